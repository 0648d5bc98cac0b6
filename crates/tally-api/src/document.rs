//! Typed representation of the synchronized document
//!
//! The stored form uses compact keys and positional log entries (see `wire`);
//! everything in this module works on named fields only.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DocumentError;

/// Current value of the top-level `v` key.
pub const FORMAT_VERSION: u32 = 1;

/// Upper bound on category name length, in characters.
pub const MAX_CATEGORY_NAME_LEN: usize = 50;

/// Opaque client-generated category identifier.
pub type CategoryId = String;

/// Per-document log identifier, assigned as `max(existing) + 1`.
pub type LogId = u64;

/// Period a goal target applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalType {
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "W")]
    Weekly,
    #[serde(rename = "M")]
    Monthly,
    #[serde(rename = "Y")]
    Yearly,
}

impl GoalType {
    /// Single-letter code used in stored documents
    pub fn code(&self) -> &'static str {
        match self {
            GoalType::Daily => "D",
            GoalType::Weekly => "W",
            GoalType::Monthly => "M",
            GoalType::Yearly => "Y",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GoalType::Daily => "Daily",
            GoalType::Weekly => "Weekly",
            GoalType::Monthly => "Monthly",
            GoalType::Yearly => "Yearly",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GoalType {
    type Err = String;

    /// Accepts either the stored code (`D`) or the label (`daily`), case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "daily" => Ok(GoalType::Daily),
            "w" | "weekly" => Ok(GoalType::Weekly),
            "m" | "monthly" => Ok(GoalType::Monthly),
            "y" | "yearly" => Ok(GoalType::Yearly),
            other => Err(format!("unknown goal type: {}", other)),
        }
    }
}

/// Periodic target for a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    #[serde(rename = "t")]
    pub goal_type: GoalType,
    #[serde(rename = "x")]
    pub target: u32,
}

impl Goal {
    pub fn new(goal_type: GoalType, target: u32) -> Result<Self, DocumentError> {
        if target == 0 {
            return Err(DocumentError::InvalidGoalTarget);
        }
        Ok(Self { goal_type, target })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub goal: Option<Goal>,
}

/// A single counted event.
///
/// `timestamp` is kept verbatim as written by the client so that documents
/// round-trip byte-for-byte in that field; use [`LogEntry::parsed_timestamp`]
/// to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: LogId,
    pub timestamp: String,
    pub category_id: CategoryId,
    pub delta: u32,
    pub note: Option<String>,
}

impl LogEntry {
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Parse a stored timestamp as a naive UTC date-time.
///
/// Accepts minute precision (`2024-01-01T10:00`, what date-time inputs emit),
/// second or sub-second precision, and full RFC 3339 (converted to UTC).
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).naive_utc())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMeta {
    /// Incremented by the writer on every successful save. Informational only.
    pub revision: u64,
    /// RFC 3339 creation time, written once by the provisioner
    pub created: Option<String>,
}

/// The single synchronized unit: every category and log for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDocument {
    pub format_version: u32,
    pub meta: DocumentMeta,
    pub categories: BTreeMap<CategoryId, Category>,
    pub logs: Vec<LogEntry>,
}

impl Default for AppDocument {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            meta: DocumentMeta::default(),
            categories: BTreeMap::new(),
            logs: Vec::new(),
        }
    }
}

impl AppDocument {
    /// Document written when the remote file is first created
    pub fn skeleton(created: DateTime<Utc>) -> Self {
        Self {
            meta: DocumentMeta {
                revision: 0,
                created: Some(created.to_rfc3339_opts(SecondsFormat::Millis, true)),
            },
            ..Self::default()
        }
    }

    pub fn next_log_id(&self) -> LogId {
        self.logs.iter().map(|log| log.id).max().unwrap_or(0) + 1
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    /// Case-insensitive lookup by name
    pub fn category_by_name(&self, name: &str) -> Option<&Category> {
        let wanted = name.trim().to_lowercase();
        self.categories
            .values()
            .find(|category| category.name.trim().to_lowercase() == wanted)
    }

    pub fn log(&self, id: LogId) -> Option<&LogEntry> {
        self.logs.iter().find(|log| log.id == id)
    }

    pub fn logs_for<'a>(&'a self, category_id: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.logs
            .iter()
            .filter(move |log| log.category_id == category_id)
    }

    /// Log entries whose category no longer exists
    pub fn dangling_logs(&self) -> impl Iterator<Item = &LogEntry> + '_ {
        self.logs
            .iter()
            .filter(|log| !self.categories.contains_key(&log.category_id))
    }

    pub fn from_json_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_json_vec(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
