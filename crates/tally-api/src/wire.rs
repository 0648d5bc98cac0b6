//! JSON encoding of the stored document
//!
//! Stored layout:
//! ```json
//! {"v":1,"meta":{"rev":3,"created":"..."},
//!  "cats":{"<id>":{"n":"Water","g":{"t":"D","x":8}}},
//!  "logs":[[1,"2024-01-01T10:00:00","<id>",3],[2,"2024-01-01T14:00:00","<id>",2,"note"]]}
//! ```
//! Log entries are positional arrays of 4 elements, or 5 when a note is present.
//! Existing files depend on that shape, so it is produced and accepted exactly.
//! Missing or null `meta`, `cats` and `logs` load as empty.

use serde::de::{self, Deserializer, IgnoredAny, SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::document::{AppDocument, Category, DocumentMeta, Goal, LogEntry, FORMAT_VERSION};

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

/// Treat an explicit `null` the same as a missing key
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct WireMeta {
    #[serde(default, deserialize_with = "nullable")]
    rev: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireCategory {
    n: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    g: Option<Goal>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireDocument {
    #[serde(default = "default_format_version")]
    v: u32,
    #[serde(default, deserialize_with = "nullable")]
    meta: WireMeta,
    #[serde(default, deserialize_with = "nullable")]
    cats: BTreeMap<String, WireCategory>,
    #[serde(default, deserialize_with = "nullable")]
    logs: Vec<LogEntry>,
}

impl From<WireDocument> for AppDocument {
    fn from(wire: WireDocument) -> Self {
        let categories = wire
            .cats
            .into_iter()
            .map(|(id, cat)| {
                let category = Category {
                    id: id.clone(),
                    name: cat.n,
                    goal: cat.g,
                };
                (id, category)
            })
            .collect();

        AppDocument {
            format_version: wire.v,
            meta: DocumentMeta {
                revision: wire.meta.rev,
                created: wire.meta.created,
            },
            categories,
            logs: wire.logs,
        }
    }
}

impl From<AppDocument> for WireDocument {
    fn from(doc: AppDocument) -> Self {
        let cats = doc
            .categories
            .into_values()
            .map(|cat| {
                (
                    cat.id,
                    WireCategory {
                        n: cat.name,
                        g: cat.goal,
                    },
                )
            })
            .collect();

        WireDocument {
            v: doc.format_version,
            meta: WireMeta {
                rev: doc.meta.revision,
                created: doc.meta.created,
            },
            cats,
            logs: doc.logs,
        }
    }
}

impl Serialize for AppDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireDocument::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AppDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        WireDocument::deserialize(deserializer).map(AppDocument::from)
    }
}

impl Serialize for LogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.note.is_some() { 5 } else { 4 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.id)?;
        seq.serialize_element(&self.timestamp)?;
        seq.serialize_element(&self.category_id)?;
        seq.serialize_element(&self.delta)?;
        if let Some(note) = &self.note {
            seq.serialize_element(note)?;
        }
        seq.end()
    }
}

struct LogEntryVisitor;

impl<'de> Visitor<'de> for LogEntryVisitor {
    type Value = LogEntry;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a log entry array [id, timestamp, categoryId, delta] with an optional note")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<LogEntry, A::Error> {
        let id = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let timestamp = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
        let category_id = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(2, &self))?;
        let delta = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(3, &self))?;
        let note: Option<Option<String>> = seq.next_element()?;
        if seq.next_element::<IgnoredAny>()?.is_some() {
            return Err(de::Error::invalid_length(6, &self));
        }

        Ok(LogEntry {
            id,
            timestamp,
            category_id,
            delta,
            note: note.flatten().filter(|n| !n.is_empty()),
        })
    }
}

impl<'de> Deserialize<'de> for LogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(LogEntryVisitor)
    }
}
