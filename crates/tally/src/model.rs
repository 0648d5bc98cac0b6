//! Document transforms
//!
//! Every function here is pure: it takes a snapshot, returns a fresh snapshot
//! and never touches the caller's copy. The coordinator relies on this to
//! replay the same logical change against a reloaded document after a
//! conflict, so a transform must not have effects outside the document it
//! returns. Check any new transform against that before adding it.

use chrono::{NaiveDateTime, Utc};
use rand::Rng;
use tally_api::{
    parse_timestamp, AppDocument, Category, CategoryId, DocumentError, Goal, LogEntry, LogId,
    MAX_CATEGORY_NAME_LEN,
};

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Short client-side id: base-36 millisecond clock followed by five random base-36 characters
pub fn generate_category_id() -> CategoryId {
    let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..5)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}{}", to_base36(millis), suffix)
}

fn normalize_name(name: &str) -> Result<String, DocumentError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > MAX_CATEGORY_NAME_LEN {
        return Err(DocumentError::InvalidName { len });
    }
    Ok(trimmed.to_string())
}

fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

fn ensure_unique_name(
    doc: &AppDocument,
    name: &str,
    except: Option<&str>,
) -> Result<(), DocumentError> {
    match doc.category_by_name(name) {
        Some(existing) if Some(existing.id.as_str()) != except => {
            Err(DocumentError::DuplicateName {
                name: name.to_string(),
            })
        }
        _ => Ok(()),
    }
}

pub fn add_category(
    doc: &AppDocument,
    id: CategoryId,
    name: &str,
    goal: Option<Goal>,
) -> Result<AppDocument, DocumentError> {
    let name = normalize_name(name)?;
    if goal.as_ref().is_some_and(|g| g.target == 0) {
        return Err(DocumentError::InvalidGoalTarget);
    }
    ensure_unique_name(doc, &name, None)?;

    let mut next = doc.clone();
    next.categories
        .insert(id.clone(), Category { id, name, goal });
    Ok(next)
}

/// Renames a category. Unknown ids leave the document unchanged.
pub fn rename_category(
    doc: &AppDocument,
    id: &str,
    new_name: &str,
) -> Result<AppDocument, DocumentError> {
    let name = normalize_name(new_name)?;
    if !doc.categories.contains_key(id) {
        return Ok(doc.clone());
    }
    ensure_unique_name(doc, &name, Some(id))?;

    let mut next = doc.clone();
    if let Some(category) = next.categories.get_mut(id) {
        category.name = name;
    }
    Ok(next)
}

/// Removes a category together with every log that references it
pub fn delete_category(doc: &AppDocument, id: &str) -> AppDocument {
    let mut next = doc.clone();
    if next.categories.remove(id).is_some() {
        next.logs.retain(|log| log.category_id != id);
    }
    next
}

/// Appends a log entry and returns the id it was given.
///
/// "Not in the future" is the caller's check (see [`check_not_future`]); the
/// transform cannot know the caller's clock.
pub fn add_log(
    doc: &AppDocument,
    category_id: &str,
    delta: u32,
    timestamp: &str,
    note: Option<&str>,
) -> Result<(AppDocument, LogId), DocumentError> {
    if delta == 0 {
        return Err(DocumentError::InvalidDelta);
    }
    if !doc.categories.contains_key(category_id) {
        return Err(DocumentError::UnknownCategory {
            id: category_id.to_string(),
        });
    }

    let id = doc.next_log_id();
    let mut next = doc.clone();
    next.logs.push(LogEntry {
        id,
        timestamp: timestamp.to_string(),
        category_id: category_id.to_string(),
        delta,
        note: normalize_note(note),
    });
    Ok((next, id))
}

/// Replaces a log's count and note; `None` clears the note. Unknown ids are a no-op.
pub fn edit_log(
    doc: &AppDocument,
    id: LogId,
    new_delta: u32,
    new_note: Option<&str>,
) -> Result<AppDocument, DocumentError> {
    if new_delta == 0 {
        return Err(DocumentError::InvalidDelta);
    }

    let mut next = doc.clone();
    if let Some(log) = next.logs.iter_mut().find(|log| log.id == id) {
        log.delta = new_delta;
        log.note = normalize_note(new_note);
    }
    Ok(next)
}

pub fn delete_log(doc: &AppDocument, id: LogId) -> AppDocument {
    let mut next = doc.clone();
    next.logs.retain(|log| log.id != id);
    next
}

/// Rejects timestamps that do not parse or that lie after `now`
pub fn check_not_future(timestamp: &str, now: NaiveDateTime) -> Result<(), DocumentError> {
    let parsed = parse_timestamp(timestamp).ok_or_else(|| DocumentError::InvalidTimestamp {
        value: timestamp.to_string(),
    })?;
    if parsed > now {
        return Err(DocumentError::FutureTimestamp {
            value: timestamp.to_string(),
        });
    }
    Ok(())
}
