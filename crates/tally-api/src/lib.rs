//! Shared types for the tally document
//!
//! This crate holds everything that crosses a boundary between the sync core,
//! the storage backends and the frontends:
//! - `document` - the typed in-memory document (categories, logs, meta)
//! - `wire` - the JSON encoding used by stored documents (positional log entries)
//! - `remote` - opaque identifiers and version tokens issued by the remote store
//! - `error` - the error taxonomy returned to callers

pub mod document;
pub mod error;
pub mod remote;
mod wire;

pub use document::{
    parse_timestamp, AppDocument, Category, CategoryId, DocumentMeta, Goal, GoalType, LogEntry,
    LogId, FORMAT_VERSION, MAX_CATEGORY_NAME_LEN,
};
pub use error::{DocumentError, ProvisionError, SessionError, StoreError, SyncFailure};
pub use remote::{ContainerId, FileHandle, RemoteVersionToken};
