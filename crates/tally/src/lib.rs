//! Sync core for the tally tracker
//!
//! Keeps one JSON document in a revision-tracked remote file consistent across
//! clients that write to it independently:
//!
//! - `model` - pure document transforms (categories, logs, validation)
//! - `store` - RemoteFileStore seam and the typed RemoteDocumentStore on top of it
//! - `revision` / `conflict` - token tracking and the pre-write conflict check
//! - `coordinator` - MutationRetryCoordinator, the bounded reload-and-retry write loop
//! - `undo` - one-shot compensating write for the last mutation
//! - `provision` - first-use creation of the folder and data file
//! - `session` - TallySession, the facade frontends talk to
//! - `config` - YAML configuration
//! - `testing` - MemoryFileStore with call counting and fault injection

pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod model;
pub mod provision;
pub mod revision;
pub mod session;
pub mod store;
pub mod testing;
pub mod undo;

pub use config::{load_yaml, ConfigError, TallyConfig};
pub use conflict::{ConflictCheck, ConflictDetector};
pub use coordinator::{Applied, MutationRetryCoordinator, DEFAULT_MAX_ATTEMPTS};
pub use provision::StorageProvisioner;
pub use revision::RevisionTracker;
pub use session::TallySession;
pub use store::{RemoteDocumentStore, RemoteFileStore};
pub use undo::UndoHandle;

pub use tally_api;
