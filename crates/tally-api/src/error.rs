use thiserror::Error;

use crate::document::{CategoryId, MAX_CATEGORY_NAME_LEN};

/// Local validation failures raised by document transforms.
///
/// These never reach the network: a transform that fails does so before any
/// remote call of the attempt it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Category \"{name}\" already exists")]
    DuplicateName { name: String },

    #[error("Category name must be 1-{max} characters, got {len}", max = MAX_CATEGORY_NAME_LEN)]
    InvalidName { len: usize },

    #[error("Category not found: {id}")]
    UnknownCategory { id: CategoryId },

    #[error("Count must be a positive integer")]
    InvalidDelta,

    #[error("Goal target must be a positive integer")]
    InvalidGoalTarget,

    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    #[error("Future timestamps are not allowed: {value}")]
    FutureTimestamp { value: String },
}

/// Failures reported by a remote file store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("HTTP {status} error from {url}: {body}")]
    Http { status: u16, url: String, body: String },

    #[error("Remote file not found: {id}")]
    NotFound { id: String },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Remote document is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Outcome of a mutation or undo that did not persist
#[derive(Debug, Error)]
pub enum SyncFailure {
    #[error("Changes could not be saved after {attempts} conflicting attempts, please retry")]
    RetriesExhausted { attempts: usize },

    #[error("Failed to reload the remote document after a conflict: {0}")]
    ReloadFailed(#[source] StoreError),

    #[error("Failed to save changes: {0}")]
    WriteFailed(#[source] StoreError),

    #[error("Undo was rejected because the document changed remotely")]
    UndoConflict,

    #[error("Undo has already been used")]
    AlreadyResolved,

    #[error(transparent)]
    Rejected(#[from] DocumentError),
}

impl SyncFailure {
    /// Whether repeating the same user action is expected to succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncFailure::RetriesExhausted { .. }
                | SyncFailure::ReloadFailed(_)
                | SyncFailure::WriteFailed(_)
        )
    }
}

/// Storage bootstrap failed; no document can be synchronized this session
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to find or create folder \"{name}\": {source}")]
    Container {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to find or create data file \"{name}\": {source}")]
    File {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to encode the initial document: {0}")]
    Skeleton(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("Failed to load the remote document: {0}")]
    InitialLoad(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let network = || StoreError::Network {
            message: "offline".to_string(),
        };

        assert!(SyncFailure::RetriesExhausted { attempts: 3 }.is_transient());
        assert!(SyncFailure::ReloadFailed(network()).is_transient());
        assert!(SyncFailure::WriteFailed(network()).is_transient());
        assert!(!SyncFailure::UndoConflict.is_transient());
        assert!(!SyncFailure::AlreadyResolved.is_transient());
        assert!(!SyncFailure::Rejected(DocumentError::InvalidDelta).is_transient());
    }

    #[test]
    fn test_messages() {
        let err = DocumentError::DuplicateName {
            name: "Water".to_string(),
        };
        assert_eq!(err.to_string(), "Category \"Water\" already exists");

        let err = DocumentError::InvalidName { len: 0 };
        assert_eq!(err.to_string(), "Category name must be 1-50 characters, got 0");
    }
}
