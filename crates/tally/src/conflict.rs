use tally_api::{RemoteVersionToken, StoreError};
use tracing::debug;

use crate::revision::RevisionTracker;
use crate::store::RemoteDocumentStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Remote still matches what was last seen; a write may proceed
    Clear { remote: RemoteVersionToken },
    /// Someone else wrote since the last read or write
    Conflict {
        tracked: RemoteVersionToken,
        remote: RemoteVersionToken,
    },
}

impl ConflictCheck {
    pub fn compare(tracker: &RevisionTracker, remote: RemoteVersionToken) -> Self {
        match tracker.current() {
            Some(tracked) if *tracked != remote => ConflictCheck::Conflict {
                tracked: tracked.clone(),
                remote,
            },
            _ => ConflictCheck::Clear { remote },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ConflictCheck::Conflict { .. })
    }
}

/// Pre-write check of the remote token against the tracked one
#[derive(Clone)]
pub struct ConflictDetector {
    store: RemoteDocumentStore,
}

impl ConflictDetector {
    pub fn new(store: RemoteDocumentStore) -> Self {
        Self { store }
    }

    pub async fn check(&self, tracker: &RevisionTracker) -> Result<ConflictCheck, StoreError> {
        let remote = self.store.read_current_token().await?;
        let check = ConflictCheck::compare(tracker, remote);
        debug!("[ConflictDetector] {:?}", check);
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(s: &str) -> RemoteVersionToken {
        RemoteVersionToken::new(s)
    }

    #[test]
    fn test_compare() {
        let untracked = RevisionTracker::new();
        assert_eq!(
            ConflictCheck::compare(&untracked, token("a")),
            ConflictCheck::Clear { remote: token("a") }
        );

        let tracked = RevisionTracker::with_token(token("a"));
        assert!(!ConflictCheck::compare(&tracked, token("a")).is_conflict());
        assert_eq!(
            ConflictCheck::compare(&tracked, token("b")),
            ConflictCheck::Conflict {
                tracked: token("a"),
                remote: token("b"),
            }
        );
    }
}
