//! One-shot undo for a persisted mutation
//!
//! Each successful `apply` hands back an [`UndoHandle`] holding the document
//! as it was before that mutation. Undoing writes that snapshot back, guarded
//! by the same token check as a normal write but without the reload-and-retry:
//! replaying an undo over someone else's newer change would silently discard it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tally_api::{AppDocument, SyncFailure};
use tracing::{info, warn};

use crate::conflict::ConflictCheck;
use crate::coordinator::Shared;

pub struct UndoHandle {
    shared: Arc<Shared>,
    snapshot: AppDocument,
    resolved: AtomicBool,
}

impl UndoHandle {
    pub(crate) fn new(shared: Arc<Shared>, snapshot: AppDocument) -> Self {
        Self {
            shared,
            snapshot,
            resolved: AtomicBool::new(false),
        }
    }

    /// The document this handle would restore
    pub fn snapshot(&self) -> &AppDocument {
        &self.snapshot
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Write the pre-mutation document back.
    ///
    /// Fails with [`SyncFailure::UndoConflict`] if the remote file changed since
    /// this process last read or wrote it. Every call after the first, whatever
    /// its outcome, returns [`SyncFailure::AlreadyResolved`].
    #[tracing::instrument(name = "undo", skip(self))]
    pub async fn undo(&self) -> Result<AppDocument, SyncFailure> {
        if self.resolved.swap(true, Ordering::SeqCst) {
            return Err(SyncFailure::AlreadyResolved);
        }

        let mut state = self.shared.state.lock().await;
        let check = self
            .shared
            .detector
            .check(&state.tracker)
            .await
            .map_err(SyncFailure::WriteFailed)?;

        if let ConflictCheck::Conflict { tracked, remote } = check {
            warn!(
                "[UndoHandle] Remote changed since last sync (tracked={}, remote={}), refusing to undo",
                tracked, remote
            );
            return Err(SyncFailure::UndoConflict);
        }

        let mut restored = self.snapshot.clone();
        restored.meta.revision = state.document.meta.revision + 1;
        let token = self
            .shared
            .store
            .write(&restored)
            .await
            .map_err(SyncFailure::WriteFailed)?;

        info!(
            "[UndoHandle] Restored previous document as rev={} (token={})",
            restored.meta.revision, token
        );
        self.shared.adopt(&mut state, restored.clone(), token);
        Ok(restored)
    }
}

impl fmt::Debug for UndoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UndoHandle")
            .field("snapshot_revision", &self.snapshot.meta.revision)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::MutationRetryCoordinator;
    use crate::model;
    use crate::store::RemoteDocumentStore;
    use crate::testing::MemoryFileStore;
    use std::sync::Arc;
    use tally_api::{AppDocument, FileHandle, SyncFailure};

    async fn setup() -> (Arc<MemoryFileStore>, FileHandle, MutationRetryCoordinator) {
        let files = Arc::new(MemoryFileStore::new());
        let doc = model::add_category(&AppDocument::default(), "water".to_string(), "Water", None)
            .unwrap();
        let file = files.seed_file("TallyTracker", "data.json", &doc);
        let store = RemoteDocumentStore::new(files.clone(), file.clone());
        let coordinator = MutationRetryCoordinator::load(store).await.unwrap();
        (files, file, coordinator)
    }

    #[tokio::test]
    async fn test_undo_restores_previous_document() {
        let (files, file, coordinator) = setup().await;
        let before = coordinator.current();

        let applied = coordinator
            .apply(|doc| Ok((model::delete_category(doc, "water"), ())))
            .await
            .unwrap();
        assert!(files.document(&file).unwrap().category("water").is_none());

        let restored = applied.undo.undo().await.unwrap();

        assert_eq!(restored.categories, before.categories);
        assert_eq!(restored.meta.revision, applied.document.meta.revision + 1);
        assert_eq!(files.document(&file).unwrap(), restored);
        assert_eq!(coordinator.current(), restored);
        assert_eq!(coordinator.tracked_token().await, files.token(&file));
    }

    #[tokio::test]
    async fn test_second_undo_is_already_resolved() {
        let (_files, _file, coordinator) = setup().await;
        let applied = coordinator
            .apply(|doc| model::add_log(doc, "water", 1, "2024-01-01T10:00:00", None))
            .await
            .unwrap();

        applied.undo.undo().await.unwrap();
        assert!(applied.undo.is_resolved());
        assert!(matches!(
            applied.undo.undo().await,
            Err(SyncFailure::AlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn test_undo_conflict_is_not_retried() {
        let (files, file, coordinator) = setup().await;
        let applied = coordinator
            .apply(|doc| model::add_log(doc, "water", 1, "2024-01-01T10:00:00", None))
            .await
            .unwrap();
        files.foreign_update(&file, |doc| {
            *doc = model::add_log(doc, "water", 9, "2024-01-01T11:00:00", None)
                .unwrap()
                .0;
        });
        let remote_before = files.document(&file).unwrap();
        files.reset_calls();

        let err = applied.undo.undo().await.unwrap_err();

        assert!(matches!(err, SyncFailure::UndoConflict));
        assert_eq!(files.calls().writes, 0);
        assert_eq!(files.calls().content_reads, 0);
        assert_eq!(files.document(&file).unwrap(), remote_before);

        // resolved even though it failed
        assert!(matches!(
            applied.undo.undo().await,
            Err(SyncFailure::AlreadyResolved)
        ));
    }

    #[tokio::test]
    async fn test_undo_after_conflict_restores_reloaded_state() {
        let (files, file, coordinator) = setup().await;
        files.foreign_update(&file, |doc| {
            *doc = model::add_category(doc, "tea".to_string(), "Tea", None).unwrap();
        });

        let applied = coordinator
            .apply(|doc| model::add_log(doc, "water", 1, "2024-01-01T10:00:00", None))
            .await
            .unwrap();
        let restored = applied.undo.undo().await.unwrap();

        // the other client's category survives the undo
        assert!(restored.category("tea").is_some());
        assert!(restored.logs.is_empty());
    }

    #[tokio::test]
    async fn test_undo_write_failure_is_reported() {
        let (files, _file, coordinator) = setup().await;
        let applied = coordinator
            .apply(|doc| model::add_log(doc, "water", 1, "2024-01-01T10:00:00", None))
            .await
            .unwrap();
        let current = coordinator.current();
        files.fail_next_writes(1);

        assert!(matches!(
            applied.undo.undo().await,
            Err(SyncFailure::WriteFailed(_))
        ));
        assert_eq!(coordinator.current(), current);
        assert!(matches!(
            applied.undo.undo().await,
            Err(SyncFailure::AlreadyResolved)
        ));
    }
}
