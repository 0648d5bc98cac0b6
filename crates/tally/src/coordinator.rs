//! Mutation retry coordinator
//!
//! Owns the authoritative local document and the revision tracker, and is the
//! only writer of the remote file. Each `apply`:
//! 1. Runs the transform against the current local document
//! 2. Checks the remote token against the tracked one
//! 3. Clear: writes the candidate, adopts it locally, returns it with an undo handle
//! 4. Conflict: reloads the remote document and goes back to 1 with it
//!
//! The loop is bounded by `max_attempts`. Calls are serialized through one
//! FIFO lock, so a mutation always starts from the result of the previous one.

use std::fmt;
use std::sync::Arc;
use tally_api::{AppDocument, DocumentError, RemoteVersionToken, StoreError, SyncFailure};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::conflict::{ConflictCheck, ConflictDetector};
use crate::revision::RevisionTracker;
use crate::store::RemoteDocumentStore;
use crate::undo::UndoHandle;

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

pub(crate) struct SyncState {
    pub(crate) document: AppDocument,
    pub(crate) tracker: RevisionTracker,
}

/// State shared between the coordinator and the undo handles it hands out
pub(crate) struct Shared {
    pub(crate) store: RemoteDocumentStore,
    pub(crate) detector: ConflictDetector,
    /// Held for the whole of an apply or undo; tokio's mutex is FIFO-fair
    pub(crate) state: Mutex<SyncState>,
    current: watch::Sender<AppDocument>,
}

impl Shared {
    /// Swap in a document confirmed by the remote store and notify observers
    pub(crate) fn adopt(
        &self,
        state: &mut SyncState,
        document: AppDocument,
        token: RemoteVersionToken,
    ) {
        state.document = document.clone();
        state.tracker.observe(token);
        self.current.send_replace(document);
    }
}

/// Result of a persisted mutation
pub struct Applied<T> {
    /// Document as written to the remote store
    pub document: AppDocument,
    /// Value produced by the transform (e.g., the id of a new entry)
    pub output: T,
    /// One-shot compensating write back to the pre-mutation document
    pub undo: UndoHandle,
}

impl<T: fmt::Debug> fmt::Debug for Applied<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Applied")
            .field("revision", &self.document.meta.revision)
            .field("output", &self.output)
            .field("undo", &self.undo)
            .finish()
    }
}

pub struct MutationRetryCoordinator {
    shared: Arc<Shared>,
    max_attempts: usize,
}

impl MutationRetryCoordinator {
    pub fn new(
        store: RemoteDocumentStore,
        document: AppDocument,
        token: Option<RemoteVersionToken>,
    ) -> Self {
        let tracker = token.map(RevisionTracker::with_token).unwrap_or_default();
        let (current, _) = watch::channel(document.clone());
        Self {
            shared: Arc::new(Shared {
                detector: ConflictDetector::new(store.clone()),
                store,
                state: Mutex::new(SyncState { document, tracker }),
                current,
            }),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Read the remote document and start tracking its token
    pub async fn load(store: RemoteDocumentStore) -> Result<Self, StoreError> {
        let (document, token) = store.read_content().await?;
        info!(
            "[MutationRetryCoordinator] Loaded document from {} (rev={}, categories={}, logs={})",
            store.store_name(),
            document.meta.revision,
            document.categories.len(),
            document.logs.len()
        );
        Ok(Self::new(store, document, Some(token)))
    }

    /// Set the attempt bound; values below 1 are raised to 1
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Latest confirmed document. Never blocks on an in-flight mutation.
    pub fn current(&self) -> AppDocument {
        self.shared.current.borrow().clone()
    }

    /// Receiver notified every time a write or reload replaces the local document
    pub fn subscribe(&self) -> watch::Receiver<AppDocument> {
        self.shared.current.subscribe()
    }

    pub async fn tracked_token(&self) -> Option<RemoteVersionToken> {
        self.shared.state.lock().await.tracker.current().cloned()
    }

    /// Replace the local document with the remote one, queued behind pending mutations
    #[tracing::instrument(name = "coordinator.reload", skip(self))]
    pub async fn reload(&self) -> Result<AppDocument, SyncFailure> {
        let mut state = self.shared.state.lock().await;
        let (document, token) = self
            .shared
            .store
            .read_content()
            .await
            .map_err(SyncFailure::ReloadFailed)?;
        self.shared.adopt(&mut state, document.clone(), token);
        Ok(document)
    }

    /// Apply `transform` and persist the result, reloading and replaying on conflict.
    ///
    /// The transform may run once per attempt, each time against the freshest
    /// known document, so it must be pure. A transform error aborts the call
    /// with [`SyncFailure::Rejected`] before any further remote traffic.
    #[tracing::instrument(name = "coordinator.apply", skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn apply<F, T>(&self, mut transform: F) -> Result<Applied<T>, SyncFailure>
    where
        F: FnMut(&AppDocument) -> Result<(AppDocument, T), DocumentError>,
    {
        let mut state = self.shared.state.lock().await;
        let mut snapshot = state.document.clone();

        for attempt in 1..=self.max_attempts {
            let (mut candidate, output) = transform(&state.document).inspect_err(|e| {
                debug!("[MutationRetryCoordinator] Transform rejected: {}", e);
            })?;

            let check = self
                .shared
                .detector
                .check(&state.tracker)
                .await
                .map_err(|e| {
                    error!("[MutationRetryCoordinator] Token check failed: {}", e);
                    SyncFailure::WriteFailed(e)
                })?;

            match check {
                ConflictCheck::Clear { .. } => {
                    candidate.meta.revision = state.document.meta.revision + 1;
                    let token = self.shared.store.write(&candidate).await.map_err(|e| {
                        error!("[MutationRetryCoordinator] Write failed: {}", e);
                        SyncFailure::WriteFailed(e)
                    })?;

                    info!(
                        "[MutationRetryCoordinator] Saved rev={} on attempt {}/{} (token={})",
                        candidate.meta.revision, attempt, self.max_attempts, token
                    );
                    self.shared.adopt(&mut state, candidate.clone(), token);

                    return Ok(Applied {
                        document: candidate,
                        output,
                        undo: UndoHandle::new(Arc::clone(&self.shared), snapshot),
                    });
                }
                ConflictCheck::Conflict { tracked, remote } => {
                    warn!(
                        "[MutationRetryCoordinator] Conflict on attempt {}/{} (tracked={}, remote={}), reloading",
                        attempt, self.max_attempts, tracked, remote
                    );
                    let (fresh, token) = self.shared.store.read_content().await.map_err(|e| {
                        error!("[MutationRetryCoordinator] Reload after conflict failed: {}", e);
                        SyncFailure::ReloadFailed(e)
                    })?;
                    // undo must restore what the eventual write replaces, not a stale copy
                    snapshot = fresh.clone();
                    self.shared.adopt(&mut state, fresh, token);
                }
            }
        }

        error!(
            "[MutationRetryCoordinator] Giving up after {} conflicting attempts",
            self.max_attempts
        );
        Err(SyncFailure::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }
}
