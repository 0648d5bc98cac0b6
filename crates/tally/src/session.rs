use chrono::{NaiveDateTime, Utc};
use std::sync::Arc;
use tally_api::{
    AppDocument, CategoryId, FileHandle, Goal, LogId, SessionError, SyncFailure,
};
use tokio::sync::watch;
use tracing::info;

use crate::config::TallyConfig;
use crate::coordinator::{Applied, MutationRetryCoordinator};
use crate::model;
use crate::provision::StorageProvisioner;
use crate::store::{RemoteDocumentStore, RemoteFileStore};

/// A connected client: provisioned file, loaded document, ready to mutate.
///
/// Each operation is one logical user action. Its transform is replayed on
/// conflict, so anything that must stay fixed across replays (a new category
/// id, the "now" used for timestamp checks) is computed here, once.
pub struct TallySession {
    coordinator: MutationRetryCoordinator,
    file: FileHandle,
}

impl TallySession {
    #[tracing::instrument(name = "session.connect", skip_all, fields(store = files.store_name()))]
    pub async fn connect(
        files: Arc<dyn RemoteFileStore>,
        config: &TallyConfig,
    ) -> Result<Self, SessionError> {
        let file = StorageProvisioner::from_config(files.clone(), config)
            .ensure_storage()
            .await?;
        let store = RemoteDocumentStore::new(files, file.clone());
        let coordinator = MutationRetryCoordinator::load(store)
            .await
            .map_err(SessionError::InitialLoad)?
            .with_max_attempts(config.max_attempts);

        info!("[TallySession] Connected to {}", file);
        Ok(Self { coordinator, file })
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn coordinator(&self) -> &MutationRetryCoordinator {
        &self.coordinator
    }

    pub fn document(&self) -> AppDocument {
        self.coordinator.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppDocument> {
        self.coordinator.subscribe()
    }

    /// Pull the remote document, e.g. when the app returns to the foreground
    pub async fn refresh(&self) -> Result<AppDocument, SyncFailure> {
        self.coordinator.reload().await
    }

    pub async fn add_category(
        &self,
        name: &str,
        goal: Option<Goal>,
    ) -> Result<Applied<CategoryId>, SyncFailure> {
        let id = model::generate_category_id();
        self.coordinator
            .apply(|doc| {
                let next = model::add_category(doc, id.clone(), name, goal.clone())?;
                Ok((next, id.clone()))
            })
            .await
    }

    pub async fn rename_category(
        &self,
        id: &str,
        new_name: &str,
    ) -> Result<Applied<()>, SyncFailure> {
        self.coordinator
            .apply(|doc| Ok((model::rename_category(doc, id, new_name)?, ())))
            .await
    }

    pub async fn delete_category(&self, id: &str) -> Result<Applied<()>, SyncFailure> {
        self.coordinator
            .apply(|doc| Ok((model::delete_category(doc, id), ())))
            .await
    }

    /// Log against `category_id` at `timestamp`, which must not be later than now
    pub async fn add_log(
        &self,
        category_id: &str,
        delta: u32,
        timestamp: &str,
        note: Option<&str>,
    ) -> Result<Applied<LogId>, SyncFailure> {
        self.add_log_at(category_id, delta, timestamp, note, Utc::now().naive_utc())
            .await
    }

    pub async fn add_log_at(
        &self,
        category_id: &str,
        delta: u32,
        timestamp: &str,
        note: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<Applied<LogId>, SyncFailure> {
        model::check_not_future(timestamp, now)?;
        self.coordinator
            .apply(|doc| model::add_log(doc, category_id, delta, timestamp, note))
            .await
    }

    pub async fn edit_log(
        &self,
        id: LogId,
        new_delta: u32,
        new_note: Option<&str>,
    ) -> Result<Applied<()>, SyncFailure> {
        self.coordinator
            .apply(|doc| Ok((model::edit_log(doc, id, new_delta, new_note)?, ())))
            .await
    }

    pub async fn delete_log(&self, id: LogId) -> Result<Applied<()>, SyncFailure> {
        self.coordinator
            .apply(|doc| Ok((model::delete_log(doc, id), ())))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFileStore;
    use chrono::NaiveDate;
    use tally_api::{DocumentError, GoalType};

    async fn connect() -> (Arc<MemoryFileStore>, TallySession) {
        let files = Arc::new(MemoryFileStore::new());
        let session = TallySession::connect(files.clone(), &TallyConfig::default())
            .await
            .unwrap();
        (files, session)
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_provisions_and_loads_skeleton() {
        let (files, session) = connect().await;

        assert_eq!(files.file_count(), 1);
        assert_eq!(session.document().meta.revision, 0);
        assert_eq!(session.coordinator().max_attempts(), 3);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let files = Arc::new(MemoryFileStore::new());
        files.fail_lookups(true);
        let err = TallySession::connect(files.clone(), &TallyConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::Provision(_)));

        files.fail_lookups(false);
        files.fail_next_content_reads(1);
        let err = TallySession::connect(files, &TallyConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::InitialLoad(_)));
    }

    #[tokio::test]
    async fn test_operations_persist() {
        let (files, session) = connect().await;

        let goal = Goal::new(GoalType::Daily, 8).unwrap();
        let water = session.add_category("Water", Some(goal)).await.unwrap().output;
        let first = session
            .add_log_at(&water, 2, "2024-01-01T10:00:00", Some("morning"), noon())
            .await
            .unwrap()
            .output;
        session.edit_log(first, 3, None).await.unwrap();
        session.rename_category(&water, "H2O").await.unwrap();

        let remote = files.document(session.file()).unwrap();
        assert_eq!(remote, session.document());
        assert_eq!(remote.meta.revision, 4);
        assert_eq!(remote.categories[&water].name, "H2O");
        assert_eq!(remote.logs[0].delta, 3);
        assert_eq!(remote.logs[0].note, None);

        session.delete_log(first).await.unwrap();
        session.delete_category(&water).await.unwrap();
        let remote = files.document(session.file()).unwrap();
        assert!(remote.categories.is_empty());
        assert!(remote.logs.is_empty());
    }

    #[tokio::test]
    async fn test_future_timestamp_never_reaches_the_store() {
        let (files, session) = connect().await;
        let water = session.add_category("Water", None).await.unwrap().output;
        files.reset_calls();

        let err = session
            .add_log_at(&water, 1, "2024-01-01T12:00:01", None, noon())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncFailure::Rejected(DocumentError::FutureTimestamp { .. })
        ));
        assert_eq!(files.calls(), Default::default());
    }

    #[tokio::test]
    async fn test_category_id_is_stable_across_replays() {
        let (files, session) = connect().await;
        files.interfere_before_token_reads(2);

        let applied = session.add_category("Water", None).await.unwrap();

        assert_eq!(files.calls().writes, 1);
        assert!(applied.document.categories.contains_key(&applied.output));
        assert_eq!(applied.document.categories.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected_locally() {
        let (files, session) = connect().await;
        session.add_category("Water", None).await.unwrap();
        files.reset_calls();

        let err = session.add_category(" water ", None).await.unwrap_err();

        assert!(matches!(
            err,
            SyncFailure::Rejected(DocumentError::DuplicateName { .. })
        ));
        assert_eq!(files.calls().token_reads, 0);
    }
}
