use chrono::Utc;
use std::sync::Arc;
use tally_api::{AppDocument, ContainerId, FileHandle, ProvisionError};
use tracing::info;

use crate::config::TallyConfig;
use crate::store::RemoteFileStore;

/// Resolves the data file, creating its folder and skeleton document on first use
pub struct StorageProvisioner {
    files: Arc<dyn RemoteFileStore>,
    folder_name: String,
    file_name: String,
}

impl StorageProvisioner {
    pub fn new(
        files: Arc<dyn RemoteFileStore>,
        folder_name: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            files,
            folder_name: folder_name.into(),
            file_name: file_name.into(),
        }
    }

    pub fn from_config(files: Arc<dyn RemoteFileStore>, config: &TallyConfig) -> Self {
        Self::new(files, config.folder_name.clone(), config.file_name.clone())
    }

    /// Idempotent: once both exist, only lookups are issued
    #[tracing::instrument(name = "provision.ensure_storage", skip(self), fields(store = self.files.store_name()))]
    pub async fn ensure_storage(&self) -> Result<FileHandle, ProvisionError> {
        let container = self.ensure_container().await?;
        self.ensure_file(&container).await
    }

    async fn ensure_container(&self) -> Result<ContainerId, ProvisionError> {
        let wrap = |source| ProvisionError::Container {
            name: self.folder_name.clone(),
            source,
        };

        if let Some(existing) = self.files.find_container(&self.folder_name).await.map_err(wrap)? {
            return Ok(existing);
        }

        let created = self
            .files
            .create_container(&self.folder_name)
            .await
            .map_err(wrap)?;
        info!(
            "[StorageProvisioner] Created folder \"{}\" ({})",
            self.folder_name, created
        );
        Ok(created)
    }

    async fn ensure_file(&self, container: &ContainerId) -> Result<FileHandle, ProvisionError> {
        let wrap = |source| ProvisionError::File {
            name: self.file_name.clone(),
            source,
        };

        if let Some(existing) = self
            .files
            .find_file(container, &self.file_name)
            .await
            .map_err(wrap)?
        {
            return Ok(existing);
        }

        let skeleton = AppDocument::skeleton(Utc::now())
            .to_json_vec()
            .map_err(ProvisionError::Skeleton)?;
        let created = self
            .files
            .create_file(container, &self.file_name, skeleton)
            .await
            .map_err(wrap)?;
        info!(
            "[StorageProvisioner] Created data file \"{}\" ({})",
            self.file_name, created
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFileStore;

    fn provisioner(files: &Arc<MemoryFileStore>) -> StorageProvisioner {
        StorageProvisioner::from_config(files.clone(), &TallyConfig::default())
    }

    #[tokio::test]
    async fn test_first_run_creates_folder_and_skeleton() {
        let files = Arc::new(MemoryFileStore::new());

        let file = provisioner(&files).ensure_storage().await.unwrap();

        assert_eq!(files.container_count(), 1);
        assert_eq!(files.file_count(), 1);
        let doc = files.document(&file).unwrap();
        assert_eq!(doc.meta.revision, 0);
        assert!(doc.meta.created.is_some());
        assert!(doc.categories.is_empty());
        assert!(doc.logs.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_calls_create_nothing_new() {
        let files = Arc::new(MemoryFileStore::new());
        let provisioner = provisioner(&files);
        let first = provisioner.ensure_storage().await.unwrap();
        files.reset_calls();

        let second = provisioner.ensure_storage().await.unwrap();

        assert_eq!(first, second);
        let calls = files.calls();
        assert_eq!(calls.containers_created, 0);
        assert_eq!(calls.files_created, 0);
        assert_eq!(calls.container_lookups, 1);
        assert_eq!(calls.file_lookups, 1);
    }

    #[tokio::test]
    async fn test_existing_file_is_left_untouched() {
        let files = Arc::new(MemoryFileStore::new());
        let mut doc = AppDocument::default();
        doc.meta.revision = 12;
        let seeded = files.seed_file("TallyTracker", "tally_tracker_data.json", &doc);

        let file = provisioner(&files).ensure_storage().await.unwrap();

        assert_eq!(file, seeded);
        assert_eq!(files.document(&file).unwrap().meta.revision, 12);
        assert_eq!(files.calls().writes, 0);
    }

    #[tokio::test]
    async fn test_failures_are_provision_errors() {
        let files = Arc::new(MemoryFileStore::new());
        files.fail_lookups(true);
        assert!(matches!(
            provisioner(&files).ensure_storage().await,
            Err(ProvisionError::Container { .. })
        ));

        files.fail_lookups(false);
        files.fail_creates(true);
        assert!(matches!(
            provisioner(&files).ensure_storage().await,
            Err(ProvisionError::Container { .. })
        ));
        assert_eq!(files.file_count(), 0);
    }

    #[tokio::test]
    async fn test_file_create_failure() {
        let files = Arc::new(MemoryFileStore::new());
        files.seed_file("TallyTracker", "other.json", &AppDocument::default());
        files.fail_creates(true);

        let err = provisioner(&files).ensure_storage().await.unwrap_err();

        assert!(matches!(err, ProvisionError::File { ref name, .. } if name == "tally_tracker_data.json"));
    }
}
