use std::sync::Arc;
use tally_api::{AppDocument, FileHandle, RemoteVersionToken, StoreError};
use tracing::debug;

use super::RemoteFileStore;

/// Typed access to the single data file.
///
/// Wraps a [`RemoteFileStore`] and the handle resolved by provisioning, and
/// converts between [`AppDocument`] and the stored JSON bytes.
#[derive(Clone)]
pub struct RemoteDocumentStore {
    files: Arc<dyn RemoteFileStore>,
    file: FileHandle,
}

impl RemoteDocumentStore {
    pub fn new(files: Arc<dyn RemoteFileStore>, file: FileHandle) -> Self {
        Self { files, file }
    }

    pub fn file(&self) -> &FileHandle {
        &self.file
    }

    pub fn store_name(&self) -> &str {
        self.files.store_name()
    }

    #[tracing::instrument(name = "remote.read_content", skip(self), fields(file = %self.file))]
    pub async fn read_content(&self) -> Result<(AppDocument, RemoteVersionToken), StoreError> {
        let (bytes, token) = self.files.read(&self.file).await?;
        let document = AppDocument::from_json_slice(&bytes)?;
        debug!(
            "[RemoteDocumentStore] Read {} bytes (rev={}, categories={}, logs={}, token={})",
            bytes.len(),
            document.meta.revision,
            document.categories.len(),
            document.logs.len(),
            token
        );
        Ok((document, token))
    }

    #[tracing::instrument(name = "remote.read_token", skip(self), fields(file = %self.file))]
    pub async fn read_current_token(&self) -> Result<RemoteVersionToken, StoreError> {
        self.files.version_token(&self.file).await
    }

    #[tracing::instrument(name = "remote.write", skip(self, document), fields(file = %self.file, rev = document.meta.revision))]
    pub async fn write(&self, document: &AppDocument) -> Result<RemoteVersionToken, StoreError> {
        let bytes = document.to_json_vec()?;
        let len = bytes.len();
        let token = self.files.write(&self.file, bytes).await?;
        debug!(
            "[RemoteDocumentStore] Wrote {} bytes, new token={}",
            len, token
        );
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFileStore;

    #[tokio::test]
    async fn test_write_then_read_round_trips_document() {
        let files = Arc::new(MemoryFileStore::new());
        let file = files.seed_file("TallyTracker", "data.json", &AppDocument::default());
        let store = RemoteDocumentStore::new(files.clone(), file);

        let mut doc = AppDocument::default();
        doc.meta.revision = 4;
        let written = store.write(&doc).await.unwrap();

        let (read, token) = store.read_content().await.unwrap();
        assert_eq!(read, doc);
        assert_eq!(token, written);
        assert_eq!(store.read_current_token().await.unwrap(), written);
    }

    #[tokio::test]
    async fn test_invalid_json_is_reported_as_corrupt() {
        let files = Arc::new(MemoryFileStore::new());
        let file = files.seed_file("TallyTracker", "data.json", &AppDocument::default());
        files.overwrite_raw(&file, b"not json".to_vec());
        let store = RemoteDocumentStore::new(files, file);

        assert!(matches!(
            store.read_content().await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
