//! Remote file store seam
//!
//! The core only assumes a versioned blob store: named folders, named files
//! created atomically with content, and an opaque token that changes on every
//! write. Transport, authentication and backoff belong to the implementation.

mod document;

pub use document::RemoteDocumentStore;

use async_trait::async_trait;
use tally_api::{ContainerId, FileHandle, RemoteVersionToken, StoreError};

/// Versioned blob store holding the document file.
///
/// Implementations:
/// - `tally_drive::DriveClient` - Google Drive application data folder
/// - `crate::testing::MemoryFileStore` - in-memory, for tests
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Short name used in logs (e.g., "drive", "memory")
    fn store_name(&self) -> &str;

    /// Look up a container by name in the application's private area
    async fn find_container(&self, name: &str) -> Result<Option<ContainerId>, StoreError>;

    async fn create_container(&self, name: &str) -> Result<ContainerId, StoreError>;

    async fn find_file(
        &self,
        container: &ContainerId,
        name: &str,
    ) -> Result<Option<FileHandle>, StoreError>;

    /// Create a file with its initial content in a single call.
    ///
    /// The file must never be observable without that content.
    async fn create_file(
        &self,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, StoreError>;

    /// Current version token, without downloading content
    async fn version_token(&self, file: &FileHandle) -> Result<RemoteVersionToken, StoreError>;

    /// Content together with the token it corresponds to.
    ///
    /// If the token cannot be fetched atomically with the content it must be
    /// fetched first, so a stale pairing can only cause a spurious conflict,
    /// never a missed one.
    async fn read(&self, file: &FileHandle) -> Result<(Vec<u8>, RemoteVersionToken), StoreError>;

    /// Replace the whole content, returning the token of the new version
    async fn write(
        &self,
        file: &FileHandle,
        content: Vec<u8>,
    ) -> Result<RemoteVersionToken, StoreError>;
}
