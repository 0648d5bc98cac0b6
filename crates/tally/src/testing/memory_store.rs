//! In-memory remote file store
//!
//! MemoryFileStore implements RemoteFileStore over a HashMap:
//! - Every write bumps the file's revision; the token is derived from it
//! - Counts every call so tests can assert exact read/write traffic
//! - Injects failures and writes from a simulated second client

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tally_api::{AppDocument, ContainerId, FileHandle, RemoteVersionToken, StoreError};

use crate::store::RemoteFileStore;

/// Number of calls made against a [`MemoryFileStore`], by operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub container_lookups: usize,
    pub containers_created: usize,
    pub file_lookups: usize,
    pub files_created: usize,
    pub token_reads: usize,
    pub content_reads: usize,
    pub writes: usize,
}

#[derive(Debug, Default)]
struct Faults {
    fail_lookups: bool,
    fail_creates: bool,
    fail_token_reads: usize,
    fail_content_reads: usize,
    fail_writes: usize,
    /// Token reads that are each preceded by a write from another client
    interfering_token_reads: usize,
}

#[derive(Debug)]
struct StoredFile {
    container: ContainerId,
    name: String,
    content: Vec<u8>,
    revision: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: Vec<(ContainerId, String)>,
    files: HashMap<FileHandle, StoredFile>,
    next_id: u64,
    calls: CallCounts,
    faults: Faults,
}

impl MemoryState {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn file_mut(&mut self, file: &FileHandle) -> Result<&mut StoredFile, StoreError> {
        self.files.get_mut(file).ok_or_else(|| StoreError::NotFound {
            id: file.to_string(),
        })
    }
}

fn token_for(file: &FileHandle, revision: u64) -> RemoteVersionToken {
    RemoteVersionToken::new(format!("{}@{}", file, revision))
}

fn injected(operation: &str) -> StoreError {
    StoreError::Network {
        message: format!("injected failure: {}", operation),
    }
}

/// Take one unit from a fault counter, returning whether it fired
fn consume(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

#[derive(Debug, Default)]
pub struct MemoryFileStore {
    state: Mutex<MemoryState>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    pub fn reset_calls(&self) {
        self.state().calls = CallCounts::default();
    }

    /// Create a container and file directly, bypassing call counting
    pub fn seed_file(&self, container_name: &str, file_name: &str, doc: &AppDocument) -> FileHandle {
        let mut state = self.state();
        let container = ContainerId::new(state.fresh_id("folder"));
        state
            .containers
            .push((container.clone(), container_name.to_string()));
        let file = FileHandle::new(state.fresh_id("file"));
        state.files.insert(
            file.clone(),
            StoredFile {
                container,
                name: file_name.to_string(),
                content: serde_json::to_vec(doc).unwrap_or_default(),
                revision: 1,
            },
        );
        file
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    pub fn file_count(&self) -> usize {
        self.state().files.len()
    }

    pub fn raw(&self, file: &FileHandle) -> Option<Vec<u8>> {
        self.state().files.get(file).map(|f| f.content.clone())
    }

    pub fn document(&self, file: &FileHandle) -> Option<AppDocument> {
        self.raw(file)
            .and_then(|bytes| AppDocument::from_json_slice(&bytes).ok())
    }

    pub fn token(&self, file: &FileHandle) -> Option<RemoteVersionToken> {
        self.state()
            .files
            .get(file)
            .map(|f| token_for(file, f.revision))
    }

    /// Replace the content as another client would, bumping the revision
    pub fn overwrite_raw(&self, file: &FileHandle, content: Vec<u8>) {
        if let Some(stored) = self.state().files.get_mut(file) {
            stored.content = content;
            stored.revision += 1;
        }
    }

    /// Apply `change` to the stored document as another client would
    pub fn foreign_update(&self, file: &FileHandle, change: impl FnOnce(&mut AppDocument)) {
        let Some(mut doc) = self.document(file) else {
            return;
        };
        change(&mut doc);
        doc.meta.revision += 1;
        self.overwrite_raw(file, serde_json::to_vec(&doc).unwrap_or_default());
    }

    /// Remove the file, as if deleted by another client
    pub fn remove_file(&self, file: &FileHandle) {
        self.state().files.remove(file);
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.state().faults.fail_lookups = fail;
    }

    pub fn fail_creates(&self, fail: bool) {
        self.state().faults.fail_creates = fail;
    }

    pub fn fail_next_token_reads(&self, count: usize) {
        self.state().faults.fail_token_reads = count;
    }

    pub fn fail_next_content_reads(&self, count: usize) {
        self.state().faults.fail_content_reads = count;
    }

    pub fn fail_next_writes(&self, count: usize) {
        self.state().faults.fail_writes = count;
    }

    /// Make each of the next `count` token reads observe a fresh foreign write
    pub fn interfere_before_token_reads(&self, count: usize) {
        self.state().faults.interfering_token_reads = count;
    }
}

#[async_trait]
impl RemoteFileStore for MemoryFileStore {
    fn store_name(&self) -> &str {
        "memory"
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerId>, StoreError> {
        let mut state = self.state();
        state.calls.container_lookups += 1;
        if state.faults.fail_lookups {
            return Err(injected("find_container"));
        }
        Ok(state
            .containers
            .iter()
            .find(|(_, existing)| existing == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_container(&self, name: &str) -> Result<ContainerId, StoreError> {
        let mut state = self.state();
        state.calls.containers_created += 1;
        if state.faults.fail_creates {
            return Err(injected("create_container"));
        }
        let id = ContainerId::new(state.fresh_id("folder"));
        state.containers.push((id.clone(), name.to_string()));
        Ok(id)
    }

    async fn find_file(
        &self,
        container: &ContainerId,
        name: &str,
    ) -> Result<Option<FileHandle>, StoreError> {
        let mut state = self.state();
        state.calls.file_lookups += 1;
        if state.faults.fail_lookups {
            return Err(injected("find_file"));
        }
        Ok(state
            .files
            .iter()
            .find(|(_, f)| &f.container == container && f.name == name)
            .map(|(id, _)| id.clone()))
    }

    async fn create_file(
        &self,
        container: &ContainerId,
        name: &str,
        content: Vec<u8>,
    ) -> Result<FileHandle, StoreError> {
        let mut state = self.state();
        state.calls.files_created += 1;
        if state.faults.fail_creates {
            return Err(injected("create_file"));
        }
        let id = FileHandle::new(state.fresh_id("file"));
        state.files.insert(
            id.clone(),
            StoredFile {
                container: container.clone(),
                name: name.to_string(),
                content,
                revision: 1,
            },
        );
        Ok(id)
    }

    async fn version_token(&self, file: &FileHandle) -> Result<RemoteVersionToken, StoreError> {
        let mut state = self.state();
        state.calls.token_reads += 1;
        if consume(&mut state.faults.fail_token_reads) {
            return Err(injected("version_token"));
        }
        let interfere = consume(&mut state.faults.interfering_token_reads);
        let stored = state.file_mut(file)?;
        if interfere {
            stored.revision += 1;
        }
        Ok(token_for(file, stored.revision))
    }

    async fn read(&self, file: &FileHandle) -> Result<(Vec<u8>, RemoteVersionToken), StoreError> {
        let mut state = self.state();
        state.calls.content_reads += 1;
        if consume(&mut state.faults.fail_content_reads) {
            return Err(injected("read"));
        }
        let stored = state.file_mut(file)?;
        Ok((stored.content.clone(), token_for(file, stored.revision)))
    }

    async fn write(
        &self,
        file: &FileHandle,
        content: Vec<u8>,
    ) -> Result<RemoteVersionToken, StoreError> {
        let mut state = self.state();
        state.calls.writes += 1;
        if consume(&mut state.faults.fail_writes) {
            return Err(injected("write"));
        }
        let stored = state.file_mut(file)?;
        stored.content = content;
        stored.revision += 1;
        Ok(token_for(file, stored.revision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokens_change_on_every_write() {
        let store = MemoryFileStore::new();
        let file = store.seed_file("f", "data.json", &AppDocument::default());

        let before = store.version_token(&file).await.unwrap();
        let after = store.write(&file, b"{}".to_vec()).await.unwrap();

        assert_ne!(before, after);
        assert_eq!(store.version_token(&file).await.unwrap(), after);
        assert_eq!(store.calls().writes, 1);
        assert_eq!(store.calls().token_reads, 2);
    }

    #[tokio::test]
    async fn test_interference_bumps_revision_without_touching_content() {
        let store = MemoryFileStore::new();
        let file = store.seed_file("f", "data.json", &AppDocument::default());
        let original = store.raw(&file);
        let first = store.token(&file).unwrap();

        store.interfere_before_token_reads(1);
        let seen = store.version_token(&file).await.unwrap();
        let again = store.version_token(&file).await.unwrap();

        assert_ne!(first, seen);
        assert_eq!(seen, again);
        assert_eq!(store.raw(&file), original);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryFileStore::new();
        let file = store.seed_file("f", "data.json", &AppDocument::default());

        store.fail_next_writes(1);
        assert!(store.write(&file, b"{}".to_vec()).await.is_err());
        assert!(store.write(&file, b"{}".to_vec()).await.is_ok());
    }
}
