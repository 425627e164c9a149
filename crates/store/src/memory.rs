use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{ObjectStore, RawEntry, StoreError};

/// In-memory `ObjectStore`, used for tests and local development. Not
/// durable across process restarts.
#[derive(Default)]
pub struct MemoryObjectStore {
    blobs: RwLock<HashMap<String, (Vec<u8>, u64)>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn read_raw(&self, path: &str) -> Result<Option<RawEntry>, StoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.get(path).map(|(bytes, version)| RawEntry { bytes: bytes.clone(), version: *version }))
    }

    async fn write_if_version(
        &self,
        path: &str,
        expected_version: Option<u64>,
        bytes: Vec<u8>,
    ) -> Result<u64, StoreError> {
        let mut blobs = self.blobs.write().await;
        let current_version = blobs.get(path).map(|(_, v)| *v);
        if current_version != expected_version {
            return Err(StoreError::VersionConflict { path: path.to_string(), attempts: 1 });
        }
        let next_version = current_version.unwrap_or(0) + 1;
        blobs.insert(path.to_string(), (bytes, next_version));
        Ok(next_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absent_blob_reads_as_none() {
        let store = MemoryObjectStore::new();
        assert!(store.read_raw("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_write_requires_none_expectation() {
        let store = MemoryObjectStore::new();
        assert!(store.write_if_version("p", Some(1), b"x".to_vec()).await.is_err());
        assert!(store.write_if_version("p", None, b"x".to_vec()).await.is_ok());
    }
}
