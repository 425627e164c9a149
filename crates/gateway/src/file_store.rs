use std::path::{Path, PathBuf};

use async_trait::async_trait;
use billing_store::{ObjectStore, RawEntry, StoreError};
use tokio::{fs, sync::Mutex};

/// Filesystem-backed `ObjectStore` for local/demonstration runs. Each blob
/// path maps to one file under `root`, prefixed with its version as an
/// 8-byte big-endian header so `write_if_version` can enforce CAS without a
/// side-channel metadata store. Single-process only: the in-process mutex
/// serializes writers, it does not lock the file against other processes.
pub struct FileObjectStore {
    root: PathBuf,
    lock: Mutex<()>,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), lock: Mutex::new(()) }
    }

    fn file_path(&self, path: &str) -> PathBuf {
        let sanitized = path.replace("://", "__").replace('/', "_");
        self.root.join(format!("{sanitized}.blob"))
    }
}

fn decode(path: &str, contents: Vec<u8>) -> Result<RawEntry, StoreError> {
    if contents.len() < 8 {
        return Err(StoreError::Io {
            path: path.to_string(),
            source: std::io::Error::other("blob file is shorter than its version header"),
        });
    }
    let version = u64::from_be_bytes(contents[..8].try_into().unwrap());
    Ok(RawEntry { bytes: contents[8..].to_vec(), version })
}

async fn read_version(path: &str, file_path: &Path) -> Result<Option<u64>, StoreError> {
    match fs::read(file_path).await {
        Ok(contents) => Ok(Some(decode(path, contents)?.version)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io { path: path.to_string(), source }),
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn read_raw(&self, path: &str) -> Result<Option<RawEntry>, StoreError> {
        let file_path = self.file_path(path);
        match fs::read(&file_path).await {
            Ok(contents) => Ok(Some(decode(path, contents)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path: path.to_string(), source }),
        }
    }

    async fn write_if_version(
        &self,
        path: &str,
        expected_version: Option<u64>,
        bytes: Vec<u8>,
    ) -> Result<u64, StoreError> {
        let _guard = self.lock.lock().await;
        let file_path = self.file_path(path);
        let current_version = read_version(path, &file_path).await?;
        if current_version != expected_version {
            return Err(StoreError::VersionConflict { path: path.to_string(), attempts: 1 });
        }
        let next_version = current_version.unwrap_or(0) + 1;
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| StoreError::Io { path: path.to_string(), source })?;
        }
        let mut encoded = next_version.to_be_bytes().to_vec();
        encoded.extend_from_slice(&bytes);
        let tmp_path = file_path.with_extension("tmp");
        fs::write(&tmp_path, &encoded).await.map_err(|source| StoreError::Io { path: path.to_string(), source })?;
        fs::rename(&tmp_path, &file_path).await.map_err(|source| StoreError::Io { path: path.to_string(), source })?;
        Ok(next_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path());
        assert!(store.read_raw("system://apps.json").await.unwrap().is_none());
        let v1 = store.write_if_version("system://apps.json", None, b"[]".to_vec()).await.unwrap();
        let entry = store.read_raw("system://apps.json").await.unwrap().unwrap();
        assert_eq!(entry.version, v1);
        assert_eq!(entry.bytes, b"[]");
    }

    #[tokio::test]
    async fn rejects_stale_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path());
        let v1 = store.write_if_version("p", None, b"a".to_vec()).await.unwrap();
        let err = store.write_if_version("p", None, b"b".to_vec()).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        let v2 = store.write_if_version("p", Some(v1), b"b".to_vec()).await.unwrap();
        assert!(v2 > v1);
    }

    #[tokio::test]
    async fn survives_across_a_fresh_store_handle() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileObjectStore::new(dir.path());
            store.write_if_version("logs://org-1_featureLog.json", None, b"[1]".to_vec()).await.unwrap();
        }
        let reopened = FileObjectStore::new(dir.path());
        let entry = reopened.read_raw("logs://org-1_featureLog.json").await.unwrap().unwrap();
        assert_eq!(entry.bytes, b"[1]");
    }
}
