//! Durable object-store adapter: named JSON blobs with optimistic, versioned
//! compare-and-swap. Every writer does read -> mutate -> compare-and-set,
//! retried on version conflict; no lock is held across an await point.
//!
//! The production driver lives outside this crate. It defines the trait
//! boundary plus an in-memory implementation for tests and local
//! development.

mod blob;
mod memory;

pub use blob::Blob;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("version conflict writing {path} after {attempts} attempt(s)")]
    VersionConflict { path: String, attempts: u32 },

    #[error("object store I/O error reading/writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON blob at {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A blob's raw bytes plus its opaque version token. `None` version means the
/// blob does not exist yet.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub bytes: Vec<u8>,
    pub version: u64,
}

/// Low-level byte-oriented object store. `Blob<T>` (de)serializes JSON on top
/// of this.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn read_raw(&self, path: &str) -> Result<Option<RawEntry>, StoreError>;

    /// Write `bytes` to `path` iff the store's current version equals
    /// `expected_version` (`None` means "path must not exist yet"). Returns
    /// the new version on success, or `StoreError::VersionConflict` if the
    /// precondition failed so the caller can re-read and retry.
    async fn write_if_version(
        &self,
        path: &str,
        expected_version: Option<u64>,
        bytes: Vec<u8>,
    ) -> Result<u64, StoreError>;
}
