use std::{marker::PhantomData, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{instrument, warn};

use crate::{ObjectStore, StoreError};

/// Maximum compare-and-set attempts before giving up on a version conflict
/// storm. Bounded so a pathologically hot blob cannot spin a request forever.
const MAX_CAS_ATTEMPTS: u32 = 16;

/// A typed JSON blob at a fixed path, backed by an `ObjectStore`: `read` for
/// a point-in-time snapshot, `optimistic_update` for a versioned
/// read-mutate-write loop.
pub struct Blob<T> {
    store: Arc<dyn ObjectStore>,
    path: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Blob<T> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), path: self.path.clone(), _marker: PhantomData }
    }
}

impl<T: Serialize + DeserializeOwned + Clone + Send + Sync> Blob<T> {
    pub fn new(store: Arc<dyn ObjectStore>, path: impl Into<String>) -> Self {
        Self { store, path: path.into(), _marker: PhantomData }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Serde { path: self.path.clone(), source })
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|source| StoreError::Serde { path: self.path.clone(), source })
    }

    /// Read the current value, or `default` if the blob does not exist yet.
    #[instrument(level = "trace", skip(self, default))]
    pub async fn read(&self, default: T) -> Result<T, StoreError> {
        match self.store.read_raw(&self.path).await? {
            Some(entry) => self.decode(&entry.bytes),
            None => Ok(default),
        }
    }

    /// Read-mutate-write with compare-and-swap retry on version conflict.
    /// `mutator` is a pure function `(current) -> next`; it may run more than
    /// once per call under contention, so it must not close over mutable
    /// state or perform side effects.
    #[instrument(level = "debug", skip(self, mutator, default))]
    pub async fn optimistic_update<F>(&self, mutator: F, default: T) -> Result<T, StoreError>
    where
        F: Fn(T) -> T + Send + Sync,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let (current, version) = match self.store.read_raw(&self.path).await? {
                Some(entry) => (self.decode(&entry.bytes)?, Some(entry.version)),
                None => (default.clone(), None),
            };
            let next = mutator(current);
            let bytes = self.encode(&next)?;
            match self.store.write_if_version(&self.path, version, bytes).await {
                Ok(_) => return Ok(next),
                Err(StoreError::VersionConflict { .. }) => {
                    warn!(path = %self.path, attempt, "optimistic update conflict, retrying");
                    continue;
                },
                Err(other) => return Err(other),
            }
        }
        Err(StoreError::VersionConflict { path: self.path.clone(), attempts: MAX_CAS_ATTEMPTS })
    }
}
