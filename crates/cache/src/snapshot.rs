use std::future::Future;

use cached::{Cached, TimedCache};
use tokio::sync::Mutex;
use tracing::trace;

/// A single TTL-bounded, single-flight cached value, backed by `cached`'s
/// `TimedCache` the same way a token-introspection cache wraps one in
/// `Arc<Mutex<...>>`. Here the lock is held for the duration of a refresh
/// (not dropped around the fetch), which is what makes concurrent misses
/// collapse into a single fetch instead of racing.
pub struct Snapshot<T> {
    cache: Mutex<TimedCache<(), T>>,
}

impl<T: Clone + Send + Sync> Snapshot<T> {
    pub fn new(ttl_ms: i64) -> Self {
        let lifespan_secs = (ttl_ms.max(0) as u64) / 1000;
        Self { cache: Mutex::new(TimedCache::with_lifespan(lifespan_secs)) }
    }

    /// Return the current value, refreshing via `fetch` iff missing or
    /// stale. The cache's lock is held across `fetch`, so at most one
    /// refresh per snapshot runs at a time; other callers simply wait for
    /// it and observe the freshly-set value on their own `cache_get`.
    pub async fn get_or_refresh<F, Fut, E>(&self, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut guard = self.cache.lock().await;
        if let Some(data) = guard.cache_get(&()) {
            trace!("snapshot cache hit");
            return Ok(data.clone());
        }
        trace!("snapshot cache miss, refreshing");
        let data = fetch().await?;
        guard.cache_set((), data.clone());
        Ok(data)
    }

    /// Replace-or-append a single item into the cached collection via
    /// `mutate`. No-op if the snapshot has not been loaded yet.
    pub async fn update(&self, mutate: impl FnOnce(&mut T)) {
        let mut guard = self.cache.lock().await;
        if let Some(data) = guard.cache_get_mut(&()) {
            mutate(data);
        }
    }

    /// Drop the cached value and force the next `get_or_refresh` to refetch,
    /// regardless of TTL.
    pub async fn invalidate(&self) {
        self.cache.lock().await.cache_remove(&());
    }
}
