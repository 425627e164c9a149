//! Process-wide read-mostly cache over five system snapshots (apps, users,
//! organizations, blocked orgs, dunning entries), each with an independent
//! TTL and single-flight refresh: concurrent readers that find a snapshot
//! missing or stale attach to the same in-flight fetch rather than each
//! issuing their own. Built on `cached::TimedCache` guarded by a
//! `tokio::sync::Mutex`.

mod kinds;
mod layer;
mod snapshot;

pub use kinds::SnapshotKind;
pub use layer::{CacheError, CacheLayer};
pub use snapshot::Snapshot;
