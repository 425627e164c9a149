//! Epoch-millisecond time helpers. The billing core treats all timestamps as
//! `i64` milliseconds since the Unix epoch, matching the wire representation
//! of the durable blobs it reads and writes.

use chrono::{DateTime, Datelike, Utc};

/// Milliseconds since the Unix epoch.
pub type EpochMs = i64;

/// Current time as epoch milliseconds. The sole clock source for the core;
/// every stage and evaluator takes `now` as an explicit parameter rather than
/// calling this directly, so that tests can hold time fixed.
pub fn now_ms() -> EpochMs {
    Utc::now().timestamp_millis()
}

/// UTC `YYYY-MM` month key for a given instant, used to bucket `BillingLog` entries.
pub fn month_key(now: EpochMs) -> String {
    let dt = DateTime::from_timestamp_millis(now).unwrap_or_else(Utc::now);
    format!("{:04}-{:02}", dt.year(), dt.month())
}
