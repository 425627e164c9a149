//! Tunable constants and the process-wide configuration surface.

use std::env;

use crate::time::EpochMs;

/// Default TTL for each CacheLayer snapshot kind.
pub const CACHE_TTL_MS: i64 = 30_000;

/// Grace-period window granted to new orphan apps and to unknown users of an
/// organization before their first exposure is actually denied.
pub const GRACE_PERIOD_MS: i64 = 14 * 24 * 60 * 60 * 1000; // 14 days

/// Hard-coded cutoff preserved from the source for the legacy
/// `X-Ninja-Subscription-Missing` compatibility header: orphan apps whose
/// `free_until` falls on or before this instant are flagged.
/// 2024-02-01T00:00:00Z.
pub const LEGACY_SUBSCRIPTION_CUTOFF_MS: EpochMs = 1_706_745_600_000;

/// Stripe meter-events endpoint.
pub const STRIPE_METER_EVENTS_URL: &str = "https://api.stripe.com/v1/billing/meter_events";

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub cache_ttl_ms: i64,
    pub grace_period_ms: i64,
    pub legacy_subscription_cutoff_ms: EpochMs,
    /// "on the house": skip preprocessing/postprocessing/writeback entirely.
    pub private_backend: bool,
    pub stripe_secret_key: Option<String>,
    pub stripe_meter_events_url: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: CACHE_TTL_MS,
            grace_period_ms: GRACE_PERIOD_MS,
            legacy_subscription_cutoff_ms: LEGACY_SUBSCRIPTION_CUTOFF_MS,
            private_backend: false,
            stripe_secret_key: None,
            stripe_meter_events_url: STRIPE_METER_EVENTS_URL.to_string(),
        }
    }
}

impl BillingConfig {
    /// Load configuration from the environment, falling back to defaults.
    /// `STRIPE_SECRET_KEY` unset means metering is disabled entirely.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.stripe_secret_key = env::var("STRIPE_SECRET_KEY").ok().filter(|s| !s.is_empty());
        if let Ok(flag) = env::var("NINJA_PRIVATE_BACKEND") {
            config.private_backend = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        if let Ok(ttl) = env::var("CACHE_TTL_MS") {
            if let Ok(parsed) = ttl.parse() {
                config.cache_ttl_ms = parsed;
            }
        }
        config
    }

    pub fn metering_enabled(&self) -> bool {
        self.stripe_secret_key.is_some()
    }
}
