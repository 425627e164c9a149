use billing_cache::CacheLayer;
use billing_common::{config::BillingConfig, time::EpochMs, Billing};
use billing_store::Blob;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{
    decorator::{HandlerFlags, Moniker},
    error::{StageError, StageResult},
    pipeline::{bind, block, claim, dunning_warning, enforce, permission, subscription_missing_header, StageInputs},
};

/// Response headers the pipeline decided to set, independent of the
/// handler's own response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    pub dunning_warning: bool,
    pub subscription_missing: bool,
}

#[derive(Debug, Default)]
pub struct PreprocessResult {
    pub billing: Option<Billing>,
    pub headers: ResponseHeaders,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnhandledErrorEntry {
    timestamp: EpochMs,
    message: String,
}

async fn run_stages(
    cache: &CacheLayer,
    billing: &mut Billing,
    flags: HandlerFlags,
    inputs: &StageInputs<'_>,
) -> StageResult<()> {
    bind(cache, billing, inputs).await?;
    claim(cache, billing, inputs).await?;
    block(cache, billing).await?;
    if flags.security {
        permission(billing, inputs.app_id, inputs.git_email, inputs.now)?;
        enforce(billing)?;
    }
    Ok(())
}

/// Best-effort append to the unhandled-errors log. Failure here is itself
/// swallowed: infrastructure failure must never cascade into a second
/// failure the caller has to handle.
async fn record_unhandled_error(cache: &CacheLayer, now: EpochMs, message: String) {
    let blob: Blob<Vec<UnhandledErrorEntry>> = Blob::new(cache.store().clone(), "system://unhandledErrors.json");
    let entry = UnhandledErrorEntry { timestamp: now, message };
    if let Err(err) = blob
        .optimistic_update(
            move |mut entries| {
                entries.push(entry.clone());
                entries
            },
            Vec::new(),
        )
        .await
    {
        warn!(error = %err, "failed appending to unhandledErrors.json");
    }
}

/// Runs once per request ahead of the handler, when the handler carries the
/// `Billing` flag. Fails closed on policy errors (propagated to the
/// caller); fails open on infrastructure errors (billing is cleared and the
/// request proceeds unconstrained).
#[instrument(level = "debug", skip(cache, config, inputs))]
pub async fn preprocess(
    cache: &CacheLayer,
    config: &BillingConfig,
    flags: HandlerFlags,
    moniker: Moniker,
    inputs: &StageInputs<'_>,
) -> Result<PreprocessResult, crate::error::PolicyError> {
    if !flags.runs_billing() || config.private_backend {
        return Ok(PreprocessResult::default());
    }
    if flags.logging {
        info!(
            moniker = moniker.0,
            app_id = inputs.app_id,
            profile_id = inputs.profile_id,
            git_email = inputs.git_email,
            "handling request"
        );
    }
    if flags.security {
        cache.invalidate_all().await;
    }

    let mut billing = Billing::new();
    match run_stages(cache, &mut billing, flags, inputs).await {
        Ok(()) => Ok(PreprocessResult {
            headers: ResponseHeaders {
                dunning_warning: dunning_warning(&billing),
                subscription_missing: subscription_missing_header(&billing, config.legacy_subscription_cutoff_ms),
            },
            billing: Some(billing),
        }),
        Err(StageError::Policy(err)) => Err(err),
        Err(StageError::Infra(err)) => {
            warn!(error = %err, "infrastructure failure during preprocessing, failing open");
            record_unhandled_error(cache, inputs.now, err.to_string()).await;
            Ok(PreprocessResult::default())
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use billing_store::{MemoryObjectStore, ObjectStore};

    use super::*;

    #[tokio::test]
    async fn private_backend_skips_entirely() {
        let cache = CacheLayer::new(Arc::new(MemoryObjectStore::new()), 30_000);
        let config = BillingConfig { private_backend: true, ..Default::default() };
        let inputs = StageInputs { app_id: Some("a1"), now: 0, ..Default::default() };
        let result = preprocess(&cache, &config, HandlerFlags::billing(), Moniker("test"), &inputs).await.unwrap();
        assert!(result.billing.is_none());
    }

    #[tokio::test]
    async fn non_billing_handler_skips_entirely() {
        let cache = CacheLayer::new(Arc::new(MemoryObjectStore::new()), 30_000);
        let config = BillingConfig::default();
        let inputs = StageInputs { app_id: Some("a1"), now: 0, ..Default::default() };
        let result = preprocess(&cache, &config, HandlerFlags::NONE, Moniker("test"), &inputs).await.unwrap();
        assert!(result.billing.is_none());
    }

    #[tokio::test]
    async fn security_handler_enforces_denied_permission() {
        use billing_common::App;

        let store = MemoryObjectStore::new();
        let expired = App {
            id: "a1".into(),
            name: "a1".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 100,
            owner: None,
            git_email: None,
            sponsored: false,
        };
        store.write_if_version("system://apps.json", None, serde_json::to_vec(&[expired]).unwrap()).await.unwrap();
        let cache = CacheLayer::new(Arc::new(store), 30_000);
        let config = BillingConfig::default();
        // Orphan app already past its grace period, no claim: enforcement
        // should deny with GRACE_EXPIRED.
        let inputs = StageInputs { app_id: Some("a1"), now: 1000, ..Default::default() };
        let err = preprocess(&cache, &config, HandlerFlags::security(), Moniker("test"), &inputs).await.unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn missing_app_id_on_security_handler_is_bad_request() {
        let cache = CacheLayer::new(Arc::new(MemoryObjectStore::new()), 30_000);
        let config = BillingConfig::default();
        let inputs = StageInputs { app_id: None, now: 0, ..Default::default() };
        let err = preprocess(&cache, &config, HandlerFlags::security(), Moniker("test"), &inputs).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
