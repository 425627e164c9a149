use std::sync::Arc;

use billing_cache::CacheLayer;
use billing_common::{
    config::BillingConfig, time::EpochMs, App, Billing, NewUserWriteback, Organization, Owner, OwnerType,
};
use billing_core::decorator::{HandlerFlags, Moniker};
use billing_store::{Blob, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{metering::record_usage as metering_record_usage, meter_client::MeterClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ActivityLogEntry {
    timestamp: EpochMs,
    #[serde(rename = "appId")]
    app_id: String,
    email: String,
    feature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UnknownUserLogEntry {
    timestamp: EpochMs,
    email: String,
    #[serde(rename = "appId")]
    app_id: String,
}

/// Drains the writeback intents a completed request's `Billing` record
/// accumulated: durable app/organization mutations, append-only activity and
/// unknown-user logs, and PAYG meter events. Runs in the request's terminal
/// phase; none of its failures propagate to the caller.
pub struct WritebackEngine {
    store: Arc<dyn ObjectStore>,
    cache: Arc<CacheLayer>,
    meter: MeterClient,
    private_backend: bool,
}

impl WritebackEngine {
    pub fn new(store: Arc<dyn ObjectStore>, cache: Arc<CacheLayer>, config: &BillingConfig) -> Self {
        let meter = MeterClient::new(config.stripe_meter_events_url.clone(), config.stripe_secret_key.clone());
        Self { store, cache, meter, private_backend: config.private_backend }
    }

    fn apps_blob(&self) -> Blob<Vec<App>> {
        Blob::new(self.store.clone(), "system://apps.json")
    }

    fn organizations_blob(&self) -> Blob<Vec<Organization>> {
        Blob::new(self.store.clone(), "system://organizations.json")
    }

    /// Iff no app with matching `(id, publisher)` already exists, appends
    /// `app`. Otherwise a concurrent writer beat us to it; leave it alone.
    #[instrument(level = "debug", skip(self, app))]
    async fn write_back_new_orphan(&self, app: &App) {
        let key = app.key();
        let to_persist = app.clone();
        let result = self
            .apps_blob()
            .optimistic_update(
                move |mut apps| {
                    if !apps.iter().any(|a| a.key() == key) {
                        apps.push(to_persist.clone());
                    }
                    apps
                },
                Vec::new(),
            )
            .await;
        match result {
            Ok(_) => self.cache.update_app(app.clone()).await,
            Err(err) => {
                metrics::increment_counter!("billing_writeback_failures_total");
                warn!(error = %err, app_id = %app.id, "failed to persist new orphan app");
            },
        }
    }

    /// Applies an owner mutation (claim or force-orphan) to the app matching
    /// `(id, publisher)`, appending it first if a concurrent reader never saw
    /// it written by Binding.
    #[instrument(level = "debug", skip(self, app, owner))]
    async fn write_back_owner(&self, app: &App, owner: Option<Owner>) {
        let key = app.key();
        let fallback = app.clone();
        let owner_for_mutator = owner.clone();
        let result = self
            .apps_blob()
            .optimistic_update(
                move |mut apps| {
                    match apps.iter_mut().find(|a| a.key() == key) {
                        Some(existing) => existing.owner = owner_for_mutator.clone(),
                        None => {
                            let mut app = fallback.clone();
                            app.owner = owner_for_mutator.clone();
                            apps.push(app);
                        },
                    }
                    apps
                },
                Vec::new(),
            )
            .await;
        match result {
            Ok(apps) => {
                if let Some(updated) = apps.into_iter().find(|a| a.key() == app.key()) {
                    self.cache.update_app(updated).await;
                }
            },
            Err(err) => {
                metrics::increment_counter!("billing_writeback_failures_total");
                warn!(error = %err, app_id = %app.id, "failed to persist app owner change");
            },
        }
    }

    async fn write_back_claimed(&self, app: &App) {
        let Some(owner_id) = app.owner_id() else { return };
        self.write_back_owner(app, Some(Owner { owner_type: OwnerType::Organization, owner_id: owner_id.to_string() })).await;
    }

    async fn write_back_force_orphan(&self, app: &App) {
        self.write_back_owner(app, None).await;
    }

    #[instrument(level = "debug", skip(self))]
    async fn write_back_new_user(&self, organization_id: &str, email: &str, intent: NewUserWriteback, now: EpochMs) {
        let org_id = organization_id.to_string();
        let email = email.to_string();
        let result = self
            .organizations_blob()
            .optimistic_update(
                move |mut orgs| {
                    if let Some(org) = orgs.iter_mut().find(|o| o.id == org_id) {
                        match intent {
                            NewUserWriteback::Allow => org.allow_user(&email),
                            NewUserWriteback::Deny => org.deny_user(&email),
                            NewUserWriteback::Unknown => org.record_first_seen(&email, now),
                        }
                    }
                    orgs
                },
                Vec::new(),
            )
            .await;
        match result {
            Ok(orgs) => {
                if let Some(updated) = orgs.into_iter().find(|o| o.id == organization_id) {
                    self.cache.update_organization(updated).await;
                }
            },
            Err(err) => {
                metrics::increment_counter!("billing_writeback_failures_total");
                warn!(error = %err, organization_id, "failed to persist user writeback");
            },
        }
    }

    /// Ensures `user_first_seen_timestamp[email]` exists for a known-org
    /// user, independent of the user's classification. Never overwrites.
    #[instrument(level = "debug", skip(self))]
    async fn ensure_first_seen(&self, organization_id: &str, email: &str, now: EpochMs) {
        let org_id = organization_id.to_string();
        let email = email.to_string();
        let result = self
            .organizations_blob()
            .optimistic_update(
                move |mut orgs| {
                    if let Some(org) = orgs.iter_mut().find(|o| o.id == org_id) {
                        org.record_first_seen(&email, now);
                    }
                    orgs
                },
                Vec::new(),
            )
            .await;
        if let Ok(orgs) = result {
            if let Some(updated) = orgs.into_iter().find(|o| o.id == organization_id) {
                self.cache.update_organization(updated).await;
            }
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn append_activity_log(&self, organization_id: &str, app_id: &str, email: &str, feature: &str, now: EpochMs) {
        let blob: Blob<Vec<ActivityLogEntry>> = Blob::new(self.store.clone(), format!("logs://{organization_id}_featureLog.json"));
        let entry = ActivityLogEntry { timestamp: now, app_id: app_id.to_string(), email: email.to_string(), feature: feature.to_string() };
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
            metrics::increment_counter!("billing_writeback_failures_total");
            warn!(error = %err, organization_id, "failed to append activity log entry");
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn append_unknown_user_log(&self, organization_id: &str, app_id: &str, email: &str, now: EpochMs) {
        let blob: Blob<Vec<UnknownUserLogEntry>> = Blob::new(self.store.clone(), format!("logs://{organization_id}_unknown.json"));
        let entry = UnknownUserLogEntry { timestamp: now, email: email.to_lowercase(), app_id: app_id.to_string() };
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
            metrics::increment_counter!("billing_writeback_failures_total");
            warn!(error = %err, organization_id, "failed to append unknown-user log entry");
        }
    }

    /// Drains every writeback intent `billing` accumulated. `flags` and
    /// `moniker` gate the activity log; `git_email` is the request's raw
    /// header value (unnormalized, as seen by the handler).
    #[instrument(level = "debug", skip(self, billing))]
    pub async fn run(&self, billing: &Billing, flags: HandlerFlags, moniker: Moniker, git_email: Option<&str>, now: EpochMs) {
        if self.private_backend {
            return;
        }

        if billing.write_back_new_orphan {
            if let Some(app) = &billing.app {
                self.write_back_new_orphan(app).await;
            }
        }
        if billing.write_back_claimed {
            if let Some(app) = &billing.app {
                self.write_back_claimed(app).await;
            }
        }
        if billing.write_back_force_orphan {
            if let Some(app) = &billing.app {
                self.write_back_force_orphan(app).await;
            }
        }

        let organization_id = billing.organization_id().map(str::to_string);
        if let (Some(org_id), Some(intent)) = (organization_id.as_deref(), billing.write_back_new_user) {
            if let Some(email) = git_email {
                self.write_back_new_user(org_id, email, intent, now).await;
            }
        }
        if let (Some(org_id), Some(email)) = (organization_id.as_deref(), git_email) {
            self.ensure_first_seen(org_id, email, now).await;
        }

        let permission_allows = !matches!(billing.permission, Some(ref p) if !p.is_allowed());
        if let (true, Some(org_id), Some(app), Some(email)) =
            (flags.usage_logging, organization_id.as_deref(), billing.app.as_ref(), git_email)
        {
            let denied_explicitly = billing
                .organization
                .as_ref()
                .is_some_and(|org| org.has_denied_user(email));
            if permission_allows && !denied_explicitly {
                self.append_activity_log(org_id, &app.id, email, moniker.0, now).await;
            }
        }

        if let (true, Some(org_id), Some(app), Some(email)) =
            (billing.log_unknown_user_attempt, organization_id.as_deref(), billing.app.as_ref(), git_email)
        {
            self.append_unknown_user_log(org_id, &app.id, email, now).await;
        }

        if let (Some(org), Some(app)) = (billing.organization.as_ref(), billing.app.as_ref()) {
            metering_record_usage(self.store.clone(), &self.meter, org, &app.id, &app.publisher, git_email, now).await;
        }
    }
}
