use std::{collections::HashMap, sync::Arc};

use billing_common::{
    normalize::normalize, App, BlockedEntry, BlockedOrganizations, DunningEntry, Organization, UserProfile,
};
use billing_store::{ObjectStore, StoreError};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::{kinds::SnapshotKind, snapshot::Snapshot};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to load {kind} snapshot: {source}")]
    Store {
        kind: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Process-wide cache singleton: five independently-TTLed, single-flight
/// snapshots, plus lookup helpers matching the normalization rules each
/// entity defines.
pub struct CacheLayer {
    store: Arc<dyn ObjectStore>,
    ttl_ms: i64,
    apps: Snapshot<Vec<App>>,
    users: Snapshot<Vec<UserProfile>>,
    organizations: Snapshot<Vec<Organization>>,
    blocked: Snapshot<BlockedOrganizations>,
    dunning: Snapshot<Vec<DunningEntry>>,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn ObjectStore>, ttl_ms: i64) -> Self {
        Self {
            store,
            ttl_ms,
            apps: Snapshot::new(ttl_ms),
            users: Snapshot::new(ttl_ms),
            organizations: Snapshot::new(ttl_ms),
            blocked: Snapshot::new(ttl_ms),
            dunning: Snapshot::new(ttl_ms),
        }
    }

    async fn load<T: DeserializeOwned + Default>(&self, kind: SnapshotKind) -> Result<T, CacheError> {
        let to_err = |source: StoreError| CacheError::Store { kind: kind.as_str(), source };
        match self.store.read_raw(kind.path()).await.map_err(to_err)? {
            Some(raw) => serde_json::from_slice(&raw.bytes).map_err(|source| {
                to_err(StoreError::Serde { path: kind.path().to_string(), source })
            }),
            None => Ok(T::default()),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn apps(&self) -> Result<Vec<App>, CacheError> {
        self.apps
            .get_or_refresh(|| async {
                metrics::increment_counter!("billing_cache_refresh_total", "kind" => SnapshotKind::Apps.as_str());
                self.load::<Vec<App>>(SnapshotKind::Apps).await
            })
            .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn users(&self) -> Result<Vec<UserProfile>, CacheError> {
        self.users
            .get_or_refresh(|| async {
                metrics::increment_counter!("billing_cache_refresh_total", "kind" => SnapshotKind::Users.as_str());
                self.load::<Vec<UserProfile>>(SnapshotKind::Users).await
            })
            .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn organizations(&self) -> Result<Vec<Organization>, CacheError> {
        self.organizations
            .get_or_refresh(|| async {
                metrics::increment_counter!("billing_cache_refresh_total", "kind" => SnapshotKind::Organizations.as_str());
                self.load::<Vec<Organization>>(SnapshotKind::Organizations).await
            })
            .await
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn blocked(&self) -> Result<BlockedOrganizations, CacheError> {
        self.blocked
            .get_or_refresh(|| async {
                metrics::increment_counter!("billing_cache_refresh_total", "kind" => SnapshotKind::Blocked.as_str());
                self.load::<BlockedOrganizations>(SnapshotKind::Blocked).await
            })
            .await
    }

    /// Fail-open: a refresh failure is logged and treated as an empty list
    /// rather than propagated, since dunning state is warn-only.
    #[instrument(level = "debug", skip(self))]
    pub async fn dunning(&self) -> Vec<DunningEntry> {
        let result = self
            .dunning
            .get_or_refresh(|| async {
                metrics::increment_counter!("billing_cache_refresh_total", "kind" => SnapshotKind::Dunning.as_str());
                self.load::<Vec<DunningEntry>>(SnapshotKind::Dunning).await
            })
            .await;
        match result {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "dunning snapshot refresh failed, failing open to empty");
                Vec::new()
            },
        }
    }

    pub async fn get_app(&self, id: &str, publisher: Option<&str>) -> Result<Option<App>, CacheError> {
        let key = App::match_key(id, publisher);
        Ok(self.apps().await?.into_iter().find(|a| a.key() == key))
    }

    /// First hit per requested id; matching is on normalized id only.
    pub async fn get_apps(&self, ids: &[String]) -> Result<HashMap<String, App>, CacheError> {
        let mut wanted: HashMap<String, String> =
            ids.iter().map(|id| (normalize(id), id.clone())).collect();
        let mut found = HashMap::new();
        for app in self.apps().await? {
            if wanted.is_empty() {
                break;
            }
            if let Some(requested_id) = wanted.remove(&normalize(&app.id)) {
                found.insert(requested_id, app);
            }
        }
        Ok(found)
    }

    pub async fn get_organization(&self, id: &str) -> Result<Option<Organization>, CacheError> {
        let key = normalize(id);
        Ok(self.organizations().await?.into_iter().find(|o| normalize(&o.id) == key))
    }

    pub async fn get_organizations(&self) -> Result<Vec<Organization>, CacheError> {
        self.organizations().await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserProfile>, CacheError> {
        Ok(self.users().await?.into_iter().find(|u| u.id_matches(id)))
    }

    pub async fn get_blocked_status(&self, organization_id: &str) -> Result<Option<BlockedEntry>, CacheError> {
        Ok(self.blocked().await?.status_for(organization_id).cloned())
    }

    pub async fn get_dunning_entry(&self, organization_id: &str) -> Option<DunningEntry> {
        self.dunning().await.into_iter().find(|d| d.organization_id == organization_id)
    }

    pub async fn update_app(&self, app: App) {
        let key = app.key();
        self.apps
            .update(move |apps| match apps.iter().position(|a| a.key() == key) {
                Some(idx) => apps[idx] = app,
                None => apps.push(app),
            })
            .await;
    }

    pub async fn update_organization(&self, org: Organization) {
        let id = org.id.clone();
        self.organizations
            .update(move |orgs| match orgs.iter().position(|o| o.id == id) {
                Some(idx) => orgs[idx] = org,
                None => orgs.push(org),
            })
            .await;
    }

    pub async fn invalidate(&self, kind: SnapshotKind) {
        match kind {
            SnapshotKind::Apps => self.apps.invalidate().await,
            SnapshotKind::Users => self.users.invalidate().await,
            SnapshotKind::Organizations => self.organizations.invalidate().await,
            SnapshotKind::Blocked => self.blocked.invalidate().await,
            SnapshotKind::Dunning => self.dunning.invalidate().await,
        }
    }

    pub async fn invalidate_all(&self) {
        for kind in SnapshotKind::all() {
            self.invalidate(kind).await;
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}
