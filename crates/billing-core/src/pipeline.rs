use billing_cache::CacheLayer;
use billing_common::{
    config::GRACE_PERIOD_MS, time::EpochMs, App, Billing, OwnerType, PermissionResult, UserProfile,
};
use tracing::instrument;

use crate::{
    claim::evaluate_claim_candidates,
    error::{PolicyError, StageResult},
    permission::evaluate_permission,
};

/// The subset of a request's inbound headers the stage pipeline needs,
/// already trimmed of the transport layer (`poem`'s header map, etc).
#[derive(Debug, Clone, Copy, Default)]
pub struct StageInputs<'a> {
    pub app_id: Option<&'a str>,
    pub publisher: Option<&'a str>,
    pub git_email: Option<&'a str>,
    pub profile_id: Option<&'a str>,
    pub now: EpochMs,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Stage 1. Resolves `app` by `(appId, publisher)`, synthesizing a new
/// orphan if none exists. Binds `user` by `ProfileId` or email. If the app
/// is organization-owned, binds `organization` and attaches its blocked and
/// dunning state.
#[instrument(level = "debug", skip(cache, billing))]
pub async fn bind(cache: &CacheLayer, billing: &mut Billing, inputs: &StageInputs<'_>) -> StageResult<()> {
    if let Some(app_id) = non_blank(inputs.app_id) {
        let existing = cache.get_app(app_id, inputs.publisher).await?;
        let app = match existing {
            Some(app) => app,
            None => {
                billing.write_back_new_orphan = true;
                App {
                    id: app_id.to_string(),
                    name: app_id.to_string(),
                    publisher: inputs.publisher.unwrap_or_default().to_string(),
                    created: inputs.now,
                    free_until: inputs.now + GRACE_PERIOD_MS,
                    owner: None,
                    git_email: None,
                    sponsored: false,
                }
            },
        };
        billing.app = Some(app);
    }

    billing.user = bind_user(cache, inputs.profile_id, inputs.git_email).await?;

    if let Some(OwnerType::Organization) = billing.app.as_ref().and_then(|a| a.owner_type()) {
        if let Some(org_id) = billing.app.as_ref().and_then(|a| a.owner_id()).map(str::to_string) {
            attach_organization(cache, billing, &org_id).await?;
        }
    }
    Ok(())
}

async fn bind_user(
    cache: &CacheLayer,
    profile_id: Option<&str>,
    git_email: Option<&str>,
) -> StageResult<Option<UserProfile>> {
    let profile_id = non_blank(profile_id);
    let git_email = non_blank(git_email);
    if profile_id.is_none() && git_email.is_none() {
        return Ok(None);
    }
    let users = cache.users().await?;
    Ok(users
        .into_iter()
        .find(|u| profile_id.is_some_and(|id| u.id_matches(id)) || git_email.is_some_and(|e| u.email_matches(e))))
}

async fn attach_organization(cache: &CacheLayer, billing: &mut Billing, org_id: &str) -> StageResult<()> {
    billing.organization = cache.get_organization(org_id).await?;
    billing.blocked = cache.get_blocked_status(org_id).await?;
    billing.dunning = cache.get_dunning_entry(org_id).await;
    Ok(())
}

/// Stage 2. Skipped unless the bound app is an orphan and a non-blank
/// publisher is present. A single unambiguous match claims the app for that
/// organization; zero or multiple matches flag a claim issue instead.
#[instrument(level = "debug", skip(cache, billing))]
pub async fn claim(cache: &CacheLayer, billing: &mut Billing, inputs: &StageInputs<'_>) -> StageResult<()> {
    let Some(mut app) = billing.app.clone() else { return Ok(()) };
    if !app.is_orphan() {
        return Ok(());
    }
    let Some(publisher) = non_blank(inputs.publisher) else { return Ok(()) };

    let orgs = cache.get_organizations().await?;
    let result = evaluate_claim_candidates(publisher, inputs.git_email, &orgs);
    if !result.publisher_match_found {
        return Ok(());
    }
    match result.candidates.as_slice() {
        [] => billing.claim_issue = true,
        [candidate] => {
            app.claim(&candidate.organization_id);
            billing.write_back_claimed = true;
            billing.app = Some(app);
            attach_organization(cache, billing, &candidate.organization_id).await?;
        },
        _ => billing.claim_issue = true,
    }
    Ok(())
}

/// Stage 3. Refreshes blocked/dunning state for whichever organization is
/// bound by this point (from Binding or from a fresh Claiming match).
#[instrument(level = "debug", skip(cache, billing))]
pub async fn block(cache: &CacheLayer, billing: &mut Billing) -> StageResult<()> {
    if let Some(org_id) = billing.organization_id().map(str::to_string) {
        billing.blocked = cache.get_blocked_status(&org_id).await?;
        billing.dunning = cache.get_dunning_entry(&org_id).await;
    }
    Ok(())
}

/// Stage 4. Pure: whether the dunning-warning response header should be
/// set. Dunning is warn-only and never denies a request.
pub fn dunning_warning(billing: &Billing) -> bool {
    billing.dunning.is_some()
}

/// Stage 5. Requires a non-blank `appId`; computes and stores the
/// permission decision.
pub fn permission(billing: &mut Billing, app_id: Option<&str>, git_email: Option<&str>, now: EpochMs) -> StageResult<()> {
    if non_blank(app_id).is_none() {
        return Err(PolicyError::BadRequest { header: "Ninja-App-Id" }.into());
    }
    billing.permission = Some(evaluate_permission(billing, git_email, now));
    Ok(())
}

/// Enforcement step, run only for `Security` handlers: turns a denial into
/// the request-terminating error.
pub fn enforce(billing: &Billing) -> StageResult<()> {
    if let Some(PermissionResult::Denied { error }) = billing.permission {
        metrics::increment_counter!("billing_denied_total", "reason" => error.as_str());
        return Err(PolicyError::Forbidden(error).into());
    }
    Ok(())
}

/// Whether the legacy compatibility header should be set: the bound app is
/// an orphan whose grace period ends on or before the hard-coded cutoff.
pub fn subscription_missing_header(billing: &Billing, legacy_cutoff_ms: EpochMs) -> bool {
    billing.app.as_ref().is_some_and(|app| app.is_orphan() && app.free_until <= legacy_cutoff_ms)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use billing_common::Organization;
    use billing_store::MemoryObjectStore;

    use super::*;

    async fn cache_with(apps: &[App], orgs: &[Organization]) -> CacheLayer {
        let store = MemoryObjectStore::new();
        store
            .write_if_version("system://apps.json", None, serde_json::to_vec(apps).unwrap())
            .await
            .unwrap();
        store
            .write_if_version("system://organizations.json", None, serde_json::to_vec(orgs).unwrap())
            .await
            .unwrap();
        CacheLayer::new(Arc::new(store), 30_000)
    }

    #[tokio::test]
    async fn binding_synthesizes_orphan_when_app_missing() {
        let cache = cache_with(&[], &[]).await;
        let mut billing = Billing::new();
        let inputs = StageInputs { app_id: Some("a1"), publisher: Some("acme"), now: 1000, ..Default::default() };
        bind(&cache, &mut billing, &inputs).await.unwrap();
        let app = billing.app.unwrap();
        assert!(app.is_orphan());
        assert_eq!(app.free_until, 1000 + GRACE_PERIOD_MS);
        assert!(billing.write_back_new_orphan);
    }

    #[tokio::test]
    async fn claiming_binds_single_unambiguous_org() {
        let app = App {
            id: "a1".into(),
            name: "a1".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 1000,
            owner: None,
            git_email: None,
            sponsored: false,
        };
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), ..Default::default() };
        org.publishers.insert("acme".into());
        org.users.insert("dev@acme.io".into());
        let cache = cache_with(std::slice::from_ref(&app), &[org]).await;

        let mut billing = Billing::new();
        billing.app = Some(app);
        let inputs =
            StageInputs { app_id: Some("a1"), publisher: Some("acme"), git_email: Some("dev@acme.io"), now: 0, ..Default::default() };
        claim(&cache, &mut billing, &inputs).await.unwrap();
        assert!(billing.write_back_claimed);
        assert_eq!(billing.app.unwrap().owner_id(), Some("org-1"));
        assert!(!billing.claim_issue);
    }

    #[tokio::test]
    async fn claiming_flags_ambiguity_on_multiple_candidates() {
        let app = App {
            id: "a1".into(),
            name: "a1".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 1000,
            owner: None,
            git_email: None,
            sponsored: false,
        };
        let mut org_a = Organization { id: "org-a".into(), name: "A".into(), ..Default::default() };
        org_a.publishers.insert("acme".into());
        org_a.domains.insert("acme.io".into());
        let mut org_b = Organization { id: "org-b".into(), name: "B".into(), ..Default::default() };
        org_b.publishers.insert("acme".into());
        org_b.domains.insert("acme.io".into());
        let cache = cache_with(std::slice::from_ref(&app), &[org_a, org_b]).await;

        let mut billing = Billing::new();
        billing.app = Some(app);
        let inputs =
            StageInputs { app_id: Some("a1"), publisher: Some("acme"), git_email: Some("dev@acme.io"), now: 0, ..Default::default() };
        claim(&cache, &mut billing, &inputs).await.unwrap();
        assert!(billing.claim_issue);
        assert!(!billing.write_back_claimed);
    }

    #[test]
    fn permission_stage_rejects_blank_app_id() {
        let mut billing = Billing::new();
        let err = permission(&mut billing, Some("  "), None, 0).unwrap_err();
        assert!(matches!(err, crate::error::StageError::Policy(PolicyError::BadRequest { .. })));
    }

    #[test]
    fn enforce_raises_on_denial() {
        let mut billing = Billing::new();
        billing.permission = Some(PermissionResult::denied(billing_common::ErrorCode::GraceExpired));
        assert!(enforce(&billing).is_err());
    }

    #[test]
    fn enforce_passes_on_allow() {
        let mut billing = Billing::new();
        billing.permission = Some(PermissionResult::allowed(None));
        assert!(enforce(&billing).is_ok());
    }

    #[test]
    fn subscription_missing_header_only_for_orphans_before_cutoff() {
        let mut billing = Billing::new();
        billing.app = Some(App {
            id: "a1".into(),
            name: "a1".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 500,
            owner: None,
            git_email: None,
            sponsored: false,
        });
        assert!(subscription_missing_header(&billing, 1000));
        assert!(!subscription_missing_header(&billing, 100));
    }
}
