use billing_common::{
    config::GRACE_PERIOD_MS,
    normalize::{email_domain, normalized_eq},
    time::EpochMs,
    Billing, ErrorCode, NewUserWriteback, Organization, OwnerType, PermissionResult, UserProfile, Warning,
};

/// Pure, total decision function over a request's `Billing` record. Mutates
/// `billing.write_back_new_user` and `billing.log_unknown_user_attempt` as a
/// side channel to the permission decision; returns the decision itself.
pub fn evaluate_permission(billing: &mut Billing, git_email: Option<&str>, now: EpochMs) -> PermissionResult {
    let Some(app) = billing.app.clone() else {
        return PermissionResult::allowed(None);
    };

    if app.is_sponsored() {
        return PermissionResult::allowed(None);
    }

    if let Some(blocked) = &billing.blocked {
        return PermissionResult::denied(ErrorCode::from_blocked_reason(blocked.reason));
    }

    match app.owner_type() {
        Some(OwnerType::User) => evaluate_personal_app(&app.git_email, billing.user.as_ref(), git_email),
        Some(OwnerType::Organization) => {
            let org = billing.organization.clone();
            match org {
                Some(org) => evaluate_organization_app(&org, git_email, now, billing),
                None => PermissionResult::allowed(None),
            }
        },
        None => {
            if now < app.free_until {
                PermissionResult::allowed(Some(Warning::app_grace_period(app.free_until - now)))
            } else {
                PermissionResult::denied(ErrorCode::GraceExpired)
            }
        },
    }
}

fn evaluate_personal_app(
    app_git_email: &Option<String>,
    user: Option<&UserProfile>,
    git_email: Option<&str>,
) -> PermissionResult {
    let Some(git_email) = git_email else {
        return PermissionResult::denied(ErrorCode::GitEmailRequired);
    };
    let matches_app = app_git_email.as_deref().is_some_and(|e| normalized_eq(e, git_email));
    let matches_user = user.is_some_and(|u| u.email_matches(git_email) || u.git_email.as_deref().is_some_and(|e| normalized_eq(e, git_email)));
    if matches_app || matches_user {
        PermissionResult::allowed(None)
    } else {
        PermissionResult::denied(ErrorCode::UserNotAuthorized)
    }
}

fn evaluate_organization_app(
    org: &Organization,
    git_email: Option<&str>,
    now: EpochMs,
    billing: &mut Billing,
) -> PermissionResult {
    if org.plan.as_ref().is_some_and(|p| p.is_unlimited()) {
        return PermissionResult::allowed(None);
    }

    let Some(email) = git_email else {
        return PermissionResult::denied(ErrorCode::GitEmailRequired);
    };

    if org.has_user(email) {
        return PermissionResult::allowed(None);
    }
    if org.has_denied_user(email) {
        return PermissionResult::denied(ErrorCode::UserNotAuthorized);
    }
    if let Some(domain) = email_domain(email) {
        if org.has_domain(&domain) {
            billing.write_back_new_user = Some(NewUserWriteback::Allow);
            return PermissionResult::allowed(None);
        }
        if org.has_pending_domain(&domain) {
            billing.write_back_new_user = Some(NewUserWriteback::Unknown);
            billing.log_unknown_user_attempt = true;
            return PermissionResult::allowed(None);
        }
    }
    if org.deny_unknown_domains {
        billing.write_back_new_user = Some(NewUserWriteback::Deny);
        return PermissionResult::denied(ErrorCode::UserNotAuthorized);
    }

    billing.log_unknown_user_attempt = true;
    billing.write_back_new_user = Some(NewUserWriteback::Unknown);
    let within_grace = org.first_seen(email).map_or(true, |first_seen| now - first_seen < GRACE_PERIOD_MS);
    if within_grace {
        PermissionResult::allowed(None)
    } else {
        PermissionResult::denied(ErrorCode::OrgGraceExpired)
    }
}

#[cfg(test)]
mod tests {
    use billing_common::{App, BlockedEntry, BlockedReason, Plan, UserProfile};
    use proptest::prelude::*;

    use super::*;

    fn app_with_owner(owner_type: Option<OwnerType>) -> App {
        App {
            id: "a1".into(),
            name: "demo".into(),
            publisher: "acme".into(),
            created: 0,
            free_until: 1000,
            owner: owner_type.map(|t| billing_common::Owner { owner_type: t, owner_id: "org-1".into() }),
            git_email: None,
            sponsored: false,
        }
    }

    fn billing_with_app(app: App) -> Billing {
        Billing { app: Some(app), ..Billing::new() }
    }

    #[test]
    fn no_app_bound_is_allowed() {
        let mut billing = Billing::new();
        assert!(evaluate_permission(&mut billing, None, 0).is_allowed());
    }

    #[test]
    fn sponsored_app_is_always_allowed() {
        let mut app = app_with_owner(None);
        app.sponsored = true;
        let mut billing = billing_with_app(app);
        assert!(evaluate_permission(&mut billing, None, 999_999).is_allowed());
    }

    #[test]
    fn blocked_organization_denies_regardless_of_owner_type() {
        let mut billing = billing_with_app(app_with_owner(Some(OwnerType::Organization)));
        billing.blocked = Some(BlockedEntry { reason: BlockedReason::PaymentFailed, blocked_at: 0 });
        let result = evaluate_permission(&mut billing, Some("dev@acme.io"), 0);
        assert_eq!(result.error(), Some(ErrorCode::PaymentFailed));
    }

    #[test]
    fn personal_app_requires_git_email() {
        let mut billing = billing_with_app(app_with_owner(Some(OwnerType::User)));
        assert_eq!(evaluate_permission(&mut billing, None, 0).error(), Some(ErrorCode::GitEmailRequired));
    }

    #[test]
    fn personal_app_matches_app_git_email_case_insensitively() {
        let mut app = app_with_owner(Some(OwnerType::User));
        app.git_email = Some("Dev@Acme.io".into());
        let mut billing = billing_with_app(app);
        assert!(evaluate_permission(&mut billing, Some("dev@acme.io"), 0).is_allowed());
    }

    #[test]
    fn personal_app_mismatch_is_denied() {
        let mut app = app_with_owner(Some(OwnerType::User));
        app.git_email = Some("dev@acme.io".into());
        let mut billing = billing_with_app(app);
        assert_eq!(
            evaluate_permission(&mut billing, Some("other@acme.io"), 0).error(),
            Some(ErrorCode::UserNotAuthorized)
        );
    }

    #[test]
    fn personal_app_matches_bound_user_profile() {
        let app = app_with_owner(Some(OwnerType::User));
        let mut billing = billing_with_app(app);
        billing.user = Some(UserProfile {
            id: "u1".into(),
            provider: "github".into(),
            provider_id: "1".into(),
            name: "Dev".into(),
            email: "dev@acme.io".into(),
            git_email: None,
        });
        assert!(evaluate_permission(&mut billing, Some("dev@acme.io"), 0).is_allowed());
    }

    fn org_app_billing(org: Organization) -> Billing {
        let mut billing = billing_with_app(app_with_owner(Some(OwnerType::Organization)));
        billing.organization = Some(org);
        billing
    }

    #[test]
    fn unlimited_plan_skips_git_email_requirement() {
        let org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Unlimited), ..Default::default() };
        let mut billing = org_app_billing(org);
        assert!(evaluate_permission(&mut billing, None, 0).is_allowed());
    }

    #[test]
    fn org_app_requires_git_email_when_not_unlimited() {
        let org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        let mut billing = org_app_billing(org);
        assert_eq!(evaluate_permission(&mut billing, None, 0).error(), Some(ErrorCode::GitEmailRequired));
    }

    #[test]
    fn explicit_user_allowed_without_writeback() {
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        org.users.insert("dev@acme.io".into());
        let mut billing = org_app_billing(org);
        assert!(evaluate_permission(&mut billing, Some("dev@acme.io"), 0).is_allowed());
        assert_eq!(billing.write_back_new_user, None);
    }

    #[test]
    fn denied_user_is_denied() {
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        org.denied_users.insert("dev@acme.io".into());
        let mut billing = org_app_billing(org);
        assert_eq!(
            evaluate_permission(&mut billing, Some("dev@acme.io"), 0).error(),
            Some(ErrorCode::UserNotAuthorized)
        );
    }

    #[test]
    fn domain_match_allows_and_flags_writeback_allow() {
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        org.domains.insert("acme.io".into());
        let mut billing = org_app_billing(org);
        assert!(evaluate_permission(&mut billing, Some("new@acme.io"), 0).is_allowed());
        assert_eq!(billing.write_back_new_user, Some(NewUserWriteback::Allow));
    }

    #[test]
    fn pending_domain_allows_and_logs_unknown_attempt() {
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        org.pending_domains.insert("acme.io".into());
        let mut billing = org_app_billing(org);
        assert!(evaluate_permission(&mut billing, Some("new@acme.io"), 0).is_allowed());
        assert_eq!(billing.write_back_new_user, Some(NewUserWriteback::Unknown));
        assert!(billing.log_unknown_user_attempt);
    }

    #[test]
    fn deny_unknown_domains_denies_and_flags_writeback_deny() {
        let org = Organization {
            id: "org-1".into(),
            name: "Acme".into(),
            plan: Some(Plan::Small),
            deny_unknown_domains: true,
            ..Default::default()
        };
        let mut billing = org_app_billing(org);
        assert_eq!(
            evaluate_permission(&mut billing, Some("stranger@nowhere.com"), 0).error(),
            Some(ErrorCode::UserNotAuthorized)
        );
        assert_eq!(billing.write_back_new_user, Some(NewUserWriteback::Deny));
    }

    #[test]
    fn unknown_user_within_grace_is_allowed() {
        let org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        let mut billing = org_app_billing(org);
        let result = evaluate_permission(&mut billing, Some("stranger@nowhere.com"), 0);
        assert!(result.is_allowed());
        assert!(billing.log_unknown_user_attempt);
        assert_eq!(billing.write_back_new_user, Some(NewUserWriteback::Unknown));
    }

    #[test]
    fn unknown_user_past_grace_is_denied() {
        let mut org = Organization { id: "org-1".into(), name: "Acme".into(), plan: Some(Plan::Small), ..Default::default() };
        org.user_first_seen_timestamp.insert("stranger@nowhere.com".into(), 0);
        let mut billing = org_app_billing(org);
        let result = evaluate_permission(&mut billing, Some("stranger@nowhere.com"), GRACE_PERIOD_MS + 1);
        assert_eq!(result.error(), Some(ErrorCode::OrgGraceExpired));
    }

    #[test]
    fn orphan_within_grace_is_allowed_with_warning() {
        let mut billing = billing_with_app(app_with_owner(None));
        billing.app.as_mut().unwrap().free_until = 1000;
        let result = evaluate_permission(&mut billing, None, 500);
        assert!(result.is_allowed());
        assert_eq!(result.warning().unwrap().time_remaining, Some(500));
    }

    #[test]
    fn orphan_past_grace_is_denied() {
        let mut billing = billing_with_app(app_with_owner(None));
        billing.app.as_mut().unwrap().free_until = 1000;
        let result = evaluate_permission(&mut billing, None, 1000);
        assert_eq!(result.error(), Some(ErrorCode::GraceExpired));
    }

    proptest! {
        #[test]
        fn permission_is_total_and_idempotent(free_until in 0i64..10_000, now in 0i64..10_000) {
            let mut billing = billing_with_app(app_with_owner(None));
            billing.app.as_mut().unwrap().free_until = free_until;
            let first = evaluate_permission(&mut billing.clone(), None, now);
            let second = evaluate_permission(&mut billing, None, now);
            prop_assert_eq!(first, second);
        }
    }
}
