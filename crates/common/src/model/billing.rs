use super::{
    app::App, blocked::BlockedEntry, dunning::DunningEntry, org::Organization,
    permission::{NewUserWriteback, PermissionResult},
    user::UserProfile,
};

/// The per-request transient record threaded through the stage pipeline.
/// Created during Binding, mutated only by later stages, read by
/// `SuccessPostprocessor`, drained by `WritebackEngine`, then discarded.
/// Never shared across concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct Billing {
    pub app: Option<App>,
    pub organization: Option<Organization>,
    pub user: Option<UserProfile>,
    pub blocked: Option<BlockedEntry>,
    pub dunning: Option<DunningEntry>,
    pub permission: Option<PermissionResult>,
    pub claim_issue: bool,
    pub log_unknown_user_attempt: bool,
    pub write_back_new_orphan: bool,
    pub write_back_claimed: bool,
    pub write_back_force_orphan: bool,
    pub write_back_new_user: Option<NewUserWriteback>,
}

impl Billing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization.as_ref().map(|o| o.id.as_str())
    }

    pub fn app_id(&self) -> Option<&str> {
        self.app.as_ref().map(|a| a.id.as_str())
    }
}
