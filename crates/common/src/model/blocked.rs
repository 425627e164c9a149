use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time::EpochMs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedReason {
    Flagged,
    SubscriptionCancelled,
    PaymentFailed,
    NoSubscription,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedEntry {
    pub reason: BlockedReason,
    #[serde(rename = "blockedAt")]
    pub blocked_at: EpochMs,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedOrganizations {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: EpochMs,
    #[serde(default)]
    pub orgs: HashMap<String, BlockedEntry>,
}

impl BlockedOrganizations {
    pub fn status_for(&self, organization_id: &str) -> Option<&BlockedEntry> {
        self.orgs.get(organization_id)
    }
}
