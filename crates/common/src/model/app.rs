use serde::{Deserialize, Serialize};

use crate::{normalize::normalize, time::EpochMs};

/// Owner of an app: either a single developer (identified by git email) or an
/// organization. Absence of an owner (`App::owner`) means the app is an
/// **orphan**.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    User,
    Organization,
}

/// An owner reference: the owner's kind plus its id. A personal app's owner
/// id is the owning user's id; an organization app's owner id is the
/// organization's id (invariant I2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    #[serde(rename = "ownerType")]
    pub owner_type: OwnerType,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub publisher: String,
    pub created: EpochMs,
    #[serde(rename = "freeUntil")]
    pub free_until: EpochMs,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
    #[serde(rename = "gitEmail", skip_serializing_if = "Option::is_none")]
    pub git_email: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub sponsored: bool,
}

impl App {
    pub fn is_orphan(&self) -> bool {
        self.owner.is_none()
    }

    pub fn is_sponsored(&self) -> bool {
        self.sponsored
    }

    pub fn owner_type(&self) -> Option<&OwnerType> {
        self.owner.as_ref().map(|o| &o.owner_type)
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.owner_id.as_str())
    }

    /// Whether `now` still falls within this app's grace period.
    pub fn in_grace_period(&self, now: EpochMs) -> bool {
        now < self.free_until
    }

    /// Matching key used by the CacheLayer: normalized (id, publisher).
    /// A missing publisher normalizes to the empty string.
    pub fn match_key(id: &str, publisher: Option<&str>) -> (String, String) {
        (normalize(id), publisher.map(normalize).unwrap_or_default())
    }

    pub fn key(&self) -> (String, String) {
        Self::match_key(&self.id, Some(&self.publisher))
    }

    /// `appKey` used in `BillingLog`: `"<id>|<publisher>"`.
    pub fn billing_key(&self) -> String {
        format!("{}|{}", self.id, self.publisher)
    }

    pub fn claim(&mut self, organization_id: &str) {
        self.owner = Some(Owner {
            owner_type: OwnerType::Organization,
            owner_id: organization_id.to_string(),
        });
    }

    pub fn force_orphan(&mut self) {
        self.owner = None;
    }
}
