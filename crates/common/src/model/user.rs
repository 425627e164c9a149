use serde::{Deserialize, Serialize};

use crate::normalize::normalize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub provider: String,
    #[serde(rename = "providerId")]
    pub provider_id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "gitEmail", skip_serializing_if = "Option::is_none")]
    pub git_email: Option<String>,
}

impl UserProfile {
    /// `CacheLayer::get_user` matches by id, exact case-sensitive.
    pub fn id_matches(&self, id: &str) -> bool {
        self.id == id
    }

    pub fn email_matches(&self, email: &str) -> bool {
        normalize(&self.email) == normalize(email)
    }
}
