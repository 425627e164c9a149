use std::collections::{HashMap, HashSet};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    normalize::{email_domain, normalize},
    time::EpochMs,
};

/// An organization's subscription plan. Open-ended in the source ("unlimited"
/// | "small" | ...), so unrecognized values round-trip through `Other` rather
/// than failing to deserialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Unlimited,
    Small,
    Payg,
    Other(String),
}

impl Plan {
    pub fn as_str(&self) -> &str {
        match self {
            Plan::Unlimited => "unlimited",
            Plan::Small => "small",
            Plan::Payg => "payg",
            Plan::Other(s) => s,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Plan::Unlimited)
    }

    pub fn is_payg(&self) -> bool {
        matches!(self, Plan::Payg)
    }
}

impl From<&str> for Plan {
    fn from(s: &str) -> Self {
        match s {
            "unlimited" => Plan::Unlimited,
            "small" => Plan::Small,
            "payg" => Plan::Payg,
            other => Plan::Other(other.to_string()),
        }
    }
}

impl Serialize for Plan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Plan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(Plan::from(s.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub publishers: HashSet<String>,
    #[serde(default)]
    pub users: HashSet<String>,
    #[serde(rename = "deniedUsers", default)]
    pub denied_users: HashSet<String>,
    #[serde(default)]
    pub domains: HashSet<String>,
    #[serde(rename = "pendingDomains", default)]
    pub pending_domains: HashSet<String>,
    #[serde(rename = "denyUnknownDomains", default)]
    pub deny_unknown_domains: bool,
    #[serde(rename = "userFirstSeenTimestamp", default)]
    pub user_first_seen_timestamp: HashMap<String, EpochMs>,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "stripeCustomerId", skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
}

/// Result of classifying a user's standing against an organization's
/// allow/deny configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCategory {
    Allowed,
    AllowedPending,
    Deny,
    Denied,
    Unknown,
}

impl Organization {
    pub fn accepts_publisher(&self, publisher: &str) -> bool {
        let needle = normalize(publisher);
        self.publishers.iter().any(|p| normalize(p) == needle)
    }

    pub fn has_user(&self, email: &str) -> bool {
        let needle = normalize(email);
        self.users.iter().any(|u| normalize(u) == needle)
    }

    pub fn has_denied_user(&self, email: &str) -> bool {
        let needle = normalize(email);
        self.denied_users.iter().any(|u| normalize(u) == needle)
    }

    pub fn has_domain(&self, domain: &str) -> bool {
        let needle = normalize(domain);
        self.domains.iter().any(|d| normalize(d) == needle)
    }

    pub fn has_pending_domain(&self, domain: &str) -> bool {
        let needle = normalize(domain);
        self.pending_domains.iter().any(|d| normalize(d) == needle)
    }

    pub fn first_seen(&self, email: &str) -> Option<EpochMs> {
        let needle = normalize(email);
        self.user_first_seen_timestamp
            .iter()
            .find(|(k, _)| normalize(k) == needle)
            .map(|(_, v)| *v)
    }

    /// Classify `email` per the `UserCategory` glossary entry. `domain` is
    /// `email`'s normalized domain, or `None` if malformed.
    pub fn classify_user(&self, email: &str) -> UserCategory {
        if self.has_user(email) {
            return UserCategory::Allowed;
        }
        if self.has_denied_user(email) {
            return UserCategory::Denied;
        }
        if let Some(domain) = email_domain(email) {
            if self.has_domain(&domain) {
                return UserCategory::Allowed;
            }
            if self.has_pending_domain(&domain) {
                return UserCategory::AllowedPending;
            }
        }
        if self.deny_unknown_domains {
            return UserCategory::Deny;
        }
        UserCategory::Unknown
    }

    pub fn is_payg_metered(&self) -> bool {
        self.plan.as_ref().is_some_and(Plan::is_payg) && self.stripe_customer_id.is_some()
    }

    /// Add `email` to `users`, removing it from `deniedUsers`. Idempotent.
    pub fn allow_user(&mut self, email: &str) {
        self.denied_users.retain(|u| normalize(u) != normalize(email));
        if !self.has_user(email) {
            self.users.insert(email.to_string());
        }
    }

    /// Add `email` to `deniedUsers`, without duplicates (case-insensitive). Idempotent.
    pub fn deny_user(&mut self, email: &str) {
        if !self.has_denied_user(email) {
            self.denied_users.insert(email.to_string());
        }
    }

    /// Record `email`'s first-seen timestamp iff absent. Never overwrites
    /// (first-seen min-wins).
    pub fn record_first_seen(&mut self, email: &str, now: EpochMs) {
        if self.first_seen(email).is_none() {
            self.user_first_seen_timestamp.insert(normalize(email), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> Organization {
        Organization { id: "org-1".into(), name: "Acme".into(), ..Default::default() }
    }

    #[test]
    fn classify_explicit_allow_beats_everything() {
        let mut o = org();
        o.users.insert("alice@acme.io".into());
        o.deny_unknown_domains = true;
        assert_eq!(o.classify_user("Alice@ACME.io"), UserCategory::Allowed);
    }

    #[test]
    fn classify_denied_user() {
        let mut o = org();
        o.denied_users.insert("bob@acme.io".into());
        assert_eq!(o.classify_user("bob@acme.io"), UserCategory::Denied);
    }

    #[test]
    fn classify_domain_allow_and_pending() {
        let mut o = org();
        o.domains.insert("acme.io".into());
        assert_eq!(o.classify_user("new@acme.io"), UserCategory::Allowed);

        let mut o2 = org();
        o2.pending_domains.insert("acme.io".into());
        assert_eq!(o2.classify_user("new@acme.io"), UserCategory::AllowedPending);
    }

    #[test]
    fn classify_deny_unknown_domains() {
        let mut o = org();
        o.deny_unknown_domains = true;
        assert_eq!(o.classify_user("stranger@nowhere.com"), UserCategory::Deny);
    }

    #[test]
    fn classify_unknown_default() {
        let o = org();
        assert_eq!(o.classify_user("stranger@nowhere.com"), UserCategory::Unknown);
    }

    #[test]
    fn allow_user_is_idempotent_and_clears_deny() {
        let mut o = org();
        o.deny_user("carol@acme.io");
        o.allow_user("carol@acme.io");
        o.allow_user("CAROL@acme.io");
        assert_eq!(o.users.len(), 1);
        assert!(!o.has_denied_user("carol@acme.io"));
    }

    #[test]
    fn first_seen_min_wins() {
        let mut o = org();
        o.record_first_seen("dave@acme.io", 100);
        o.record_first_seen("dave@acme.io", 999);
        assert_eq!(o.first_seen("dave@acme.io"), Some(100));
    }

    #[test]
    fn plan_round_trips_unknown_variants() {
        let p: Plan = "enterprise".into();
        assert_eq!(p, Plan::Other("enterprise".to_string()));
        assert_eq!(p.as_str(), "enterprise");
    }

    #[test]
    fn payg_requires_stripe_customer_id() {
        let mut o = org();
        o.plan = Some(Plan::Payg);
        assert!(!o.is_payg_metered());
        o.stripe_customer_id = Some("cus_123".into());
        assert!(o.is_payg_metered());
    }
}
