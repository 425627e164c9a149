use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::time::EpochMs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingLogAppEntry {
    pub id: String,
    pub publisher: String,
    #[serde(rename = "firstSeen")]
    pub first_seen: EpochMs,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingLogUserEntry {
    pub email: String,
    #[serde(rename = "firstSeen")]
    pub first_seen: EpochMs,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingLogMonth {
    #[serde(default)]
    pub apps: HashMap<String, BillingLogAppEntry>,
    #[serde(default)]
    pub users: HashMap<String, BillingLogUserEntry>,
}

/// `logs://<orgId>_billingLog.json`: a month key (`YYYY-MM`, UTC) to
/// per-month usage map, for PAYG metering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingLog(#[serde(default)] pub HashMap<String, BillingLogMonth>);

/// Outcome of recording one event against a `BillingLog` month: whether a
/// meter event must be emitted because this was a first sighting this month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    FirstSeenThisMonth,
    AlreadySeenThisMonth,
}

impl BillingLog {
    pub fn month_mut(&mut self, month: &str) -> &mut BillingLogMonth {
        self.0.entry(month.to_string()).or_default()
    }

    /// Record a `(appId, publisher)` usage for `month`. Returns
    /// `FirstSeenThisMonth` exactly when the app had no prior entry this
    /// month (the caller then emits a `pay_as_you_go_app` meter event).
    pub fn record_app(
        &mut self,
        month: &str,
        app_id: &str,
        publisher: &str,
        now: EpochMs,
    ) -> RecordOutcome {
        let app_key = format!("{app_id}|{publisher}");
        let month_entry = self.month_mut(month);
        match month_entry.apps.get_mut(&app_key) {
            Some(entry) => {
                entry.count += 1;
                RecordOutcome::AlreadySeenThisMonth
            },
            None => {
                month_entry.apps.insert(
                    app_key,
                    BillingLogAppEntry {
                        id: app_id.to_string(),
                        publisher: publisher.to_string(),
                        first_seen: now,
                        count: 1,
                    },
                );
                RecordOutcome::FirstSeenThisMonth
            },
        }
    }

    /// Record an email's usage for `month` (lowercased). Returns
    /// `FirstSeenThisMonth` exactly when no prior entry existed this month.
    pub fn record_user(&mut self, month: &str, email: &str, now: EpochMs) -> RecordOutcome {
        let email = email.to_lowercase();
        let month_entry = self.month_mut(month);
        match month_entry.users.get_mut(&email) {
            Some(entry) => {
                entry.count += 1;
                RecordOutcome::AlreadySeenThisMonth
            },
            None => {
                month_entry
                    .users
                    .insert(email.clone(), BillingLogUserEntry { email, first_seen: now, count: 1 });
                RecordOutcome::FirstSeenThisMonth
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_occurrence_creates_and_emits() {
        let mut log = BillingLog::default();
        let outcome = log.record_app("2024-02", "A1", "Acme", 1000);
        assert_eq!(outcome, RecordOutcome::FirstSeenThisMonth);
        let entry = &log.month_mut("2024-02").apps["A1|Acme"];
        assert_eq!(entry.count, 1);
        assert_eq!(entry.first_seen, 1000);
    }

    #[test]
    fn repeat_occurrence_increments_and_preserves_first_seen() {
        let mut log = BillingLog::default();
        log.record_app("2024-02", "A1", "Acme", 1000);
        let outcome = log.record_app("2024-02", "A1", "Acme", 2000);
        assert_eq!(outcome, RecordOutcome::AlreadySeenThisMonth);
        let entry = &log.month_mut("2024-02").apps["A1|Acme"];
        assert_eq!(entry.count, 2);
        assert_eq!(entry.first_seen, 1000);
    }

    #[test]
    fn user_email_is_lowercased() {
        let mut log = BillingLog::default();
        log.record_user("2024-02", "Alice@Example.com", 1000);
        assert!(log.month_mut("2024-02").users.contains_key("alice@example.com"));
    }
}
