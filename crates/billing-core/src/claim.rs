use billing_common::{normalize::email_domain, Organization};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    User,
    Domain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimCandidate {
    pub organization_id: String,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimResult {
    pub publisher_match_found: bool,
    pub candidates: Vec<ClaimCandidate>,
}

impl ClaimResult {
    pub fn no_match() -> Self {
        Self::default()
    }
}

/// Pure function: which organizations (if any) would claim an orphan app
/// published under `publisher`, given its git email. Within one org, an
/// explicit user match takes precedence over a domain match.
pub fn evaluate_claim_candidates(publisher: &str, git_email: Option<&str>, orgs: &[Organization]) -> ClaimResult {
    let matching: Vec<&Organization> = orgs.iter().filter(|o| o.accepts_publisher(publisher)).collect();
    if matching.is_empty() {
        return ClaimResult::no_match();
    }

    let mut candidates = Vec::new();
    if let Some(email) = git_email {
        for org in &matching {
            if org.has_user(email) {
                candidates.push(ClaimCandidate { organization_id: org.id.clone(), match_type: MatchType::User });
            } else if email_domain(email).is_some_and(|domain| org.has_domain(&domain)) {
                candidates.push(ClaimCandidate { organization_id: org.id.clone(), match_type: MatchType::Domain });
            }
        }
    }

    ClaimResult { publisher_match_found: true, candidates }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org(id: &str, publisher: &str) -> Organization {
        let mut o = Organization { id: id.into(), name: id.into(), ..Default::default() };
        o.publishers.insert(publisher.to_string());
        o
    }

    #[test]
    fn no_publisher_match_yields_no_candidates() {
        let result = evaluate_claim_candidates("acme", None, &[org("o1", "other")]);
        assert!(!result.publisher_match_found);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn publisher_match_without_email_is_ambiguous_free_but_candidateless() {
        let result = evaluate_claim_candidates("acme", None, &[org("o1", "acme")]);
        assert!(result.publisher_match_found);
        assert!(result.candidates.is_empty());
    }

    #[test]
    fn user_match_takes_precedence_over_domain_within_one_org() {
        let mut o = org("o1", "acme");
        o.users.insert("dev@acme.io".into());
        o.domains.insert("acme.io".into());
        let result = evaluate_claim_candidates("acme", Some("dev@acme.io"), &[o]);
        assert_eq!(result.candidates, vec![ClaimCandidate { organization_id: "o1".into(), match_type: MatchType::User }]);
    }

    #[test]
    fn multiple_matching_orgs_are_all_returned_as_ambiguous_candidates() {
        let mut a = org("o1", "acme");
        a.domains.insert("acme.io".into());
        let mut b = org("o2", "acme");
        b.domains.insert("acme.io".into());
        let result = evaluate_claim_candidates("acme", Some("dev@acme.io"), &[a, b]);
        assert_eq!(result.candidates.len(), 2);
    }

    #[test]
    fn domain_match_when_no_explicit_user() {
        let mut o = org("o1", "acme");
        o.domains.insert("acme.io".into());
        let result = evaluate_claim_candidates("acme", Some("new@acme.io"), &[o]);
        assert_eq!(result.candidates, vec![ClaimCandidate { organization_id: "o1".into(), match_type: MatchType::Domain }]);
    }
}
