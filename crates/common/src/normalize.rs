//! String normalization shared by every identity comparison in the billing
//! core: emails, publishers, domains, and allow/deny-list entries are all
//! compared case-insensitively after trimming.

/// `normalize(s) = trim(lower(s))`. Idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Two strings are considered equal for identity-matching purposes iff their
/// normalized forms match.
pub fn normalized_eq(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Extract the domain portion of an email address, normalized. Returns `None`
/// if there is no `@` or the domain part is empty.
pub fn email_domain(email: &str) -> Option<String> {
    let normalized = normalize(email);
    let (_, domain) = normalized.split_once('@')?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}
