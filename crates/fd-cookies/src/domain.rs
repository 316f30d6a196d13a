//! Domain-filter predicate shared by all three parsers.

/// True when a stored cookie domain is accepted for target host `target`.
///
/// Accepted stored domains are the exact host, the dot-prefixed host,
/// and any subdomain of it, mirroring the SQL filter
/// `host = ?` / `host = '.' || ?` / `host LIKE '%.' || ?`.
pub fn domain_matches(stored: &str, target: &str) -> bool {
    if stored.is_empty() || target.is_empty() {
        return false;
    }
    stored == target || stored.strip_suffix(target).is_some_and(|p| p.ends_with('.'))
}
