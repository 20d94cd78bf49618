//! Public Suffix List checks for cookie `Domain` attributes.
//!
//! Browsers refuse cookies scoped to a public suffix (`.com`, `.co.uk`,
//! `.github.io`, ...). That refusal is exactly what the broad-domain probe
//! walk runs into on its first candidates.

use std::net::IpAddr;

use ::psl::{List, Psl};

/// Returns `true` if `domain` itself is a public suffix (e.g. "com", "co.uk").
pub fn is_public_suffix(domain: &str) -> bool {
    let domain_lower = domain.trim_start_matches('.').to_lowercase();
    let domain_bytes = domain_lower.as_bytes();

    match List.suffix(domain_bytes) {
        Some(suffix) => suffix.as_bytes() == domain_bytes,
        None => false,
    }
}

/// Registrable domain (eTLD+1), e.g. "example.com" for "sub.example.com".
pub fn registrable_domain(domain: &str) -> Option<String> {
    let domain_lower = domain.trim_start_matches('.').to_lowercase();
    ::psl::domain(domain_lower.as_bytes())
        .and_then(|d| std::str::from_utf8(d.as_bytes()).ok())
        .map(|s| s.to_string())
}

/// Checks whether a page on `host` may set a cookie with `Domain=cookie_domain`.
///
/// The domain must domain-match the host and must not be a public suffix.
/// IP hosts only accept their own address.
pub fn is_valid_cookie_domain(cookie_domain: &str, host: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.').to_lowercase();
    let host = host.to_lowercase();

    if cookie_domain.is_empty() {
        return false;
    }

    if host.parse::<IpAddr>().is_ok() {
        return cookie_domain == host;
    }

    if is_public_suffix(&cookie_domain) {
        return false;
    }

    host == cookie_domain || host.ends_with(&format!(".{cookie_domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_suffixes() {
        assert!(is_public_suffix("com"));
        assert!(is_public_suffix(".COM"));
        assert!(is_public_suffix("co.uk"));
        assert!(is_public_suffix("github.io"));
        assert!(!is_public_suffix("bar.com"));
        assert!(!is_public_suffix("foo.bar.com"));
    }

    #[test]
    fn registrable_domains() {
        assert_eq!(registrable_domain("baz.foo.bar.com").as_deref(), Some("bar.com"));
        assert_eq!(registrable_domain("shop.example.co.uk").as_deref(), Some("example.co.uk"));
        assert_eq!(registrable_domain("com"), None);
    }

    #[test]
    fn valid_domains_for_host() {
        assert!(is_valid_cookie_domain(".bar.com", "baz.foo.bar.com"));
        assert!(is_valid_cookie_domain("foo.bar.com", "baz.foo.bar.com"));
        assert!(is_valid_cookie_domain(".baz.foo.bar.com", "baz.foo.bar.com"));
    }

    #[test]
    fn rejects_public_suffix_and_foreign_domains() {
        assert!(!is_valid_cookie_domain(".com", "baz.foo.bar.com"));
        assert!(!is_valid_cookie_domain(".co.uk", "shop.example.co.uk"));
        assert!(!is_valid_cookie_domain("other.com", "bar.com"));
        // suffix match must happen on a label boundary
        assert!(!is_valid_cookie_domain("ar.com", "bar.com"));
        assert!(!is_valid_cookie_domain(".", "bar.com"));
    }

    #[test]
    fn ip_hosts_only_accept_themselves() {
        assert!(is_valid_cookie_domain("127.0.0.1", "127.0.0.1"));
        assert!(!is_valid_cookie_domain(".0.0.1", "127.0.0.1"));
        assert!(!is_valid_cookie_domain(".1", "127.0.0.1"));
    }
}
