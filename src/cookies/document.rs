//! The page's cookie string (`document.cookie`) and an in-memory emulation.
//!
//! Scripts only get two operations on cookies: assign a `Set-Cookie`-like
//! string, and read back every visible `name=value` pair as one string. The
//! browser never tells which domain a returned cookie was stored under and
//! never reports a refused write. [`CookieDocument`] models exactly that.
//!
//! [`InMemoryDocument`] reproduces the browser rules that matter for domain
//! scoping:
//! - a `Domain` attribute must domain-match the page host,
//! - public suffixes are refused (a public suffix equal to the host becomes host-only),
//! - IP hosts only accept their own address,
//! - writes with an expiry in the past delete the matching cookie.

use std::fmt;
use std::sync::Arc;

use log::debug;
use time::OffsetDateTime;
use url::Url;

use super::cookies::Cookie;
use super::psl;

/// Time source used for cookie expiry.
pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Raw access to the page's cookie string.
pub trait CookieDocument: Send {
    /// Returns all visible cookies as `"a=1; b=2"`.
    fn cookie(&self) -> String;

    /// Assigns one cookie string. Refused writes are silently dropped.
    fn set_cookie(&mut self, cookie: &str);

    /// Current time, used to compute `Expires` attributes.
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// In-memory cookie document for a single page.
pub struct InMemoryDocument {
    host: String,
    path: String,
    cookies: Vec<Cookie>,
    clock: Clock,
}

impl fmt::Debug for InMemoryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryDocument")
            .field("host", &self.host)
            .field("path", &self.path)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

impl InMemoryDocument {
    /// Creates an empty document for a page at `/` on `host`.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_lowercase(),
            path: "/".to_string(),
            cookies: Vec::new(),
            clock: Arc::new(OffsetDateTime::now_utc),
        }
    }

    /// Creates an empty document for the page at `url`.
    pub fn for_url(url: &Url) -> Self {
        let mut doc = Self::new(url.host_str().unwrap_or_default());
        doc.path = url.path().to_string();
        doc
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// All stored records, including expired ones that were not purged yet.
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Stored records named `name`, across all domains and paths.
    pub fn cookies_named(&self, name: &str) -> Vec<&Cookie> {
        self.cookies.iter().filter(|c| c.name == name).collect()
    }

    /// Drops records that are expired at the current time.
    pub fn purge_expired(&mut self) {
        let now = (self.clock)();
        self.cookies.retain(|c| !c.is_expired(now));
    }

    fn default_path(&self) -> String {
        self.path
            .rsplit_once('/')
            .map_or("/", |(a, _)| if a.is_empty() { "/" } else { a })
            .to_string()
    }

    fn path_matches(&self, cookie_path: &str) -> bool {
        if self.path == cookie_path {
            return true;
        }
        self.path.starts_with(cookie_path)
            && (cookie_path.ends_with('/') || self.path[cookie_path.len()..].starts_with('/'))
    }

    /// Resolves the domain a write is stored under, or `None` if the browser would refuse it.
    fn scope_for(&self, domain_attr: Option<&str>) -> Option<(String, bool)> {
        let domain = domain_attr
            .map(|d| d.trim_start_matches('.').to_lowercase())
            .filter(|d| !d.is_empty());

        match domain {
            None => Some((self.host.clone(), true)),
            Some(d) if d == self.host && psl::is_public_suffix(&d) => Some((d, true)),
            Some(d) if psl::is_valid_cookie_domain(&d, &self.host) => Some((d, false)),
            Some(d) => {
                debug!("cookie domain {} refused for host {}", d, self.host);
                None
            }
        }
    }
}

impl CookieDocument for InMemoryDocument {
    fn cookie(&self) -> String {
        let now = (self.clock)();
        self.cookies
            .iter()
            .filter(|c| !c.is_expired(now))
            .filter(|c| self.path_matches(&c.path))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookie(&mut self, cookie_str: &str) {
        let parsed = match cookie::Cookie::parse(cookie_str.to_string()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("ignoring malformed cookie string {:?}: {}", cookie_str, e);
                return;
            }
        };

        let Some((domain, host_only)) = self.scope_for(parsed.domain()) else {
            return;
        };

        let now = (self.clock)();
        let expires = match parsed.max_age() {
            Some(max_age) => Some(now + max_age),
            None => parsed.expires_datetime(),
        };

        let cookie = Cookie {
            name: parsed.name().to_string(),
            value: parsed.value().to_string(),
            domain,
            host_only,
            path: parsed
                .path()
                .map(str::to_string)
                .unwrap_or_else(|| self.default_path()),
            expires,
        };

        if cookie.is_expired(now) {
            self.cookies.retain(|c| !c.same_slot(&cookie));
            return;
        }

        // Replace in place so creation order is kept
        if let Some(existing) = self.cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
            *existing = cookie;
        } else {
            self.cookies.push(cookie);
        }
    }

    fn now(&self) -> OffsetDateTime {
        (self.clock)()
    }
}
