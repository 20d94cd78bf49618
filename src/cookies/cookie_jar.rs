//! Cookie primitives.
//!
//! [`CookieJar`] is the three-operation surface a tag script has for cookies:
//! create, read and remove by name. Everything above it (the broad-domain
//! resolver, the storage manager) only talks to this trait, so tests can swap
//! in a jar with arbitrary acceptance rules.
//!
//! [`DocumentCookieJar`] implements the primitives on top of a
//! [`CookieDocument`] the way a script does it: by formatting cookie strings
//! and scanning the `document.cookie` getter.
//!
//! ## Encoding
//! Values are percent-encoded on write and decoded on read, so any string
//! round-trips. Callers that pre-encode get their encoded form back.

use std::any::Any;

use log::warn;
use time::{Duration, OffsetDateTime};

use super::document::CookieDocument;

/// Upper bound for a cookie lifetime. Browsers clamp longer expiries to 400 days.
const MAX_COOKIE_TTL_SECONDS: u64 = 400 * 24 * 60 * 60;

/// The create/read/remove surface over the page's cookies.
///
/// ### Type erasure
/// `as_any` / `as_any_mut` enable downcasting when callers need access to
/// the concrete jar (e.g. to inspect a test double).
pub trait CookieJar: Send {
    /// Returns a type-erased reference to the jar.
    fn as_any(&self) -> &dyn Any;

    /// Returns a mutable type-erased reference to the jar.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Writes `name=value` on path `/`.
    ///
    /// `ttl_seconds == 0` writes a session cookie. Without `domain` the cookie
    /// is host-only. The write is fire-and-forget: a refused cookie is not reported.
    fn create_cookie(&mut self, name: &str, value: &str, ttl_seconds: u64, domain: Option<&str>);

    /// Returns the decoded value of the first visible cookie called `name`.
    fn read_cookie(&self, name: &str) -> Option<String>;

    /// Requests deletion of `name` (on `domain`, if given) by writing an expired cookie.
    fn remove_cookie(&mut self, name: &str, domain: Option<&str>);
}

/// Cookie primitives implemented over a [`CookieDocument`].
#[derive(Debug)]
pub struct DocumentCookieJar<D> {
    document: D,
}

impl<D: CookieDocument> DocumentCookieJar<D> {
    pub fn new(document: D) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn into_inner(self) -> D {
        self.document
    }
}

fn non_empty(domain: Option<&str>) -> Option<&str> {
    domain.filter(|d| !d.is_empty())
}

impl<D: CookieDocument + 'static> CookieJar for DocumentCookieJar<D> {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }

    fn create_cookie(&mut self, name: &str, value: &str, ttl_seconds: u64, domain: Option<&str>) {
        let encoded = urlencoding::encode(value).into_owned();
        let mut builder = cookie::Cookie::build((name.to_string(), encoded)).path("/");

        if ttl_seconds > 0 {
            let secs = ttl_seconds.min(MAX_COOKIE_TTL_SECONDS) as i64;
            builder = builder.expires(self.document.now() + Duration::seconds(secs));
        }
        if let Some(domain) = non_empty(domain) {
            builder = builder.domain(domain.to_string());
        }

        self.document.set_cookie(&builder.build().to_string());
    }

    fn read_cookie(&self, name: &str) -> Option<String> {
        let needle = format!("{name}=");
        let all = self.document.cookie();
        let raw = all
            .split(';')
            .map(|c| c.trim_start_matches(' '))
            .find_map(|c| c.strip_prefix(needle.as_str()))?;

        match urlencoding::decode(raw) {
            Ok(value) => Some(value.into_owned()),
            Err(e) => {
                warn!("cookie {} holds an undecodable value: {}", name, e);
                None
            }
        }
    }

    fn remove_cookie(&mut self, name: &str, domain: Option<&str>) {
        let epoch = OffsetDateTime::UNIX_EPOCH + Duration::seconds(1);
        let mut builder = cookie::Cookie::build((name.to_string(), String::new())).expires(epoch);

        if let Some(domain) = non_empty(domain) {
            builder = builder.domain(domain.to_string()).path("/");
        }

        self.document.set_cookie(&builder.build().to_string());
    }
}
