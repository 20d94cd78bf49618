//! Cookie record type.
//!
//! [`Cookie`] is what an [`InMemoryDocument`](super::InMemoryDocument) keeps
//! for every accepted `document.cookie` write. Scripts never see these
//! attributes; they only get `name=value` pairs back from the getter.

use time::OffsetDateTime;

/// A cookie as stored by the document emulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    /// Cookie name (case-sensitive).
    pub name: String,

    /// Raw cookie value, exactly as written (still percent-encoded).
    pub value: String,

    /// Lowercased domain without a leading dot. For host-only cookies this is the page host.
    pub domain: String,

    /// `true` when the write carried no (usable) `Domain` attribute.
    pub host_only: bool,

    /// Path scoping. Defaults to `"/"`.
    pub path: String,

    /// Expiration time. Session cookies have `None`.
    pub expires: Option<OffsetDateTime>,
}

impl Cookie {
    /// Returns `true` if the cookie is expired at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires.is_some_and(|t| t <= now)
    }

    /// Identity of a cookie from the browser's point of view.
    pub(crate) fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}
