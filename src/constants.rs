//! Well-known property names persisted by the tag.

/// Guest identifier. Stored as a plain string rather than JSON when it falls back to a cookie.
pub const GCOOKIE_NAME: &str = "WZRK_G";

/// Meta object holding small bookkeeping properties.
pub const META_COOKIE: &str = "WZRK_META";

/// Session/kill-switch object carrying the instant-delete flag.
pub const KCOOKIE_NAME: &str = "WZRK_K";
