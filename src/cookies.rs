//! Cookies: the [`CookieJar`] primitives, the [`CookieDocument`] they write
//! through, and the [`BroadDomainResolver`] built on top of them.

mod broad_domain;
mod cookie_jar;
mod cookies;
mod document;
pub mod psl;

pub use broad_domain::domain_ladder;
pub use broad_domain::probe_cookie_name;
pub use broad_domain::BroadCookieOutcome;
pub use broad_domain::BroadDomainResolver;
pub use broad_domain::Probe;
pub use broad_domain::Resolution;

pub use cookie_jar::CookieJar;
pub use cookie_jar::DocumentCookieJar;

pub use cookies::Cookie;

pub use document::Clock;
pub use document::CookieDocument;
pub use document::InMemoryDocument;
