//! Broad-domain cookie resolution.
//!
//! A cookie written on `.bar.com` from `baz.foo.bar.com` is visible on every
//! sibling subdomain. Updating such a cookie later requires writing it on the
//! same domain again, but the browser never tells a script which domain a
//! cookie lives on. [`BroadDomainResolver`] finds out by probing: it walks the
//! [domain ladder](domain_ladder) from the broadest candidate to the
//! narrowest, writes a short-lived probe cookie on each, and settles on the
//! first candidate where both the probe and the real cookie read back.
//!
//! The result is remembered per hint domain for the lifetime of the resolver,
//! so only the first write of a page pays for probing.
//!
//! ## Caveats
//! - Probes are deleted right after a successful read, but deletion is not
//!   guaranteed; the probe TTL bounds how long a leftover can live.
//! - Read-after-write is treated as a heuristic. A candidate that fails it is
//!   skipped, and exhausting the ladder falls back to the hint domain without
//!   reporting an error.

use std::collections::HashMap;

use log::{debug, trace};

use super::cookie_jar::CookieJar;
use crate::config::StorageConfig;

/// Candidate cookie domains for `domain`, broadest first.
///
/// `baz.foo.bar.com` yields `.com`, `.bar.com`, `.foo.bar.com`,
/// `.baz.foo.bar.com`. Empty labels are skipped.
pub fn domain_ladder(domain: &str) -> Vec<String> {
    let mut ladder = Vec::new();
    let mut candidate = String::new();

    for label in domain.split('.').rev().filter(|l| !l.is_empty()) {
        candidate = format!(".{label}{candidate}");
        ladder.push(candidate.clone());
    }

    ladder
}

/// Name of the probe cookie for ladder position `index`.
///
/// The index is the last `_`-separated segment, so probes of different cookie
/// names can never produce the same string.
pub fn probe_cookie_name(prefix: &str, name: &str, index: usize) -> String {
    format!("{prefix}{name}_{index}")
}

/// How a broad cookie write was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// No hint domain was given; the cookie was written host-only.
    HostOnly,
    /// Written on a domain resolved by an earlier call.
    Cached,
    /// No existing cookie to reconcile; written on the hint domain.
    NewCookie,
    /// Probing found the domain and the read-back confirmed the write.
    Resolved,
    /// No candidate was confirmed; the cookie ended up on the hint domain.
    Fallback,
}

/// A probe cookie written during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub name: String,
    pub domain: String,
    /// Whether the probe could be read back, i.e. the browser accepted the domain.
    pub accepted: bool,
}

/// Result of [`BroadDomainResolver::create_broad_cookie`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadCookieOutcome {
    pub resolution: Resolution,
    /// Domain the real cookie was last written on (`None` for host-only).
    pub domain: Option<String>,
    /// Probes in the order they were written.
    pub probes: Vec<Probe>,
}

impl BroadCookieOutcome {
    fn direct(resolution: Resolution, domain: Option<&str>) -> Self {
        Self {
            resolution,
            domain: domain.map(str::to_string),
            probes: Vec::new(),
        }
    }
}

/// Finds and remembers the broadest domain a cookie lives on.
#[derive(Debug, Clone)]
pub struct BroadDomainResolver {
    probe_prefix: String,
    probe_ttl_seconds: u64,
    /// Hint domain -> resolved broad domain.
    resolved: HashMap<String, String>,
}

impl Default for BroadDomainResolver {
    fn default() -> Self {
        Self::new(&StorageConfig::default())
    }
}

impl BroadDomainResolver {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            probe_prefix: config.probe_prefix.clone(),
            probe_ttl_seconds: config.probe_ttl_seconds,
            resolved: HashMap::new(),
        }
    }

    /// Broad domain resolved earlier for `hint`, if any.
    pub fn resolved_domain(&self, hint: &str) -> Option<&str> {
        self.resolved.get(hint).map(String::as_str)
    }

    /// Writes `name=value` on the broadest domain the browser accepts for `domain`.
    ///
    /// - Without a (non-empty) `domain` the cookie is written host-only.
    /// - With a cached broad domain for `domain` the cookie is written there.
    /// - If no cookie called `name` exists yet, it is written on `domain` itself.
    /// - Otherwise the domain ladder is probed, see the module docs.
    pub fn create_broad_cookie(
        &mut self,
        jar: &mut dyn CookieJar,
        name: &str,
        value: &str,
        seconds: u64,
        domain: Option<&str>,
    ) -> BroadCookieOutcome {
        let Some(domain) = domain.filter(|d| !d.is_empty()) else {
            jar.create_cookie(name, value, seconds, None);
            return BroadCookieOutcome::direct(Resolution::HostOnly, None);
        };

        if let Some(broad) = self.resolved.get(domain) {
            jar.create_cookie(name, value, seconds, Some(broad));
            return BroadCookieOutcome::direct(Resolution::Cached, Some(broad));
        }

        if jar.read_cookie(name).is_none() {
            jar.create_cookie(name, value, seconds, Some(domain));
            return BroadCookieOutcome::direct(Resolution::NewCookie, Some(domain));
        }

        let ladder = domain_ladder(domain);
        let mut probes = Vec::with_capacity(ladder.len());
        let mut last_written: Option<usize> = None;

        for (idx, candidate) in ladder.iter().enumerate() {
            let probe_name = probe_cookie_name(&self.probe_prefix, name, idx);
            jar.create_cookie(&probe_name, value, self.probe_ttl_seconds, Some(candidate));

            let accepted = jar.read_cookie(&probe_name).is_some();
            probes.push(Probe {
                name: probe_name.clone(),
                domain: candidate.clone(),
                accepted,
            });

            if !accepted {
                trace!("probe {} refused on {}", probe_name, candidate);
                continue;
            }
            jar.remove_cookie(&probe_name, Some(candidate));

            jar.create_cookie(name, value, seconds, Some(candidate));
            last_written = Some(idx);

            if jar.read_cookie(name).as_deref() == Some(value) {
                debug!("cookie {} resolved to broad domain {} (hint {})", name, candidate, domain);
                self.resolved.insert(domain.to_string(), candidate.clone());
                return BroadCookieOutcome {
                    resolution: Resolution::Resolved,
                    domain: Some(candidate.clone()),
                    probes,
                };
            }
            trace!("cookie {} did not read back on {}", name, candidate);
        }

        // The narrowest candidate is the hint domain itself
        let narrowest = ladder.len().checked_sub(1);
        let written_on = match (last_written, narrowest) {
            (Some(last), Some(narrowest)) if last == narrowest => ladder[last].clone(),
            _ => {
                jar.create_cookie(name, value, seconds, Some(domain));
                domain.to_string()
            }
        };
        debug!("cookie {} not confirmed on any broad domain, left on {}", name, written_on);

        BroadCookieOutcome {
            resolution: Resolution::Fallback,
            domain: Some(written_on),
            probes,
        }
    }
}
