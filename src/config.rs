//! Storage configuration.
//!
//! `StorageConfig` controls how a [`StorageManager`](crate::manager::StorageManager)
//! probes cookie domains and which backend it falls back to. It provides
//! defaults via [`Default`], can be deserialized from JSON handed over by the
//! embedding page, and offers a fluent [`StorageConfig::builder()`] with
//! validation.
//!
//! # Examples
//!
//! ```rust
//! use tagstore::config::{FallbackPolicy, StorageConfig};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = StorageConfig::builder()
//!     .probe_ttl_seconds(5)
//!     .probe_prefix("probe_")
//!     .fallback(FallbackPolicy::AlwaysLocalStorage)
//!     .build()?;
//! assert_eq!(cfg.probe_ttl_seconds, 5);
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `probe_ttl_seconds`: lifetime of a probe cookie (default: 10). Probes are
//!   deleted right away, the TTL only bounds the ones a browser refuses to delete.
//! - `probe_prefix`: marker prepended to probe cookie names (default: `test_`).
//! - `fallback`: backend selection for [`save_to_ls_or_cookie`](crate::manager::StorageManager::save_to_ls_or_cookie).

use serde::Deserialize;

/// Default lifetime of a probe cookie, in seconds.
pub const DEFAULT_PROBE_TTL_SECONDS: u64 = 10;

/// Default marker for probe cookie names.
pub const DEFAULT_PROBE_PREFIX: &str = "test_";

/// Which backend `save_to_ls_or_cookie` writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Use local storage when it is available, cookies otherwise.
    #[default]
    DetectSupport,
    /// Always target local storage, even when it is unavailable. The cookie
    /// branch is never taken and writes degrade instead.
    AlwaysLocalStorage,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub probe_ttl_seconds: u64,
    pub probe_prefix: String,
    pub fallback: FallbackPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            probe_ttl_seconds: DEFAULT_PROBE_TTL_SECONDS,
            probe_prefix: DEFAULT_PROBE_PREFIX.to_string(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl StorageConfig {
    pub fn builder() -> StorageConfigBuilder {
        StorageConfigBuilder::default()
    }

    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, StorageConfigError> {
        let cfg: StorageConfig =
            serde_json::from_str(json).map_err(|e| StorageConfigError::Parse(e.to_string()))?;
        validate(&cfg)?;
        Ok(cfg)
    }
}

/// Builder for [`StorageConfig`].
#[derive(Debug, Clone, Default)]
pub struct StorageConfigBuilder {
    inner: StorageConfig,
}

impl StorageConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut StorageConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn probe_ttl_seconds(self, secs: u64) -> Self { self.map(|c| c.probe_ttl_seconds = secs) }
    pub fn probe_prefix<S: Into<String>>(self, prefix: S) -> Self { self.map(|c| c.probe_prefix = prefix.into()) }
    pub fn fallback(self, policy: FallbackPolicy) -> Self { self.map(|c| c.fallback = policy) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut StorageConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<StorageConfig, StorageConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageConfigError {
    #[error("probe_ttl_seconds must be at least 1")]
    ZeroProbeTtl,

    #[error("probe_prefix must not be empty")]
    EmptyProbePrefix,

    #[error("invalid configuration: {0}")]
    Parse(String),
}

fn validate(c: &StorageConfig) -> Result<(), StorageConfigError> {
    // A session-lifetime probe would outlive a failed delete indefinitely.
    if c.probe_ttl_seconds == 0 {
        return Err(StorageConfigError::ZeroProbeTtl);
    }
    if c.probe_prefix.is_empty() {
        return Err(StorageConfigError::EmptyProbePrefix);
    }
    Ok(())
}
