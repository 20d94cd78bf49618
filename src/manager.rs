//! Storage manager: one facade over local storage, cookies and the value cache.
//!
//! A [`StorageManager`] is created once per page. It owns everything the tag
//! used to keep in globals:
//! - the injected backends (an optional local storage area and a cookie jar),
//! - the value cache filled by [`save_to_ls_or_cookie`](StorageManager::save_to_ls_or_cookie)
//!   and [`read_from_ls_or_cookie`](StorageManager::read_from_ls_or_cookie),
//! - the [`BroadDomainResolver`] state.
//!
//! Dropping the manager is the end of the page session: the cache and the
//! resolved broad domain go with it.
//!
//! Values are `serde_json::Value`s and are stored as JSON text. Backend
//! failures on the fallback path do not abort the caller; they come back as
//! [`StorageOutcome::Degraded`] while the cache keeps the value.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tagstore::{StorageConfig, StorageManager};
//! use tagstore::storage::InMemoryLocalStore;
//!
//! let page = url::Url::parse("https://baz.foo.bar.com/").unwrap();
//! let store = InMemoryLocalStore::new();
//! let mut manager = StorageManager::for_page(&page, StorageConfig::default(), Some(&store)).unwrap();
//!
//! assert!(manager.save_to_ls_or_cookie("WZRK_K", json!({"flag": false})).is_stored());
//! assert_eq!(manager.read_from_ls_or_cookie("WZRK_K"), Some(json!({"flag": false})));
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde_json::{Map, Value};
use url::Url;

use crate::config::{FallbackPolicy, StorageConfig};
use crate::constants::{GCOOKIE_NAME, KCOOKIE_NAME, META_COOKIE};
use crate::cookies::{BroadCookieOutcome, BroadDomainResolver, CookieJar, DocumentCookieJar, InMemoryDocument};
use crate::errors::StorageError;
use crate::storage::{LocalStore, StorageArea};

/// Backend a value was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    LocalStorage,
    Cookie,
}

/// Result of a write that must never abort the caller.
#[derive(Debug)]
pub enum StorageOutcome {
    /// The value was persisted to the given backend.
    Stored(Backend),
    /// Nothing to do (empty property name or `null` value).
    Skipped,
    /// The value could not be persisted. The in-memory cache still holds it.
    Degraded(StorageError),
}

impl StorageOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, StorageOutcome::Stored(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, StorageOutcome::Degraded(_))
    }
}

pub struct StorageManager {
    config: StorageConfig,
    /// Page hostname, used as cookie domain for fallback writes.
    hostname: Option<String>,
    local: Option<Arc<dyn StorageArea>>,
    jar: Box<dyn CookieJar>,
    cache: HashMap<String, Value>,
    resolver: BroadDomainResolver,
}

impl StorageManager {
    /// Creates a manager for the page at `page` with explicit backends.
    ///
    /// Passing `None` for `local` means the host has no local storage.
    pub fn new(
        page: &Url,
        config: StorageConfig,
        local: Option<Arc<dyn StorageArea>>,
        jar: Box<dyn CookieJar>,
    ) -> Self {
        let resolver = BroadDomainResolver::new(&config);
        Self {
            config,
            hostname: page.host_str().filter(|h| !h.is_empty()).map(str::to_string),
            local,
            jar,
            cache: HashMap::new(),
            resolver,
        }
    }

    /// Creates a manager backed by an in-memory cookie document for `page` and,
    /// if given, the area `local_store` provides for the page's origin.
    pub fn for_page(
        page: &Url,
        config: StorageConfig,
        local_store: Option<&dyn LocalStore>,
    ) -> Result<Self, StorageError> {
        let local = local_store.map(|s| s.area(&page.origin())).transpose()?;
        let jar = DocumentCookieJar::new(InMemoryDocument::for_url(page));
        Ok(Self::new(page, config, local, Box::new(jar)))
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref()
    }

    /// Values cached by fallback writes and reads.
    pub fn cache(&self) -> &HashMap<String, Value> {
        &self.cache
    }

    pub fn resolver(&self) -> &BroadDomainResolver {
        &self.resolver
    }

    pub fn cookie_jar(&self) -> &dyn CookieJar {
        self.jar.as_ref()
    }

    pub fn cookie_jar_mut(&mut self) -> &mut dyn CookieJar {
        self.jar.as_mut()
    }

    pub fn is_local_storage_supported(&self) -> bool {
        self.local.is_some()
    }

    // ---------- Local storage ----------

    /// Stores `value` as JSON under `key`.
    ///
    /// Returns `Ok(false)` for an empty key or a `null` value.
    pub fn save(&self, key: &str, value: &Value) -> Result<bool, StorageError> {
        if key.is_empty() || value.is_null() {
            return Ok(false);
        }
        let area = self.local.as_ref().ok_or(StorageError::LocalStorageUnavailable)?;
        area.set_item(key, &serde_json::to_string(value)?)?;
        Ok(true)
    }

    /// Reads `key`. Stored text that is not JSON comes back as a JSON string.
    pub fn read(&self, key: &str) -> Option<Value> {
        if key.is_empty() {
            return None;
        }
        let raw = self.local.as_ref()?.get_item(key)?;
        Some(parse_lenient(raw))
    }

    /// Removes `key`. Returns `Ok(false)` for an empty key.
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        if key.is_empty() {
            return Ok(false);
        }
        let area = self.local.as_ref().ok_or(StorageError::LocalStorageUnavailable)?;
        area.remove_item(key)?;
        Ok(true)
    }

    // ---------- Cookies ----------

    pub fn create_cookie(&mut self, name: &str, value: &str, seconds: u64, domain: Option<&str>) {
        self.jar.create_cookie(name, value, seconds, domain);
    }

    pub fn read_cookie(&self, name: &str) -> Option<String> {
        self.jar.read_cookie(name)
    }

    pub fn remove_cookie(&mut self, name: &str, domain: Option<&str>) {
        self.jar.remove_cookie(name, domain);
    }

    /// Writes a cookie on the broadest domain that holds it, see [`BroadDomainResolver`].
    pub fn create_broad_cookie(
        &mut self,
        name: &str,
        value: &str,
        seconds: u64,
        domain: Option<&str>,
    ) -> BroadCookieOutcome {
        self.resolver
            .create_broad_cookie(self.jar.as_mut(), name, value, seconds, domain)
    }

    // ---------- Cached fallback storage ----------

    /// Persists `value` to local storage or, per [`FallbackPolicy`], to a
    /// session cookie on the page hostname, and caches it.
    pub fn save_to_ls_or_cookie(&mut self, property: &str, value: Value) -> StorageOutcome {
        if property.is_empty() || value.is_null() {
            return StorageOutcome::Skipped;
        }

        let use_local = match self.config.fallback {
            FallbackPolicy::DetectSupport => self.is_local_storage_supported(),
            FallbackPolicy::AlwaysLocalStorage => true,
        };

        let result = if use_local {
            self.save(property, &value).map(|_| Backend::LocalStorage)
        } else {
            self.save_to_cookie(property, &value).map(|_| Backend::Cookie)
        };

        self.cache.insert(property.to_string(), value);

        match result {
            Ok(backend) => {
                debug!("stored {} in {:?}", property, backend);
                StorageOutcome::Stored(backend)
            }
            Err(e) => {
                warn!("could not persist {}, keeping it in memory only: {}", property, e);
                StorageOutcome::Degraded(e)
            }
        }
    }

    fn save_to_cookie(&mut self, property: &str, value: &Value) -> Result<(), StorageError> {
        // The guest id is kept as bare text, everything else as JSON
        let text = match value {
            Value::String(s) if property == GCOOKIE_NAME => s.clone(),
            _ => serde_json::to_string(value)?,
        };
        let encoded = urlencoding::encode(&text);
        self.jar
            .create_cookie(property, &encoded, 0, self.hostname.as_deref());
        Ok(())
    }

    /// Returns the cached value of `property`, loading it from local storage
    /// (when supported) or from its cookie on a cache miss.
    pub fn read_from_ls_or_cookie(&mut self, property: &str) -> Option<Value> {
        if let Some(value) = self.cache.get(property) {
            return Some(value.clone());
        }

        let raw = if self.is_local_storage_supported() {
            self.local.as_ref()?.get_item(property)?
        } else {
            let cookie = self.jar.read_cookie(property)?;
            match urlencoding::decode(&cookie) {
                Ok(decoded) => decoded.into_owned(),
                Err(e) => {
                    warn!("cookie {} holds an undecodable value: {}", property, e);
                    return None;
                }
            }
        };

        if raw.trim().is_empty() {
            return None;
        }

        let value = parse_lenient(raw);
        self.cache.insert(property.to_string(), value.clone());
        Some(value)
    }

    // ---------- Meta object ----------

    pub fn get_meta_prop(&mut self, property: &str) -> Option<Value> {
        self.read_from_ls_or_cookie(META_COOKIE)?.get(property).cloned()
    }

    /// Sets (`Some`) or deletes (`None`) `property` on the meta object.
    ///
    /// Only available with local storage; returns `Skipped` otherwise.
    pub fn set_meta_prop(&mut self, property: &str, value: Option<Value>) -> StorageOutcome {
        if !self.is_local_storage_supported() {
            return StorageOutcome::Skipped;
        }

        let mut meta = self.read_object(META_COOKIE);
        match value {
            Some(value) => {
                meta.insert(property.to_string(), value);
            }
            None => {
                meta.remove(property);
            }
        }
        self.save_to_ls_or_cookie(META_COOKIE, Value::Object(meta))
    }

    pub fn get_and_clear_meta_prop(&mut self, property: &str) -> Option<Value> {
        let value = self.get_meta_prop(property);
        self.set_meta_prop(property, None);
        value
    }

    /// Marks the K object so the next session start deletes tag state right away.
    pub fn set_instant_delete_flag_in_k(&mut self) -> StorageOutcome {
        let mut k = self.read_object(KCOOKIE_NAME);
        k.insert("flag".to_string(), Value::Bool(true));
        self.save_to_ls_or_cookie(KCOOKIE_NAME, Value::Object(k))
    }

    fn read_object(&mut self, property: &str) -> Map<String, Value> {
        match self.read_from_ls_or_cookie(property) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

fn parse_lenient(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookies::CookieDocument;
    use crate::storage::InMemoryLocalArea;
    use anyhow::anyhow;
    use serde_json::json;

    type Jar = DocumentCookieJar<InMemoryDocument>;

    /// Area whose writes always fail, like a full or blocked local storage.
    struct FailingArea;

    impl StorageArea for FailingArea {
        fn get_item(&self, _key: &str) -> Option<String> { None }
        fn set_item(&self, _key: &str, _value: &str) -> anyhow::Result<()> { Err(anyhow!("quota exceeded")) }
        fn remove_item(&self, _key: &str) -> anyhow::Result<()> { Err(anyhow!("quota exceeded")) }
        fn clear(&self) -> anyhow::Result<()> { Ok(()) }
        fn len(&self) -> usize { 0 }
        fn keys(&self) -> Vec<String> { vec![] }
    }

    fn page() -> Url {
        Url::parse("https://baz.foo.bar.com/checkout").unwrap()
    }

    fn manager(config: StorageConfig, local: Option<Arc<dyn StorageArea>>) -> StorageManager {
        let jar = DocumentCookieJar::new(InMemoryDocument::for_url(&page()));
        StorageManager::new(&page(), config, local, Box::new(jar))
    }

    fn with_local() -> (StorageManager, Arc<InMemoryLocalArea>) {
        let area = Arc::new(InMemoryLocalArea::new());
        (manager(StorageConfig::default(), Some(area.clone() as Arc<dyn StorageArea>)), area)
    }

    fn without_local(fallback: FallbackPolicy) -> StorageManager {
        let config = StorageConfig::builder().fallback(fallback).build().unwrap();
        manager(config, None)
    }

    fn document(m: &StorageManager) -> &InMemoryDocument {
        m.cookie_jar()
            .as_any()
            .downcast_ref::<Jar>()
            .expect("document jar")
            .document()
    }

    #[test]
    fn save_read_remove() {
        let (m, area) = with_local();
        assert!(m.is_local_storage_supported());

        assert!(m.save("k", &json!({"a": 1})).unwrap());
        assert_eq!(area.get_item("k").as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(m.read("k"), Some(json!({"a": 1})));

        assert!(m.remove("k").unwrap());
        assert!(m.read("k").is_none());
    }

    #[test]
    fn save_rejects_empty_key_and_null() {
        let (m, area) = with_local();
        assert!(!m.save("", &json!(1)).unwrap());
        assert!(!m.save("k", &Value::Null).unwrap());
        assert!(!m.remove("").unwrap());
        assert!(m.read("").is_none());
        assert!(area.is_empty());
    }

    #[test]
    fn read_keeps_non_json_text() {
        let (m, area) = with_local();
        area.set_item("raw", "not json").unwrap();
        assert_eq!(m.read("raw"), Some(json!("not json")));
    }

    #[test]
    fn save_without_local_storage_is_an_error() {
        let m = without_local(FallbackPolicy::DetectSupport);
        assert!(matches!(
            m.save("k", &json!(1)),
            Err(StorageError::LocalStorageUnavailable)
        ));
        assert!(m.read("k").is_none());
    }

    #[test]
    fn cookie_passthrough() {
        let (mut m, _) = with_local();
        m.create_cookie("c", "v w", 60, None);
        assert_eq!(m.read_cookie("c").as_deref(), Some("v w"));
        m.remove_cookie("c", None);
        assert!(m.read_cookie("c").is_none());
    }

    #[test]
    fn fallback_prefers_local_storage() {
        let (mut m, area) = with_local();
        let out = m.save_to_ls_or_cookie("WZRK_K", json!({"flag": false}));

        assert!(matches!(out, StorageOutcome::Stored(Backend::LocalStorage)));
        assert!(area.get_item("WZRK_K").is_some());
        assert!(m.read_cookie("WZRK_K").is_none());
        assert_eq!(m.cache().get("WZRK_K"), Some(&json!({"flag": false})));
    }

    #[test]
    fn fallback_writes_session_cookie_on_hostname() {
        let mut m = without_local(FallbackPolicy::DetectSupport);
        let out = m.save_to_ls_or_cookie("WZRK_K", json!({"flag": false}));
        assert!(matches!(out, StorageOutcome::Stored(Backend::Cookie)));

        let stored = document(&m).cookies_named("WZRK_K")[0].clone();
        assert_eq!(stored.domain, "baz.foo.bar.com");
        assert!(!stored.host_only);
        assert!(stored.expires.is_none());

        // fresh read path goes through the cookie, not the cache
        let mut fresh = without_local(FallbackPolicy::DetectSupport);
        let raw = document(&m).cookie();
        fresh
            .cookie_jar_mut()
            .as_any_mut()
            .downcast_mut::<Jar>()
            .unwrap()
            .document_mut()
            .set_cookie(&format!("{raw}; path=/"));
        assert_eq!(fresh.read_from_ls_or_cookie("WZRK_K"), Some(json!({"flag": false})));
    }

    #[test]
    fn guest_id_cookie_is_bare_text() {
        let mut m = without_local(FallbackPolicy::DetectSupport);
        m.save_to_ls_or_cookie(GCOOKIE_NAME, json!("guest-123"));

        // encoded once by the manager, once more by the jar
        assert_eq!(m.read_cookie(GCOOKIE_NAME).as_deref(), Some("guest-123"));
        assert_eq!(document(&m).cookies_named(GCOOKIE_NAME)[0].value, "guest-123");

        let mut json_valued = without_local(FallbackPolicy::DetectSupport);
        json_valued.save_to_ls_or_cookie("other", json!("guest-123"));
        assert_eq!(json_valued.read_cookie("other").as_deref(), Some("%22guest-123%22"));
    }

    #[test]
    fn always_local_policy_never_uses_cookies() {
        let mut m = without_local(FallbackPolicy::AlwaysLocalStorage);
        let out = m.save_to_ls_or_cookie("WZRK_K", json!({"flag": true}));

        assert!(matches!(
            out,
            StorageOutcome::Degraded(StorageError::LocalStorageUnavailable)
        ));
        assert!(document(&m).cookies().is_empty());
        // still served from the cache
        assert_eq!(m.read_from_ls_or_cookie("WZRK_K"), Some(json!({"flag": true})));
    }

    #[test]
    fn backend_failure_degrades() {
        let mut m = manager(StorageConfig::default(), Some(Arc::new(FailingArea) as Arc<dyn StorageArea>));
        let out = m.save_to_ls_or_cookie("k", json!([1, 2]));
        match out {
            StorageOutcome::Degraded(StorageError::Backend(msg)) => assert!(msg.contains("quota")),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(m.remove("k").is_err());
        assert_eq!(m.read_from_ls_or_cookie("k"), Some(json!([1, 2])));
    }

    #[test]
    fn null_and_empty_property_are_skipped() {
        let (mut m, area) = with_local();
        assert!(matches!(m.save_to_ls_or_cookie("k", Value::Null), StorageOutcome::Skipped));
        assert!(matches!(m.save_to_ls_or_cookie("", json!(1)), StorageOutcome::Skipped));
        assert!(m.cache().is_empty());
        assert!(area.is_empty());
    }

    #[test]
    fn read_populates_cache_once() {
        let (mut m, area) = with_local();
        area.set_item("k", "42").unwrap();

        assert_eq!(m.read_from_ls_or_cookie("k"), Some(json!(42)));
        // later backend changes are not seen through the cache
        area.set_item("k", "43").unwrap();
        assert_eq!(m.read_from_ls_or_cookie("k"), Some(json!(42)));
    }

    #[test]
    fn blank_values_read_as_absent() {
        let (mut m, area) = with_local();
        area.set_item("k", "   ").unwrap();
        assert!(m.read_from_ls_or_cookie("k").is_none());
        assert!(m.cache().is_empty());
        assert!(m.read_from_ls_or_cookie("missing").is_none());
    }

    #[test]
    fn meta_props() {
        let (mut m, _) = with_local();
        assert!(m.get_meta_prop("lastSeen").is_none());

        assert!(m.set_meta_prop("lastSeen", Some(json!(1700000000))).is_stored());
        assert!(m.set_meta_prop("campaign", Some(json!("spring"))).is_stored());
        assert_eq!(m.get_meta_prop("lastSeen"), Some(json!(1700000000)));
        assert_eq!(m.read(META_COOKIE), Some(json!({"lastSeen": 1700000000, "campaign": "spring"})));

        assert_eq!(m.get_and_clear_meta_prop("campaign"), Some(json!("spring")));
        assert!(m.get_meta_prop("campaign").is_none());
        assert_eq!(m.read(META_COOKIE), Some(json!({"lastSeen": 1700000000})));
    }

    #[test]
    fn meta_props_need_local_storage() {
        let mut m = without_local(FallbackPolicy::DetectSupport);
        assert!(matches!(
            m.set_meta_prop("x", Some(json!(1))),
            StorageOutcome::Skipped
        ));
        assert!(m.get_meta_prop("x").is_none());
    }

    #[test]
    fn instant_delete_flag_merges_into_k() {
        let (mut m, _) = with_local();
        m.save_to_ls_or_cookie(KCOOKIE_NAME, json!({"win": 5}));

        assert!(m.set_instant_delete_flag_in_k().is_stored());
        assert_eq!(m.read(KCOOKIE_NAME), Some(json!({"win": 5, "flag": true})));
    }

    #[test]
    fn broad_cookie_goes_through_resolver() {
        let (mut m, _) = with_local();
        let host = m.hostname().map(str::to_string);

        m.create_cookie("WZRK_G", "old", 3600, Some(".bar.com"));
        let out = m.create_broad_cookie("WZRK_G", "new", 3600, host.as_deref());

        assert_eq!(out.domain.as_deref(), Some(".bar.com"));
        assert_eq!(m.resolver().resolved_domain("baz.foo.bar.com"), Some(".bar.com"));
        assert_eq!(m.read_cookie("WZRK_G").as_deref(), Some("new"));
    }

    #[test]
    fn for_page_wires_origin_area() {
        let store = crate::storage::InMemoryLocalStore::new();
        let mut m = StorageManager::for_page(&page(), StorageConfig::default(), Some(&store)).unwrap();
        m.save_to_ls_or_cookie("k", json!("v"));

        let area = store.area(&page().origin()).unwrap();
        assert_eq!(area.get_item("k").as_deref(), Some(r#""v""#));

        let no_local = StorageManager::for_page(&page(), StorageConfig::default(), None).unwrap();
        assert!(!no_local.is_local_storage_supported());
    }
}
