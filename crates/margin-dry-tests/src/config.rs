// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory config store fake for testing without filesystem I/O.

use margin_app_core::config::{ConfigError, ConfigStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory implementation of [`ConfigStore`] for testing.
///
/// Clones share state, so a test can hand one clone to a `ConfigService`
/// and inspect what was persisted through the other.
///
/// ```
/// use margin_app_core::config::ConfigService;
/// use margin_dry_tests::InMemoryConfigStore;
///
/// let store = InMemoryConfigStore::new();
/// store.put_json("comment_permissions", r#"{"default": false}"#);
/// let service = ConfigService::new(store.clone());
///
/// let raw: Option<serde_json::Value> = service.load("comment_permissions").unwrap();
/// assert_eq!(raw.unwrap()["default"], false);
/// assert_eq!(store.load_count(), 1);
/// assert_eq!(store.save_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    data: HashMap<String, Vec<u8>>,
    load_count: usize,
    save_count: usize,
    fail_on_load: bool,
    fail_on_save: bool,
}

impl InMemoryConfigStore {
    /// Create a new empty in-memory config store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed `key` with a JSON document without counting a save.
    pub fn put_json(&self, key: &str, json: &str) {
        self.lock()
            .data
            .insert(key.to_owned(), json.as_bytes().to_vec());
    }

    /// Stored document for `key`, if any.
    pub fn get_json(&self, key: &str) -> Option<String> {
        self.lock()
            .data
            .get(key)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Configure the store to fail on load operations.
    pub fn set_fail_on_load(&self, fail: bool) {
        self.lock().fail_on_load = fail;
    }

    /// Configure the store to fail on save operations.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.lock().fail_on_save = fail;
    }

    /// Number of `load_raw` calls, failed ones included.
    pub fn load_count(&self) -> usize {
        self.lock().load_count
    }

    /// Number of `save_raw` calls, failed ones included.
    pub fn save_count(&self) -> usize {
        self.lock().save_count
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        let mut inner = self.lock();
        inner.load_count += 1;

        if inner.fail_on_load {
            return Err(ConfigError::Other("simulated load failure".into()));
        }

        inner.data.get(key).cloned().ok_or(ConfigError::NotFound)
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let mut inner = self.lock();
        inner.save_count += 1;

        if inner.fail_on_save {
            return Err(ConfigError::Other("simulated save failure".into()));
        }

        inner.data.insert(key.to_owned(), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use margin_app_core::config::ConfigService;

    #[test]
    fn load_or_init_persists_default_once() {
        let store = InMemoryConfigStore::new();
        let service = ConfigService::new(store.clone());

        let first: Vec<String> = service.load_or_init("pad_aliases").unwrap();
        let second: Vec<String> = service.load_or_init("pad_aliases").unwrap();

        assert_eq!(first, second);
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.get_json("pad_aliases").as_deref(), Some("[]"));
    }

    #[test]
    fn failures_are_counted_and_store_nothing() {
        let store = InMemoryConfigStore::new();
        store.set_fail_on_save(true);
        store.set_fail_on_load(true);

        assert!(matches!(store.save_raw("k", b"v"), Err(ConfigError::Other(_))));
        assert!(matches!(store.load_raw("k"), Err(ConfigError::Other(_))));
        assert_eq!((store.save_count(), store.load_count()), (1, 1));

        store.set_fail_on_load(false);
        assert!(matches!(store.load_raw("k"), Err(ConfigError::NotFound)));
    }

    #[test]
    fn clones_share_state() {
        let a = InMemoryConfigStore::new();
        let b = a.clone();
        a.save_raw("shared", b"1").unwrap();
        assert_eq!(b.load_raw("shared").unwrap(), b"1");
        assert_eq!(b.save_count(), 1);
    }
}
