// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Hub settings loaded through the config service.

use margin_access::CommentPermissions;
use margin_app_core::{
    config::{ConfigError, ConfigService, ConfigStore},
    AliasTable,
};
use margin_changeset::COMMENT_ATTRIBUTE;
use margin_session_proto::default_socket_path;
use serde::{Deserialize, Serialize};

/// Config key of [`HostPrefs`].
pub const HOST_KEY: &str = "session_host";
/// Config key of the layered comment permissions.
pub const PERMISSIONS_KEY: &str = "comment_permissions";
/// Config key of the read-only alias table.
pub const ALIASES_KEY: &str = "pad_aliases";

/// Host-level preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostPrefs {
    /// Unix socket the hub listens on.
    pub socket_path: String,
    /// Attribute name comment markers are stored under.
    pub reserved_attribute: String,
}

impl Default for HostPrefs {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path().display().to_string(),
            reserved_attribute: COMMENT_ATTRIBUTE.to_owned(),
        }
    }
}

/// Everything the hub reads from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Host preferences.
    pub host: HostPrefs,
    /// Comment permission layers.
    pub permissions: CommentPermissions,
    /// Read-only aliases.
    pub aliases: AliasTable,
}

impl Settings {
    /// Load every key, persisting defaults for the ones that are absent.
    pub fn load<S: ConfigStore>(config: &ConfigService<S>) -> Result<Self, ConfigError> {
        Ok(Self {
            host: config.load_or_init(HOST_KEY)?,
            permissions: config.load_or_init(PERMISSIONS_KEY)?,
            aliases: config.load_or_init(ALIASES_KEY)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use margin_app_core::PadResolver;
    use margin_dry_tests::InMemoryConfigStore;

    #[test]
    fn defaults_are_written_once() {
        let store = InMemoryConfigStore::new();
        let config = ConfigService::new(store.clone());

        let first = Settings::load(&config).unwrap();
        assert_eq!(first.host.reserved_attribute, "comment");
        assert_eq!(store.save_count(), 3);

        let second = Settings::load(&config).unwrap();
        assert_eq!(second, first);
        assert_eq!(store.save_count(), 3);
    }

    #[test]
    fn stored_values_win_over_defaults() {
        let store = InMemoryConfigStore::new();
        store.put_json(PERMISSIONS_KEY, r#"{"default": false}"#);
        store.put_json(ALIASES_KEY, r#"{"aliases": {"r.abc": "doc1"}}"#);
        store.put_json(HOST_KEY, r#"{"socket_path": "/run/m.sock"}"#);
        let settings = Settings::load(&ConfigService::new(store.clone())).unwrap();

        assert_eq!(settings.permissions.default, Some(false));
        assert_eq!(settings.aliases.resolve("r.abc").unwrap().canonical, "doc1");
        assert_eq!(settings.host.socket_path, "/run/m.sock");
        assert_eq!(settings.host.reserved_attribute, "comment");
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn unreadable_blob_is_reported() {
        let store = InMemoryConfigStore::new();
        store.put_json(PERMISSIONS_KEY, "{not json");
        let err = Settings::load(&ConfigService::new(store.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::Serde(_)));
    }
}
