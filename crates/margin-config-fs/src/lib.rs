// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Filesystem-backed `ConfigStore` for Margin (one JSON file per key).

use directories::ProjectDirs;
use margin_app_core::config::{ConfigError, ConfigStore};
use std::fs;
use std::path::{Path, PathBuf};

/// Store config blobs as `<key>.json` files under a base directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Create a store rooted at the user config directory (e.g., `~/.config/margin`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "flyingrobots", "Margin")
            .ok_or_else(|| ConfigError::Other("could not resolve config dir".into()))?;
        Self::at(proj.config_dir())
    }

    /// Create a store rooted at `dir`, creating it when missing.
    pub fn at(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base = dir.as_ref().to_path_buf();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory holding the config files.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ConfigError> {
        // keys name files directly; refuse anything that could escape `base`
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ConfigError::Other(format!("invalid config key {key:?}")));
        }
        Ok(self.base.join(format!("{key}.json")))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)?) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.base)?;
        fs::write(path, data)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use margin_app_core::config::ConfigService;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Prefs {
        socket_path: String,
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("margin-config-fs-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = FsConfigStore::at(scratch_dir("missing")).unwrap();
        assert!(matches!(store.load_raw("session_host"), Err(ConfigError::NotFound)));
    }

    #[test]
    fn load_or_init_persists_defaults_once() {
        let dir = scratch_dir("init");
        let service = ConfigService::new(FsConfigStore::at(&dir).unwrap());
        let prefs: Prefs = service.load_or_init("session_host").unwrap();
        assert_eq!(prefs, Prefs::default());
        assert!(dir.join("session_host.json").exists());

        fs::write(dir.join("session_host.json"), br#"{"socket_path":"/run/m.sock"}"#).unwrap();
        let prefs: Prefs = service.load_or_init("session_host").unwrap();
        assert_eq!(prefs.socket_path, "/run/m.sock");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_like_keys_are_refused() {
        let store = FsConfigStore::at(scratch_dir("keys")).unwrap();
        assert!(matches!(store.save_raw("../x", b"{}"), Err(ConfigError::Other(_))));
        assert!(matches!(store.load_raw(".hidden"), Err(ConfigError::Other(_))));
    }
}
