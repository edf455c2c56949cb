//! Configuration file loading and saving.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use filterdns_core::defaults;

use crate::error::ConfigError;
use crate::types::Config;

const CONFIG_FILE: &str = "config.json";

/// Reads and writes the JSON config document at a fixed path.
///
/// The default path is `<user config dir>/FilterDNS/config.json`; tests and
/// embedders can point the store anywhere.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the per-user config directory.
    pub fn new() -> Result<Self, ConfigError> {
        let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self {
            path: base.join(defaults::APP_NAME).join(CONFIG_FILE),
        })
    }

    /// Store backed by an explicit file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the configuration, falling back to defaults when the file does
    /// not exist yet.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut config: Config = serde_json::from_str(&data)?;
        if config.server_url.is_empty() {
            config.server_url = defaults::DEFAULT_SERVER_URL.to_string();
        }
        Ok(config)
    }

    /// Persist the configuration, stamping its `last_modified` in place.
    ///
    /// Writes to a sibling temp file first and renames it into place so a
    /// crash mid-write never leaves a truncated document.
    pub fn save(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }

        config.last_modified = Some(Utc::now());

        let data = serde_json::to_vec_pretty(config)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &data)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "config saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Forwarder;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("config.json"));
        let config = store.load().unwrap();
        assert_eq!(config.server_url, defaults::DEFAULT_SERVER_URL);
        assert!(!config.enabled);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("config.json"));

        let mut config = Config {
            profile: "home".into(),
            server_url: "https://filterdns.example.com".into(),
            enabled: true,
            forwarders: vec![Forwarder {
                domain: "ts.net".into(),
                server: "100.100.100.100".into(),
            }],
            ..Config::default()
        };
        store.save(&mut config).unwrap();
        assert!(config.last_modified.is_some());

        let loaded = store.load().unwrap();
        assert_eq!(loaded.profile, "home");
        assert!(loaded.enabled);
        assert_eq!(loaded.forwarders, config.forwarders);
        assert!(loaded.last_modified.is_some());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_path(dir.path().join("nested/deeper/config.json"));
        store.save(&mut Config::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn empty_server_url_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"profile":"home","serverUrl":""}"#).unwrap();
        let config = ConfigStore::with_path(&path).load().unwrap();
        assert_eq!(config.server_url, defaults::DEFAULT_SERVER_URL);
    }
}
