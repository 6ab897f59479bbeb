use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{KeytreeError, Result};
use crate::loader::LoaderSettings;
use crate::search::SearchOptions;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loader: LoaderConfig,
    pub search: SearchOptions,
    pub keys: KeybindingConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub capacity: usize,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
    /// Zero disables expiry
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeybindingConfig {
    /// Opens the command palette from browse mode
    pub palette: char,
    /// Pressed together with Ctrl to toggle the overlay
    pub activate: char,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file backing the key-value store; the platform data dir when unset
    pub path: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let settings = LoaderSettings::default();
        Self {
            capacity: settings.capacity,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay.as_millis() as u64,
            timeout_ms: settings.timeout.as_millis() as u64,
            ttl_secs: settings.ttl.map_or(0, |ttl| ttl.as_secs()),
        }
    }
}

impl LoaderConfig {
    pub fn settings(&self) -> LoaderSettings {
        LoaderSettings {
            capacity: self.capacity,
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            timeout: Duration::from_millis(self.timeout_ms),
            ttl: (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs)),
        }
    }
}

impl Default for KeybindingConfig {
    fn default() -> Self {
        Self {
            palette: '`',
            activate: 'k',
        }
    }
}

impl Config {
    /// `<config dir>/keytree/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("keytree").join("config.toml"))
    }

    /// Load the user configuration, falling back to defaults when it is
    /// missing or unreadable
    pub fn load() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => {
                log::debug!("config: loaded {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("config: ignoring {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| KeytreeError::Config(format!("{:?}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| KeytreeError::Config(e.to_string()))
    }

    /// Persistence file to use, if one can be determined
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .path
            .clone()
            .or_else(crate::storage::JsonFileStore::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_loader_settings_round_trip() {
        assert_eq!(LoaderConfig::default().settings(), LoaderSettings::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [loader]
            max_retries = 5
            ttl_secs = 0

            [keys]
            palette = "/"
            "#,
        )
        .unwrap();
        assert_eq!(config.loader.max_retries, 5);
        assert_eq!(config.loader.capacity, 32);
        assert_eq!(config.loader.settings().ttl, None);
        assert_eq!(config.keys.palette, '/');
        assert_eq!(config.keys.activate, 'k');
        assert_eq!(config.search, SearchOptions::default());
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[search]\nmax_results = 5\n[storage]\npath = \"/tmp/k.json\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.storage_path(), Some(PathBuf::from("/tmp/k.json")));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[loader\n").unwrap_err();
        assert!(matches!(err, KeytreeError::Config(_)));
        assert!(Config::from_file("/definitely/not/here.toml").is_err());
    }
}
