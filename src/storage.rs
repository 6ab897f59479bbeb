//! Persistence collaborator: a string key-value store, plus typed
//! preferences layered on top of it.
//!
//! Storage failures are never fatal. Reads that fail are logged and treated
//! as "value absent"; writes report an error the caller may surface.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{KeytreeError, Result};

const THEME_KEY: &str = "keytree.theme";
const WINDOW_KEY: &str = "keytree.window";
const POSITION_KEY: &str = "keytree.position";

#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Read `key`, treating any failure as a missing value
pub fn read_value(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("storage: reading {} failed, using default: {}", key, e);
            None
        }
    }
}

/// Write `key`, normalising failures to [`KeytreeError::Persistence`]
pub fn write_value(store: &dyn KeyValueStore, key: &str, value: &str) -> Result<()> {
    store.set(key, value).map_err(|e| {
        log::warn!("storage: writing {} failed: {}", key, e);
        match e {
            KeytreeError::Persistence(_) => e,
            other => KeytreeError::Persistence(other.to_string()),
        }
    })
}

/// In-process store, used by tests and scripted runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing or corrupt file starts empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("storage: {:?} is corrupt, starting empty: {}", path, e);
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("storage: cannot read {:?}, starting empty: {}", path, e);
                BTreeMap::new()
            }
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// `<data dir>/keytree/store.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("keytree").join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeytreeError::Persistence(format!("{:?}: {}", parent, e)))?;
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content)
            .map_err(|e| KeytreeError::Persistence(format!("{:?}: {}", self.path, e)))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.lock();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&values) {
            // Keep memory and disk in step
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    #[default]
    System,
    Light,
    Dark,
}

impl fmt::Display for ThemePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThemePreference::System => "system",
            ThemePreference::Light => "light",
            ThemePreference::Dark => "dark",
        };
        f.write_str(name)
    }
}

impl FromStr for ThemePreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(ThemePreference::System),
            "light" => Ok(ThemePreference::Light),
            "dark" => Ok(ThemePreference::Dark),
            other => Err(format!("unknown theme \"{}\"", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowGeometry {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Typed component preferences over a [`KeyValueStore`]
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn theme(&self) -> ThemePreference {
        read_value(self.store.as_ref(), THEME_KEY)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    pub fn set_theme(&self, theme: ThemePreference) -> Result<()> {
        write_value(self.store.as_ref(), THEME_KEY, &theme.to_string())
    }

    pub fn window_geometry(&self) -> Option<WindowGeometry> {
        let raw = read_value(self.store.as_ref(), WINDOW_KEY)?;
        if raw.is_empty() {
            return None;
        }
        match serde_json::from_str(&raw) {
            Ok(geometry) => Some(geometry),
            Err(e) => {
                log::warn!("storage: ignoring corrupt window geometry: {}", e);
                None
            }
        }
    }

    pub fn set_window_geometry(&self, geometry: WindowGeometry) -> Result<()> {
        let raw = serde_json::to_string(&geometry)?;
        write_value(self.store.as_ref(), WINDOW_KEY, &raw)
    }

    pub fn reset_window_geometry(&self) -> Result<()> {
        write_value(self.store.as_ref(), WINDOW_KEY, "")
    }

    /// Last remembered navigation path; empty when unknown
    pub fn last_position(&self) -> Vec<String> {
        read_value(self.store.as_ref(), POSITION_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    pub fn set_last_position(&self, path: &[String]) -> Result<()> {
        let raw = serde_json::to_string(path)?;
        write_value(self.store.as_ref(), POSITION_KEY, &raw)
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preferences(..)")
    }
}
