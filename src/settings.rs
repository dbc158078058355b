// SPDX-License-Identifier: GPL-3.0-only

//! Persistent user settings
//!
//! A flat JSON object of dotted keys, e.g. `{"camera.flash_mode": 2}`.

use crate::constants::files;
use crate::errors::AppResult;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    /// `None` keeps everything in memory
    path: Option<PathBuf>,
    values: Map<String, Value>,
}

impl SettingsStore {
    /// Open `<config dir>/quadcam/settings.json`
    pub fn open_default() -> Self {
        match dirs::config_dir() {
            Some(dir) => Self::open(dir.join(files::APP_DIR).join(files::SETTINGS_FILE)),
            None => {
                warn!("No config directory, settings won't persist");
                Self::in_memory()
            }
        }
    }

    /// Open a store at `path`; unreadable content starts empty
    pub fn open(path: PathBuf) -> Self {
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt settings file, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read settings");
                Map::new()
            }
        };
        Self {
            path: Some(path),
            values,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Ignoring malformed setting");
                None
            }
        }
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    /// Store `value` under `key` and write the file
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> AppResult<()> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        self.save()
    }

    pub fn set_i64(&mut self, key: &str, value: i64) -> AppResult<()> {
        self.set(key, value)
    }

    fn save(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.values)?)?;
        debug!(path = %path.display(), "Settings saved");
        Ok(())
    }
}
