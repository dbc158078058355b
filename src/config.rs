// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::CameraBackendType;
use crate::constants::{BitratePreset, detection, files};
use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture session implementation
    pub backend: CameraBackendType,
    /// Run the quadrilateral detector on delivered frames
    pub detection_enabled: bool,
    /// Longest side of the detector's working image
    pub detection_max_dimension: u32,
    /// Detect on every Nth frame
    pub detect_every_n_frames: u32,
    /// Drop frames that arrive while the previous one is still queued
    pub discard_late_frames: bool,
    /// Use any camera when no back camera exists (laptops, desktops)
    pub any_position_fallback: bool,
    /// Overrides `~/Pictures/quadcam`
    pub photo_dir: Option<PathBuf>,
    /// Overrides `~/Videos/quadcam`
    pub video_dir: Option<PathBuf>,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: CameraBackendType::default(),
            detection_enabled: true,
            detection_max_dimension: detection::DEFAULT_MAX_DIMENSION,
            detect_every_n_frames: 1,
            discard_late_frames: true,
            any_position_fallback: false,
            photo_dir: None,
            video_dir: None,
            bitrate_preset: BitratePreset::default(),
        }
    }
}

impl Config {
    /// `<config dir>/quadcam/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(files::APP_DIR).join(files::CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            debug!("No config directory, using defaults");
            return Self::default();
        };
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    /// Load from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> AppResult<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), backend = %config.backend, "Loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    fn validate(&self) -> AppResult<()> {
        if self.detect_every_n_frames == 0 {
            return Err(AppError::Config("detect_every_n_frames must be at least 1".into()));
        }
        if self.detection_max_dimension < 16 {
            return Err(AppError::Config(format!(
                "detection_max_dimension {} is too small",
                self.detection_max_dimension
            )));
        }
        Ok(())
    }
}
