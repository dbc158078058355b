// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Recording quality, mapped to an encoder bitrate per resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Smaller files, reduced quality
    Low,
    /// Balanced quality and file size (default)
    #[default]
    Medium,
    /// Larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Encoder target in kbps for a frame width
    pub fn bitrate_kbps(&self, width: u32, _height: u32) -> u32 {
        let (low, medium, high) = ResolutionTier::from_width(width).kbps();
        match self {
            BitratePreset::Low => low,
            BitratePreset::Medium => medium,
            BitratePreset::High => high,
        }
    }
}

/// Width buckets used to scale encoder bitrates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    SD,
    HD,
    FullHD,
    FourK,
}

impl ResolutionTier {
    pub fn from_width(width: u32) -> Self {
        match width {
            3840.. => ResolutionTier::FourK,
            1920.. => ResolutionTier::FullHD,
            1280.. => ResolutionTier::HD,
            _ => ResolutionTier::SD,
        }
    }

    /// (low, medium, high) in kbps
    fn kbps(self) -> (u32, u32, u32) {
        match self {
            ResolutionTier::SD => (1_000, 2_000, 4_000),
            ResolutionTier::HD => (2_500, 5_000, 10_000),
            ResolutionTier::FullHD => (4_000, 8_000, 16_000),
            ResolutionTier::FourK => (15_000, 30_000, 50_000),
        }
    }
}

/// "8 Mbps", "2.5 Mbps"
pub fn format_bitrate(kbps: u32) -> String {
    if kbps % 1000 == 0 {
        format!("{} Mbps", kbps / 1000)
    } else {
        format!("{:.1} Mbps", kbps as f64 / 1000.0)
    }
}

/// Session preset dimensions
pub mod presets {
    /// Photo preset: highest quality still resolution the device offers
    pub const PHOTO_WIDTH: u32 = 1920;
    pub const PHOTO_HEIGHT: u32 = 1080;

    /// Video preset is fixed to 720p
    pub const VIDEO_WIDTH: u32 = 1280;
    pub const VIDEO_HEIGHT: u32 = 720;

    pub const FRAMERATE: i32 = 30;
}

/// Quadrilateral detection tuning
pub mod detection {
    /// Frames are downscaled so their longer side is at most this many pixels
    pub const DEFAULT_MAX_DIMENSION: u32 = 320;

    /// Smallest component (as a fraction of frame area) considered a candidate
    pub const MIN_AREA_FRACTION: f32 = 0.02;

    /// Region area over convex hull area; rejects rings and L shapes
    pub const MIN_FILL_RATIO: f32 = 0.8;

    /// Fitted quad area over hull area; rejects discs and blobs
    pub const MIN_QUAD_COVERAGE: f32 = 0.9;

    /// Target screen ratio bands (width / height), inclusive
    pub const TARGET_ASPECT_BANDS: [(f32, f32); 2] = [(0.54, 0.58), (0.44, 0.48)];
}

/// Exposure mapping
pub mod exposure {
    /// Fraction of the remaining bias range a full slider swing covers
    pub const BIAS_SCALE: f32 = 0.66;

    /// Centre of the frame in normalized device coordinates
    pub const CENTER_POINT: (f32, f32) = (0.5, 0.5);
}

/// Filesystem names
pub mod files {
    /// Reused temporary recording path inside the temp dir
    pub const TEMP_VIDEO_NAME: &str = "quadcam-video.mp4";

    /// Extension of the paired live-photo movie
    pub const LIVE_PHOTO_EXTENSION: &str = "mov";

    /// Application directory name under config/pictures/videos
    pub const APP_DIR: &str = "quadcam";

    pub const CONFIG_FILE: &str = "config.json";
    pub const SETTINGS_FILE: &str = "settings.json";
}

/// Settings keys
pub mod settings_keys {
    pub const FLASH_MODE: &str = "camera.flash_mode";
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Maximum buffer queue size (keep small for low latency)
    pub const MAX_BUFFERS: u32 = 2;

    /// Get number of threads for videoconvert based on available CPU threads
    pub fn videoconvert_threads() -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(4)
    }

    /// Output pixel format for appsink
    pub const OUTPUT_FORMAT: &str = "RGBA";

    /// JPEG quality for still captures
    pub const JPEG_QUALITY: u8 = 92;
}

/// Timing constants
pub mod timing {
    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 30;

    /// Pipeline state change timeout on stop
    pub const STOP_TIMEOUT_SECS: u64 = 2;

    /// Pipeline playing state timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// How long to wait for EOS when finalizing a recording
    pub const EOS_TIMEOUT_SECS: u64 = 10;

    /// Nice value requested for the session thread
    pub const SESSION_THREAD_NICE: i32 = -10;
}
