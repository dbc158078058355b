// SPDX-License-Identifier: MPL-2.0

//! H.264 encoder selection for the recording writer
//!
//! Hardware encoders are tried first, then software fallbacks.

use crate::constants::BitratePreset;
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info};

/// (element, hardware) in priority order
const H264_ENCODERS: &[(&str, bool)] = &[
    ("vah264enc", true),
    ("vaapih264enc", true),
    ("nvh264enc", true),
    ("qsvh264enc", true),
    ("v4l2h264enc", true),
    ("x264enc", false),
    ("openh264enc", false),
];

/// Configuration for encoder selection
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub bitrate_preset: BitratePreset,
    pub width: u32,
    pub height: u32,
    /// Takes precedence over the preset
    pub bitrate_override_kbps: Option<u32>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate_preset: BitratePreset::default(),
            width: crate::constants::presets::VIDEO_WIDTH,
            height: crate::constants::presets::VIDEO_HEIGHT,
            bitrate_override_kbps: None,
        }
    }
}

impl EncoderConfig {
    pub fn bitrate_kbps(&self) -> u32 {
        self.bitrate_override_kbps
            .unwrap_or_else(|| self.bitrate_preset.bitrate_kbps(self.width, self.height))
    }
}

/// Encoder plus parser ready to link
pub struct SelectedEncoder {
    pub name: &'static str,
    pub encoder: gst::Element,
    pub parser: gst::Element,
}

/// Names of the H.264 encoders installed on this system
pub fn available_encoders() -> Vec<&'static str> {
    if gst::init().is_err() {
        return Vec::new();
    }
    H264_ENCODERS
        .iter()
        .filter(|(name, _)| gst::ElementFactory::find(name).is_some())
        .map(|(name, _)| *name)
        .collect()
}

/// Select the best available H.264 encoder and its parser
pub fn select_encoder(config: &EncoderConfig) -> Result<SelectedEncoder, String> {
    gst::init().map_err(|e| format!("Failed to initialize GStreamer: {}", e))?;

    for &(name, hardware) in H264_ENCODERS {
        let Ok(encoder) = gst::ElementFactory::make(name).build() else {
            continue;
        };
        let bitrate = config.bitrate_kbps();
        configure_encoder(&encoder, name, bitrate);
        info!(encoder = name, hardware, bitrate_kbps = bitrate, "Selected video encoder");

        let parser = gst::ElementFactory::make("h264parse")
            .build()
            .map_err(|e| format!("Failed to create h264parse: {}", e))?;
        return Ok(SelectedEncoder {
            name,
            encoder,
            parser,
        });
    }

    Err("No video encoder available. Please install gstreamer1-plugins-ugly (x264enc) or gstreamer1-plugin-openh264".to_string())
}

fn configure_encoder(encoder: &gst::Element, name: &str, bitrate: u32) {
    match name {
        "x264enc" => {
            encoder.set_property_from_str("speed-preset", "veryfast");
            encoder.set_property_from_str("tune", "zerolatency");
            encoder.set_property("bitrate", bitrate);
        }
        "vaapih264enc" => {
            encoder.set_property("bitrate", bitrate);
        }
        "vah264enc" => {
            encoder.set_property_from_str("rate-control", "cbr");
            encoder.set_property("bitrate", bitrate);
        }
        "nvh264enc" | "qsvh264enc" => {
            encoder.set_property("bitrate", bitrate);
        }
        "openh264enc" => {
            encoder.set_property_from_str("rate-control", "bitrate");
            encoder.set_property("bitrate", bitrate * 1000);
            encoder.set_property_from_str("usage-type", "camera");
        }
        _ => {
            debug!(encoder = name, "Using encoder defaults");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_uses_video_preset_size() {
        let config = EncoderConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.bitrate_kbps(), 5_000);
    }

    #[test]
    fn test_bitrate_override() {
        let config = EncoderConfig {
            bitrate_override_kbps: Some(1234),
            ..Default::default()
        };
        assert_eq!(config.bitrate_kbps(), 1234);
    }

    #[test]
    fn test_software_fallbacks_listed_last() {
        let last_hw = H264_ENCODERS.iter().rposition(|(_, hw)| *hw).unwrap();
        let first_sw = H264_ENCODERS.iter().position(|(_, hw)| !*hw).unwrap();
        assert!(last_hw < first_sw);
    }
}
