// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use quadcam::constants::{BitratePreset, ResolutionTier, format_bitrate, presets};

#[test]
fn test_video_preset_bitrates() {
    let kbps: Vec<u32> = BitratePreset::ALL
        .iter()
        .map(|p| p.bitrate_kbps(presets::VIDEO_WIDTH, presets::VIDEO_HEIGHT))
        .collect();
    assert_eq!(kbps, vec![2_500, 5_000, 10_000]);
}

#[test]
fn test_tier_boundaries() {
    assert_eq!(ResolutionTier::from_width(640), ResolutionTier::SD);
    assert_eq!(ResolutionTier::from_width(1279), ResolutionTier::SD);
    assert_eq!(ResolutionTier::from_width(1280), ResolutionTier::HD);
    assert_eq!(ResolutionTier::from_width(1920), ResolutionTier::FullHD);
    assert_eq!(ResolutionTier::from_width(4096), ResolutionTier::FourK);
}

#[test]
fn test_bitrate_grows_with_width_and_preset() {
    for preset in BitratePreset::ALL {
        let widths = [640, 1280, 1920, 3840];
        let rates: Vec<u32> = widths.iter().map(|w| preset.bitrate_kbps(*w, 0)).collect();
        assert!(rates.windows(2).all(|w| w[0] < w[1]), "{:?}: {:?}", preset, rates);
    }
    assert!(BitratePreset::Low.bitrate_kbps(1920, 1080) < BitratePreset::High.bitrate_kbps(1920, 1080));
}

#[test]
fn test_format_bitrate() {
    assert_eq!(format_bitrate(8_000), "8 Mbps");
    assert_eq!(format_bitrate(2_500), "2.5 Mbps");
    assert_eq!(format_bitrate(50_000), "50 Mbps");
}

#[test]
fn test_bitrate_preset_serializes_by_name() {
    let json = serde_json::to_string(&BitratePreset::High).unwrap();
    assert_eq!(json, "\"High\"");
    let preset: BitratePreset = serde_json::from_str("\"Low\"").unwrap();
    assert_eq!(preset, BitratePreset::Low);
    assert_eq!(preset.display_name(), "Low");
}
