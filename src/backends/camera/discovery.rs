// SPDX-License-Identifier: GPL-3.0-only

//! Device discovery queries

use super::types::{CameraDevice, CameraPosition, DeviceType};
use tracing::debug;

/// Pick a device at `position`, preferring `preferred_type`
///
/// Falls back to the first device at `position` when no device has the
/// preferred type.
pub fn select_device(
    devices: &[CameraDevice],
    position: CameraPosition,
    preferred_type: DeviceType,
) -> Option<CameraDevice> {
    let exact = devices
        .iter()
        .find(|d| d.position == position && d.device_type == preferred_type);
    if let Some(device) = exact {
        return Some(device.clone());
    }

    let fallback = devices.iter().find(|d| d.position == position).cloned();
    debug!(
        %position,
        ?preferred_type,
        found = fallback.as_ref().map(|d| d.name.as_str()),
        "No exact device match, using position fallback"
    );
    fallback
}

/// Target position and preferred type when switching away from `current`
pub fn switch_target(current: CameraPosition) -> (CameraPosition, DeviceType) {
    match current {
        CameraPosition::Front | CameraPosition::Unspecified => {
            (CameraPosition::Back, DeviceType::Dual)
        }
        CameraPosition::Back => (CameraPosition::Front, DeviceType::TrueDepth),
    }
}

/// Guess where a device faces from its name
///
/// Desktop devices rarely report a location; laptops name their integrated
/// camera and phones expose "front"/"back"/"rear" in the description.
pub fn position_from_name(name: &str) -> CameraPosition {
    let lower = name.to_lowercase();
    if lower.contains("front") || lower.contains("integrated") || lower.contains("user") {
        CameraPosition::Front
    } else if lower.contains("back") || lower.contains("rear") || lower.contains("world") {
        CameraPosition::Back
    } else {
        CameraPosition::Unspecified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, position: CameraPosition, device_type: DeviceType) -> CameraDevice {
        CameraDevice {
            id: id.to_string(),
            name: id.to_string(),
            position,
            device_type,
            path: String::new(),
        }
    }

    #[test]
    fn test_exact_match_preferred() {
        let devices = vec![
            device("back-wide", CameraPosition::Back, DeviceType::WideAngle),
            device("back-dual", CameraPosition::Back, DeviceType::Dual),
        ];
        let found = select_device(&devices, CameraPosition::Back, DeviceType::Dual).unwrap();
        assert_eq!(found.id, "back-dual");
    }

    #[test]
    fn test_falls_back_to_position() {
        let devices = vec![
            device("front", CameraPosition::Front, DeviceType::WideAngle),
            device("back-wide", CameraPosition::Back, DeviceType::WideAngle),
        ];
        let found = select_device(&devices, CameraPosition::Back, DeviceType::Dual).unwrap();
        assert_eq!(found.id, "back-wide");
    }

    #[test]
    fn test_no_device_at_position() {
        let devices = vec![device("back", CameraPosition::Back, DeviceType::WideAngle)];
        assert!(select_device(&devices, CameraPosition::Front, DeviceType::TrueDepth).is_none());
    }

    #[test]
    fn test_switch_target() {
        assert_eq!(
            switch_target(CameraPosition::Front),
            (CameraPosition::Back, DeviceType::Dual)
        );
        assert_eq!(
            switch_target(CameraPosition::Unspecified),
            (CameraPosition::Back, DeviceType::Dual)
        );
        assert_eq!(
            switch_target(CameraPosition::Back),
            (CameraPosition::Front, DeviceType::TrueDepth)
        );
    }

    #[test]
    fn test_position_from_name() {
        assert_eq!(position_from_name("Integrated Camera"), CameraPosition::Front);
        assert_eq!(position_from_name("Rear camera"), CameraPosition::Back);
        assert_eq!(position_from_name("USB Webcam"), CameraPosition::Unspecified);
    }
}
