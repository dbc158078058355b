// SPDX-License-Identifier: GPL-3.0-only

//! Camera discovery through the GStreamer device monitor
//!
//! The monitor covers both PipeWire and V4L2 providers. Devices rarely report
//! where they face, so position and type are guessed from the display name.

use super::super::discovery::position_from_name;
use super::super::types::{CameraDevice, DeviceType};
use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{debug, info, warn};

/// Properties that may carry the V4L2 node, in lookup order
const PATH_PROPERTIES: &[&str] = &["api.v4l2.path", "device.path", "object.path"];

/// Discover video sources, paired with the GStreamer device that creates them
pub fn enumerate_devices() -> Vec<(CameraDevice, gst::Device)> {
    if let Err(e) = gst::init() {
        warn!(error = %e, "GStreamer init failed");
        return Vec::new();
    }

    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some("Video/Source"), None);
    if let Err(e) = monitor.start() {
        warn!(error = %e, "Device monitor failed to start");
        return Vec::new();
    }
    let devices: Vec<_> = monitor
        .devices()
        .into_iter()
        .enumerate()
        .map(|(index, device)| (camera_device(&device, index), device))
        .collect();
    monitor.stop();

    info!(count = devices.len(), "Enumerated cameras");
    devices
}

fn camera_device(device: &gst::Device, index: usize) -> CameraDevice {
    let name = device.display_name().to_string();
    let path = device
        .properties()
        .and_then(|props| {
            PATH_PROPERTIES
                .iter()
                .find_map(|key| props.get::<String>(*key).ok())
        })
        .filter(|p| p.starts_with("/dev/"))
        .unwrap_or_default();
    let id = if path.is_empty() {
        format!("{}#{}", name, index)
    } else {
        path.clone()
    };

    let camera = CameraDevice {
        id,
        position: position_from_name(&name),
        device_type: device_type_from_name(&name),
        name,
        path,
    };
    debug!(device = %camera, path = %camera.path, "Found camera");
    camera
}

pub fn device_type_from_name(name: &str) -> DeviceType {
    let lower = name.to_lowercase();
    if lower.contains("depth") || lower.contains("infrared") || lower.contains(" ir ") {
        DeviceType::TrueDepth
    } else if lower.contains("dual") || lower.contains("stereo") {
        DeviceType::Dual
    } else {
        DeviceType::WideAngle
    }
}
