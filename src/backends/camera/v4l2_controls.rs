// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera control interface
//!
//! Focus, exposure mode and exposure bias for V4L2 device nodes, exposed
//! through [`DeviceControl`].
//!
//! Inspired by [cameractrls](https://github.com/soyersoyer/cameractrls).

use super::types::{BackendError, BackendResult, ExposureBiasRange, ExposureMode, FocusMode, Point};
use super::DeviceControl;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs (Camera Class) =====

/// Exposure mode: Auto, Manual, Shutter Priority, Aperture Priority
pub const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Focus control (manual focus position)
pub const V4L2_CID_FOCUS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 10;
/// Continuous auto focus enable
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
/// Exposure compensation (EV bias) in 0.001 EV units
pub const V4L2_CID_AUTO_EXPOSURE_BIAS: u32 = V4L2_CID_CAMERA_CLASS_BASE + 19;
/// One-shot auto focus trigger (button)
pub const V4L2_CID_AUTO_FOCUS_START: u32 = V4L2_CID_CAMERA_CLASS_BASE + 28;

// ===== V4L2 Exposure Auto Menu Values =====

pub const V4L2_EXPOSURE_AUTO: i32 = 0;
pub const V4L2_EXPOSURE_MANUAL: i32 = 1;
pub const V4L2_EXPOSURE_APERTURE_PRIORITY: i32 = 3;

/// V4L2 bias units per EV
const BIAS_UNITS_PER_EV: f32 = 1000.0;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Range and flags of a V4L2 control
#[derive(Debug, Clone)]
pub struct ControlInfo {
    pub id: u32,
    pub minimum: i32,
    pub maximum: i32,
    pub default_value: i32,
    pub flags: u32,
}

impl ControlInfo {
    pub fn is_disabled(&self) -> bool {
        self.flags & V4L2_CTRL_FLAG_DISABLED != 0
    }
}

/// Query if a control exists and get its information
pub fn query_control(device_path: &str, control_id: u32) -> Option<ControlInfo> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_QUERYCTRL, &mut qctrl as *mut V4l2Queryctrl) };
    if result < 0 {
        return None;
    }

    Some(ControlInfo {
        id: qctrl.id,
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        default_value: qctrl.default_value,
        flags: qctrl.flags,
    })
}

/// Get current value of a control
pub fn get_control(device_path: &str, control_id: u32) -> Option<i32> {
    let file = File::open(device_path).ok()?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        debug!(device_path, control_id, "Failed to get V4L2 control");
        return None;
    }

    Some(ctrl.value)
}

/// Set value of a control
pub fn set_control(device_path: &str, control_id: u32, value: i32) -> Result<(), String> {
    let file = File::open(device_path).map_err(|e| format!("Failed to open device: {}", e))?;
    let fd = file.as_raw_fd();

    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd, VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };
    if result < 0 {
        let errno = std::io::Error::last_os_error();
        warn!(device_path, control_id, value, ?errno, "Failed to set V4L2 control");
        return Err(format!("Failed to set control: {}", errno));
    }

    if ctrl.value != value {
        debug!(
            device_path,
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }

    Ok(())
}

/// Check if a control is available on the device
pub fn has_control(device_path: &str, control_id: u32) -> bool {
    query_control(device_path, control_id)
        .map(|info| !info.is_disabled())
        .unwrap_or(false)
}

/// Convert an EV bias to V4L2 units, clamped to the control's range
pub fn bias_to_v4l2(bias: f32, info: &ControlInfo) -> i32 {
    ((bias * BIAS_UNITS_PER_EV).round() as i32).clamp(info.minimum, info.maximum)
}

/// Device control backed by a V4L2 node
///
/// V4L2 has no point-of-interest controls, so only modes and bias apply.
pub struct V4l2DeviceControl {
    path: String,
    monitoring: Arc<AtomicBool>,
}

impl V4l2DeviceControl {
    pub fn open(path: &str, monitoring: Arc<AtomicBool>) -> BackendResult<Self> {
        if path.is_empty() {
            return Err(BackendError::NotSupported(
                "device has no V4L2 node".to_string(),
            ));
        }
        File::open(path).map_err(|e| BackendError::IoError(format!("{}: {}", path, e)))?;
        Ok(Self {
            path: path.to_string(),
            monitoring,
        })
    }
}

impl DeviceControl for V4l2DeviceControl {
    fn exposure_bias_range(&self) -> ExposureBiasRange {
        let Some(info) = query_control(&self.path, V4L2_CID_AUTO_EXPOSURE_BIAS) else {
            return ExposureBiasRange::default();
        };
        let current = get_control(&self.path, V4L2_CID_AUTO_EXPOSURE_BIAS).unwrap_or(info.default_value);
        ExposureBiasRange {
            min: info.minimum as f32 / BIAS_UNITS_PER_EV,
            current: current as f32 / BIAS_UNITS_PER_EV,
            max: info.maximum as f32 / BIAS_UNITS_PER_EV,
        }
    }

    fn is_focus_point_of_interest_supported(&self) -> bool {
        false
    }

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool {
        match mode {
            FocusMode::ContinuousAutoFocus => has_control(&self.path, V4L2_CID_FOCUS_AUTO),
            FocusMode::AutoFocus => has_control(&self.path, V4L2_CID_AUTO_FOCUS_START),
            FocusMode::Locked => has_control(&self.path, V4L2_CID_FOCUS_ABSOLUTE),
        }
    }

    fn set_focus(&mut self, mode: FocusMode, _point: Point) -> BackendResult<()> {
        let result = match mode {
            FocusMode::ContinuousAutoFocus => set_control(&self.path, V4L2_CID_FOCUS_AUTO, 1),
            FocusMode::AutoFocus => set_control(&self.path, V4L2_CID_FOCUS_AUTO, 0)
                .and_then(|_| set_control(&self.path, V4L2_CID_AUTO_FOCUS_START, 1)),
            FocusMode::Locked => set_control(&self.path, V4L2_CID_FOCUS_AUTO, 0),
        };
        result.map_err(BackendError::Other)
    }

    fn is_exposure_point_of_interest_supported(&self) -> bool {
        false
    }

    fn is_exposure_mode_supported(&self, mode: ExposureMode) -> bool {
        match mode {
            ExposureMode::ContinuousAutoExposure | ExposureMode::Locked => {
                has_control(&self.path, V4L2_CID_EXPOSURE_AUTO)
            }
            ExposureMode::AutoExpose => false,
        }
    }

    fn set_exposure(&mut self, mode: ExposureMode, _point: Point) -> BackendResult<()> {
        let value = match mode {
            ExposureMode::Locked => V4L2_EXPOSURE_MANUAL,
            ExposureMode::ContinuousAutoExposure | ExposureMode::AutoExpose => {
                // UVC devices usually only offer manual and aperture priority
                let auto_ok = query_control(&self.path, V4L2_CID_EXPOSURE_AUTO)
                    .map(|info| info.minimum == V4L2_EXPOSURE_AUTO)
                    .unwrap_or(false);
                if auto_ok {
                    V4L2_EXPOSURE_AUTO
                } else {
                    V4L2_EXPOSURE_APERTURE_PRIORITY
                }
            }
        };
        set_control(&self.path, V4L2_CID_EXPOSURE_AUTO, value).map_err(BackendError::Other)
    }

    fn set_subject_area_change_monitoring(&mut self, enabled: bool) {
        self.monitoring.store(enabled, Ordering::Relaxed);
    }

    fn set_exposure_target_bias(&mut self, bias: f32) -> BackendResult<()> {
        let info = query_control(&self.path, V4L2_CID_AUTO_EXPOSURE_BIAS).ok_or_else(|| {
            BackendError::NotSupported("exposure bias control not available".to_string())
        })?;
        let value = bias_to_v4l2(bias, &info);
        info!(path = %self.path, bias, value, "Setting exposure bias");
        set_control(&self.path, V4L2_CID_AUTO_EXPOSURE_BIAS, value).map_err(BackendError::Other)
    }
}
