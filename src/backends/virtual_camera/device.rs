// SPDX-License-Identifier: GPL-3.0-only

//! Focus and exposure controls for the virtual device

use super::{SharedState, lock};
use crate::backends::camera::{
    BackendError, BackendResult, DeviceControl, ExposureBiasRange, ExposureMode, FocusMode, Point,
};
use tracing::debug;

/// Everything a locked virtual device records
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualDeviceState {
    pub bias_range: ExposureBiasRange,
    pub point_of_interest_supported: bool,
    pub focus: Option<(FocusMode, Point)>,
    pub exposure: Option<(ExposureMode, Point)>,
    pub target_bias: Option<f32>,
    pub monitoring: bool,
}

impl Default for VirtualDeviceState {
    fn default() -> Self {
        Self {
            bias_range: ExposureBiasRange {
                min: -4.0,
                current: 0.0,
                max: 4.0,
            },
            point_of_interest_supported: true,
            focus: None,
            exposure: None,
            target_bias: None,
            monitoring: false,
        }
    }
}

pub struct VirtualDeviceControl {
    state: SharedState,
}

impl VirtualDeviceControl {
    pub(super) fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl DeviceControl for VirtualDeviceControl {
    fn exposure_bias_range(&self) -> ExposureBiasRange {
        lock(&self.state).device.bias_range
    }

    fn is_focus_point_of_interest_supported(&self) -> bool {
        lock(&self.state).device.point_of_interest_supported
    }

    fn is_focus_mode_supported(&self, _mode: FocusMode) -> bool {
        true
    }

    fn set_focus(&mut self, mode: FocusMode, point: Point) -> BackendResult<()> {
        debug!(?mode, x = point.x, y = point.y, "Virtual focus");
        lock(&self.state).device.focus = Some((mode, point));
        Ok(())
    }

    fn is_exposure_point_of_interest_supported(&self) -> bool {
        lock(&self.state).device.point_of_interest_supported
    }

    fn is_exposure_mode_supported(&self, _mode: ExposureMode) -> bool {
        true
    }

    fn set_exposure(&mut self, mode: ExposureMode, point: Point) -> BackendResult<()> {
        debug!(?mode, x = point.x, y = point.y, "Virtual exposure");
        lock(&self.state).device.exposure = Some((mode, point));
        Ok(())
    }

    fn set_subject_area_change_monitoring(&mut self, enabled: bool) {
        lock(&self.state).device.monitoring = enabled;
    }

    fn set_exposure_target_bias(&mut self, bias: f32) -> BackendResult<()> {
        let mut state = lock(&self.state);
        let range = state.device.bias_range;
        if bias < range.min || bias > range.max {
            return Err(BackendError::NotSupported(format!(
                "bias {} outside [{}, {}]",
                bias, range.min, range.max
            )));
        }
        state.device.target_bias = Some(bias);
        Ok(())
    }
}
