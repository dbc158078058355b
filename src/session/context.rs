// SPDX-License-Identifier: GPL-3.0-only

//! Session-side state
//!
//! Everything here runs on the session queue. Failures are logged and turned
//! into state or events; nothing is returned to the UI directly.

use super::events::{CameraEvent, CameraSetupResult, EventSink};
use super::executor::SessionQueue;
use crate::backends::camera::discovery::switch_target;
use crate::backends::camera::{
    BackendResult, CameraDevice, CameraFrame, CameraPosition, CaptureSession,
    ConfigurationTransaction, DeviceType, ExposureBiasRange, ExposureMode, FlashMode, FocusMode,
    OutputKind, PermissionProvider, PhotoCaptureEvent, Point, SessionPreset, select_device,
};
use crate::detection::QuadrilateralDetector;
use crate::errors::{CameraError, RecordingError};
use crate::pipelines::photo::PhotoCaptureService;
use crate::pipelines::video::{RecordingState, VideoRecordingService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Detection and device-selection knobs taken from [`crate::Config`]
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub detect_every_n_frames: u32,
    pub any_position_fallback: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            detect_every_n_frames: 1,
            any_position_fallback: false,
        }
    }
}

pub struct SessionContext {
    session: Box<dyn CaptureSession>,
    queue: SessionQueue,
    events: EventSink,
    permission: Arc<dyn PermissionProvider>,
    setup_result: CameraSetupResult,
    camera: Option<CameraDevice>,
    photo: PhotoCaptureService,
    video: VideoRecordingService,
    detector: Option<QuadrilateralDetector>,
    options: SessionOptions,
    frame_count: u64,
    subject_area_subscribed: bool,
    exposure_range: Option<ExposureBiasRange>,
}

impl SessionContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut session: Box<dyn CaptureSession>,
        queue: SessionQueue,
        events: EventSink,
        permission: Arc<dyn PermissionProvider>,
        photo: PhotoCaptureService,
        video: VideoRecordingService,
        detector: Option<QuadrilateralDetector>,
        options: SessionOptions,
        discard_late_frames: bool,
    ) -> Self {
        session.set_frame_sink(queue.frame_sink(discard_late_frames));
        session.set_photo_sink(queue.photo_sink());
        let setup_result = permission.authorization_status().into();
        Self {
            session,
            queue,
            events,
            permission,
            setup_result,
            camera: None,
            photo,
            video,
            detector,
            options,
            frame_count: 0,
            subject_area_subscribed: false,
            exposure_range: None,
        }
    }

    // ===== Setup =====

    /// Configure inputs and outputs once access has been granted
    pub fn configure(&mut self) {
        if self.setup_result != CameraSetupResult::Success {
            info!(
                result = ?self.setup_result,
                error = %CameraError::NotAuthorized,
                "Skipping configuration"
            );
            self.events.emit(CameraEvent::ConfigurationFinished {
                result: self.setup_result,
                device: None,
            });
            return;
        }

        self.setup_result = match self.configure_session() {
            Ok(device) => {
                info!(device = %device, "Session configured");
                self.camera = Some(device);
                CameraSetupResult::Success
            }
            Err(e) => {
                error!(error = %e, "Session configuration failed");
                CameraSetupResult::ConfigurationFailed
            }
        };
        self.events.emit(CameraEvent::ConfigurationFinished {
            result: self.setup_result,
            device: self.camera.clone(),
        });
    }

    fn configure_session(&mut self) -> Result<CameraDevice, CameraError> {
        let any_position = self.options.any_position_fallback;
        let mut tx = ConfigurationTransaction::begin(self.session.as_mut());
        tx.set_preset(SessionPreset::Photo)?;

        let devices = tx.discover_devices();
        debug!(count = devices.len(), "Discovered devices");
        let device = select_device(&devices, CameraPosition::Back, DeviceType::WideAngle)
            .or_else(|| any_position.then(|| devices.first().cloned()).flatten())
            .ok_or(CameraError::NoCameraFound)?;

        if !tx.can_add_input(&device) {
            return Err(CameraError::CannotAdd(format!("input {}", device.name)));
        }
        tx.add_input(&device)?;

        self.video.add_output(&mut *tx)?;
        self.photo.add_output(&mut *tx);
        Ok(device)
    }

    /// Ask for access on a worker; the answer comes back through the queue
    pub fn request_access(&mut self) {
        let permission = Arc::clone(&self.permission);
        let queue = self.queue.clone();
        let spawned = std::thread::Builder::new()
            .name("camera-access".to_string())
            .spawn(move || {
                let granted = permission.request_access();
                queue.dispatch(move |ctx| ctx.access_finished(granted));
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn access request");
            self.access_finished(false);
        }
    }

    pub fn access_finished(&mut self, granted: bool) {
        info!(granted, "Camera access request finished");
        self.setup_result = if granted {
            CameraSetupResult::Success
        } else {
            CameraSetupResult::NotAuthorized
        };
        self.events.emit(CameraEvent::AccessRequestFinished { granted });
    }

    // ===== Presets and devices =====

    pub fn change_preset(&mut self, preset: SessionPreset) {
        if let Err(e) = self.apply_preset(preset) {
            error!(?preset, error = %e, "Preset change failed");
        }
        let preset = self.session.preset();
        info!(?preset, "Preset changed");
        self.events.emit(CameraEvent::PresetChanged { preset });
    }

    fn apply_preset(&mut self, preset: SessionPreset) -> Result<(), CameraError> {
        let mut tx = ConfigurationTransaction::begin(self.session.as_mut());
        match preset {
            SessionPreset::Video => {
                tx.set_preset(SessionPreset::Video)?;
                self.photo.remove_output(&mut *tx);
                self.video.configure_output_connection(&mut *tx)?;
            }
            SessionPreset::Photo => {
                tx.set_preset(SessionPreset::Photo)?;
                self.photo.add_output(&mut *tx);
            }
        }
        Ok(())
    }

    /// Switch between back and front cameras
    pub fn change_camera(&mut self) {
        let Some(current) = self.camera.clone() else {
            debug!("No active camera to switch from");
            self.events.emit(CameraEvent::CameraChanged {
                device: None,
                switched: false,
            });
            return;
        };

        let (position, preferred) = switch_target(current.position);
        let devices = self.session.discover_devices();
        let Some(target) = select_device(&devices, position, preferred) else {
            info!(%position, "No camera to switch to");
            self.events.emit(CameraEvent::CameraChanged {
                device: Some(current),
                switched: false,
            });
            return;
        };

        let switched = match self.swap_input(&current, &target) {
            Ok(()) => {
                info!(from = %current, to = %target, "Switched camera");
                self.camera = Some(target);
                self.exposure_range = None;
                true
            }
            Err(e) => {
                error!(error = %e, "Camera switch failed");
                false
            }
        };

        if self.subject_area_subscribed {
            self.session.unsubscribe_subject_area();
            self.subscribe_subject_area();
        }
        self.events.emit(CameraEvent::CameraChanged {
            device: self.camera.clone(),
            switched,
        });
    }

    fn swap_input(
        &mut self,
        current: &CameraDevice,
        target: &CameraDevice,
    ) -> Result<(), CameraError> {
        let mut tx = ConfigurationTransaction::begin(self.session.as_mut());
        tx.remove_input(current);

        let added = tx.can_add_input(target)
            && match tx.add_input(target) {
                Ok(()) => true,
                Err(e) => {
                    warn!(device = %target, error = %e, "Failed to add input");
                    false
                }
            };
        if !added {
            if let Err(e) = tx.add_input(current) {
                error!(device = %current, error = %e, "Failed to restore previous input");
            }
            return Err(CameraError::CannotAdd(format!("input {}", target.name)));
        }

        if tx.has_output(OutputKind::VideoData) {
            self.video.configure_output_connection(&mut *tx)?;
        }
        if tx.has_output(OutputKind::Photo) {
            self.photo.configure_output(&mut *tx);
        }
        Ok(())
    }

    // ===== Focus and exposure =====

    pub fn focus(
        &mut self,
        focus_mode: FocusMode,
        exposure_mode: ExposureMode,
        point: Point,
        monitor_subject_area: bool,
    ) {
        let Some(device) = self.camera.clone() else {
            debug!("Focus requested without an active camera");
            return;
        };
        if let Err(e) =
            self.apply_focus(&device, focus_mode, exposure_mode, point, monitor_subject_area)
        {
            warn!(device = %device, error = %e, "Could not lock device for configuration");
        }
    }

    fn apply_focus(
        &mut self,
        device: &CameraDevice,
        focus_mode: FocusMode,
        exposure_mode: ExposureMode,
        point: Point,
        monitor_subject_area: bool,
    ) -> BackendResult<()> {
        let mut control = self.session.lock_device(device)?;
        self.exposure_range = Some(control.exposure_bias_range());

        if control.is_focus_point_of_interest_supported()
            && control.is_focus_mode_supported(focus_mode)
        {
            control.set_focus(focus_mode, point)?;
        }
        if control.is_exposure_point_of_interest_supported()
            && control.is_exposure_mode_supported(exposure_mode)
        {
            control.set_exposure(exposure_mode, point)?;
        }
        control.set_subject_area_change_monitoring(monitor_subject_area);
        debug!(
            ?focus_mode,
            ?exposure_mode,
            x = point.x,
            y = point.y,
            monitor_subject_area,
            "Focus applied"
        );
        Ok(())
    }

    /// Map a slider value in [-1, 1] onto the device's exposure bias
    pub fn update_exposure(&mut self, value: f32) {
        let Some(device) = self.camera.clone() else {
            return;
        };
        let result = self.session.lock_device(&device).and_then(|mut control| {
            let range = *self
                .exposure_range
                .get_or_insert_with(|| control.exposure_bias_range());
            control.set_subject_area_change_monitoring(false);
            let bias = range.bias_for(value);
            debug!(value, bias, "Exposure bias");
            control.set_exposure_target_bias(bias)
        });
        if let Err(e) = result {
            warn!(device = %device, error = %e, "Could not update exposure");
        }
    }

    pub fn subject_area_changed(&mut self) {
        debug!("Subject area changed");
        self.events.emit(CameraEvent::SubjectAreaChanged);
        self.focus(
            FocusMode::ContinuousAutoFocus,
            ExposureMode::ContinuousAutoExposure,
            Point::center(),
            false,
        );
    }

    fn subscribe_subject_area(&mut self) {
        if let Some(device) = &self.camera {
            self.session
                .subscribe_subject_area(device, self.queue.subject_area_sink());
            self.subject_area_subscribed = true;
        }
    }

    // ===== Running state =====

    pub fn turn_on(&mut self) {
        self.subscribe_subject_area();
        if self.setup_result == CameraSetupResult::Success && !self.session.is_running() {
            if let Err(e) = self.session.start_running() {
                error!(error = %e, "Failed to start session");
            }
        }
        let running = self.session.is_running();
        info!(running, "Camera turned on");
        self.events.emit(CameraEvent::CameraStarted { running });
    }

    pub fn turn_off(&mut self) {
        self.session.unsubscribe_subject_area();
        self.subject_area_subscribed = false;
        if self.session.is_running() && self.setup_result == CameraSetupResult::Success {
            self.session.stop_running();
        }
        info!("Camera turned off");
        self.events.emit(CameraEvent::CameraStopped);
    }

    // ===== Frames and capture =====

    pub fn handle_frame(&mut self, frame: Arc<CameraFrame>) {
        self.video.handle_frame(Arc::clone(&frame));

        self.frame_count += 1;
        let Some(detector) = &self.detector else {
            return;
        };
        if self.frame_count % u64::from(self.options.detect_every_n_frames.max(1)) != 0 {
            return;
        }
        let (quadrilateral, is_target_aspect) = detector.detect(&frame);
        trace!(found = quadrilateral.is_some(), is_target_aspect, "Detection");
        self.events.emit(CameraEvent::QuadrilateralDetected {
            quadrilateral,
            is_target_aspect,
        });
    }

    pub fn capture_photo(&mut self, flash_mode: FlashMode, live_photo: bool, depth: bool) {
        self.photo
            .capture(self.session.as_mut(), flash_mode, live_photo, depth);
    }

    pub fn handle_photo_event(&mut self, event: PhotoCaptureEvent) {
        self.photo.handle_capture_event(event);
    }

    pub fn start_recording(&mut self) {
        self.video.start_recording();
    }

    pub fn pause_recording(&mut self) {
        self.video.pause_recording();
    }

    pub fn finish_recording(&mut self) {
        self.video.finish_recording();
    }

    pub fn recording_finalized(&mut self, result: Result<PathBuf, RecordingError>) {
        self.video.finalized(result);
    }

    /// Finish any recording and stop the session before the queue exits
    pub fn shutdown(&mut self) {
        if self.video.state() != RecordingState::Idle {
            warn!("Session shutting down while recording");
            self.video.finish_recording();
        }
        self.session.unsubscribe_subject_area();
        if self.session.is_running() {
            self.session.stop_running();
        }
    }
}
