// SPDX-License-Identifier: GPL-3.0-only

//! In-process virtual capture session
//!
//! Stands in for camera hardware: a fixed device list, configurable
//! capabilities, frames pushed through a [`VirtualCameraHandle`] (or produced
//! by an optional generator thread), and photos encoded from the last frame.
//!
//! The session and its handle share one state block, so tests can inspect
//! what the coordinator did after the session moved onto the queue.

mod device;
mod frames;
mod writer;

pub use device::{VirtualDeviceControl, VirtualDeviceState};
pub use frames::synthetic_frame;
pub use writer::{MemoryWriterFactory, WrittenFrames};

use crate::backends::camera::{
    BackendError, BackendResult, CameraDevice, CameraFrame, CameraPosition, CaptureSession,
    DeviceControl, DeviceType, FrameSink, OutputKind, PhotoCapabilities, PhotoCaptureEvent,
    PhotoCodec, PhotoOutputOptions, PhotoSettings, PhotoSink, SessionPreset, SubjectAreaSink,
    VideoOrientation,
};
use crate::constants::presets;
use crate::pipelines::photo::encode_jpeg;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

#[derive(Default)]
struct VirtualState {
    devices: Vec<CameraDevice>,
    inputs: Vec<CameraDevice>,
    outputs: Vec<OutputKind>,
    rejected_inputs: Vec<String>,
    rejected_outputs: Vec<OutputKind>,
    preset: SessionPreset,
    configuring: bool,
    commits: usize,
    running: bool,
    photo_capabilities: PhotoCapabilities,
    photo_options: PhotoOutputOptions,
    stabilization_supported: bool,
    video_connection: Option<(VideoOrientation, bool)>,
    frame_sink: Option<FrameSink>,
    photo_sink: Option<PhotoSink>,
    subject_sink: Option<SubjectAreaSink>,
    last_frame: Option<CameraFrame>,
    last_photo_settings: Option<PhotoSettings>,
    photo_failure: Option<BackendError>,
    device: VirtualDeviceState,
}

type SharedState = Arc<Mutex<VirtualState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, VirtualState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Devices every virtual session starts with
pub fn default_devices() -> Vec<CameraDevice> {
    vec![
        CameraDevice {
            id: "virtual-back-wide".into(),
            name: "Virtual Back Camera".into(),
            position: CameraPosition::Back,
            device_type: DeviceType::WideAngle,
            path: String::new(),
        },
        CameraDevice {
            id: "virtual-back-dual".into(),
            name: "Virtual Back Dual Camera".into(),
            position: CameraPosition::Back,
            device_type: DeviceType::Dual,
            path: String::new(),
        },
        CameraDevice {
            id: "virtual-front".into(),
            name: "Virtual Front TrueDepth Camera".into(),
            position: CameraPosition::Front,
            device_type: DeviceType::TrueDepth,
            path: String::new(),
        },
    ]
}

pub struct VirtualCaptureSession {
    state: SharedState,
    generator: Option<(u32, u32)>,
    generator_stop: Arc<AtomicBool>,
}

impl VirtualCaptureSession {
    /// Session with the default devices and a handle to drive it
    pub fn with_default_devices() -> (Self, VirtualCameraHandle) {
        Self::with_devices(default_devices())
    }

    pub fn with_devices(devices: Vec<CameraDevice>) -> (Self, VirtualCameraHandle) {
        let state = VirtualState {
            devices,
            photo_capabilities: PhotoCapabilities {
                depth_delivery_supported: true,
                live_photo_supported: true,
                available_codecs: vec![PhotoCodec::Jpeg],
            },
            stabilization_supported: true,
            device: VirtualDeviceState::default(),
            ..Default::default()
        };
        let state = Arc::new(Mutex::new(state));
        let session = Self {
            state: Arc::clone(&state),
            generator: None,
            generator_stop: Arc::new(AtomicBool::new(true)),
        };
        (session, VirtualCameraHandle { state })
    }

    /// Produce synthetic frames at the video framerate while running
    pub fn with_generator(mut self, width: u32, height: u32) -> Self {
        self.generator = Some((width, height));
        self
    }

    fn spawn_generator(&mut self, width: u32, height: u32) -> BackendResult<()> {
        let stop = Arc::new(AtomicBool::new(false));
        self.generator_stop = Arc::clone(&stop);
        let handle = VirtualCameraHandle {
            state: Arc::clone(&self.state),
        };
        let interval = Duration::from_secs(1) / presets::FRAMERATE as u32;
        std::thread::Builder::new()
            .name("virtual-frames".to_string())
            .spawn(move || {
                let start = Instant::now();
                while !stop.load(Ordering::Acquire) {
                    let pts = start.elapsed();
                    handle.push_frame(synthetic_frame(width, height, pts));
                    std::thread::sleep(interval);
                }
                debug!("Virtual frame generator stopped");
            })
            .map(|_| ())
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))
    }
}

impl Drop for VirtualCaptureSession {
    fn drop(&mut self) {
        self.generator_stop.store(true, Ordering::Release);
    }
}

impl CaptureSession for VirtualCaptureSession {
    fn begin_configuration(&mut self) {
        lock(&self.state).configuring = true;
    }

    fn commit_configuration(&mut self) {
        let mut state = lock(&self.state);
        state.configuring = false;
        state.commits += 1;
    }

    fn is_configuring(&self) -> bool {
        lock(&self.state).configuring
    }

    fn preset(&self) -> SessionPreset {
        lock(&self.state).preset
    }

    fn set_preset(&mut self, preset: SessionPreset) -> BackendResult<()> {
        lock(&self.state).preset = preset;
        Ok(())
    }

    fn discover_devices(&self) -> Vec<CameraDevice> {
        lock(&self.state).devices.clone()
    }

    fn inputs(&self) -> Vec<CameraDevice> {
        lock(&self.state).inputs.clone()
    }

    fn can_add_input(&self, device: &CameraDevice) -> bool {
        let state = lock(&self.state);
        state.inputs.is_empty()
            && state.devices.contains(device)
            && !state.rejected_inputs.contains(&device.id)
    }

    fn add_input(&mut self, device: &CameraDevice) -> BackendResult<()> {
        if !self.can_add_input(device) {
            return Err(BackendError::NotSupported(format!(
                "input {} can't be added",
                device.id
            )));
        }
        lock(&self.state).inputs.push(device.clone());
        Ok(())
    }

    fn remove_input(&mut self, device: &CameraDevice) {
        lock(&self.state).inputs.retain(|d| d != device);
    }

    fn can_add_output(&self, output: OutputKind) -> bool {
        let state = lock(&self.state);
        !state.outputs.contains(&output) && !state.rejected_outputs.contains(&output)
    }

    fn add_output(&mut self, output: OutputKind) -> BackendResult<()> {
        if !self.can_add_output(output) {
            return Err(BackendError::NotSupported(format!("{:?} output", output)));
        }
        lock(&self.state).outputs.push(output);
        Ok(())
    }

    fn remove_output(&mut self, output: OutputKind) {
        let mut state = lock(&self.state);
        state.outputs.retain(|o| *o != output);
        if output == OutputKind::VideoData {
            state.video_connection = None;
        }
    }

    fn has_output(&self, output: OutputKind) -> bool {
        lock(&self.state).outputs.contains(&output)
    }

    fn photo_capabilities(&self) -> PhotoCapabilities {
        lock(&self.state).photo_capabilities.clone()
    }

    fn set_photo_output_options(&mut self, options: PhotoOutputOptions) {
        lock(&self.state).photo_options = options;
    }

    fn photo_output_options(&self) -> PhotoOutputOptions {
        lock(&self.state).photo_options
    }

    fn supports_video_stabilization(&self) -> bool {
        lock(&self.state).stabilization_supported
    }

    fn configure_video_connection(
        &mut self,
        orientation: VideoOrientation,
        stabilization: bool,
    ) -> BackendResult<()> {
        let mut state = lock(&self.state);
        if !state.outputs.contains(&OutputKind::VideoData) {
            return Err(BackendError::NotSupported("no video data output".into()));
        }
        state.video_connection = Some((orientation, stabilization));
        Ok(())
    }

    fn start_running(&mut self) -> BackendResult<()> {
        {
            let mut state = lock(&self.state);
            if state.inputs.is_empty() {
                return Err(BackendError::NotAvailable("session has no input".into()));
            }
            if state.running {
                return Ok(());
            }
            state.running = true;
        }
        info!("Virtual session started");
        if let Some((width, height)) = self.generator {
            self.spawn_generator(width, height)?;
        }
        Ok(())
    }

    fn stop_running(&mut self) {
        self.generator_stop.store(true, Ordering::Release);
        lock(&self.state).running = false;
        info!("Virtual session stopped");
    }

    fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    fn set_frame_sink(&mut self, sink: FrameSink) {
        lock(&self.state).frame_sink = Some(sink);
    }

    fn set_photo_sink(&mut self, sink: PhotoSink) {
        lock(&self.state).photo_sink = Some(sink);
    }

    fn capture_photo(&mut self, settings: &PhotoSettings) -> BackendResult<()> {
        let (sink, frame) = {
            let mut state = lock(&self.state);
            if state.configuring {
                return Err(BackendError::ConfigurationInProgress);
            }
            if !state.outputs.contains(&OutputKind::Photo) {
                return Err(BackendError::NotSupported("photo output not attached".into()));
            }
            if let Some(error) = state.photo_failure.take() {
                return Err(error);
            }
            state.last_photo_settings = Some(settings.clone());
            (state.photo_sink.clone(), state.last_frame.clone())
        };
        let Some(sink) = sink else {
            warn!("No photo sink installed, capture dropped");
            return Ok(());
        };

        let id = settings.unique_id;
        sink(PhotoCaptureEvent::WillCapture { id });

        let image = frame
            .and_then(|f| f.to_rgba_image(false))
            .unwrap_or_else(|| synthetic_frame_image(64, 48));
        let result = encode_jpeg(&image).map_err(|e| BackendError::Other(e.to_string()));
        sink(PhotoCaptureEvent::Processed { id, result });

        if let Some(path) = &settings.live_photo_movie_path {
            match std::fs::write(path, b"virtual live photo movie") {
                Ok(()) => sink(PhotoCaptureEvent::LivePhotoMovieFinished {
                    id,
                    path: path.clone(),
                }),
                Err(e) => warn!(error = %e, "Failed to write live photo movie"),
            }
        }
        sink(PhotoCaptureEvent::Finished { id, error: None });
        Ok(())
    }

    fn lock_device(&mut self, device: &CameraDevice) -> BackendResult<Box<dyn DeviceControl>> {
        let state = lock(&self.state);
        if !state.inputs.contains(device) {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }
        drop(state);
        Ok(Box::new(VirtualDeviceControl::new(Arc::clone(&self.state))))
    }

    fn subscribe_subject_area(&mut self, device: &CameraDevice, sink: SubjectAreaSink) {
        trace!(device = %device.id, "Subject area subscribed");
        lock(&self.state).subject_sink = Some(sink);
    }

    fn unsubscribe_subject_area(&mut self) {
        lock(&self.state).subject_sink = None;
    }
}

fn synthetic_frame_image(width: u32, height: u32) -> image::RgbaImage {
    image::RgbaImage::from_pixel(width, height, image::Rgba([128, 128, 128, 255]))
}

/// Test and demo handle onto a [`VirtualCaptureSession`]
#[derive(Clone)]
pub struct VirtualCameraHandle {
    state: SharedState,
}

impl VirtualCameraHandle {
    /// Deliver a frame; dropped unless the session is running
    pub fn push_frame(&self, frame: CameraFrame) -> bool {
        let sink = {
            let mut state = lock(&self.state);
            if !state.running {
                return false;
            }
            state.last_frame = Some(frame.clone());
            state.frame_sink.clone()
        };
        match sink {
            Some(sink) => {
                sink(frame);
                true
            }
            None => false,
        }
    }

    /// Fire the subject-area callback; only while monitoring is enabled
    pub fn trigger_subject_area_change(&self) -> bool {
        let sink = {
            let state = lock(&self.state);
            if !state.device.monitoring {
                return false;
            }
            state.subject_sink.clone()
        };
        match sink {
            Some(sink) => {
                sink();
                true
            }
            None => false,
        }
    }

    pub fn set_devices(&self, devices: Vec<CameraDevice>) {
        lock(&self.state).devices = devices;
    }

    pub fn reject_input(&self, device_id: &str, rejected: bool) {
        let mut state = lock(&self.state);
        state.rejected_inputs.retain(|id| id != device_id);
        if rejected {
            state.rejected_inputs.push(device_id.to_string());
        }
    }

    pub fn reject_output(&self, output: OutputKind, rejected: bool) {
        let mut state = lock(&self.state);
        state.rejected_outputs.retain(|o| *o != output);
        if rejected {
            state.rejected_outputs.push(output);
        }
    }

    pub fn set_photo_capabilities(&self, capabilities: PhotoCapabilities) {
        lock(&self.state).photo_capabilities = capabilities;
    }

    pub fn set_video_stabilization(&self, supported: bool) {
        lock(&self.state).stabilization_supported = supported;
    }

    pub fn fail_next_photo(&self, error: BackendError) {
        lock(&self.state).photo_failure = Some(error);
    }

    pub fn last_photo_settings(&self) -> Option<PhotoSettings> {
        lock(&self.state).last_photo_settings.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }

    pub fn preset(&self) -> SessionPreset {
        lock(&self.state).preset
    }

    pub fn inputs(&self) -> Vec<CameraDevice> {
        lock(&self.state).inputs.clone()
    }

    pub fn outputs(&self) -> Vec<OutputKind> {
        lock(&self.state).outputs.clone()
    }

    pub fn photo_output_options(&self) -> PhotoOutputOptions {
        lock(&self.state).photo_options
    }

    pub fn video_connection(&self) -> Option<(VideoOrientation, bool)> {
        lock(&self.state).video_connection
    }

    pub fn commits(&self) -> usize {
        lock(&self.state).commits
    }

    pub fn has_subject_area_subscription(&self) -> bool {
        lock(&self.state).subject_sink.is_some()
    }

    pub fn device_state(&self) -> VirtualDeviceState {
        lock(&self.state).device.clone()
    }

    pub fn set_device_state(&self, device: VirtualDeviceState) {
        lock(&self.state).device = device;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_input_at_a_time() {
        let (mut session, _handle) = VirtualCaptureSession::with_default_devices();
        let devices = session.discover_devices();
        assert!(session.can_add_input(&devices[0]));
        session.add_input(&devices[0]).unwrap();
        assert!(!session.can_add_input(&devices[1]));
        session.remove_input(&devices[0]);
        assert!(session.can_add_input(&devices[1]));
    }

    #[test]
    fn test_frames_only_delivered_while_running() {
        let (mut session, handle) = VirtualCaptureSession::with_default_devices();
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        session.set_frame_sink(Arc::new(move |_| *counter.lock().unwrap() += 1));

        assert!(!handle.push_frame(synthetic_frame(8, 8, Duration::ZERO)));
        assert!(session.start_running().is_err());

        let device = session.discover_devices()[0].clone();
        session.add_input(&device).unwrap();
        session.start_running().unwrap();
        assert!(handle.push_frame(synthetic_frame(8, 8, Duration::ZERO)));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_capture_requires_photo_output() {
        let (mut session, _handle) = VirtualCaptureSession::with_default_devices();
        let settings = PhotoSettings {
            unique_id: 1,
            codec: PhotoCodec::Jpeg,
            flash_mode: crate::backends::camera::FlashMode::Off,
            live_photo_movie_path: None,
            depth_delivery_enabled: false,
        };
        assert!(matches!(
            session.capture_photo(&settings),
            Err(BackendError::NotSupported(_))
        ));
    }

    #[test]
    fn test_subject_area_needs_monitoring() {
        let (mut session, handle) = VirtualCaptureSession::with_default_devices();
        let device = session.discover_devices()[0].clone();
        session.subscribe_subject_area(&device, Arc::new(|| {}));
        assert!(!handle.trigger_subject_area_change());

        session.add_input(&device).unwrap();
        let mut control = session.lock_device(&device).unwrap();
        control.set_subject_area_change_monitoring(true);
        assert!(handle.trigger_subject_area_change());
    }
}
