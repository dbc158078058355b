// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer capture session
//!
//! Devices come from the GStreamer device monitor. The session runs a single
//! preview pipeline sized by the preset; photos are taken from the next
//! delivered frame. Focus and exposure go straight to the V4L2 node.

mod enumeration;
mod pipeline;

pub use enumeration::enumerate_devices;
pub use pipeline::{CapturePipeline, SubjectAreaMonitor, mean_luma};

use super::types::*;
use super::v4l2_controls::V4l2DeviceControl;
use super::{CaptureSession, DeviceControl};
use gstreamer as gst;
use gstreamer::prelude::DeviceExt;
use pipeline::StreamShared;
use tracing::{debug, error, info};

pub struct GStreamerCaptureSession {
    configuring: bool,
    preset: SessionPreset,
    inputs: Vec<CameraDevice>,
    outputs: Vec<OutputKind>,
    photo_options: PhotoOutputOptions,
    video_connection: Option<(VideoOrientation, bool)>,
    shared: StreamShared,
    pipeline: Option<CapturePipeline>,
}

impl GStreamerCaptureSession {
    pub fn new() -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;
        Ok(Self {
            configuring: false,
            preset: SessionPreset::Photo,
            inputs: Vec::new(),
            outputs: Vec::new(),
            photo_options: PhotoOutputOptions::default(),
            video_connection: None,
            shared: StreamShared::default(),
            pipeline: None,
        })
    }

    fn source_element(device: &CameraDevice) -> BackendResult<gst::Element> {
        let from_monitor = enumerate_devices()
            .into_iter()
            .find(|(d, _)| d.id == device.id)
            .and_then(|(_, gst_device)| gst_device.create_element(None).ok());
        if let Some(element) = from_monitor {
            return Ok(element);
        }
        if device.path.is_empty() {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }
        debug!(path = %device.path, "Falling back to v4l2src");
        gst::ElementFactory::make("v4l2src")
            .property("device", &device.path)
            .build()
            .map_err(|e| BackendError::InitializationFailed(format!("v4l2src: {}", e)))
    }

    fn build_pipeline(&mut self) -> BackendResult<()> {
        let device = self
            .inputs
            .first()
            .cloned()
            .ok_or_else(|| BackendError::NotAvailable("session has no input".into()))?;
        // Release the device before opening it again
        self.pipeline = None;
        let (width, height) = self.preset.dimensions();
        let source = Self::source_element(&device)?;
        info!(device = %device, width, height, "Starting capture pipeline");
        self.pipeline = Some(CapturePipeline::new(
            source,
            width,
            height,
            self.shared.clone(),
        )?);
        Ok(())
    }
}

impl CaptureSession for GStreamerCaptureSession {
    fn begin_configuration(&mut self) {
        self.configuring = true;
    }

    fn commit_configuration(&mut self) {
        self.configuring = false;
        if self.pipeline.is_some()
            && let Err(e) = self.build_pipeline()
        {
            error!(error = %e, "Failed to apply configuration");
            self.pipeline = None;
            self.shared.abandon_pending_photo(BackendError::NotRunning);
        }
    }

    fn is_configuring(&self) -> bool {
        self.configuring
    }

    fn preset(&self) -> SessionPreset {
        self.preset
    }

    fn set_preset(&mut self, preset: SessionPreset) -> BackendResult<()> {
        self.preset = preset;
        Ok(())
    }

    fn discover_devices(&self) -> Vec<CameraDevice> {
        enumerate_devices().into_iter().map(|(d, _)| d).collect()
    }

    fn inputs(&self) -> Vec<CameraDevice> {
        self.inputs.clone()
    }

    fn can_add_input(&self, _device: &CameraDevice) -> bool {
        self.inputs.is_empty()
    }

    fn add_input(&mut self, device: &CameraDevice) -> BackendResult<()> {
        if !self.can_add_input(device) {
            return Err(BackendError::NotSupported(format!(
                "input {} can't be added",
                device.id
            )));
        }
        self.inputs.push(device.clone());
        Ok(())
    }

    fn remove_input(&mut self, device: &CameraDevice) {
        self.inputs.retain(|d| d != device);
    }

    fn can_add_output(&self, output: OutputKind) -> bool {
        !self.outputs.contains(&output)
    }

    fn add_output(&mut self, output: OutputKind) -> BackendResult<()> {
        if !self.can_add_output(output) {
            return Err(BackendError::NotSupported(format!("{:?} output", output)));
        }
        self.outputs.push(output);
        Ok(())
    }

    fn remove_output(&mut self, output: OutputKind) {
        self.outputs.retain(|o| *o != output);
        if output == OutputKind::VideoData {
            self.video_connection = None;
        }
    }

    fn has_output(&self, output: OutputKind) -> bool {
        self.outputs.contains(&output)
    }

    fn photo_capabilities(&self) -> PhotoCapabilities {
        PhotoCapabilities {
            depth_delivery_supported: false,
            live_photo_supported: false,
            available_codecs: vec![PhotoCodec::Jpeg],
        }
    }

    fn set_photo_output_options(&mut self, options: PhotoOutputOptions) {
        self.photo_options = options;
    }

    fn photo_output_options(&self) -> PhotoOutputOptions {
        self.photo_options
    }

    fn supports_video_stabilization(&self) -> bool {
        false
    }

    fn configure_video_connection(
        &mut self,
        orientation: VideoOrientation,
        stabilization: bool,
    ) -> BackendResult<()> {
        if !self.has_output(OutputKind::VideoData) {
            return Err(BackendError::NotSupported("no video data output".into()));
        }
        // Frames are delivered as the sensor produces them
        self.video_connection = Some((orientation, stabilization));
        Ok(())
    }

    fn start_running(&mut self) -> BackendResult<()> {
        if self.pipeline.is_some() {
            return Ok(());
        }
        self.build_pipeline()
    }

    fn stop_running(&mut self) {
        if self.pipeline.take().is_some() {
            info!("Capture pipeline stopped");
        }
        self.shared.abandon_pending_photo(BackendError::NotRunning);
    }

    fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    fn set_frame_sink(&mut self, sink: FrameSink) {
        *self
            .shared
            .frame_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    fn set_photo_sink(&mut self, sink: PhotoSink) {
        *self
            .shared
            .photo_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    fn capture_photo(&mut self, settings: &PhotoSettings) -> BackendResult<()> {
        if self.configuring {
            return Err(BackendError::ConfigurationInProgress);
        }
        if !self.has_output(OutputKind::Photo) {
            return Err(BackendError::NotSupported("photo output not attached".into()));
        }
        if self.pipeline.is_none() {
            return Err(BackendError::NotRunning);
        }
        self.shared.queue_photo(settings)
    }

    fn lock_device(&mut self, device: &CameraDevice) -> BackendResult<Box<dyn DeviceControl>> {
        if !self.inputs.contains(device) {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }
        if device.path.is_empty() {
            return Err(BackendError::NotSupported(format!(
                "{} has no V4L2 node",
                device.name
            )));
        }
        let control = V4l2DeviceControl::open(&device.path, self.shared.monitoring.clone())?;
        Ok(Box::new(control))
    }

    fn subscribe_subject_area(&mut self, device: &CameraDevice, sink: SubjectAreaSink) {
        debug!(device = %device.id, "Subject area subscribed");
        *self
            .shared
            .subject_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    fn unsubscribe_subject_area(&mut self) {
        *self
            .shared
            .subject_sink
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }
}
