// SPDX-License-Identifier: MPL-2.0

//! Capture session abstraction
//!
//! ```text
//! ┌──────────────────────┐
//! │  CameraCoordinator   │  ← UI-side handle
//! └──────────┬───────────┘
//!            │ serial session queue
//!            ▼
//! ┌──────────────────────┐
//! │ CaptureSession trait │  ← inputs, outputs, presets, running state
//! └──────────┬───────────┘
//!            │
//!      ┌─────┴──────┐
//!      ▼            ▼
//! ┌─────────┐  ┌─────────┐
//! │GStreamer│  │ Virtual │
//! └─────────┘  └─────────┘
//! ```
//!
//! Structural changes (preset, inputs, outputs) must happen between
//! [`CaptureSession::begin_configuration`] and
//! [`CaptureSession::commit_configuration`]; use
//! [`transaction::ConfigurationTransaction`] to keep the pair balanced.

pub mod discovery;
pub mod gstreamer;
pub mod permission;
pub mod transaction;
pub mod types;
pub mod v4l2_controls;

pub use discovery::select_device;
pub use permission::{AuthorizationStatus, PermissionProvider};
pub use transaction::ConfigurationTransaction;
pub use types::*;

/// A single shared capture session
///
/// Implementations are owned by the session queue and are never touched from
/// another thread, so only `Send` is required.
pub trait CaptureSession: Send {
    // ===== Configuration =====

    fn begin_configuration(&mut self);

    /// Apply every change made since `begin_configuration`
    fn commit_configuration(&mut self);

    fn is_configuring(&self) -> bool;

    fn preset(&self) -> SessionPreset;

    fn set_preset(&mut self, preset: SessionPreset) -> BackendResult<()>;

    // ===== Devices and inputs =====

    /// Discover the capture devices currently present
    fn discover_devices(&self) -> Vec<CameraDevice>;

    fn inputs(&self) -> Vec<CameraDevice>;

    fn can_add_input(&self, device: &CameraDevice) -> bool;

    fn add_input(&mut self, device: &CameraDevice) -> BackendResult<()>;

    fn remove_input(&mut self, device: &CameraDevice);

    // ===== Outputs =====

    fn can_add_output(&self, output: OutputKind) -> bool;

    fn add_output(&mut self, output: OutputKind) -> BackendResult<()>;

    fn remove_output(&mut self, output: OutputKind);

    fn has_output(&self, output: OutputKind) -> bool;

    fn photo_capabilities(&self) -> PhotoCapabilities;

    fn set_photo_output_options(&mut self, options: PhotoOutputOptions);

    fn photo_output_options(&self) -> PhotoOutputOptions;

    fn supports_video_stabilization(&self) -> bool;

    /// Configure the video-data output connection
    fn configure_video_connection(
        &mut self,
        orientation: VideoOrientation,
        stabilization: bool,
    ) -> BackendResult<()>;

    // ===== Running =====

    fn start_running(&mut self) -> BackendResult<()>;

    fn stop_running(&mut self);

    fn is_running(&self) -> bool;

    /// Install the receiver for video-data output frames
    fn set_frame_sink(&mut self, sink: FrameSink);

    /// Install the receiver for photo request notifications
    fn set_photo_sink(&mut self, sink: PhotoSink);

    // ===== Capture =====

    /// Issue a one-shot photo request
    ///
    /// Notifications for `settings.unique_id` arrive through the photo sink.
    /// Fails with [`BackendError::ConfigurationInProgress`] while a
    /// configuration transaction is open.
    fn capture_photo(&mut self, settings: &PhotoSettings) -> BackendResult<()>;

    // ===== Device control =====

    /// Lock a device for configuration
    fn lock_device(&mut self, device: &CameraDevice) -> BackendResult<Box<dyn DeviceControl>>;

    /// Route subject-area-change notifications for `device` to `sink`
    fn subscribe_subject_area(&mut self, device: &CameraDevice, sink: SubjectAreaSink);

    fn unsubscribe_subject_area(&mut self);
}

/// Focus and exposure control for a locked device
pub trait DeviceControl: Send {
    fn exposure_bias_range(&self) -> ExposureBiasRange;

    fn is_focus_point_of_interest_supported(&self) -> bool;

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool;

    fn set_focus(&mut self, mode: FocusMode, point: Point) -> BackendResult<()>;

    fn is_exposure_point_of_interest_supported(&self) -> bool;

    fn is_exposure_mode_supported(&self, mode: ExposureMode) -> bool;

    fn set_exposure(&mut self, mode: ExposureMode, point: Point) -> BackendResult<()>;

    fn set_subject_area_change_monitoring(&mut self, enabled: bool);

    fn set_exposure_target_bias(&mut self, bias: f32) -> BackendResult<()>;
}

/// Which capture session implementation to build
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub enum CameraBackendType {
    /// GStreamer device monitor + appsink pipeline
    #[default]
    GStreamer,
    /// In-process synthetic session
    Virtual,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::GStreamer => write!(f, "GStreamer"),
            CameraBackendType::Virtual => write!(f, "Virtual"),
        }
    }
}
