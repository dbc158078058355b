// SPDX-License-Identifier: GPL-3.0-only

//! Capture session coordinator
//!
//! ```text
//!  UI context                         camera-session thread
//! ┌───────────────────┐  dispatch   ┌─────────────────────────────┐
//! │ CameraCoordinator │ ──────────▶ │ SessionContext              │
//! │  mirrors: preset, │             │  CaptureSession             │
//! │  device, setup,   │ ◀────────── │  PhotoCaptureService        │
//! │  flash            │   events    │  VideoRecordingService      │
//! └───────────────────┘             │  QuadrilateralDetector      │
//!                                   └─────────────────────────────┘
//! ```
//!
//! The coordinator keeps UI-side mirrors of session state. They are updated
//! optimistically when a request is made and settled by the completion event
//! as it is pumped through [`CameraCoordinator::next_event`].

pub mod context;
pub mod events;
pub mod executor;

pub use context::{SessionContext, SessionOptions};
pub use events::{CameraEvent, CameraSetupResult, EventSink, event_channel};
pub use executor::{SessionExecutor, SessionQueue};

use crate::backends::camera::gstreamer::GStreamerCaptureSession;
use crate::backends::camera::permission::{PortalPermissionProvider, StaticPermissionProvider};
use crate::backends::camera::{
    CameraBackendType, CameraDevice, CameraFrame, CameraPosition, CaptureSession, ExposureMode,
    FlashMode, FocusMode, FrameSlot, PermissionProvider, Point, SessionPreset,
};
use crate::backends::virtual_camera::VirtualCaptureSession;
use crate::config::Config;
use crate::constants::{files, presets, settings_keys};
use crate::detection::default_detector;
use crate::errors::AppResult;
use crate::pipelines::photo::PhotoCaptureService;
use crate::pipelines::video::{
    AssetWriterFactory, GstAssetWriterFactory, RecordingState, VideoRecordingService,
};
use crate::settings::SettingsStore;
use crate::storage::{DirectoryMediaLibrary, MediaLibrary, default_photo_dir, default_video_dir};
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Snapshot shown while the session reconfigures
pub type FreezeFrame = RgbaImage;

/// Collaborators a coordinator is assembled from
pub struct CoordinatorParts {
    pub session: Box<dyn CaptureSession>,
    pub permission: Arc<dyn PermissionProvider>,
    pub library: Arc<dyn MediaLibrary>,
    pub writer_factory: Arc<dyn AssetWriterFactory>,
    pub settings: SettingsStore,
    /// Home of the recording temp file and live-photo movies
    pub temp_dir: PathBuf,
}

pub struct CameraCoordinator {
    executor: SessionExecutor,
    events: mpsc::UnboundedReceiver<CameraEvent>,
    last_frame: FrameSlot,
    settings: SettingsStore,
    setup_result: CameraSetupResult,
    configuring: bool,
    preset: SessionPreset,
    active_device: Option<CameraDevice>,
    flash_mode: FlashMode,
    recording_state: RecordingState,
}

impl CameraCoordinator {
    pub fn new(parts: CoordinatorParts, config: &Config) -> AppResult<Self> {
        let (sink, events) = event_channel();
        let (queue, receiver) = SessionQueue::new();
        let last_frame = FrameSlot::default();

        let photo = PhotoCaptureService::new(
            Arc::clone(&parts.library),
            parts.temp_dir.clone(),
            sink.clone(),
        );
        let video = VideoRecordingService::new(
            parts.writer_factory,
            parts.library,
            parts.temp_dir.join(files::TEMP_VIDEO_NAME),
            config.bitrate_preset,
            Arc::clone(&last_frame),
            sink.clone(),
            queue.finalize_callback(),
        );
        let detector = config
            .detection_enabled
            .then(|| default_detector(config.detection_max_dimension));
        let options = SessionOptions {
            detect_every_n_frames: config.detect_every_n_frames,
            any_position_fallback: config.any_position_fallback,
        };

        let permission = parts.permission;
        let setup_result = permission.authorization_status().into();
        let context = SessionContext::new(
            parts.session,
            queue.clone(),
            sink,
            permission,
            photo,
            video,
            detector,
            options,
            config.discard_late_frames,
        );
        let executor = SessionExecutor::spawn(context, queue, receiver)?;

        let flash_mode = parts
            .settings
            .get_i64(settings_keys::FLASH_MODE)
            .and_then(FlashMode::from_raw)
            .unwrap_or_default();
        info!(?setup_result, ?flash_mode, "Camera coordinator ready");

        Ok(Self {
            executor,
            events,
            last_frame,
            settings: parts.settings,
            setup_result,
            configuring: false,
            preset: SessionPreset::Photo,
            active_device: None,
            flash_mode,
            recording_state: RecordingState::Idle,
        })
    }

    /// Build the backend named in `config` with the user's directories
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let (session, permission): (Box<dyn CaptureSession>, Arc<dyn PermissionProvider>) =
            match config.backend {
                CameraBackendType::GStreamer => (
                    Box::new(GStreamerCaptureSession::new()?),
                    Arc::new(PortalPermissionProvider::new()),
                ),
                CameraBackendType::Virtual => {
                    let (session, _handle) = VirtualCaptureSession::with_default_devices();
                    (
                        Box::new(session.with_generator(presets::VIDEO_WIDTH, presets::VIDEO_HEIGHT)),
                        Arc::new(StaticPermissionProvider::authorized()),
                    )
                }
            };
        let library = DirectoryMediaLibrary::new(
            config.photo_dir.clone().unwrap_or_else(default_photo_dir),
            config.video_dir.clone().unwrap_or_else(default_video_dir),
        );
        debug!(backend = %config.backend, "Building coordinator");
        Self::new(
            CoordinatorParts {
                session,
                permission,
                library: Arc::new(library),
                writer_factory: Arc::new(GstAssetWriterFactory),
                settings: SettingsStore::open_default(),
                temp_dir: std::env::temp_dir(),
            },
            config,
        )
    }

    // ===== Mirrors =====

    pub fn setup_result(&self) -> CameraSetupResult {
        self.setup_result
    }

    pub fn is_configuring(&self) -> bool {
        self.configuring
    }

    pub fn preset(&self) -> SessionPreset {
        self.preset
    }

    pub fn active_device(&self) -> Option<&CameraDevice> {
        self.active_device.as_ref()
    }

    pub fn flash_mode(&self) -> FlashMode {
        self.flash_mode
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recording_state
    }

    /// Shared handle onto the most recent frame
    pub fn preview(&self) -> FrameSlot {
        Arc::clone(&self.last_frame)
    }

    pub fn latest_frame(&self) -> Option<Arc<CameraFrame>> {
        self.last_frame
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ===== Events =====

    /// Wait for the next event, applying it to the mirrors first
    pub async fn next_event(&mut self) -> Option<CameraEvent> {
        let event = self.events.recv().await?;
        self.apply(&event);
        Some(event)
    }

    pub fn try_next_event(&mut self) -> Option<CameraEvent> {
        let event = self.events.try_recv().ok()?;
        self.apply(&event);
        Some(event)
    }

    fn apply(&mut self, event: &CameraEvent) {
        match event {
            CameraEvent::AccessRequestFinished { granted } => {
                self.setup_result = if *granted {
                    CameraSetupResult::Success
                } else {
                    CameraSetupResult::NotAuthorized
                };
            }
            CameraEvent::ConfigurationFinished { result, device } => {
                self.setup_result = *result;
                self.active_device = device.clone();
            }
            CameraEvent::PresetChanged { preset } => {
                self.preset = *preset;
                self.configuring = false;
            }
            CameraEvent::CameraChanged { device, .. } => {
                self.active_device = device.clone();
                self.configuring = false;
            }
            CameraEvent::RecordingStateChanged { state } => {
                self.recording_state = *state;
            }
            _ => {}
        }
    }

    // ===== Requests =====

    fn dispatch(&self, task: impl FnOnce(&mut SessionContext) + Send + 'static) {
        if !self.executor.queue().dispatch(task) {
            warn!("Session queue is gone, request dropped");
        }
    }

    fn freeze_frame(&self) -> Option<FreezeFrame> {
        let frame = self.latest_frame()?;
        let mirror = self
            .active_device
            .as_ref()
            .is_some_and(|d| d.position == CameraPosition::Front);
        frame.to_rgba_image(mirror)
    }

    pub fn configure_camera(&self) {
        self.dispatch(SessionContext::configure);
    }

    pub fn request_access_to_camera(&self) {
        self.dispatch(SessionContext::request_access);
    }

    /// Toggle photo/video; no-op without an active camera
    pub fn change_camera_preset(&mut self) -> Option<FreezeFrame> {
        self.active_device.as_ref()?;
        let freeze = self.freeze_frame();
        self.configuring = true;
        self.preset = self.preset.toggled();
        let target = self.preset;
        debug!(?target, "Changing preset");
        self.dispatch(move |ctx| ctx.change_preset(target));
        freeze
    }

    /// Switch between back and front cameras
    pub fn change_camera(&mut self) -> Option<FreezeFrame> {
        let freeze = self.freeze_frame();
        self.configuring = true;
        self.dispatch(SessionContext::change_camera);
        freeze
    }

    pub fn focus(
        &self,
        focus_mode: FocusMode,
        exposure_mode: ExposureMode,
        point: Point,
        monitor_subject_area: bool,
    ) {
        self.dispatch(move |ctx| {
            ctx.focus(focus_mode, exposure_mode, point, monitor_subject_area)
        });
    }

    pub fn update_exposure(&self, value: f32) {
        self.dispatch(move |ctx| ctx.update_exposure(value));
    }

    pub fn turn_camera_on(&self) {
        self.dispatch(SessionContext::turn_on);
    }

    pub fn turn_camera_off(&self) -> Option<FreezeFrame> {
        let freeze = self.freeze_frame();
        self.dispatch(SessionContext::turn_off);
        freeze
    }

    /// Cycle off → on → auto and persist the choice
    pub fn change_flash_mode(&mut self) -> FlashMode {
        self.flash_mode = self.flash_mode.next();
        if let Err(e) = self
            .settings
            .set_i64(settings_keys::FLASH_MODE, self.flash_mode.raw())
        {
            warn!(error = %e, "Failed to persist flash mode");
        }
        info!(flash_mode = ?self.flash_mode, "Flash mode changed");
        self.flash_mode
    }

    pub fn capture_photo(&self) {
        let flash_mode = self.flash_mode;
        self.dispatch(move |ctx| ctx.capture_photo(flash_mode, true, true));
    }

    pub fn start_recording(&self) {
        self.dispatch(SessionContext::start_recording);
    }

    pub fn pause_recording(&self) {
        self.dispatch(SessionContext::pause_recording);
    }

    pub fn finish_recording(&self) {
        self.dispatch(SessionContext::finish_recording);
    }
}
