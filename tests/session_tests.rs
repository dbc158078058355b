// SPDX-License-Identifier: GPL-3.0-only

//! Coordinator tests against the virtual capture session

use quadcam::Config;
use quadcam::backends::camera::permission::StaticPermissionProvider;
use quadcam::backends::camera::{
    AuthorizationStatus, CameraDevice, CameraPosition, DeviceType, ExposureMode, FlashMode,
    FocusMode, OutputKind, PermissionProvider, Point, SessionPreset, VideoOrientation,
};
use quadcam::backends::virtual_camera::{
    MemoryWriterFactory, VirtualCameraHandle, VirtualCaptureSession, WrittenFrames,
    synthetic_frame,
};
use quadcam::pipelines::video::RecordingState;
use quadcam::session::{CameraCoordinator, CameraEvent, CameraSetupResult, CoordinatorParts};
use quadcam::settings::SettingsStore;
use quadcam::storage::DirectoryMediaLibrary;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

struct Harness {
    coordinator: CameraCoordinator,
    handle: VirtualCameraHandle,
    written: WrittenFrames,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with(
            VirtualCaptureSession::with_default_devices(),
            StaticPermissionProvider::authorized(),
        )
    }

    fn with(
        (session, handle): (VirtualCaptureSession, VirtualCameraHandle),
        permission: StaticPermissionProvider,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let written = factory.written();
        let coordinator =
            build_coordinator_with_writer(&dir, session, Arc::new(permission), factory);
        Self {
            coordinator,
            handle,
            written,
            dir,
        }
    }

    fn photo_dir(&self) -> PathBuf {
        self.dir.path().join("photos")
    }

    fn video_dir(&self) -> PathBuf {
        self.dir.path().join("videos")
    }

    async fn expect<T>(&mut self, mut matcher: impl FnMut(&CameraEvent) -> Option<T>) -> T {
        let wait = async {
            loop {
                let event = self.coordinator.next_event().await.expect("event channel open");
                if let Some(value) = matcher(&event) {
                    return value;
                }
            }
        };
        tokio::time::timeout(EVENT_TIMEOUT, wait)
            .await
            .expect("timed out waiting for event")
    }

    async fn configure(&mut self) -> CameraSetupResult {
        self.coordinator.configure_camera();
        self.expect(|e| match e {
            CameraEvent::ConfigurationFinished { result, .. } => Some(*result),
            _ => None,
        })
        .await
    }

    async fn turn_on(&mut self) -> bool {
        self.coordinator.turn_camera_on();
        self.expect(|e| match e {
            CameraEvent::CameraStarted { running } => Some(*running),
            _ => None,
        })
        .await
    }

    async fn toggle_preset(&mut self) -> SessionPreset {
        self.coordinator.change_camera_preset();
        self.expect(|e| match e {
            CameraEvent::PresetChanged { preset } => Some(*preset),
            _ => None,
        })
        .await
    }

    /// Wait until every previously dispatched request has run
    async fn barrier(&mut self) {
        self.turn_on().await;
    }

    async fn recording_state(&mut self, want: RecordingState) {
        self.expect(|e| match e {
            CameraEvent::RecordingStateChanged { state } if *state == want => Some(()),
            _ => None,
        })
        .await;
        assert_eq!(self.coordinator.recording_state(), want);
    }

    fn push(&self, pts_ms: u64) {
        let frame = synthetic_frame(64, 48, Duration::from_millis(pts_ms));
        assert!(self.handle.push_frame(frame), "session not running");
    }
}

fn test_config() -> Config {
    Config {
        discard_late_frames: false,
        ..Config::default()
    }
}

fn build_coordinator(
    dir: &TempDir,
    session: VirtualCaptureSession,
    permission: Arc<dyn PermissionProvider>,
) -> CameraCoordinator {
    build_coordinator_with_writer(dir, session, permission, MemoryWriterFactory::new())
}

fn build_coordinator_with_writer(
    dir: &TempDir,
    session: VirtualCaptureSession,
    permission: Arc<dyn PermissionProvider>,
    writer_factory: MemoryWriterFactory,
) -> CameraCoordinator {
    let parts = CoordinatorParts {
        session: Box::new(session),
        permission,
        library: Arc::new(DirectoryMediaLibrary::new(
            dir.path().join("photos"),
            dir.path().join("videos"),
        )),
        writer_factory: Arc::new(writer_factory),
        settings: SettingsStore::open(dir.path().join("settings.json")),
        temp_dir: dir.path().to_path_buf(),
    };
    CameraCoordinator::new(parts, &test_config()).unwrap()
}

fn device(id: &str, position: CameraPosition, device_type: DeviceType) -> CameraDevice {
    CameraDevice {
        id: id.to_string(),
        name: id.to_string(),
        position,
        device_type,
        path: String::new(),
    }
}

#[tokio::test]
async fn test_configure_attaches_back_wide_camera() {
    let mut h = Harness::new();
    assert_eq!(h.coordinator.setup_result(), CameraSetupResult::Success);

    assert_eq!(h.configure().await, CameraSetupResult::Success);
    let active = h.coordinator.active_device().cloned().unwrap();
    assert_eq!(active.position, CameraPosition::Back);
    assert_eq!(active.device_type, DeviceType::WideAngle);

    assert_eq!(h.handle.inputs(), vec![active]);
    let outputs = h.handle.outputs();
    assert!(outputs.contains(&OutputKind::VideoData));
    assert!(outputs.contains(&OutputKind::Photo));
    assert_eq!(h.handle.preset(), SessionPreset::Photo);
    assert_eq!(h.handle.commits(), 1);

    let options = h.handle.photo_output_options();
    assert!(options.depth_delivery_enabled);
    assert!(options.live_photo_enabled);
}

#[tokio::test]
async fn test_configure_without_authorization_still_reports() {
    let mut h = Harness::with(
        VirtualCaptureSession::with_default_devices(),
        StaticPermissionProvider::new(AuthorizationStatus::Denied, false),
    );
    assert_eq!(h.configure().await, CameraSetupResult::NotAuthorized);
    assert!(h.coordinator.active_device().is_none());
    assert!(h.handle.inputs().is_empty());
    assert_eq!(h.handle.commits(), 0);
}

#[tokio::test]
async fn test_configure_without_back_camera_fails() {
    let devices = vec![device("front", CameraPosition::Front, DeviceType::WideAngle)];
    let mut h = Harness::with(
        VirtualCaptureSession::with_devices(devices),
        StaticPermissionProvider::authorized(),
    );
    assert_eq!(h.configure().await, CameraSetupResult::ConfigurationFailed);
    // The transaction is still committed
    assert_eq!(h.handle.commits(), 1);
}

#[tokio::test]
async fn test_access_request_updates_setup_result() {
    let mut h = Harness::with(
        VirtualCaptureSession::with_default_devices(),
        StaticPermissionProvider::new(AuthorizationStatus::NotDetermined, true),
    );
    assert_eq!(h.coordinator.setup_result(), CameraSetupResult::NotDetermined);

    h.coordinator.request_access_to_camera();
    let granted = h
        .expect(|e| match e {
            CameraEvent::AccessRequestFinished { granted } => Some(*granted),
            _ => None,
        })
        .await;
    assert!(granted);
    assert_eq!(h.coordinator.setup_result(), CameraSetupResult::Success);
    assert_eq!(h.configure().await, CameraSetupResult::Success);
}

#[tokio::test]
async fn test_access_denied() {
    let mut h = Harness::with(
        VirtualCaptureSession::with_default_devices(),
        StaticPermissionProvider::new(AuthorizationStatus::NotDetermined, false),
    );
    h.coordinator.request_access_to_camera();
    let granted = h
        .expect(|e| match e {
            CameraEvent::AccessRequestFinished { granted } => Some(*granted),
            _ => None,
        })
        .await;
    assert!(!granted);
    assert_eq!(h.configure().await, CameraSetupResult::NotAuthorized);
}

#[tokio::test]
async fn test_preset_change_requires_active_camera() {
    let mut h = Harness::new();
    assert!(h.coordinator.change_camera_preset().is_none());
    assert!(!h.coordinator.is_configuring());
    assert_eq!(h.coordinator.preset(), SessionPreset::Photo);
}

#[tokio::test]
async fn test_preset_round_trip_restores_photo_output() {
    let mut h = Harness::new();
    h.configure().await;

    assert_eq!(h.toggle_preset().await, SessionPreset::Video);
    assert!(!h.coordinator.is_configuring());
    assert_eq!(h.handle.preset(), SessionPreset::Video);
    assert!(!h.handle.outputs().contains(&OutputKind::Photo));
    assert_eq!(
        h.handle.video_connection(),
        Some((VideoOrientation::Portrait, true))
    );

    assert_eq!(h.toggle_preset().await, SessionPreset::Photo);
    assert!(h.handle.outputs().contains(&OutputKind::Photo));
    let options = h.handle.photo_output_options();
    assert!(options.depth_delivery_enabled);
    assert!(options.live_photo_enabled);
}

#[tokio::test]
async fn test_preset_change_returns_freeze_frame() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;
    h.push(0);
    h.barrier().await;

    let freeze = h.coordinator.change_camera_preset().unwrap();
    assert_eq!(freeze.dimensions(), (64, 48));
    assert!(h.coordinator.is_configuring());
}

#[tokio::test]
async fn test_change_camera_switches_position() {
    let mut h = Harness::new();
    h.configure().await;

    h.coordinator.change_camera();
    let (device, switched) = h
        .expect(|e| match e {
            CameraEvent::CameraChanged { device, switched } => Some((device.clone(), *switched)),
            _ => None,
        })
        .await;
    assert!(switched);
    let device = device.unwrap();
    assert_eq!(device.position, CameraPosition::Front);
    assert_eq!(device.device_type, DeviceType::TrueDepth);
    assert_eq!(h.handle.inputs(), vec![device.clone()]);
    assert_eq!(h.coordinator.active_device(), Some(&device));

    // Back again prefers the dual camera
    h.coordinator.change_camera();
    let device = h
        .expect(|e| match e {
            CameraEvent::CameraChanged { device, .. } => device.clone(),
            _ => None,
        })
        .await;
    assert_eq!(device.position, CameraPosition::Back);
    assert_eq!(device.device_type, DeviceType::Dual);
}

#[tokio::test]
async fn test_change_camera_without_alternative_keeps_input() {
    let devices = vec![device("back", CameraPosition::Back, DeviceType::WideAngle)];
    let mut h = Harness::with(
        VirtualCaptureSession::with_devices(devices),
        StaticPermissionProvider::authorized(),
    );
    h.configure().await;
    let before = h.handle.inputs();
    let commits = h.handle.commits();

    h.coordinator.change_camera();
    let (device, switched) = h
        .expect(|e| match e {
            CameraEvent::CameraChanged { device, switched } => Some((device.clone(), *switched)),
            _ => None,
        })
        .await;
    assert!(!switched);
    assert_eq!(device.as_ref(), before.first());
    assert_eq!(h.handle.inputs(), before);
    assert_eq!(h.handle.commits(), commits);
    assert!(!h.coordinator.is_configuring());
}

#[tokio::test]
async fn test_change_camera_restores_input_when_rejected() {
    let mut h = Harness::new();
    h.configure().await;
    h.handle.reject_input("virtual-front", true);
    let before = h.handle.inputs();

    h.coordinator.change_camera();
    let switched = h
        .expect(|e| match e {
            CameraEvent::CameraChanged { switched, .. } => Some(*switched),
            _ => None,
        })
        .await;
    assert!(!switched);
    assert_eq!(h.handle.inputs(), before);
}

#[tokio::test]
async fn test_exposure_maps_onto_bias_range() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;

    h.coordinator.update_exposure(0.5);
    h.barrier().await;
    let state = h.handle.device_state();
    assert!((state.target_bias.unwrap() - 1.32).abs() < 1e-4);
    assert!(!state.monitoring);

    h.coordinator.update_exposure(-0.5);
    h.barrier().await;
    assert!((h.handle.device_state().target_bias.unwrap() + 1.32).abs() < 1e-4);

    h.coordinator.update_exposure(0.0);
    h.barrier().await;
    assert_eq!(h.handle.device_state().target_bias, Some(0.0));
}

#[tokio::test]
async fn test_focus_then_subject_area_change_recenters() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;
    assert!(h.handle.has_subject_area_subscription());

    let point = Point::new(0.2, 0.7);
    h.coordinator
        .focus(FocusMode::AutoFocus, ExposureMode::AutoExpose, point, true);
    h.barrier().await;
    let state = h.handle.device_state();
    assert_eq!(state.focus, Some((FocusMode::AutoFocus, point)));
    assert_eq!(state.exposure, Some((ExposureMode::AutoExpose, point)));
    assert!(state.monitoring);

    assert!(h.handle.trigger_subject_area_change());
    h.expect(|e| matches!(e, CameraEvent::SubjectAreaChanged).then_some(()))
        .await;
    h.barrier().await;

    let state = h.handle.device_state();
    assert_eq!(
        state.focus,
        Some((FocusMode::ContinuousAutoFocus, Point::center()))
    );
    assert_eq!(
        state.exposure,
        Some((ExposureMode::ContinuousAutoExposure, Point::center()))
    );
    assert!(!state.monitoring);
    assert!(!h.handle.trigger_subject_area_change());
}

#[tokio::test]
async fn test_turn_off_stops_session() {
    let mut h = Harness::new();
    h.configure().await;
    assert!(h.turn_on().await);
    assert!(h.handle.is_running());

    h.coordinator.turn_camera_off();
    h.expect(|e| matches!(e, CameraEvent::CameraStopped).then_some(()))
        .await;
    assert!(!h.handle.is_running());
    assert!(!h.handle.has_subject_area_subscription());
}

#[tokio::test]
async fn test_turn_on_without_configuration_stays_stopped() {
    let mut h = Harness::new();
    // No input attached yet, so the session refuses to start
    assert!(!h.turn_on().await);
}

#[tokio::test]
async fn test_flash_mode_cycles_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let (session, _handle) = VirtualCaptureSession::with_default_devices();
    let mut coordinator =
        build_coordinator(&dir, session, Arc::new(StaticPermissionProvider::authorized()));
    assert_eq!(coordinator.flash_mode(), FlashMode::Off);
    assert_eq!(coordinator.change_flash_mode(), FlashMode::On);
    assert_eq!(coordinator.change_flash_mode(), FlashMode::Auto);
    drop(coordinator);

    let (session, _handle) = VirtualCaptureSession::with_default_devices();
    let mut coordinator =
        build_coordinator(&dir, session, Arc::new(StaticPermissionProvider::authorized()));
    assert_eq!(coordinator.flash_mode(), FlashMode::Auto);
    assert_eq!(coordinator.change_flash_mode(), FlashMode::Off);
}

#[tokio::test]
async fn test_frames_produce_detections() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;

    h.handle
        .push_frame(synthetic_frame(320, 240, Duration::ZERO));
    let (quad, is_target) = h
        .expect(|e| match e {
            CameraEvent::QuadrilateralDetected {
                quadrilateral,
                is_target_aspect,
            } => Some((*quadrilateral, *is_target_aspect)),
            _ => None,
        })
        .await;
    let quad = quad.unwrap();
    assert!(is_target);
    assert_eq!(quad.frame_size.width, 320.0);
    assert!(h.coordinator.latest_frame().is_some());
}

#[tokio::test]
async fn test_photo_is_saved_with_paired_movie() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;
    h.coordinator.change_flash_mode();
    h.push(0);

    h.coordinator.capture_photo();
    let id = h
        .expect(|e| match e {
            CameraEvent::PhotoWillCapture { id } => Some(*id),
            _ => None,
        })
        .await;
    let preview = h
        .expect(|e| match e {
            CameraEvent::PhotoCaptured { id: got, error, preview, .. } if *got == id => {
                assert!(error.is_none());
                Some(preview.clone())
            }
            _ => None,
        })
        .await;
    assert_eq!(preview.unwrap().dimensions(), (64, 48));

    let path = h
        .expect(|e| match e {
            CameraEvent::PhotoSaved { result, .. } => Some(result.clone()),
            _ => None,
        })
        .await
        .unwrap();
    assert!(path.starts_with(h.photo_dir()));
    assert_eq!(path.extension().unwrap(), "jpg");
    assert!(path.with_extension("mov").exists());

    let settings = h.handle.last_photo_settings().unwrap();
    assert_eq!(settings.flash_mode, FlashMode::On);
    assert!(settings.depth_delivery_enabled);
    assert!(settings.live_photo_movie_path.is_some());
}

#[tokio::test]
async fn test_recording_pause_removes_gap() {
    let mut h = Harness::new();
    h.configure().await;
    h.turn_on().await;
    h.toggle_preset().await;

    h.push(0);
    h.push(33);
    h.coordinator.start_recording();
    h.recording_state(RecordingState::Recording).await;
    h.push(100);
    h.push(133);

    h.coordinator.pause_recording();
    h.recording_state(RecordingState::Paused).await;
    h.push(500);
    h.push(800);

    h.coordinator.start_recording();
    h.recording_state(RecordingState::Recording).await;
    h.push(833);
    h.push(866);

    h.coordinator.finish_recording();
    h.recording_state(RecordingState::Idle).await;
    let path = h
        .expect(|e| match e {
            CameraEvent::RecordingFinished { result } => Some(result.clone()),
            _ => None,
        })
        .await
        .unwrap();
    assert!(path.starts_with(h.video_dir()));

    let written = h.written.lock().unwrap().clone();
    let ms: Vec<u128> = written.iter().map(|d| d.as_millis()).collect();
    assert_eq!(ms, vec![100, 133, 166, 199]);
}

#[tokio::test]
async fn test_start_recording_needs_a_frame() {
    let mut h = Harness::new();
    h.configure().await;
    h.coordinator.start_recording();
    h.barrier().await;
    assert_eq!(h.coordinator.recording_state(), RecordingState::Idle);
    assert!(h.written.lock().unwrap().is_empty());
}
