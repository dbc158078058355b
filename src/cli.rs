// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! Photo and video commands drive the same [`CameraCoordinator`] the terminal
//! viewer uses, waiting on its events instead of rendering them.

use quadcam::Config;
use quadcam::backends::camera::gstreamer::GStreamerCaptureSession;
use quadcam::backends::camera::{CameraBackendType, CameraFrame, CaptureSession};
use quadcam::backends::virtual_camera::VirtualCaptureSession;
use quadcam::constants::{format_bitrate, presets};
use quadcam::detection::default_detector;
use quadcam::pipelines::video::RecordingState;
use quadcam::session::{CameraCoordinator, CameraEvent, CameraSetupResult};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How long to wait for any single session response
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Recording finalization may include an encoder flush and a file move
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(30);

const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// List all available cameras
pub fn list_cameras(config: &Config) -> CliResult<()> {
    let session: Box<dyn CaptureSession> = match config.backend {
        CameraBackendType::GStreamer => Box::new(GStreamerCaptureSession::new()?),
        CameraBackendType::Virtual => Box::new(VirtualCaptureSession::with_default_devices().0),
    };
    let devices = session.discover_devices();

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", config.backend);
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device.name);
        println!(
            "      Position: {}, type: {:?}",
            device.position, device.device_type
        );
        if !device.path.is_empty() {
            println!("      Node: {}", device.path);
        }
    }
    Ok(())
}

/// Run the quadrilateral detector on a still image
pub fn detect_image(config: &Config, path: &Path) -> CliResult<()> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    let frame = CameraFrame::from_rgba(width, height, image.into_raw(), Duration::ZERO);

    let detector = default_detector(config.detection_max_dimension);
    let (quadrilateral, is_target_aspect) = detector.detect(&frame);

    println!("Image: {} ({}x{})", path.display(), width, height);
    match quadrilateral {
        Some(quad) => {
            println!("Quadrilateral: {}", quad);
            println!("Perimeter: {:.1}", quad.perimeter());
            if let Some(ratio) = quad.aspect_ratio() {
                println!("Aspect ratio: {:.3}", ratio);
            }
            println!(
                "Target aspect: {}",
                if is_target_aspect { "yes" } else { "no" }
            );
        }
        None => println!("No quadrilateral found."),
    }
    Ok(())
}

/// Take a photo and import it into the photo library
pub fn take_photo(config: &Config, warmup_secs: u64) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut coordinator = CameraCoordinator::from_config(config)?;
        start_camera(&mut coordinator).await?;
        if let Some(device) = coordinator.active_device() {
            println!("Using camera: {}", device);
        }

        tokio::time::sleep(Duration::from_secs(warmup_secs)).await;
        println!("Capturing...");
        coordinator.capture_photo();

        let saved = wait_for(&mut coordinator, EVENT_TIMEOUT, |event| match event {
            CameraEvent::PhotoCaptured {
                error: Some(error), ..
            } => Some(Err(error.clone())),
            CameraEvent::PhotoSaved { result, .. } => Some(result.clone()),
            _ => None,
        })
        .await?;
        coordinator.turn_camera_off();

        let path = saved?;
        println!("Photo saved: {}", path.display());
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Record a video, optionally pausing once, and import it
pub fn record_video(
    config: &Config,
    duration_secs: u64,
    pause_at: Option<u64>,
    pause_for: u64,
) -> CliResult<()> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut coordinator = CameraCoordinator::from_config(config)?;
        start_camera(&mut coordinator).await?;
        if let Some(device) = coordinator.active_device() {
            println!("Using camera: {}", device);
        }

        coordinator.change_camera_preset();
        wait_for(&mut coordinator, EVENT_TIMEOUT, |event| {
            matches!(event, CameraEvent::PresetChanged { .. }).then_some(())
        })
        .await?;

        println!("Duration: {} seconds", duration_secs);
        println!(
            "Bitrate: {} ({})",
            format_bitrate(
                config
                    .bitrate_preset
                    .bitrate_kbps(presets::VIDEO_WIDTH, presets::VIDEO_HEIGHT)
            ),
            config.bitrate_preset.display_name()
        );
        println!("Recording... (press Ctrl+C to stop early)");
        set_recording(&mut coordinator, true).await?;

        let target = Duration::from_secs(duration_secs);
        let pause_point = pause_at.map(Duration::from_secs);
        let mut recorded = Duration::ZERO;
        let mut paused = false;

        while recorded < target {
            if stop_flag.load(Ordering::SeqCst) {
                println!();
                println!("Stopping early...");
                break;
            }
            if !paused && pause_point.is_some_and(|at| recorded >= at) {
                paused = true;
                print!("\rPaused for {} seconds...        ", pause_for);
                std::io::Write::flush(&mut std::io::stdout())?;
                set_recording(&mut coordinator, false).await?;
                tokio::time::sleep(Duration::from_secs(pause_for)).await;
                set_recording(&mut coordinator, true).await?;
                continue;
            }

            let elapsed = recorded.as_secs();
            print!("\rRecording: {:02}:{:02}", elapsed / 60, elapsed % 60);
            std::io::Write::flush(&mut std::io::stdout())?;

            tokio::time::sleep(PROGRESS_TICK).await;
            recorded += PROGRESS_TICK;
            while coordinator.try_next_event().is_some() {}
        }
        println!();

        coordinator.finish_recording();
        let finished = wait_for(&mut coordinator, FINALIZE_TIMEOUT, |event| match event {
            CameraEvent::RecordingFinished { result } => Some(result.clone()),
            _ => None,
        })
        .await?;
        coordinator.turn_camera_off();

        let path = finished?;
        println!("Video saved: {}", path.display());
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}

/// Authorize, configure and start the session
async fn start_camera(coordinator: &mut CameraCoordinator) -> CliResult<()> {
    if coordinator.setup_result() == CameraSetupResult::NotDetermined {
        coordinator.request_access_to_camera();
        let granted = wait_for(coordinator, EVENT_TIMEOUT, |event| match event {
            CameraEvent::AccessRequestFinished { granted } => Some(*granted),
            _ => None,
        })
        .await?;
        if !granted {
            return Err("Camera access denied".into());
        }
    }

    coordinator.configure_camera();
    let result = wait_for(coordinator, EVENT_TIMEOUT, |event| match event {
        CameraEvent::ConfigurationFinished { result, .. } => Some(*result),
        _ => None,
    })
    .await?;
    if result != CameraSetupResult::Success {
        return Err(format!("Camera setup failed: {:?}", result).into());
    }

    coordinator.turn_camera_on();
    let running = wait_for(coordinator, EVENT_TIMEOUT, |event| match event {
        CameraEvent::CameraStarted { running } => Some(*running),
        _ => None,
    })
    .await?;
    if !running {
        return Err("Camera failed to start".into());
    }
    Ok(())
}

/// Start (or resume) and pause, waiting for the state to settle
async fn set_recording(coordinator: &mut CameraCoordinator, recording: bool) -> CliResult<()> {
    let want = if recording {
        coordinator.start_recording();
        RecordingState::Recording
    } else {
        coordinator.pause_recording();
        RecordingState::Paused
    };
    if coordinator.recording_state() == want {
        return Ok(());
    }
    wait_for(coordinator, EVENT_TIMEOUT, |event| match event {
        CameraEvent::RecordingStateChanged { state } if *state == want => Some(()),
        _ => None,
    })
    .await
}

/// Pump events until `matcher` picks one
async fn wait_for<T>(
    coordinator: &mut CameraCoordinator,
    timeout: Duration,
    mut matcher: impl FnMut(&CameraEvent) -> Option<T>,
) -> CliResult<T> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let event = tokio::time::timeout_at(deadline, coordinator.next_event())
            .await
            .map_err(|_| "Timed out waiting for the camera")?
            .ok_or("Camera session ended")?;
        if let Some(value) = matcher(&event) {
            return Ok(value);
        }
    }
}
