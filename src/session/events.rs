// SPDX-License-Identifier: GPL-3.0-only

//! Notifications from the session queue to the UI context

use crate::backends::camera::{CameraDevice, SessionPreset};
use crate::detection::Quadrilateral;
use crate::errors::{PhotoError, RecordingError};
use crate::pipelines::video::RecordingState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Outcome of authorization and session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraSetupResult {
    Success,
    #[default]
    NotDetermined,
    NotAuthorized,
    ConfigurationFailed,
}

impl From<crate::backends::camera::AuthorizationStatus> for CameraSetupResult {
    fn from(status: crate::backends::camera::AuthorizationStatus) -> Self {
        use crate::backends::camera::AuthorizationStatus;
        match status {
            AuthorizationStatus::Authorized => CameraSetupResult::Success,
            AuthorizationStatus::NotDetermined => CameraSetupResult::NotDetermined,
            AuthorizationStatus::Denied => CameraSetupResult::NotAuthorized,
        }
    }
}

#[derive(Debug)]
pub enum CameraEvent {
    AccessRequestFinished {
        granted: bool,
    },
    ConfigurationFinished {
        result: CameraSetupResult,
        device: Option<CameraDevice>,
    },
    CameraStarted {
        running: bool,
    },
    CameraStopped,
    PresetChanged {
        preset: SessionPreset,
    },
    /// `switched` is false when no device matched and nothing changed
    CameraChanged {
        device: Option<CameraDevice>,
        switched: bool,
    },
    QuadrilateralDetected {
        quadrilateral: Option<Quadrilateral>,
        is_target_aspect: bool,
    },
    SubjectAreaChanged,
    PhotoWillCapture {
        id: u64,
    },
    PhotoCaptured {
        id: u64,
        error: Option<PhotoError>,
        preview: Option<Arc<image::RgbaImage>>,
        data: Option<Arc<[u8]>>,
    },
    PhotoSaved {
        id: u64,
        result: Result<PathBuf, PhotoError>,
    },
    RecordingStateChanged {
        state: RecordingState,
    },
    RecordingFinished {
        result: Result<PathBuf, RecordingError>,
    },
}

/// Sending half of the event channel; safe to clone into worker threads
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<CameraEvent>,
}

impl EventSink {
    pub fn emit(&self, event: CameraEvent) {
        if let Err(e) = self.sender.send(event) {
            trace!(event = ?e.0, "Event receiver dropped");
        }
    }
}

pub fn event_channel() -> (EventSink, mpsc::UnboundedReceiver<CameraEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSink { sender }, receiver)
}
