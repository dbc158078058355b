// SPDX-License-Identifier: GPL-3.0-only

//! Asset writer that records timestamps instead of encoding

use crate::backends::camera::CameraFrame;
use crate::errors::RecordingError;
use crate::pipelines::video::{AssetWriter, AssetWriterFactory, VideoTrackFormat};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Presentation timestamps appended across every writer of a factory
pub type WrittenFrames = Arc<Mutex<Vec<Duration>>>;

#[derive(Default, Clone)]
pub struct MemoryWriterFactory {
    written: WrittenFrames,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> WrittenFrames {
        Arc::clone(&self.written)
    }
}

impl AssetWriterFactory for MemoryWriterFactory {
    fn create(
        &self,
        path: &Path,
        format: &VideoTrackFormat,
    ) -> Result<Box<dyn AssetWriter>, RecordingError> {
        debug!(path = %path.display(), width = format.width, height = format.height, "Memory writer created");
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            session_start: None,
            written: Arc::clone(&self.written),
        }))
    }
}

struct MemoryWriter {
    path: PathBuf,
    session_start: Option<Duration>,
    written: WrittenFrames,
}

impl AssetWriter for MemoryWriter {
    fn has_started(&self) -> bool {
        self.session_start.is_some()
    }

    fn start_writing(&mut self, session_start: Duration) -> Result<(), RecordingError> {
        self.session_start = Some(session_start);
        Ok(())
    }

    fn is_ready_for_more_data(&self) -> bool {
        true
    }

    fn append(&mut self, _frame: &CameraFrame, pts: Duration) -> Result<(), RecordingError> {
        self.written
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pts);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError> {
        if self.session_start.is_none() {
            return Err(RecordingError::StopFailed("no frames were written".to_string()));
        }
        let count = self.written.lock().unwrap_or_else(|e| e.into_inner()).len();
        std::fs::write(&self.path, format!("{} frames\n", count))
            .map_err(|e| RecordingError::StopFailed(e.to_string()))?;
        Ok(self.path.clone())
    }
}
