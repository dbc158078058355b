// SPDX-License-Identifier: MPL-2.0

//! Video recording service
//!
//! Owns the video-data output configuration, the recording state machine and
//! the asset writer. Every method runs on the session queue except the
//! finalization worker spawned by [`VideoRecordingService::finish_recording`].

use super::timeline::{RecordingState, RecordingTimeline};
use super::writer::{AssetWriter, AssetWriterFactory, VideoTrackFormat};
use crate::backends::camera::{CameraFrame, CaptureSession, FrameSlot, OutputKind, VideoOrientation};
use crate::constants::BitratePreset;
use crate::errors::{CameraError, RecordingError};
use crate::session::events::{CameraEvent, EventSink};
use crate::storage::{MediaLibrary, remove_temp_file};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Called from the finalization worker; must hop back onto the session queue
pub type FinalizeCallback = Arc<dyn Fn(Result<PathBuf, RecordingError>) + Send + Sync>;

pub struct VideoRecordingService {
    writer_factory: Arc<dyn AssetWriterFactory>,
    library: Arc<dyn MediaLibrary>,
    temp_path: PathBuf,
    bitrate_preset: BitratePreset,
    last_frame: FrameSlot,
    timeline: RecordingTimeline,
    writer: Option<Box<dyn AssetWriter>>,
    finalizing: bool,
    events: EventSink,
    on_finalize: FinalizeCallback,
}

impl VideoRecordingService {
    pub fn new(
        writer_factory: Arc<dyn AssetWriterFactory>,
        library: Arc<dyn MediaLibrary>,
        temp_path: PathBuf,
        bitrate_preset: BitratePreset,
        last_frame: FrameSlot,
        events: EventSink,
        on_finalize: FinalizeCallback,
    ) -> Self {
        Self {
            writer_factory,
            library,
            temp_path,
            bitrate_preset,
            last_frame,
            timeline: RecordingTimeline::new(),
            writer: None,
            finalizing: false,
            events,
            on_finalize,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.timeline.state()
    }

    pub fn is_finalizing(&self) -> bool {
        self.finalizing
    }

    pub fn offset(&self) -> Duration {
        self.timeline.offset()
    }

    /// Attach the video-data output and configure its connection
    pub fn add_output(&mut self, session: &mut dyn CaptureSession) -> Result<(), CameraError> {
        if !session.has_output(OutputKind::VideoData) {
            if !session.can_add_output(OutputKind::VideoData) {
                return Err(CameraError::CannotAdd("video data output".to_string()));
            }
            session.add_output(OutputKind::VideoData)?;
            debug!("Video data output attached");
        }
        self.configure_output_connection(session)
    }

    /// Portrait orientation, stabilization when the device offers it
    pub fn configure_output_connection(
        &mut self,
        session: &mut dyn CaptureSession,
    ) -> Result<(), CameraError> {
        let stabilization = session.supports_video_stabilization();
        session.configure_video_connection(VideoOrientation::Portrait, stabilization)?;
        debug!(stabilization, "Video connection configured");
        Ok(())
    }

    fn last_pts(&self) -> Option<Duration> {
        self.last_frame
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|f| f.pts))
    }

    fn set_state(&mut self, change: impl FnOnce(&mut RecordingTimeline)) {
        let before = self.timeline.state();
        change(&mut self.timeline);
        let state = self.timeline.state();
        if state != before {
            info!(?before, ?state, "Recording state changed");
            self.events.emit(CameraEvent::RecordingStateChanged { state });
        }
    }

    pub fn start_recording(&mut self) {
        if self.finalizing {
            warn!("Previous recording is still being finalized");
            return;
        }

        match self.timeline.state() {
            RecordingState::Recording => debug!("Already recording"),
            RecordingState::Paused => {
                let Some(now) = self.last_pts() else {
                    warn!(error = %RecordingError::NoFrameAvailable, "Cannot resume recording");
                    return;
                };
                self.set_state(|t| {
                    t.resume(now);
                });
            }
            RecordingState::Idle => {
                let Some(frame) = self.last_frame.lock().ok().and_then(|slot| slot.clone()) else {
                    warn!(error = %RecordingError::NoFrameAvailable, "Cannot start recording");
                    return;
                };
                remove_temp_file(&self.temp_path);
                let format = VideoTrackFormat::for_frame(&frame, self.bitrate_preset);
                match self.writer_factory.create(&self.temp_path, &format) {
                    Ok(writer) => {
                        self.writer = Some(writer);
                        self.set_state(RecordingTimeline::begin);
                    }
                    Err(e) => error!(error = %e, "Failed to create video writer"),
                }
            }
        }
    }

    pub fn pause_recording(&mut self) {
        let Some(now) = self.last_pts() else {
            return;
        };
        if self.timeline.state() != RecordingState::Recording {
            trace!(state = ?self.timeline.state(), "Pause ignored");
            return;
        }
        self.set_state(|t| {
            t.pause(now);
        });
    }

    /// Publish the frame and, while recording, append it to the writer
    pub fn handle_frame(&mut self, frame: Arc<CameraFrame>) {
        if let Ok(mut slot) = self.last_frame.lock() {
            *slot = Some(Arc::clone(&frame));
        }

        if self.timeline.state() != RecordingState::Recording {
            return;
        }
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        if !writer.has_started() {
            let session_start = self.timeline.adjust(frame.pts);
            if let Err(e) = writer.start_writing(session_start) {
                error!(error = %e, "Failed to start video writer");
                self.abort(e);
                return;
            }
        }

        if !frame.data_ready {
            trace!(pts_ms = frame.pts.as_millis(), "Frame not ready, skipped");
            return;
        }
        if !writer.is_ready_for_more_data() {
            trace!("Writer busy, frame dropped");
            return;
        }
        let Some(pts) = self.timeline.accept(frame.pts) else {
            debug!(pts_ms = frame.pts.as_millis(), "Out-of-order frame dropped");
            return;
        };
        if let Err(e) = writer.append(&frame, pts) {
            warn!(error = %e, "Failed to append frame");
        }
    }

    fn abort(&mut self, error: RecordingError) {
        self.writer = None;
        self.set_state(RecordingTimeline::stop);
        self.timeline.reset();
        remove_temp_file(&self.temp_path);
        self.events.emit(CameraEvent::RecordingFinished { result: Err(error) });
    }

    /// Stop recording and finalize the file in the background
    pub fn finish_recording(&mut self) {
        let Some(writer) = self.writer.take() else {
            debug!("No recording to finish");
            return;
        };
        self.set_state(RecordingTimeline::stop);
        self.finalizing = true;

        let library = Arc::clone(&self.library);
        let temp_path = self.temp_path.clone();
        let on_finalize = Arc::clone(&self.on_finalize);
        let spawned = std::thread::Builder::new()
            .name("recording-finalize".to_string())
            .spawn(move || {
                let result = writer
                    .finish()
                    .and_then(|path| library.import_video(&path));
                remove_temp_file(&temp_path);
                on_finalize(result);
            });
        if let Err(e) = spawned {
            error!(error = %e, "Failed to spawn finalization thread");
            self.finalized(Err(RecordingError::StopFailed(e.to_string())));
        }
    }

    /// Reset after the finalization worker finished
    pub fn finalized(&mut self, result: Result<PathBuf, RecordingError>) {
        self.timeline.reset();
        self.finalizing = false;
        match &result {
            Ok(path) => info!(path = %path.display(), "Recording saved"),
            Err(e) => error!(error = %e, "Recording failed"),
        }
        self.events.emit(CameraEvent::RecordingFinished { result });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::{MemoryWriterFactory, WrittenFrames};
    use crate::session::events::event_channel;
    use crate::storage::DirectoryMediaLibrary;
    use std::sync::Mutex;
    use std::sync::mpsc;

    struct Fixture {
        service: VideoRecordingService,
        written: WrittenFrames,
        finalized: mpsc::Receiver<Result<PathBuf, RecordingError>>,
        events: tokio::sync::mpsc::UnboundedReceiver<CameraEvent>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let factory = MemoryWriterFactory::new();
        let written = factory.written();
        let library = Arc::new(DirectoryMediaLibrary::new(
            dir.path().join("photos"),
            dir.path().join("videos"),
        ));
        let (sink, events) = event_channel();
        let (tx, finalized) = mpsc::channel();
        let tx = Mutex::new(tx);
        let service = VideoRecordingService::new(
            Arc::new(factory),
            library,
            dir.path().join("temp.mp4"),
            BitratePreset::Medium,
            FrameSlot::default(),
            sink,
            Arc::new(move |result| {
                let _ = tx.lock().unwrap().send(result);
            }),
        );
        Fixture {
            service,
            written,
            finalized,
            events,
            _dir: dir,
        }
    }

    fn frame_at(ms: u64) -> Arc<CameraFrame> {
        Arc::new(CameraFrame::from_rgba(
            4,
            4,
            vec![0; 64],
            Duration::from_millis(ms),
        ))
    }

    #[test]
    fn test_start_requires_frame() {
        let mut f = fixture();
        f.service.start_recording();
        assert_eq!(f.service.state(), RecordingState::Idle);
    }

    #[test]
    fn test_paused_gap_removed_from_output() {
        let mut f = fixture();
        f.service.handle_frame(frame_at(1000));
        f.service.start_recording();
        assert_eq!(f.service.state(), RecordingState::Recording);

        f.service.handle_frame(frame_at(1033));
        f.service.handle_frame(frame_at(1066));
        f.service.pause_recording();
        f.service.handle_frame(frame_at(1500));
        f.service.handle_frame(frame_at(2066));
        f.service.start_recording();
        f.service.handle_frame(frame_at(2100));

        assert_eq!(f.service.offset(), Duration::from_millis(1000));
        let pts: Vec<u64> = f
            .written
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        assert_eq!(pts, vec![1033, 1066, 1100]);
    }

    #[test]
    fn test_pause_idempotent() {
        let mut f = fixture();
        f.service.handle_frame(frame_at(0));
        f.service.start_recording();
        f.service.handle_frame(frame_at(100));
        f.service.pause_recording();
        f.service.handle_frame(frame_at(400));
        f.service.pause_recording();
        f.service.handle_frame(frame_at(700));
        f.service.start_recording();
        // Gap measured from the first pause
        assert_eq!(f.service.offset(), Duration::from_millis(600));
    }

    #[test]
    fn test_not_ready_frames_skipped() {
        let mut f = fixture();
        f.service.handle_frame(frame_at(0));
        f.service.start_recording();
        let mut frame = CameraFrame::from_rgba(4, 4, vec![0; 64], Duration::from_millis(33));
        frame.data_ready = false;
        f.service.handle_frame(Arc::new(frame));
        f.service.handle_frame(frame_at(66));
        assert_eq!(f.written.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_finish_imports_and_resets() {
        let mut f = fixture();
        f.service.handle_frame(frame_at(0));
        f.service.start_recording();
        f.service.handle_frame(frame_at(10));
        f.service.pause_recording();
        f.service.handle_frame(frame_at(50));
        f.service.start_recording();
        f.service.finish_recording();

        assert_eq!(f.service.state(), RecordingState::Idle);
        assert!(f.service.is_finalizing());
        // Refused while finalizing
        f.service.start_recording();
        assert_eq!(f.service.state(), RecordingState::Idle);

        let result = f.finalized.recv().unwrap();
        let path = result.clone().unwrap();
        assert!(path.exists());
        f.service.finalized(result);
        assert!(!f.service.is_finalizing());
        assert_eq!(f.service.offset(), Duration::ZERO);

        let mut saw_finished = false;
        while let Ok(event) = f.events.try_recv() {
            if let CameraEvent::RecordingFinished { result } = event {
                assert!(result.is_ok());
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[test]
    fn test_finish_without_writer_is_noop() {
        let mut f = fixture();
        f.service.finish_recording();
        assert!(!f.service.is_finalizing());
        assert!(f.events.try_recv().is_err());
    }
}
