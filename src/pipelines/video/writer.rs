// SPDX-License-Identifier: MPL-2.0

//! Video file writer
//!
//! ```text
//! appsrc (RGBA) → videoconvert → H.264 encoder → h264parse → mp4mux → filesink
//! ```

use super::encoder_selection::{EncoderConfig, select_encoder};
use super::muxer::create_muxer;
use crate::backends::camera::CameraFrame;
use crate::constants::{BitratePreset, pipeline, presets, timing};
use crate::errors::RecordingError;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Track format fixed when the writer is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrackFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: i32,
    pub bitrate_preset: BitratePreset,
}

impl VideoTrackFormat {
    pub fn for_frame(frame: &CameraFrame, bitrate_preset: BitratePreset) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            framerate: presets::FRAMERATE,
            bitrate_preset,
        }
    }
}

/// Sequential writer for one real-time video track
pub trait AssetWriter: Send {
    fn has_started(&self) -> bool;

    /// Start writing; output timestamps are relative to `session_start`
    fn start_writing(&mut self, session_start: Duration) -> Result<(), RecordingError>;

    fn is_ready_for_more_data(&self) -> bool;

    fn append(&mut self, frame: &CameraFrame, pts: Duration) -> Result<(), RecordingError>;

    /// Flush and close the file. Blocks until the container is finalized.
    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError>;
}

pub trait AssetWriterFactory: Send + Sync {
    fn create(
        &self,
        path: &Path,
        format: &VideoTrackFormat,
    ) -> Result<Box<dyn AssetWriter>, RecordingError>;
}

/// Builds [`GstAssetWriter`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct GstAssetWriterFactory;

impl AssetWriterFactory for GstAssetWriterFactory {
    fn create(
        &self,
        path: &Path,
        format: &VideoTrackFormat,
    ) -> Result<Box<dyn AssetWriter>, RecordingError> {
        Ok(Box::new(GstAssetWriter::new(path, format)?))
    }
}

pub struct GstAssetWriter {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    format: VideoTrackFormat,
    path: PathBuf,
    session_start: Option<Duration>,
    frames: u64,
}

impl GstAssetWriter {
    pub fn new(path: &Path, format: &VideoTrackFormat) -> Result<Self, RecordingError> {
        info!(
            path = %path.display(),
            width = format.width,
            height = format.height,
            "Creating video writer"
        );
        gst::init().map_err(|e| RecordingError::PipelineError(e.to_string()))?;

        let encoder = select_encoder(&EncoderConfig {
            bitrate_preset: format.bitrate_preset,
            width: format.width,
            height: format.height,
            bitrate_override_kbps: None,
        })
        .map_err(RecordingError::EncoderNotAvailable)?;
        let muxer = create_muxer(path).map_err(RecordingError::PipelineError)?;

        let pipeline = gst::Pipeline::new();
        let appsrc = AppSrc::builder()
            .name("writer_src")
            .caps(
                &gst::Caps::builder("video/x-raw")
                    .field("format", pipeline::OUTPUT_FORMAT)
                    .field("width", format.width as i32)
                    .field("height", format.height as i32)
                    .field("framerate", gst::Fraction::new(format.framerate, 1))
                    .build(),
            )
            .format(gst::Format::Time)
            .is_live(true)
            .do_timestamp(false)
            .max_bytes(frame_bytes(format) * 8)
            .build();

        let convert = gst::ElementFactory::make("videoconvert")
            .property("n-threads", pipeline::videoconvert_threads())
            .build()
            .map_err(|e| RecordingError::PipelineError(format!("videoconvert: {}", e)))?;
        let queue = gst::ElementFactory::make("queue")
            .build()
            .map_err(|e| RecordingError::PipelineError(format!("queue: {}", e)))?;

        let chain = [
            appsrc.upcast_ref(),
            &convert,
            &queue,
            &encoder.encoder,
            &encoder.parser,
            &muxer.muxer,
            &muxer.filesink,
        ];
        pipeline
            .add_many(chain)
            .map_err(|e| RecordingError::PipelineError(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(chain)
            .map_err(|e| RecordingError::PipelineError(format!("Failed to link elements: {}", e)))?;

        debug!(encoder = encoder.name, "Video writer pipeline built");
        Ok(Self {
            pipeline,
            appsrc,
            format: *format,
            path: path.to_path_buf(),
            session_start: None,
            frames: 0,
        })
    }
}

fn frame_bytes(format: &VideoTrackFormat) -> u64 {
    format.width as u64 * format.height as u64 * 4
}

impl AssetWriter for GstAssetWriter {
    fn has_started(&self) -> bool {
        self.session_start.is_some()
    }

    fn start_writing(&mut self, session_start: Duration) -> Result<(), RecordingError> {
        self.pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| RecordingError::StartFailed(e.to_string()))?;

        if let Some(bus) = self.pipeline.bus()
            && let Some(msg) =
                bus.timed_pop_filtered(gst::ClockTime::from_mseconds(50), &[gst::MessageType::Error])
            && let gst::MessageView::Error(err) = msg.view()
        {
            error!(
                error = %err.error(),
                debug = ?err.debug(),
                source = ?err.src().map(|s| s.name()),
                "GStreamer error during start"
            );
            return Err(RecordingError::StartFailed(err.error().to_string()));
        }

        self.session_start = Some(session_start);
        info!(session_start_ms = session_start.as_millis(), "Video writer started");
        Ok(())
    }

    fn is_ready_for_more_data(&self) -> bool {
        self.appsrc.current_level_bytes() < self.appsrc.max_bytes()
    }

    fn append(&mut self, frame: &CameraFrame, pts: Duration) -> Result<(), RecordingError> {
        let start = self.session_start.ok_or_else(|| {
            RecordingError::PipelineError("append before start_writing".to_string())
        })?;
        if frame.width != self.format.width || frame.height != self.format.height {
            return Err(RecordingError::PipelineError(format!(
                "Frame size {}x{} doesn't match track {}x{}",
                frame.width, frame.height, self.format.width, self.format.height
            )));
        }

        let row_bytes = (frame.width * 4) as usize;
        let size = row_bytes * frame.height as usize;
        let mut buffer = gst::Buffer::with_size(size)
            .map_err(|e| RecordingError::PipelineError(format!("Failed to create buffer: {}", e)))?;
        {
            let buffer_ref = buffer.get_mut().ok_or_else(|| {
                RecordingError::PipelineError("Failed to get mutable buffer reference".into())
            })?;
            buffer_ref.set_pts(gst::ClockTime::from_nseconds(
                pts.saturating_sub(start).as_nanos() as u64,
            ));
            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| RecordingError::PipelineError(format!("Failed to map buffer: {}", e)))?;
            let stride = frame.stride as usize;
            if stride == row_bytes {
                map.copy_from_slice(&frame.data[..size]);
            } else {
                for (row, dst) in map.chunks_exact_mut(row_bytes).enumerate() {
                    let src = row * stride;
                    dst.copy_from_slice(&frame.data[src..src + row_bytes]);
                }
            }
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| RecordingError::PipelineError(format!("Failed to push frame: {:?}", e)))?;
        self.frames += 1;
        if self.frames % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(frames = self.frames, pts_ms = pts.as_millis(), "Video frames written");
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf, RecordingError> {
        info!(frames = self.frames, "Finalizing video writer");
        if !self.has_started() {
            let _ = self.pipeline.set_state(gst::State::Null);
            return Err(RecordingError::StopFailed("no frames were written".to_string()));
        }

        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(?e, "Failed to send EOS to writer");
        }

        let outcome = match self.pipeline.bus() {
            Some(bus) => match bus.timed_pop_filtered(
                gst::ClockTime::from_seconds(timing::EOS_TIMEOUT_SECS),
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Error(err) => {
                        Err(RecordingError::StopFailed(err.error().to_string()))
                    }
                    _ => Ok(()),
                },
                None => Err(RecordingError::StopFailed("timed out waiting for EOS".to_string())),
            },
            None => Err(RecordingError::StopFailed("no bus available".to_string())),
        };

        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| RecordingError::StopFailed(format!("Failed to stop pipeline: {}", e)))?;
        outcome?;

        info!(path = %self.path.display(), "Video file finalized");
        Ok(self.path.clone())
    }
}

impl Drop for GstAssetWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
