// SPDX-License-Identifier: MPL-2.0

//! Preview pipeline: source → videoconvert → videoscale → RGBA appsink

use super::super::types::*;
use crate::constants::{pipeline, timing};
use crate::pipelines::photo::encode_jpeg;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Change in mean luma (0-255) treated as a new subject
const SUBJECT_CHANGE_THRESHOLD: f32 = 40.0;

/// Sampling step for the luma estimate, in pixels
const LUMA_SAMPLE_STEP: usize = 16;

/// State shared between the session and the streaming thread
#[derive(Clone, Default)]
pub struct StreamShared {
    pub frame_sink: Arc<Mutex<Option<FrameSink>>>,
    pub photo_sink: Arc<Mutex<Option<PhotoSink>>>,
    pub pending_photo: Arc<Mutex<Option<PhotoSettings>>>,
    pub subject_sink: Arc<Mutex<Option<SubjectAreaSink>>>,
    pub monitoring: Arc<AtomicBool>,
}

impl StreamShared {
    /// Queue a still for the next frame. Only one request waits at a time.
    pub fn queue_photo(&self, settings: &PhotoSettings) -> BackendResult<()> {
        let mut pending = self.pending_photo.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = pending.as_ref() {
            warn!(
                pending = current.unique_id,
                rejected = settings.unique_id,
                "Photo requested while another waits for a frame"
            );
            return Err(BackendError::Other(format!(
                "photo {} is still waiting for a frame",
                current.unique_id
            )));
        }
        *pending = Some(settings.clone());
        Ok(())
    }

    pub fn take_pending_photo(&self) -> Option<PhotoSettings> {
        self.pending_photo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Fail a queued still that no frame will serve
    pub fn abandon_pending_photo(&self, error: BackendError) {
        let Some(settings) = self.take_pending_photo() else {
            return;
        };
        let id = settings.unique_id;
        warn!(id, %error, "Pending photo abandoned");
        let Some(sink) = cloned(&self.photo_sink) else {
            return;
        };
        sink(PhotoCaptureEvent::Processed {
            id,
            result: Err(error.clone()),
        });
        sink(PhotoCaptureEvent::Finished {
            id,
            error: Some(error),
        });
    }
}

fn cloned<T: Clone>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Fires when the scene brightness moves far from its baseline
#[derive(Debug, Default)]
pub struct SubjectAreaMonitor {
    baseline: Option<f32>,
}

impl SubjectAreaMonitor {
    /// Feed the next luma estimate; true when the subject changed
    pub fn observe(&mut self, luma: f32) -> bool {
        match self.baseline {
            Some(base) if (luma - base).abs() > SUBJECT_CHANGE_THRESHOLD => {
                self.baseline = Some(luma);
                true
            }
            Some(_) => false,
            None => {
                self.baseline = Some(luma);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

/// Sparse mean luma of an RGBA frame
pub fn mean_luma(frame: &CameraFrame) -> f32 {
    let stride = frame.stride as usize;
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for y in (0..frame.height as usize).step_by(LUMA_SAMPLE_STEP) {
        for x in (0..frame.width as usize).step_by(LUMA_SAMPLE_STEP) {
            let i = y * stride + x * 4;
            let Some(px) = frame.data.get(i..i + 3) else {
                continue;
            };
            sum += 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            count += 1;
        }
    }
    if count == 0 { 0.0 } else { sum / count as f32 }
}

pub struct CapturePipeline {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl CapturePipeline {
    pub fn new(
        source: gst::Element,
        width: u32,
        height: u32,
        shared: StreamShared,
    ) -> BackendResult<Self> {
        info!(width, height, "Creating capture pipeline");
        gst::init().map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let make = |factory: &str| {
            gst::ElementFactory::make(factory).build().map_err(|e| {
                BackendError::InitializationFailed(format!("{}: {}", factory, e))
            })
        };
        let convert = gst::ElementFactory::make("videoconvert")
            .property("n-threads", pipeline::videoconvert_threads())
            .build()
            .map_err(|e| BackendError::InitializationFailed(format!("videoconvert: {}", e)))?;
        let scale = make("videoscale")?;
        let appsink = AppSink::builder()
            .name("sink")
            .caps(
                &gst::Caps::builder("video/x-raw")
                    .field("format", pipeline::OUTPUT_FORMAT)
                    .field("width", width as i32)
                    .field("height", height as i32)
                    .build(),
            )
            .max_buffers(pipeline::MAX_BUFFERS)
            .drop(true)
            .sync(false)
            .enable_last_sample(false)
            .build();

        let pipeline = gst::Pipeline::new();
        let chain = [&source, &convert, &scale, appsink.upcast_ref()];
        pipeline
            .add_many(chain)
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to add elements: {}", e)))?;
        gst::Element::link_many(chain)
            .map_err(|e| BackendError::InitializationFailed(format!("Failed to link elements: {}", e)))?;

        install_callbacks(&appsink, shared);

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            BackendError::InitializationFailed(format!("Failed to start pipeline: {}", e))
        })?;
        let (result, state, pending) =
            pipeline.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        debug!(?result, ?state, ?pending, "Pipeline state");
        if state != gst::State::Playing {
            warn!("Pipeline is not in PLAYING state");
        }

        Ok(Self { pipeline, appsink })
    }
}

fn install_callbacks(appsink: &AppSink, shared: StreamShared) {
    let frame_counter = AtomicU64::new(0);
    let started = Instant::now();
    let monitor = Mutex::new(SubjectAreaMonitor::default());

    appsink.set_callbacks(
        gstreamer_app::AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let frame_num = frame_counter.fetch_add(1, Ordering::Relaxed);
                let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                let Some(frame) = frame_from_sample(&sample, started) else {
                    if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                        warn!(frame = frame_num, "Unusable sample skipped");
                    }
                    return Ok(gst::FlowSuccess::Ok);
                };

                if shared.monitoring.load(Ordering::Acquire) {
                    let changed = monitor
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .observe(mean_luma(&frame));
                    if changed && let Some(sink) = cloned(&shared.subject_sink) {
                        debug!(frame = frame_num, "Subject area changed");
                        sink();
                    }
                } else {
                    monitor.lock().unwrap_or_else(|e| e.into_inner()).reset();
                }

                if let Some(settings) = shared.take_pending_photo() {
                    deliver_photo(&frame, settings, cloned(&shared.photo_sink));
                }

                if frame_num % timing::FRAME_LOG_INTERVAL == 0 {
                    trace!(
                        frame = frame_num,
                        width = frame.width,
                        height = frame.height,
                        pts_ms = frame.pts.as_millis(),
                        "Frame delivered"
                    );
                }
                if let Some(sink) = cloned(&shared.frame_sink) {
                    sink(frame);
                }
                Ok(gst::FlowSuccess::Ok)
            })
            .build(),
    );
}

fn frame_from_sample(sample: &gst::Sample, started: Instant) -> Option<CameraFrame> {
    let info = VideoInfo::from_caps(sample.caps()?).ok()?;
    let buffer = sample.buffer_owned()?;
    let data_ready = !buffer.flags().contains(gst::BufferFlags::CORRUPTED);
    let pts = buffer
        .pts()
        .map(|t| Duration::from_nanos(t.nseconds()))
        .unwrap_or_else(|| started.elapsed());
    let mapped = buffer.into_mapped_buffer_readable().ok()?;

    Some(CameraFrame {
        width: info.width(),
        height: info.height(),
        data: FrameData::from_mapped_buffer(mapped),
        format: PixelFormat::Rgba,
        stride: info.stride()[0] as u32,
        pts,
        data_ready,
        captured_at: Instant::now(),
    })
}

/// Encode the frame off the streaming thread and report through the sink
fn deliver_photo(frame: &CameraFrame, settings: PhotoSettings, sink: Option<PhotoSink>) {
    let Some(sink) = sink else {
        warn!(id = settings.unique_id, "No photo sink, capture dropped");
        return;
    };
    let id = settings.unique_id;
    sink(PhotoCaptureEvent::WillCapture { id });

    let frame = frame.to_copied();
    let spawned = std::thread::Builder::new()
        .name("photo-encode".to_string())
        .spawn({
            let sink = Arc::clone(&sink);
            move || {
                let result = frame
                    .to_rgba_image(false)
                    .ok_or_else(|| BackendError::Other("frame buffer too short".into()))
                    .and_then(|img| {
                        encode_jpeg(&img).map_err(|e| BackendError::Other(e.to_string()))
                    });
                let error = result.as_ref().err().cloned();
                sink(PhotoCaptureEvent::Processed { id, result });
                sink(PhotoCaptureEvent::Finished { id, error });
            }
        });
    if let Err(e) = spawned {
        error!(id, error = %e, "Failed to spawn photo encoder");
        sink(PhotoCaptureEvent::Finished {
            id,
            error: Some(BackendError::Other(e.to_string())),
        });
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        debug!("Stopping capture pipeline");
        self.appsink
            .set_callbacks(gstreamer_app::AppSinkCallbacks::builder().build());
        let _ = self.pipeline.set_state(gst::State::Null);
        let (result, state, _) = self
            .pipeline
            .state(gst::ClockTime::from_seconds(timing::STOP_TIMEOUT_SECS));
        if let Err(e) = result {
            debug!(error = ?e, ?state, "Pipeline state change had issues");
        }
    }
}
