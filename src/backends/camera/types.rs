// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture session backends

use gstreamer::buffer::{MappedBuffer, Readable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Frame data storage - either pre-copied bytes or zero-copy GStreamer buffer
///
/// The `Mapped` variant keeps the GStreamer buffer mapped and alive until all
/// references are dropped.
#[derive(Clone)]
pub enum FrameData {
    /// Pre-copied bytes (virtual sessions, tests, decoded stills)
    Copied(Arc<[u8]>),
    /// Zero-copy mapped GStreamer buffer
    Mapped(Arc<MappedBuffer<Readable>>),
}

impl FrameData {
    pub fn from_mapped_buffer(buffer: MappedBuffer<Readable>) -> Self {
        FrameData::Mapped(Arc::new(buffer))
    }

    pub fn len(&self) -> usize {
        match self {
            FrameData::Copied(data) => data.len(),
            FrameData::Mapped(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameData::Copied(data) => write!(f, "FrameData::Copied({} bytes)", data.len()),
            FrameData::Mapped(buf) => write!(f, "FrameData::Mapped({} bytes)", buf.len()),
        }
    }
}

impl AsRef<[u8]> for FrameData {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameData::Copied(data) => data.as_ref(),
            FrameData::Mapped(buf) => buf.as_slice(),
        }
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_ref()
    }
}

/// Pixel layout of a frame. Sessions always deliver RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Rgba => 4,
        }
    }
}

/// A single frame delivered by the video-data output
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub data: FrameData,
    pub format: PixelFormat,
    /// Bytes per row, may include padding
    pub stride: u32,
    /// Presentation timestamp on the session clock
    pub pts: Duration,
    /// False when the buffer is not yet complete and must not be written
    pub data_ready: bool,
    pub captured_at: Instant,
}

impl CameraFrame {
    /// Build a tightly packed RGBA frame from owned bytes
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, pts: Duration) -> Self {
        Self {
            width,
            height,
            data: FrameData::Copied(Arc::from(data)),
            format: PixelFormat::Rgba,
            stride: width * PixelFormat::Rgba.bytes_per_pixel(),
            pts,
            data_ready: true,
            captured_at: Instant::now(),
        }
    }

    /// Convert to a frame with copied data (safe for background processing)
    ///
    /// Mapped GStreamer buffers become invalid when the pipeline is destroyed.
    pub fn to_copied(&self) -> Self {
        let data = match &self.data {
            FrameData::Copied(data) => FrameData::Copied(Arc::clone(data)),
            FrameData::Mapped(buffer) => {
                let slice: &[u8] = buffer.as_ref();
                FrameData::Copied(Arc::from(slice))
            }
        };
        Self {
            data,
            ..self.clone()
        }
    }

    /// Copy into a packed RGBA image, optionally mirrored horizontally
    pub fn to_rgba_image(&self, mirror: bool) -> Option<image::RgbaImage> {
        let row_bytes = (self.width * 4) as usize;
        let stride = self.stride as usize;
        if stride < row_bytes || self.data.len() < stride * (self.height as usize).saturating_sub(1) + row_bytes {
            return None;
        }
        let mut packed = Vec::with_capacity(row_bytes * self.height as usize);
        for row in 0..self.height as usize {
            let start = row * stride;
            packed.extend_from_slice(&self.data[start..start + row_bytes]);
        }
        let mut img = image::RgbaImage::from_raw(self.width, self.height, packed)?;
        if mirror {
            image::imageops::flip_horizontal_in_place(&mut img);
        }
        Some(img)
    }
}

/// Shared slot holding the most recent frame
pub type FrameSlot = Arc<Mutex<Option<Arc<CameraFrame>>>>;

/// Where a camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CameraPosition {
    Front,
    Back,
    #[default]
    Unspecified,
}

impl std::fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraPosition::Front => write!(f, "front"),
            CameraPosition::Back => write!(f, "back"),
            CameraPosition::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Physical camera module type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceType {
    #[default]
    WideAngle,
    Dual,
    TrueDepth,
}

/// A capture device known to the session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CameraDevice {
    /// Stable identifier (device node, object serial, or virtual id)
    pub id: String,
    pub name: String,
    pub position: CameraPosition,
    pub device_type: DeviceType,
    /// V4L2 device node, empty when there is none
    pub path: String,
}

impl std::fmt::Display for CameraDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {:?})", self.name, self.position, self.device_type)
    }
}

/// Session preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPreset {
    #[default]
    Photo,
    Video,
}

impl SessionPreset {
    pub fn toggled(self) -> Self {
        match self {
            SessionPreset::Photo => SessionPreset::Video,
            SessionPreset::Video => SessionPreset::Photo,
        }
    }

    /// Frame size requested from the device for this preset
    pub fn dimensions(self) -> (u32, u32) {
        use crate::constants::presets;
        match self {
            SessionPreset::Photo => (presets::PHOTO_WIDTH, presets::PHOTO_HEIGHT),
            SessionPreset::Video => (presets::VIDEO_WIDTH, presets::VIDEO_HEIGHT),
        }
    }
}

/// Outputs that can be attached to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Photo,
    VideoData,
}

/// Video connection orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    LandscapeLeft,
    LandscapeRight,
}

/// Flash mode with its persisted raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlashMode {
    #[default]
    Off = 0,
    On = 1,
    Auto = 2,
}

impl FlashMode {
    pub fn raw(self) -> i64 {
        self as i64
    }

    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(FlashMode::Off),
            1 => Some(FlashMode::On),
            2 => Some(FlashMode::Auto),
            _ => None,
        }
    }

    /// off -> on -> auto -> off
    pub fn next(self) -> Self {
        FlashMode::from_raw((self.raw() + 1) % 3).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Locked,
    AutoExpose,
    ContinuousAutoExposure,
}

/// Normalized point of interest, (0,0) top-left to (1,1) bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn center() -> Self {
        let (x, y) = crate::constants::exposure::CENTER_POINT;
        Self { x, y }
    }
}

/// Exposure target bias bounds and current value, in EV
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExposureBiasRange {
    pub min: f32,
    pub current: f32,
    pub max: f32,
}

impl ExposureBiasRange {
    /// Map a slider value in [-1, 1] to a target bias
    ///
    /// Positive values move toward `max`, negative toward `min`, each scaled by
    /// [`crate::constants::exposure::BIAS_SCALE`].
    pub fn bias_for(&self, value: f32) -> f32 {
        let scale = crate::constants::exposure::BIAS_SCALE;
        if value >= 0.0 {
            self.current + value * (self.max - self.current) * scale
        } else {
            self.current + value * (self.current - self.min) * scale
        }
    }
}

/// Still image codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoCodec {
    Hevc,
    Jpeg,
}

impl PhotoCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            PhotoCodec::Hevc => "heic",
            PhotoCodec::Jpeg => "jpg",
        }
    }
}

/// What the attached photo output can do
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PhotoCapabilities {
    pub depth_delivery_supported: bool,
    pub live_photo_supported: bool,
    pub available_codecs: Vec<PhotoCodec>,
}

/// Photo output options applied while configuring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotoOutputOptions {
    pub depth_delivery_enabled: bool,
    pub live_photo_enabled: bool,
}

/// Per-request capture settings
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoSettings {
    pub unique_id: u64,
    pub codec: PhotoCodec,
    pub flash_mode: FlashMode,
    pub live_photo_movie_path: Option<PathBuf>,
    pub depth_delivery_enabled: bool,
}

/// Callback notifications for one photo request
#[derive(Debug, Clone)]
pub enum PhotoCaptureEvent {
    WillCapture { id: u64 },
    /// Encoded still bytes or the processing error
    Processed {
        id: u64,
        result: Result<Vec<u8>, BackendError>,
    },
    /// The paired movie has been written to the requested path
    LivePhotoMovieFinished { id: u64, path: PathBuf },
    Finished {
        id: u64,
        error: Option<BackendError>,
    },
}

impl PhotoCaptureEvent {
    pub fn id(&self) -> u64 {
        match self {
            PhotoCaptureEvent::WillCapture { id }
            | PhotoCaptureEvent::Processed { id, .. }
            | PhotoCaptureEvent::LivePhotoMovieFinished { id, .. }
            | PhotoCaptureEvent::Finished { id, .. } => *id,
        }
    }
}

/// Receives frames from the running session
pub type FrameSink = Arc<dyn Fn(CameraFrame) + Send + Sync>;

/// Receives photo request notifications
pub type PhotoSink = Arc<dyn Fn(PhotoCaptureEvent) + Send + Sync>;

/// Invoked when the monitored device reports a subject area change
pub type SubjectAreaSink = Arc<dyn Fn() + Send + Sync>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Failed to initialize backend
    InitializationFailed(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Requested operation is not supported by the device
    NotSupported(String),
    /// The session has an open configuration transaction
    ConfigurationInProgress,
    /// Session is not running
    NotRunning,
    /// General I/O error
    IoError(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            BackendError::ConfigurationInProgress => write!(f, "Session configuration in progress"),
            BackendError::NotRunning => write!(f, "Session is not running"),
            BackendError::IoError(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError(err.to_string())
    }
}

impl From<BackendError> for crate::errors::CameraError {
    fn from(err: BackendError) -> Self {
        crate::errors::CameraError::BackendError(err.to_string())
    }
}

impl From<BackendError> for crate::errors::AppError {
    fn from(err: BackendError) -> Self {
        crate::errors::AppError::Camera(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_mode_cycles_through_raw_values() {
        assert_eq!(FlashMode::Off.next(), FlashMode::On);
        assert_eq!(FlashMode::On.next(), FlashMode::Auto);
        assert_eq!(FlashMode::Auto.next(), FlashMode::Off);
        assert_eq!(FlashMode::from_raw(2), Some(FlashMode::Auto));
        assert_eq!(FlashMode::from_raw(3), None);
    }

    #[test]
    fn test_exposure_mapping() {
        let range = ExposureBiasRange {
            min: -4.0,
            current: 0.0,
            max: 4.0,
        };
        assert!((range.bias_for(0.5) - 1.32).abs() < 1e-5);
        assert!((range.bias_for(-0.5) + 1.32).abs() < 1e-5);
        assert_eq!(range.bias_for(0.0), 0.0);
    }

    #[test]
    fn test_exposure_mapping_asymmetric_range() {
        let range = ExposureBiasRange {
            min: -2.0,
            current: 1.0,
            max: 2.0,
        };
        // 1 + 1 * (2 - 1) * 0.66
        assert!((range.bias_for(1.0) - 1.66).abs() < 1e-5);
        // 1 - 1 * (1 + 2) * 0.66
        assert!((range.bias_for(-1.0) + 0.98).abs() < 1e-5);
    }

    #[test]
    fn test_frame_to_rgba_image_mirrors() {
        let data = vec![
            255, 0, 0, 255, // red
            0, 0, 255, 255, // blue
        ];
        let frame = CameraFrame::from_rgba(2, 1, data, Duration::ZERO);

        let straight = frame.to_rgba_image(false).unwrap();
        assert_eq!(straight.get_pixel(0, 0).0, [255, 0, 0, 255]);

        let mirrored = frame.to_rgba_image(true).unwrap();
        assert_eq!(mirrored.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_frame_to_rgba_image_rejects_short_buffer() {
        let mut frame = CameraFrame::from_rgba(2, 2, vec![0; 16], Duration::ZERO);
        frame.data = FrameData::Copied(Arc::from(vec![0u8; 8]));
        assert!(frame.to_rgba_image(false).is_none());
    }

    #[test]
    fn test_preset_toggle() {
        assert_eq!(SessionPreset::Photo.toggled(), SessionPreset::Video);
        assert_eq!(SessionPreset::Video.dimensions(), (1280, 720));
    }
}
