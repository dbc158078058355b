// SPDX-License-Identifier: MPL-2.0

//! Video recording pipeline
//!
//! - [`timeline`]: pause/resume bookkeeping and timestamp rebasing
//! - [`writer`]: the asset writer seam and its GStreamer implementation
//! - [`recorder`]: the recording service driven from the session queue

pub mod encoder_selection;
pub mod muxer;
pub mod recorder;
pub mod timeline;
pub mod writer;

pub use encoder_selection::{EncoderConfig, available_encoders};
pub use recorder::{FinalizeCallback, VideoRecordingService};
pub use timeline::{RecordingState, RecordingTimeline};
pub use writer::{AssetWriter, AssetWriterFactory, GstAssetWriterFactory, VideoTrackFormat};
