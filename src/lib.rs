// SPDX-License-Identifier: MPL-2.0

//! quadcam - camera capture core with live quadrilateral detection
//!
//! The crate drives one shared capture session from a serial queue and
//! layers three services on top of it:
//!
//! - [`detection`]: finds the biggest rectangle-like feature in each frame
//!   and classifies it against the target screen aspect bands
//! - [`pipelines::photo`]: one-shot photo requests saved to the media library
//! - [`pipelines::video`]: pausable recording with timestamp rebasing
//!
//! [`session::CameraCoordinator`] is the UI-facing handle; it keeps mirrors of
//! session state and forwards requests onto the session thread.
//!
//! # Architecture
//!
//! - [`backends`]: capture session trait, GStreamer and virtual implementations
//! - [`session`]: coordinator, serial queue and events
//! - [`config`]: user configuration
//! - [`settings`]: small persisted key/value settings
//! - [`storage`]: media library import

pub mod backends;
pub mod config;
pub mod constants;
pub mod detection;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod settings;
pub mod storage;
pub mod terminal;

pub use config::Config;
pub use constants::BitratePreset;
pub use detection::{Quadrilateral, QuadrilateralDetector};
pub use session::{CameraCoordinator, CameraEvent, CameraSetupResult};
