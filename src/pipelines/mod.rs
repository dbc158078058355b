// SPDX-License-Identifier: MPL-2.0

//! Capture pipelines driven from the session queue
//!
//! - [`photo`]: still capture requests, previews and library import
//! - [`video`]: pausable recording into an MP4 file

pub mod photo;
pub mod video;
