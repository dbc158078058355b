// SPDX-License-Identifier: MPL-2.0

//! Capture session backends
//!
//! - [`camera`]: the session traits, shared types and the GStreamer backend
//! - [`virtual_camera`]: an in-process session for tests and demos

pub mod camera;
pub mod virtual_camera;
