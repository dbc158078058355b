// SPDX-License-Identifier: MPL-2.0

//! MP4 muxer and file sink

use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;
use tracing::debug;

/// Muxer configuration
pub struct MuxerConfig {
    pub muxer: gst::Element,
    pub filesink: gst::Element,
}

/// Create a non-streamable mp4mux writing to `output_path`
pub fn create_muxer(output_path: &Path) -> Result<MuxerConfig, String> {
    let muxer = gst::ElementFactory::make("mp4mux")
        .build()
        .map_err(|e| format!("Failed to create mp4mux: {}", e))?;

    // Seekable output needs the moov atom written at EOS
    if muxer.has_property("streamable") {
        muxer.set_property("streamable", false);
    }

    let location = output_path
        .to_str()
        .ok_or_else(|| format!("Output path is not UTF-8: {}", output_path.display()))?;
    let filesink = gst::ElementFactory::make("filesink")
        .property("location", location)
        .build()
        .map_err(|e| format!("Failed to create filesink: {}", e))?;

    debug!(path = %output_path.display(), "Muxer and filesink created");
    Ok(MuxerConfig { muxer, filesink })
}
