// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic frames for the virtual session

use crate::backends::camera::CameraFrame;
use std::time::Duration;

/// Dark frame with a centred light card of width/height 0.56
///
/// The card makes the quadrilateral detector report a target-aspect shape.
pub fn synthetic_frame(width: u32, height: u32, pts: Duration) -> CameraFrame {
    let card_h = height * 6 / 10;
    let card_w = ((card_h as f32) * 0.56).round() as u32;
    let x0 = width.saturating_sub(card_w) / 2;
    let y0 = height.saturating_sub(card_h) / 2;

    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= x0 && x < x0 + card_w && y >= y0 && y < y0 + card_h;
            let v = if inside { 230 } else { 30 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    CameraFrame::from_rgba(width, height, data, pts)
}
