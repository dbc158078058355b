// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for quadrilateral detection

use quadcam::backends::camera::{CameraFrame, Point};
use quadcam::detection::{Quadrilateral, Size, biggest, default_detector, is_target_aspect};
use std::time::Duration;

fn quad(x: f32, y: f32, w: f32, h: f32) -> Quadrilateral {
    Quadrilateral::new(
        Point::new(x, y),
        Point::new(x + w, y),
        Point::new(x, y + h),
        Point::new(x + w, y + h),
        Size {
            width: 640.0,
            height: 480.0,
        },
    )
}

/// Dark frame with one light axis-aligned card
fn card_frame(width: u32, height: u32, card: (u32, u32, u32, u32)) -> CameraFrame {
    let (cx, cy, cw, ch) = card;
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= cx && x < cx + cw && y >= cy && y < cy + ch;
            let v = if inside { 220 } else { 20 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
    }
    CameraFrame::from_rgba(width, height, data, Duration::ZERO)
}

#[test]
fn test_biggest_prefers_largest_perimeter() {
    let candidates = [quad(0.0, 0.0, 10.0, 10.0), quad(5.0, 5.0, 100.0, 50.0)];
    let best = biggest(&candidates).unwrap();
    assert_eq!(best.top_right, Point::new(105.0, 5.0));
}

#[test]
fn test_biggest_of_empty_and_single() {
    assert!(biggest(&[]).is_none());
    let single = [quad(0.0, 0.0, 1.0, 1.0)];
    assert_eq!(biggest(&single), Some(&single[0]));
}

#[test]
fn test_biggest_tie_keeps_first() {
    let candidates = [quad(0.0, 0.0, 20.0, 10.0), quad(50.0, 50.0, 10.0, 20.0)];
    assert_eq!(biggest(&candidates), Some(&candidates[0]));
}

#[test]
fn test_target_aspect_bands() {
    // 0.56 and 0.46 fall inside the two bands
    assert!(is_target_aspect(&quad(0.0, 0.0, 56.0, 100.0)));
    assert!(is_target_aspect(&quad(0.0, 0.0, 46.0, 100.0)));
    assert!(!is_target_aspect(&quad(0.0, 0.0, 50.0, 100.0)));
    assert!(!is_target_aspect(&quad(0.0, 0.0, 100.0, 56.0)));
    // Zero height never matches
    assert!(!is_target_aspect(&quad(0.0, 0.0, 10.0, 0.0)));
}

#[test]
fn test_detector_finds_phone_shaped_card() {
    // 112 x 200 card, ratio 0.56
    let frame = card_frame(640, 480, (264, 140, 112, 200));
    let (found, target) = default_detector(320).detect(&frame);
    let found = found.unwrap();
    assert!(target);
    assert!((found.bounding_box.width - 112.0).abs() < 8.0);
    assert!((found.bounding_box.height - 200.0).abs() < 8.0);
}

#[test]
fn test_detector_reports_non_target_card() {
    let frame = card_frame(640, 480, (120, 140, 400, 200));
    let (found, target) = default_detector(320).detect(&frame);
    assert!(found.is_some());
    assert!(!target);
}

#[test]
fn test_detector_on_blank_frame() {
    let frame = CameraFrame::from_rgba(64, 48, vec![40; 64 * 48 * 4], Duration::ZERO);
    let (found, target) = default_detector(320).detect(&frame);
    assert!(found.is_none());
    assert!(!target);
}
