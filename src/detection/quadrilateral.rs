// SPDX-License-Identifier: GPL-3.0-only

//! Largest-rectangle selection and target aspect classification

use super::rectangles::RectangleDetector;
use super::types::Quadrilateral;
use crate::backends::camera::CameraFrame;
use crate::constants::detection::TARGET_ASPECT_BANDS;
use tracing::trace;

/// Finds the largest rectangle-like feature in a frame
pub struct QuadrilateralDetector {
    rectangles: Box<dyn RectangleDetector>,
}

impl QuadrilateralDetector {
    pub fn new(rectangles: Box<dyn RectangleDetector>) -> Self {
        Self { rectangles }
    }

    /// Detect the biggest quadrilateral and whether it has a target aspect
    pub fn detect(&self, frame: &CameraFrame) -> (Option<Quadrilateral>, bool) {
        let candidates = self.rectangles.detect(frame);
        let Some(quad) = biggest(&candidates).copied() else {
            return (None, false);
        };
        let target = is_target_aspect(&quad);
        trace!(candidates = candidates.len(), %quad, target, "Quadrilateral detected");
        (Some(quad), target)
    }
}

/// The candidate with the largest perimeter
///
/// A single candidate is returned unconditionally. Ties go to the earliest.
pub fn biggest(candidates: &[Quadrilateral]) -> Option<&Quadrilateral> {
    if candidates.len() <= 1 {
        return candidates.first();
    }
    let mut best = &candidates[0];
    let mut best_perimeter = best.perimeter();
    for quad in &candidates[1..] {
        let perimeter = quad.perimeter();
        if perimeter > best_perimeter {
            best = quad;
            best_perimeter = perimeter;
        }
    }
    Some(best)
}

/// Whether the width/height ratio falls in one of the target screen bands
pub fn is_target_aspect(quad: &Quadrilateral) -> bool {
    quad.aspect_ratio()
        .map(ratio_in_target_band)
        .unwrap_or(false)
}

pub fn ratio_in_target_band(ratio: f32) -> bool {
    TARGET_ASPECT_BANDS
        .iter()
        .any(|&(low, high)| ratio >= low && ratio <= high)
}
