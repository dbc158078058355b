// SPDX-License-Identifier: GPL-3.0-only

//! Viewfinder quadrilateral detection

pub mod quadrilateral;
pub mod rectangles;
pub mod types;

pub use quadrilateral::{QuadrilateralDetector, biggest, is_target_aspect};
pub use rectangles::{ContourRectangleDetector, RectangleDetector};
pub use types::{Quadrilateral, Rect, Size};

/// Detector with the default contour backend at the given resolution
pub fn default_detector(max_dimension: u32) -> QuadrilateralDetector {
    QuadrilateralDetector::new(Box::new(ContourRectangleDetector::with_max_dimension(
        max_dimension,
    )))
}
