// SPDX-License-Identifier: GPL-3.0-only

//! Geometry types for detection results

use crate::backends::camera::Point;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn bounding(points: &[Point]) -> Self {
        let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
        let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if points.is_empty() {
            return Self::default();
        }
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }
}

/// Four labelled corners of a detected rectangle-like feature
///
/// Coordinates are in source-frame pixels with the origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadrilateral {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
    pub bounding_box: Rect,
    pub frame_size: Size,
}

impl Quadrilateral {
    pub fn new(
        top_left: Point,
        top_right: Point,
        bottom_left: Point,
        bottom_right: Point,
        frame_size: Size,
    ) -> Self {
        let bounding_box = Rect::bounding(&[top_left, top_right, bottom_left, bottom_right]);
        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            bounding_box,
            frame_size,
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Sum of the four edge lengths, walking TL → TR → BR → BL → TL
    pub fn perimeter(&self) -> f32 {
        let c = self.corners();
        (0..4).map(|i| distance(c[i], c[(i + 1) % 4])).sum()
    }

    /// |TR.x − TL.x| / |TL.y − BL.y|, or `None` for a zero height
    pub fn aspect_ratio(&self) -> Option<f32> {
        let width = (self.top_right.x - self.top_left.x).abs();
        let height = (self.top_left.y - self.bottom_left.y).abs();
        if height <= f32::EPSILON {
            None
        } else {
            Some(width / height)
        }
    }

    /// Uniformly scale every coordinate, including the frame size
    pub fn scaled(&self, by: f32) -> Self {
        let s = |p: Point| Point::new(p.x * by, p.y * by);
        Self::new(
            s(self.top_left),
            s(self.top_right),
            s(self.bottom_left),
            s(self.bottom_right),
            Size {
                width: self.frame_size.width * by,
                height: self.frame_size.height * by,
            },
        )
    }

    /// Map into another frame size (e.g. from detection frame to view)
    pub fn mapped_to(&self, target: Size) -> Self {
        if self.frame_size.width <= 0.0 || self.frame_size.height <= 0.0 {
            return *self;
        }
        let sx = target.width / self.frame_size.width;
        let sy = target.height / self.frame_size.height;
        let m = |p: Point| Point::new(p.x * sx, p.y * sy);
        Self::new(
            m(self.top_left),
            m(self.top_right),
            m(self.bottom_left),
            m(self.bottom_right),
            target,
        )
    }
}

impl fmt::Display for Quadrilateral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TL({:.1},{:.1}) TR({:.1},{:.1}) BR({:.1},{:.1}) BL({:.1},{:.1})",
            self.top_left.x,
            self.top_left.y,
            self.top_right.x,
            self.top_right.y,
            self.bottom_right.x,
            self.bottom_right.y,
            self.bottom_left.x,
            self.bottom_left.y
        )
    }
}

fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_quad(x: f32, y: f32, w: f32, h: f32) -> Quadrilateral {
        Quadrilateral::new(
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x, y + h),
            Point::new(x + w, y + h),
            Size {
                width: 100.0,
                height: 100.0,
            },
        )
    }

    #[test]
    fn test_perimeter_and_aspect() {
        let q = rect_quad(10.0, 10.0, 30.0, 40.0);
        assert!((q.perimeter() - 140.0).abs() < 1e-4);
        assert!((q.aspect_ratio().unwrap() - 0.75).abs() < 1e-6);
        assert_eq!(q.bounding_box, Rect { x: 10.0, y: 10.0, width: 30.0, height: 40.0 });
    }

    #[test]
    fn test_scaled() {
        let q = rect_quad(10.0, 10.0, 30.0, 40.0).scaled(2.0);
        assert_eq!(q.top_right, Point::new(80.0, 20.0));
        assert_eq!(q.frame_size.width, 200.0);
        assert!((q.perimeter() - 280.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_height_has_no_aspect() {
        let q = rect_quad(0.0, 0.0, 10.0, 0.0);
        assert!(q.aspect_ratio().is_none());
    }
}
