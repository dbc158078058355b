// SPDX-License-Identifier: GPL-3.0-only

//! Rectangle feature detection
//!
//! Frames are reduced to a small luma image and binarized with an Otsu
//! threshold. Every 4-connected region of either polarity that stays clear of
//! the frame border is a candidate. A candidate becomes a rectangle when its
//! convex hull reduces to four vertices that still cover the hull, and the
//! region fills that hull.

use super::types::{Quadrilateral, Size};
use crate::backends::camera::{CameraFrame, Point};
use crate::constants::detection::{DEFAULT_MAX_DIMENSION, MIN_AREA_FRACTION, MIN_FILL_RATIO, MIN_QUAD_COVERAGE};
use tracing::trace;

/// Source of rectangle-like candidates for a frame
pub trait RectangleDetector: Send {
    /// Candidates in frame coordinates, in discovery order
    fn detect(&self, frame: &CameraFrame) -> Vec<Quadrilateral>;
}

/// Connected-component contour detector
#[derive(Debug, Clone)]
pub struct ContourRectangleDetector {
    /// Frames are downscaled so their longer side is at most this
    max_dimension: u32,
    min_area_fraction: f32,
}

impl Default for ContourRectangleDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ContourRectangleDetector {
    pub fn new() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            min_area_fraction: MIN_AREA_FRACTION,
        }
    }

    pub fn with_max_dimension(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(16),
            ..Self::new()
        }
    }
}

impl RectangleDetector for ContourRectangleDetector {
    fn detect(&self, frame: &CameraFrame) -> Vec<Quadrilateral> {
        let start = std::time::Instant::now();
        let Some(luma) = LumaImage::from_frame(frame, self.max_dimension) else {
            return Vec::new();
        };

        let threshold = otsu_threshold(&luma.pixels);
        let binary: Vec<bool> = luma.pixels.iter().map(|&v| v > threshold).collect();
        let min_area = ((luma.width * luma.height) as f32 * self.min_area_fraction).max(4.0) as usize;

        let frame_size = Size {
            width: frame.width as f32,
            height: frame.height as f32,
        };
        let scale = luma.factor as f32;

        let quads: Vec<Quadrilateral> = components(&binary, luma.width, luma.height)
            .into_iter()
            .filter(|c| !c.touches_border && c.area >= min_area)
            .filter_map(|c| fit_quadrilateral(&c))
            .map(|corners| label_corners(corners, scale, frame_size))
            .collect();

        trace!(
            width = luma.width,
            height = luma.height,
            threshold,
            count = quads.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Rectangle detection complete"
        );
        quads
    }
}

/// Box-averaged luma at an integer reduction factor
struct LumaImage {
    width: usize,
    height: usize,
    factor: u32,
    pixels: Vec<u8>,
}

impl LumaImage {
    fn from_frame(frame: &CameraFrame, max_dimension: u32) -> Option<Self> {
        let longest = frame.width.max(frame.height);
        if longest == 0 {
            return None;
        }
        let factor = longest.div_ceil(max_dimension).max(1);
        let width = (frame.width / factor) as usize;
        let height = (frame.height / factor) as usize;
        if width < 3 || height < 3 {
            return None;
        }

        let stride = frame.stride as usize;
        let needed = stride * (frame.height as usize - 1) + frame.width as usize * 4;
        if frame.data.len() < needed {
            return None;
        }

        let f = factor as usize;
        let data: &[u8] = &frame.data;
        let mut pixels = Vec::with_capacity(width * height);
        for ty in 0..height {
            for tx in 0..width {
                let mut sum = 0u32;
                for sy in ty * f..(ty + 1) * f {
                    let row = sy * stride;
                    for sx in tx * f..(tx + 1) * f {
                        let i = row + sx * 4;
                        sum += (77 * data[i] as u32 + 150 * data[i + 1] as u32 + 29 * data[i + 2] as u32) >> 8;
                    }
                }
                pixels.push((sum / (f * f) as u32) as u8);
            }
        }

        Some(Self {
            width,
            height,
            factor,
            pixels,
        })
    }
}

/// Threshold maximizing between-class variance; class 0 is `<= t`
pub fn otsu_threshold(pixels: &[u8]) -> u8 {
    let mut histogram = [0u64; 256];
    for &p in pixels {
        histogram[p as usize] += 1;
    }
    let total = pixels.len() as f64;
    if total == 0.0 {
        return 127;
    }
    let sum_all: f64 = histogram.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut best = 0u8;
    let mut best_variance = -1.0f64;
    let mut weight_bg = 0.0f64;
    let mut sum_bg = 0.0f64;
    for t in 0..256usize {
        weight_bg += histogram[t] as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }
        sum_bg += t as f64 * histogram[t] as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best = t as u8;
        }
    }
    best
}

/// A 4-connected region with its per-row horizontal extent
#[derive(Debug)]
struct Component {
    area: usize,
    touches_border: bool,
    /// (row, min_x, max_x)
    rows: Vec<(usize, usize, usize)>,
}

/// Label regions of both polarities in raster order
fn components(binary: &[bool], width: usize, height: usize) -> Vec<Component> {
    let mut visited = vec![false; binary.len()];
    let mut found = Vec::new();
    let mut stack = Vec::new();

    for start in 0..binary.len() {
        if visited[start] {
            continue;
        }
        let value = binary[start];
        visited[start] = true;
        stack.push(start);

        let mut area = 0usize;
        let mut touches_border = false;
        // Everything above `top` is already labelled, so rows grow downward only
        let top = start / width;
        let mut extents: Vec<Option<(usize, usize)>> = Vec::new();

        while let Some(i) = stack.pop() {
            let (x, y) = (i % width, i / width);
            area += 1;
            if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
                touches_border = true;
            }
            let row = y - top;
            if row >= extents.len() {
                extents.resize(row + 1, None);
            }
            extents[row] = Some(match extents[row] {
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
                None => (x, x),
            });

            let mut visit = |j: usize| {
                if !visited[j] && binary[j] == value {
                    visited[j] = true;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < width {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - width);
            }
            if y + 1 < height {
                visit(i + width);
            }
        }

        let rows = extents
            .into_iter()
            .enumerate()
            .filter_map(|(row, e)| e.map(|(lo, hi)| (top + row, lo, hi)))
            .collect();
        found.push(Component {
            area,
            touches_border,
            rows,
        });
    }
    found
}

type Vertex = (i64, i64);

fn cross(o: Vertex, a: Vertex, b: Vertex) -> i64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Monotone chain hull without collinear points
fn convex_hull(mut points: Vec<Vertex>) -> Vec<Vertex> {
    points.sort_unstable();
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut hull: Vec<Vertex> = Vec::with_capacity(points.len() * 2);
    for &p in &points {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in points.iter().rev().skip(1) {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

fn polygon_area(poly: &[Vertex]) -> f64 {
    let n = poly.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % n]);
            a.0 * b.1 - b.0 * a.1
        })
        .sum();
    twice.abs() as f64 / 2.0
}

/// Drop the vertex whose removal loses the least area until four remain
fn reduce_to_quad(mut hull: Vec<Vertex>) -> Option<Vec<Vertex>> {
    if hull.len() < 4 {
        return None;
    }
    while hull.len() > 4 {
        let n = hull.len();
        let (idx, _) = (0..n)
            .map(|i| {
                let loss = cross(hull[(i + n - 1) % n], hull[i], hull[(i + 1) % n]).abs();
                (i, loss)
            })
            .min_by_key(|&(_, loss)| loss)?;
        hull.remove(idx);
    }
    Some(hull)
}

/// Four pixel-edge corners in reduced coordinates, if the region is rectangular
fn fit_quadrilateral(component: &Component) -> Option<[Vertex; 4]> {
    let mut points = Vec::with_capacity(component.rows.len() * 4);
    for &(y, lo, hi) in &component.rows {
        let (y, lo, hi) = (y as i64, lo as i64, hi as i64 + 1);
        points.extend_from_slice(&[(lo, y), (hi, y), (lo, y + 1), (hi, y + 1)]);
    }

    let hull = convex_hull(points);
    let hull_area = polygon_area(&hull);
    if hull_area <= 0.0 {
        return None;
    }
    if (component.area as f64) < hull_area * MIN_FILL_RATIO as f64 {
        return None;
    }

    let quad = reduce_to_quad(hull)?;
    if polygon_area(&quad) < hull_area * MIN_QUAD_COVERAGE as f64 {
        return None;
    }
    Some([quad[0], quad[1], quad[2], quad[3]])
}

/// Label corners and map them back to frame coordinates
///
/// Top-left has the smallest x+y and bottom-right is opposite it. Of the
/// remaining two, top-right has the larger x−y.
fn label_corners(corners: [Vertex; 4], scale: f32, frame_size: Size) -> Quadrilateral {
    let tl = (0..4)
        .min_by_key(|&i| corners[i].0 + corners[i].1)
        .unwrap_or(0);
    let br = (tl + 2) % 4;
    let (a, b) = ((tl + 1) % 4, (tl + 3) % 4);
    let (tr, bl) = if corners[a].0 - corners[a].1 >= corners[b].0 - corners[b].1 {
        (a, b)
    } else {
        (b, a)
    };

    let p = |i: usize| Point::new(corners[i].0 as f32 * scale, corners[i].1 as f32 * scale);
    Quadrilateral::new(p(tl), p(tr), p(bl), p(br), frame_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Dark frame with bright axis-aligned rectangles given as (x0, y0, x1, y1)
    fn frame_with_rects(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> CameraFrame {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&[20, 20, 20, 255]);
        }
        for &(x0, y0, x1, y1) in rects {
            for y in y0..y1 {
                for x in x0..x1 {
                    let i = ((y * width + x) * 4) as usize;
                    data[i..i + 4].copy_from_slice(&[230, 230, 230, 255]);
                }
            }
        }
        CameraFrame::from_rgba(width, height, data, Duration::ZERO)
    }

    #[test]
    fn test_otsu_splits_two_levels() {
        let mut pixels = vec![20u8; 100];
        pixels.extend(vec![220u8; 50]);
        let t = otsu_threshold(&pixels);
        assert!((20..220).contains(&t));
    }

    #[test]
    fn test_detects_axis_aligned_rectangle() {
        let frame = frame_with_rects(300, 200, &[(100, 50, 156, 150)]);
        let quads = ContourRectangleDetector::new().detect(&frame);
        assert_eq!(quads.len(), 1);

        let q = quads[0];
        assert_eq!(q.top_left, Point::new(100.0, 50.0));
        assert_eq!(q.top_right, Point::new(156.0, 50.0));
        assert_eq!(q.bottom_left, Point::new(100.0, 150.0));
        assert_eq!(q.bottom_right, Point::new(156.0, 150.0));
        assert!((q.aspect_ratio().unwrap() - 0.56).abs() < 1e-4);
    }

    #[test]
    fn test_maps_back_from_downscaled_frame() {
        let frame = frame_with_rects(640, 480, &[(100, 100, 300, 400)]);
        let quads = ContourRectangleDetector::new().detect(&frame);
        assert_eq!(quads.len(), 1);
        assert_eq!(quads[0].top_left, Point::new(100.0, 100.0));
        assert_eq!(quads[0].bottom_right, Point::new(300.0, 400.0));
        assert_eq!(quads[0].frame_size.width, 640.0);
    }

    #[test]
    fn test_multiple_rectangles_in_scan_order() {
        let frame = frame_with_rects(300, 200, &[(150, 20, 250, 80), (20, 100, 80, 180)]);
        let quads = ContourRectangleDetector::new().detect(&frame);
        assert_eq!(quads.len(), 2);
        assert_eq!(quads[0].top_left, Point::new(150.0, 20.0));
        assert_eq!(quads[1].top_left, Point::new(20.0, 100.0));
    }

    #[test]
    fn test_ignores_border_touching_and_tiny_regions() {
        let frame = frame_with_rects(300, 200, &[(0, 0, 100, 100), (200, 150, 203, 153)]);
        assert!(ContourRectangleDetector::new().detect(&frame).is_empty());
    }

    #[test]
    fn test_rejects_disc() {
        let (w, h) = (200u32, 200u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for y in 0..h {
            for x in 0..w {
                let (dx, dy) = (x as f32 - 100.0, y as f32 - 100.0);
                let v = if dx * dx + dy * dy < 60.0 * 60.0 { 230 } else { 20 };
                let i = ((y * w + x) * 4) as usize;
                data[i..i + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = CameraFrame::from_rgba(w, h, data, Duration::ZERO);
        assert!(ContourRectangleDetector::new().detect(&frame).is_empty());
    }

    #[test]
    fn test_component_rows_cover_only_their_span() {
        let (w, h) = (64usize, 48usize);
        let checker: Vec<bool> = (0..w * h).map(|i| (i % w + i / w) % 2 == 0).collect();
        let found = components(&checker, w, h);
        assert_eq!(found.len(), w * h);
        assert!(found.iter().all(|c| c.area == 1 && c.rows.len() == 1));
        let row_entries: usize = found.iter().map(|c| c.rows.len()).sum();
        assert_eq!(row_entries, w * h);

        // A bar starting mid-frame keeps absolute row numbers
        let mut bar = vec![false; w * h];
        for y in 10..20 {
            for x in 5..8 {
                bar[y * w + x] = true;
            }
        }
        let found = components(&bar, w, h);
        let bar = found.iter().find(|c| c.area == 30).unwrap();
        assert_eq!(bar.rows.first(), Some(&(10, 5, 7)));
        assert_eq!(bar.rows.last(), Some(&(19, 5, 7)));
        assert_eq!(bar.rows.len(), 10);
    }

    #[test]
    fn test_checkerboard_frame_yields_nothing() {
        let (w, h) = (1280u32, 720u32);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = if (x / 4 + y / 4) % 2 == 0 { 230 } else { 20 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = CameraFrame::from_rgba(w, h, data, Duration::ZERO);
        assert!(ContourRectangleDetector::new().detect(&frame).is_empty());
    }

    #[test]
    fn test_hull_and_reduction() {
        let hull = convex_hull(vec![(0, 0), (4, 0), (4, 4), (0, 4), (2, 2), (2, 0)]);
        assert_eq!(hull.len(), 4);
        assert_eq!(polygon_area(&hull), 16.0);

        let octagon = vec![(1, 0), (3, 0), (4, 1), (4, 3), (3, 4), (1, 4), (0, 3), (0, 1)];
        let quad = reduce_to_quad(convex_hull(octagon)).unwrap();
        assert_eq!(quad.len(), 4);
    }
}
