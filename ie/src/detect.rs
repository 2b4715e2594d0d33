//! Circular token detection.
//!
//! A gradient-based circle Hough transform: edge pixels vote for centres along
//! their gradient direction, accumulator peaks become centre candidates, and
//! each accepted centre gets the radius with the strongest edge support.
//!
//! The radius band is not fixed. Larger photos are assumed to be taken at a
//! higher effective resolution, so the expected token radius in pixels grows
//! with the image.

use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};

use crate::Image;

/// Canny upper threshold; the lower one is half of it.
const EDGE_THRESHOLD: f32 = 50.0;
/// Votes a centre candidate (and the radius support) must exceed.
const ACCUMULATOR_THRESHOLD: u32 = 30;
const MIN_RADIUS_PX: u32 = 20;
const CM_PER_INCH: f32 = 2.54;

/// A detected token in image pixel coordinates. Always fully inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Circle {
    pub x: u32,
    pub y: u32,
    pub radius: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Physical token radius bounds.
    pub min_radius_cm: f32,
    pub max_radius_cm: f32,
    /// Gaussian smoothing applied before edge detection (0 disables it).
    pub blur_sigma: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_radius_cm: 2.5,
            max_radius_cm: 3.5,
            blur_sigma: 2.0,
        }
    }
}

/// Guess the scan resolution from the image size.
fn estimated_dpi(width: u32, height: u32) -> f32 {
    match width.max(height) {
        s if s > 3000 => 300.0,
        s if s > 2000 => 250.0,
        s if s > 1000 => 200.0,
        _ => 150.0,
    }
}

/// Radius band `(min, max)` in pixels for an image of the given size, or `None`
/// if the image is too small to hold a token.
pub fn radius_band(width: u32, height: u32, config: &DetectorConfig) -> Option<(u32, u32)> {
    let px_per_cm = estimated_dpi(width, height) / CM_PER_INCH;
    let min_radius = ((config.min_radius_cm * px_per_cm) as u32).max(MIN_RADIUS_PX);
    let max_radius = ((config.max_radius_cm * px_per_cm) as u32).min(width.min(height) / 4);

    (max_radius >= min_radius).then_some((min_radius, max_radius))
}

#[derive(Debug, Clone, Copy)]
struct EdgePoint {
    x: i32,
    y: i32,
    // Unit gradient direction.
    dx: f32,
    dy: f32,
}

/// Edge points bucketed into square cells so a centre only has to look at its
/// neighbourhood when estimating the radius.
struct EdgeGrid {
    cell: i32,
    cols: i32,
    rows: i32,
    cells: Vec<Vec<EdgePoint>>,
}

impl EdgeGrid {
    fn new(width: u32, height: u32, cell: u32, points: &[EdgePoint]) -> Self {
        let cell = cell.max(1) as i32;
        let cols = width as i32 / cell + 1;
        let rows = height as i32 / cell + 1;
        let mut cells = vec![Vec::new(); (cols * rows) as usize];
        for p in points {
            cells[((p.y / cell) * cols + p.x / cell) as usize].push(*p);
        }
        Self {
            cell,
            cols,
            rows,
            cells,
        }
    }

    fn around(&self, x: i32, y: i32) -> impl Iterator<Item = &EdgePoint> {
        let cx = x / self.cell;
        let cy = y / self.cell;
        let xs = (cx - 1).max(0)..=(cx + 1).min(self.cols - 1);
        let ys = (cy - 1).max(0)..=(cy + 1).min(self.rows - 1);
        ys.flat_map(move |gy| xs.clone().map(move |gx| (gy * self.cols + gx) as usize))
            .flat_map(move |i| self.cells[i].iter())
    }
}

/// Detect circular tokens.
///
/// Pure function of the image and the configuration. Returns an empty list
/// when nothing is found (or the image is too small for the radius band).
pub fn detect_circles(image: Image, config: &DetectorConfig) -> Vec<Circle> {
    let (width, height) = (image.width(), image.height());
    if width < 3 || height < 3 {
        return vec![];
    }

    let Some((min_radius, max_radius)) = radius_band(width, height, config) else {
        tracing::debug!(width, height, "image too small for the token radius band");
        return vec![];
    };

    let gray = image.to_gray_image();
    let blurred = if config.blur_sigma > 0.0 {
        gaussian_blur_f32(&gray, config.blur_sigma)
    } else {
        gray
    };

    let edges = canny(&blurred, EDGE_THRESHOLD / 2.0, EDGE_THRESHOLD);
    let gx = horizontal_sobel(&blurred);
    let gy = vertical_sobel(&blurred);

    let mut points = Vec::new();
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y).0[0] as f32;
        let dy = gy.get_pixel(x, y).0[0] as f32;
        let mag = dx.hypot(dy);
        if mag == 0.0 {
            continue;
        }
        points.push(EdgePoint {
            x: x as i32,
            y: y as i32,
            dx: dx / mag,
            dy: dy / mag,
        });
    }

    tracing::debug!(
        edges = points.len(),
        min_radius,
        max_radius,
        "circle detection edge map"
    );
    if points.is_empty() {
        return vec![];
    }

    let accumulator = vote(&points, width, height, min_radius, max_radius);
    let candidates = centre_candidates(&accumulator, width, height);

    let grid = EdgeGrid::new(width, height, max_radius, &points);
    let min_dist_sq = (2 * min_radius as i64).pow(2);

    let mut centres: Vec<(i32, i32)> = Vec::new();
    let mut circles = Vec::new();
    for (x, y, _votes) in candidates {
        let too_close = centres.iter().any(|&(cx, cy)| {
            let dx = (cx - x) as i64;
            let dy = (cy - y) as i64;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }

        let Some(radius) = estimate_radius(&grid, x, y, min_radius, max_radius) else {
            continue;
        };
        centres.push((x, y));

        let (x, y) = (x as u32, y as u32);
        if x >= radius && x + radius < width && y >= radius && y + radius < height {
            circles.push(Circle { x, y, radius });
        } else {
            tracing::debug!(x, y, radius, "discarding circle that leaves the image");
        }
    }

    circles
}

/// Every edge pixel votes along its gradient, both ways, for each radius in the band.
fn vote(points: &[EdgePoint], width: u32, height: u32, min_radius: u32, max_radius: u32) -> Vec<u32> {
    let (w, h) = (width as i32, height as i32);
    let mut accumulator = vec![0u32; (width * height) as usize];

    for p in points {
        for sign in [1.0f32, -1.0] {
            for r in min_radius..=max_radius {
                let t = sign * r as f32;
                let x = (p.x as f32 + p.dx * t).round() as i32;
                let y = (p.y as f32 + p.dy * t).round() as i32;
                // The ray only moves further away once it has left the image.
                if x < 0 || y < 0 || x >= w || y >= h {
                    break;
                }
                accumulator[(y * w + x) as usize] += 1;
            }
        }
    }

    accumulator
}

/// Local accumulator maxima above the threshold, strongest first.
fn centre_candidates(accumulator: &[u32], width: u32, height: u32) -> Vec<(i32, i32, u32)> {
    let w = width as usize;
    let mut candidates = Vec::new();
    for y in 1..height as usize - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let v = accumulator[i];
            if v > ACCUMULATOR_THRESHOLD
                && v > accumulator[i - 1]
                && v >= accumulator[i + 1]
                && v > accumulator[i - w]
                && v >= accumulator[i + w]
            {
                candidates.push((x as i32, y as i32, v));
            }
        }
    }

    // Stable: equal votes stay in raster order.
    candidates.sort_by(|a, b| b.2.cmp(&a.2));
    candidates
}

/// Pick the radius with the most edge support around a centre.
fn estimate_radius(grid: &EdgeGrid, x: i32, y: i32, min_radius: u32, max_radius: u32) -> Option<u32> {
    let min_sq = (min_radius as i64).pow(2);
    let max_sq = (max_radius as i64).pow(2);
    let mut hist = vec![0u32; (max_radius - min_radius + 1) as usize];

    for p in grid.around(x, y) {
        let dx = (p.x - x) as i64;
        let dy = (p.y - y) as i64;
        let d_sq = dx * dx + dy * dy;
        if d_sq < min_sq || d_sq > max_sq {
            continue;
        }
        let d = ((d_sq as f64).sqrt().round() as u32).clamp(min_radius, max_radius);
        hist[(d - min_radius) as usize] += 1;
    }

    // 3-bin window: Canny edges of a drawn circle straddle neighbouring radii.
    let mut best: Option<(usize, u32)> = None;
    for i in 0..hist.len() {
        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(hist.len() - 1);
        let support = hist[lo..=hi].iter().sum::<u32>();
        if best.is_none_or(|(_, s)| support > s) {
            best = Some((i, support));
        }
    }

    let (i, support) = best?;
    if support <= ACCUMULATOR_THRESHOLD {
        return None;
    }

    let lo = i.saturating_sub(1);
    let hi = (i + 1).min(hist.len() - 1);
    let weighted = (lo..=hi)
        .map(|j| (min_radius as usize + j) as f64 * hist[j] as f64)
        .sum::<f64>();
    Some((weighted / support as f64).round() as u32)
}
