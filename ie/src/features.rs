//! Oriented binary features for token matching.
//!
//! FAST-9 keypoints, an intensity-centroid orientation per keypoint and a
//! 256-bit BRIEF descriptor sampled along a rotated pattern, compared with
//! Hamming distance. Everything runs on a fixed-size grayscale canvas so token
//! crops and reference icons of any size are comparable.

use std::f32::consts::PI;
use std::sync::LazyLock;

use anyhow::Result;
use image::GrayImage;
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;

use crate::{Image, resize_gray};

/// Side of the square canvas every image is resampled to.
pub const NORMALIZED_SIZE: u32 = 200;
pub const MAX_FEATURES: usize = 500;
/// A match is kept only when the nearest neighbour is this much closer than the second.
pub const RATIO: f32 = 0.75;
/// Raw good-match ratios are small even for true matches; scale them into [0, 1].
pub const CONFIDENCE_SCALE: f32 = 5.0;

const FAST_THRESHOLD: u8 = 20;
/// Keypoints closer than this to the edge are dropped so every sample stays inside.
const BORDER: u32 = 16;
const ORIENTATION_RADIUS: i32 = 15;
const PATTERN_RADIUS: f32 = 13.0;
const BRIEF_SIGMA: f32 = 2.0;

/// 256-bit binary descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; 32]);

impl Descriptor {
    #[inline]
    pub fn distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

/// Point pairs `(ax, ay, bx, by)` relative to the keypoint.
///
/// Points lie on a golden-angle spiral inside `PATTERN_RADIUS`; pair `i` joins
/// an inner point with an outer one so comparisons span the whole patch.
static PATTERN: LazyLock<[[f32; 4]; 256]> = LazyLock::new(|| {
    const POINTS: usize = 512;
    let golden = PI * (3.0 - 5f32.sqrt());
    let point = |i: usize| {
        let r = PATTERN_RADIUS * ((i as f32 + 0.5) / POINTS as f32).sqrt();
        let theta = i as f32 * golden;
        (r * theta.cos(), r * theta.sin())
    };

    let mut pattern = [[0.0; 4]; 256];
    for (i, pair) in pattern.iter_mut().enumerate() {
        let (ax, ay) = point(i);
        let (bx, by) = point(POINTS - 1 - i);
        *pair = [ax, ay, bx, by];
    }
    pattern
});

/// Resample an image onto the canonical grayscale canvas.
pub fn normalize(image: Image) -> Result<GrayImage> {
    resize_gray(&image.to_gray_image(), NORMALIZED_SIZE, NORMALIZED_SIZE)
}

/// Normalize and describe an image.
pub fn describe(image: Image) -> Result<Vec<Descriptor>> {
    Ok(extract(&normalize(image)?))
}

/// Up to `MAX_FEATURES` descriptors, strongest keypoints first.
pub fn extract(gray: &GrayImage) -> Vec<Descriptor> {
    let (width, height) = gray.dimensions();
    if width <= 2 * BORDER || height <= 2 * BORDER {
        return vec![];
    }

    let mut corners = corners_fast9(gray, FAST_THRESHOLD)
        .into_iter()
        .filter(|c| c.x >= BORDER && c.y >= BORDER && c.x < width - BORDER && c.y < height - BORDER)
        .collect::<Vec<_>>();
    corners.sort_by(|a, b| b.score.total_cmp(&a.score));
    corners.truncate(MAX_FEATURES);

    if corners.is_empty() {
        return vec![];
    }

    let smooth = gaussian_blur_f32(gray, BRIEF_SIGMA);
    corners
        .iter()
        .map(|c| {
            let angle = orientation(gray, c.x as i32, c.y as i32);
            brief(&smooth, c.x as f32, c.y as f32, angle)
        })
        .collect()
}

/// Patch orientation from the intensity centroid.
fn orientation(gray: &GrayImage, x: i32, y: i32) -> f32 {
    let r_sq = ORIENTATION_RADIUS * ORIENTATION_RADIUS;
    let (mut m01, mut m10) = (0i64, 0i64);
    for dy in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
        for dx in -ORIENTATION_RADIUS..=ORIENTATION_RADIUS {
            if dx * dx + dy * dy > r_sq {
                continue;
            }
            let v = gray.get_pixel((x + dx) as u32, (y + dy) as u32).0[0] as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f32).atan2(m10 as f32)
}

fn brief(smooth: &GrayImage, x: f32, y: f32, angle: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let sample = |px: f32, py: f32| {
        let sx = (x + px * cos - py * sin).round() as u32;
        let sy = (y + px * sin + py * cos).round() as u32;
        smooth.get_pixel(sx, sy).0[0]
    };

    let mut desc = [0u8; 32];
    for (i, [ax, ay, bx, by]) in PATTERN.iter().enumerate() {
        if sample(*ax, *ay) < sample(*bx, *by) {
            desc[i / 8] |= 1 << (i % 8);
        }
    }
    Descriptor(desc)
}

/// Count query descriptors that pass the ratio test against `reference`.
pub fn good_matches(query: &[Descriptor], reference: &[Descriptor]) -> usize {
    if reference.len() < 2 {
        return 0;
    }

    query
        .iter()
        .filter(|q| {
            let (mut best, mut second) = (u32::MAX, u32::MAX);
            for r in reference {
                let d = q.distance(r);
                if d < best {
                    second = best;
                    best = d;
                } else if d < second {
                    second = d;
                }
            }
            (best as f32) < RATIO * second as f32
        })
        .count()
}

/// Similarity in `[0, 1]` between two descriptor sets.
pub fn confidence(query: &[Descriptor], reference: &[Descriptor]) -> f32 {
    if query.len() < 2 || reference.len() < 2 {
        return 0.0;
    }
    let raw = good_matches(query, reference) as f32 / query.len().min(reference.len()) as f32;
    (raw * CONFIDENCE_SCALE).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(bytes: &[(usize, u8)]) -> Descriptor {
        let mut d = [0u8; 32];
        for &(i, b) in bytes {
            d[i] = b;
        }
        Descriptor(d)
    }

    /// 10 px blocks of pseudo-random gray levels.
    fn blocky_noise(seed: u32) -> GrayImage {
        GrayImage::from_fn(NORMALIZED_SIZE, NORMALIZED_SIZE, |x, y| {
            let mut h = (x / 10).wrapping_mul(73_856_093) ^ (y / 10).wrapping_mul(19_349_663) ^ seed.wrapping_mul(83_492_791);
            h ^= h >> 13;
            h = h.wrapping_mul(0x5bd1_e995);
            h ^= h >> 15;
            image::Luma([(h & 0xff) as u8])
        })
    }

    #[test]
    fn hamming_distance_counts_bits() {
        assert_eq!(desc(&[]).distance(&desc(&[])), 0);
        assert_eq!(desc(&[(0, 0xff)]).distance(&desc(&[])), 8);
        assert_eq!(desc(&[(0, 0b1010)]).distance(&desc(&[(0, 0b0110), (31, 1)])), 3);
    }

    #[test]
    fn identical_sets_score_one() {
        let set = [desc(&[]), desc(&[(0, 0xff), (1, 0xff)]), desc(&[(5, 0xff), (6, 0xff), (7, 0xff)])];
        assert_eq!(good_matches(&set, &set), 3);
        assert_eq!(confidence(&set, &set), 1.0);
    }

    #[test]
    fn equidistant_neighbours_never_pass_the_ratio_test() {
        let query = [desc(&[]), desc(&[(2, 0xff)])];
        let reference = [desc(&[(0, 0xff)]), desc(&[(1, 0xff)])];
        assert_eq!(good_matches(&query, &reference), 0);
        assert_eq!(confidence(&query, &reference), 0.0);
    }

    #[test]
    fn ratio_test_is_strict_at_three_quarters() {
        let query = [desc(&[])];
        // 6 < 0.75 * 8 is false.
        let at_ratio = [desc(&[(0, 0b0011_1111)]), desc(&[(1, 0xff)])];
        assert_eq!(good_matches(&query, &at_ratio), 0);
        // 5 < 0.75 * 8 holds.
        let below_ratio = [desc(&[(0, 0b0001_1111)]), desc(&[(1, 0xff)])];
        assert_eq!(good_matches(&query, &below_ratio), 1);
    }

    #[test]
    fn too_few_descriptors_score_zero() {
        let one = [desc(&[])];
        let two = [desc(&[]), desc(&[(0, 0xff)])];
        assert_eq!(confidence(&one, &two), 0.0);
        assert_eq!(confidence(&two, &one), 0.0);
        assert_eq!(confidence(&[], &two), 0.0);
    }

    #[test]
    fn blank_canvas_has_no_features() {
        let blank = GrayImage::new(NORMALIZED_SIZE, NORMALIZED_SIZE);
        assert!(extract(&blank).is_empty());
    }

    #[test]
    fn textured_canvas_is_described_deterministically() {
        let img = blocky_noise(7);
        let a = extract(&img);
        let b = extract(&img);
        assert!(a.len() >= 2);
        assert!(a.len() <= MAX_FEATURES);
        assert_eq!(a, b);
        assert_eq!(confidence(&a, &b), 1.0);
    }

    #[test]
    fn pattern_stays_inside_the_border() {
        for [ax, ay, bx, by] in PATTERN.iter() {
            for (x, y) in [(ax, ay), (bx, by)] {
                assert!(x.hypot(*y) <= PATTERN_RADIUS + 0.01);
            }
        }
    }
}
