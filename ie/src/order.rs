//! Seat numbering for detected tokens.
//!
//! Seats read like a human would read a ring of players around a table: the
//! top-most token is seat 1, then clockwise (on screen) around the centroid.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::Circle;

/// A detected circle with its 1-based seat number within one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedCircle {
    pub seat: u32,
    pub circle: Circle,
}

/// Order circles into seats `1..=N`.
///
/// Deterministic for a given circle set; the result never depends on detector
/// order except for circles exactly collinear with the centroid, which keep
/// their input order.
pub fn order_circles(circles: &[Circle]) -> Vec<OrderedCircle> {
    let Some(start) = circles.iter().min_by_key(|c| (c.y, c.x)) else {
        return vec![];
    };

    let n = circles.len() as f64;
    let cx = circles.iter().map(|c| c.x as f64).sum::<f64>() / n;
    let cy = circles.iter().map(|c| c.y as f64).sum::<f64>() / n;
    let angle = |c: &Circle| (c.y as f64 - cy).atan2(c.x as f64 - cx);
    let start_angle = angle(start);

    let mut keyed = circles
        .iter()
        .map(|c| {
            // The start circle sorts first even if another circle shares its angle.
            let is_start = std::ptr::eq(c, start);
            let key = if is_start {
                0.0
            } else {
                (angle(c) - start_angle).rem_euclid(TAU)
            };
            (key, !is_start, *c)
        })
        .collect::<Vec<_>>();

    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    keyed
        .into_iter()
        .enumerate()
        .map(|(i, (_, _, circle))| OrderedCircle {
            seat: i as u32 + 1,
            circle,
        })
        .collect()
}
