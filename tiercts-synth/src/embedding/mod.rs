//! Restricted deferred-merge embedding over a small candidate set.
//!
//! The set is repeatedly bisected around its rounded center. Every center visited is emitted, so
//! one search yields a planned coordinate for the merge node and then for each of its ancestors.

use itertools::{Itertools, MinMaxResult};
use log::debug;

use crate::core::Point;


#[inline]
fn manhattan(a: &Point, b: &Point) -> f64 {
    (a.x - b.x).abs() + (a.y - b.y).abs()
}

/// Half of the largest pairwise Manhattan distance
pub fn radius(points: &[Point]) -> f64 {
    points
        .iter()
        .tuple_combinations()
        .map(|(a, b)| manhattan(a, b))
        .fold(0.0, f64::max)
        / 2.0
}

/// Midpoint of the bounding box, unrounded. A single point is its own center.
pub fn center(points: &[Point]) -> Option<Point> {
    let span = |values: MinMaxResult<f64>| match values {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some(v),
        MinMaxResult::MinMax(lo, hi) => Some((lo + hi) / 2.0),
    };
    let x = span(points.iter().map(|p| p.x).minmax_by(f64::total_cmp))?;
    let y = span(points.iter().map(|p| p.y).minmax_by(f64::total_cmp))?;
    Some(Point::new(x, y))
}

/// Snap to the grid, rounding exactly one coordinate up and the other down: x rounds up when its
/// fractional part is at least one half, and y then rounds down; otherwise the reverse.
pub fn round_split(p: Point) -> Point {
    if p.x - p.x.floor() >= 0.5 {
        Point::new(p.x.ceil(), p.y.floor())
    } else {
        Point::new(p.x.floor(), p.y.ceil())
    }
}

/// Bisect `points` around `c`. Each rule is only consulted when the one before it left a side
/// empty; the last one always produces two non-empty halves for two or more points.
fn bisect(points: &[Point], c: Point) -> (Vec<Point>, Vec<Point>) {
    let rules: [&dyn Fn(&Point) -> bool; 4] = [
        &|p: &Point| p.x <= c.x,
        &|p: &Point| p.y <= c.y,
        &|p: &Point| p.x + p.y <= c.x + c.y,
        &|p: &Point| (p.x <= c.x && p.y <= c.y) || (p.x > c.x && p.y > c.y),
    ];

    for rule in rules {
        let (lower, upper): (Vec<Point>, Vec<Point>) =
            points.iter().copied().partition(|p| rule(p));
        if !lower.is_empty() && !upper.is_empty() {
            return (lower, upper);
        }
    }

    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| (a.x + a.y).total_cmp(&(b.x + b.y)));
    let upper = sorted.split_off(sorted.len() / 2);
    (sorted, upper)
}

fn embed_subset(points: &[Point], out: &mut Vec<Point>) {
    if points.len() <= 1 {
        return;
    }
    let c = match center(points) {
        Some(c) => round_split(c),
        None => return,
    };
    out.push(c);

    let (lower, upper) = bisect(points, c);
    embed_subset(&lower, out);
    embed_subset(&upper, out);
}

/// Plan merge coordinates over `points`.
///
/// The first coordinate is `anchor` when one is given, otherwise the center of the whole set. The
/// centers of every bisection follow in depth-first order. All coordinates are on the grid.
pub fn embed(points: &[Point], anchor: Option<Point>) -> Vec<Point> {
    let c = match center(points) {
        Some(c) => c,
        None => return Vec::new(),
    };
    debug!(
        "Embedding {} candidates, radius {:.1}",
        points.len(),
        radius(points)
    );

    let mut out = vec![round_split(anchor.unwrap_or(c))];
    embed_subset(points, &mut out);
    out.into_iter().map(round_split).collect()
}

/// Drop every point closer than `min_distance` (Euclidean) to one already kept
pub fn filter_points(points: &[Point], min_distance: f64) -> Vec<Point> {
    let mut kept: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if kept
            .iter()
            .all(|k| nalgebra::distance(k, p) >= min_distance)
        {
            kept.push(*p);
        }
    }
    kept
}
