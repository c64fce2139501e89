//! Zero-skew merging of sibling sub-trees.
//!
//! For every internal node whose children are both placed, the tapping fraction `x` along the
//! Manhattan segment between the children is solved so that both sides see the same Elmore delay:
//!
//! ```text
//! x = [(d2 - d1) + r L (c2 + c L / 2)] / [r L (c L + c1 + c2)]
//! ```
//!
//! An `x` inside `[0, 1]` is realized on the segment. Outside of it the faster side needs a longer
//! wire; when that wire would exceed half the segment length again, a buffer on the merge node
//! absorbs the imbalance instead.

use std::collections::HashSet;
use std::ops::AddAssign;

use anyhow::{bail, Result};
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;
use tiercts_common::{GridPosition, PhysicalUnits, WireUnit};

use crate::config::EmbeddingConfig;
use crate::core::{ClockTree, NodeIndex, NodeKind, Point, SynthError};
use crate::embedding::{embed, filter_points, round_split};


/// Extension beyond this multiple of the segment length is replaced by a buffer
const MAX_STRETCH: f64 = 1.5;

/// How a merge node was resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both children share a planar position
    Degenerate,
    InRange,
    ExtendedNoBuffer,
    ExtendedBuffered,
}

/// Result of the search for an unoccupied grid cell
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FreePoint {
    Free(Point),
    /// Every cell within the search radius holds a sink; carries the point searched around
    Exhausted(Point),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub merges: usize,
    pub degenerate: usize,
    pub in_range: usize,
    pub extended: usize,
    pub buffered: usize,
    /// Nodes left unplaced because a child never got a position
    pub unresolved: usize,
    /// Merge points committed on top of a sink because the free-point search gave up
    pub infeasible_embeddings: usize,
}

impl AddAssign<&MergeStats> for MergeStats {
    fn add_assign(&mut self, rhs: &MergeStats) {
        self.merges += rhs.merges;
        self.degenerate += rhs.degenerate;
        self.in_range += rhs.in_range;
        self.extended += rhs.extended;
        self.buffered += rhs.buffered;
        self.unresolved += rhs.unresolved;
        self.infeasible_embeddings += rhs.infeasible_embeddings;
    }
}

/// Fraction of the segment, measured from child 1, at which both children see equal delay. A
/// degenerate segment (zero length or zero wire resistance) taps in the middle.
pub fn tapping_fraction(d1: f64, d2: f64, c1: f64, c2: f64, wire: &WireUnit, length: f64) -> f64 {
    let (r, c) = (wire.resistance, wire.capacitance);
    let x = ((d2 - d1) + r * length * (c2 + c * length / 2.0))
        / (r * length * (c * length + c1 + c2));
    if x.is_finite() {
        x
    } else {
        0.5
    }
}

/// Length of extra wire, loaded by `c_far`, whose delay makes up `delta_d`. Never negative.
pub fn extension_length(wire: &WireUnit, c_far: f64, delta_d: f64) -> f64 {
    let (r, c) = (wire.resistance, wire.capacitance);
    let l = (((r * c_far).powi(2) + 2.0 * r * c * delta_d).sqrt() - r * c_far) / (r * c);
    if l.is_finite() {
        l.max(0.0)
    } else {
        0.0
    }
}

/// The four points `distance` away from `p` along the axes: right, left, up, down
pub fn find_points(p: Point, distance: f64) -> [Point; 4] {
    [
        Point::new(p.x + distance, p.y),
        Point::new(p.x - distance, p.y),
        Point::new(p.x, p.y + distance),
        Point::new(p.x, p.y - distance),
    ]
}

/// Point `distance` along the L-shaped path from `from` to `to`, x leg first
pub fn path_point(from: Point, to: Point, distance: f64) -> Point {
    let dx = to.x - from.x;
    let along_x = dx.abs().min(distance);
    let along_y = (to.y - from.y).abs().min(distance - along_x);
    Point::new(
        from.x + along_x * dx.signum(),
        from.y + along_y * (to.y - from.y).signum(),
    )
}

/// Whether `p` lies on some shortest Manhattan path between `a` and `b`
fn within_segment(p: &Point, a: &Point, b: &Point) -> bool {
    a.x.min(b.x) <= p.x && p.x <= a.x.max(b.x) && a.y.min(b.y) <= p.y && p.y <= a.y.max(b.y)
}

#[inline]
fn planar(p: &GridPosition) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

/// Bottom-up zero-skew merge pass over one tree.
pub struct ZeroSkewMerger<'a> {
    units: &'a PhysicalUnits,
    config: &'a EmbeddingConfig,
    /// Planar positions of every placed leaf, whatever its die
    occupied: HashSet<(i32, i32)>,
    stats: MergeStats,
}

impl<'a> ZeroSkewMerger<'a> {
    pub fn new(units: &'a PhysicalUnits, config: &'a EmbeddingConfig, tree: &ClockTree) -> Self {
        let occupied = tree
            .leaves()
            .filter_map(|idx| tree.node(idx).pos)
            .map(|p| (p.x, p.y))
            .collect();
        Self {
            units,
            config,
            occupied,
            stats: Default::default(),
        }
    }

    /// Whether a sink of the tree sits at the planar position of `p`
    pub fn is_occupied_by_leaf(&self, p: &Point) -> bool {
        self.occupied.contains(&(p.x as i32, p.y as i32))
    }

    /// Nearest cell to `p` free of sinks, probing square rings of growing Chebyshev radius. Cells
    /// outside the layout are never returned.
    pub fn find_nearest_free_point(&self, p: Point) -> FreePoint {
        if !self.is_occupied_by_leaf(&p) {
            return FreePoint::Free(p);
        }
        for d in 1..=self.config.free_point_search_radius {
            let ring = (-d..=d).cartesian_product(-d..=d);
            for (dx, dy) in ring {
                let candidate = Point::new(p.x + dx as f64, p.y + dy as f64);
                if !self.units.layout.contains(candidate.x, candidate.y) {
                    continue;
                }
                if !self.is_occupied_by_leaf(&candidate) {
                    return FreePoint::Free(candidate);
                }
            }
        }
        FreePoint::Exhausted(p)
    }

    /// Merge every internal node of `tree`, children before parents. Nodes whose children cannot
    /// be placed are retried once the rest of the pass made progress.
    pub fn run(mut self, tree: &mut ClockTree) -> MergeStats {
        let _span = tracing::info_span!("zero_skew_merge", nodes = tree.len()).entered();

        let mut pending: Vec<NodeIndex> = tree
            .postorder()
            .into_iter()
            .filter(|idx| !tree.node(*idx).is_leaf())
            .collect();

        while !pending.is_empty() {
            let mut deferred = Vec::new();
            for idx in pending.iter().copied() {
                match self.merge(tree, idx) {
                    Ok(outcome) => debug!(
                        "Node {}: {:?} at {:?}",
                        tree.node(idx).id,
                        outcome,
                        tree.node(idx).pos
                    ),
                    Err(e) => match e.downcast_ref() {
                        Some(SynthError::UnresolvedGeometry { .. }) => deferred.push(idx),
                        _ => warn!("Merge of node {} failed: {:?}", tree.node(idx).id, e),
                    },
                }
            }
            if deferred.len() == pending.len() {
                warn!("{} merge nodes left without a position", deferred.len());
                self.stats.unresolved = deferred.len();
                break;
            }
            pending = deferred;
        }

        info!(
            "{} merges ({} in range, {} extended, {} buffered), {} infeasible embeddings",
            self.stats.merges,
            self.stats.in_range,
            self.stats.extended,
            self.stats.buffered,
            self.stats.infeasible_embeddings
        );
        self.stats
    }

    /// Resolve the position of the internal node `node` from its two children.
    pub fn merge(&mut self, tree: &mut ClockTree, node: NodeIndex) -> Result<MergeOutcome> {
        let id = tree.node(node).id;
        let (left, right) = match tree.node(node).children() {
            Some(c) => c,
            None => bail!("Node {} is a leaf", id),
        };
        let (a, b) = (tree.node(left), tree.node(right));
        let (p1, p2) = match (a.pos, b.pos) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => return Err(SynthError::UnresolvedGeometry { node: id }.into()),
        };
        let (d1, d2, c1, c2) = (a.elmore_delay, b.elmore_delay, a.capacitance, b.capacitance);

        if p1.same_planar(&p2) {
            let n = tree.node_mut(node);
            n.pos = Some(p1);
            n.kind = NodeKind::MergingPoint;
            self.stats.merges += 1;
            self.stats.degenerate += 1;
            return Ok(MergeOutcome::Degenerate);
        }

        let layout = &self.units.layout;
        let wire = &self.units.wire;
        let length = p1.planar_distance(&p2) as f64;
        let (pt1, pt2) = (planar(&p1), planar(&p2));
        let x = tapping_fraction(d1, d2, c1, c2, wire, length);

        let (outcome, plan) = if (0.0..=1.0).contains(&x) {
            let dist1 = (x * length).ceil();
            let dist2 = ((1.0 - x) * length).floor();
            debug!(
                "Node {}: tapping at {:.3} of {}, {} from child 1 and {} from child 2",
                id, x, length, dist1, dist2
            );

            let candidates: Vec<Point> = find_points(pt1, dist1)
                .into_iter()
                .chain(find_points(pt2, dist2))
                .filter(|p| within_segment(p, &pt1, &pt2) && layout.contains(p.x, p.y))
                .collect();
            let candidates = filter_points(&candidates, self.config.min_candidate_separation);

            let plan = if candidates.is_empty() {
                vec![path_point(pt1, pt2, dist1)]
            } else {
                embed(&candidates, None)
            };
            (MergeOutcome::InRange, plan)
        } else {
            // The merge point sits on the slower child, the wire to the faster one is stretched
            let (anchor, c_far, delta_d) = if x > 1.0 {
                (pt2, c1, d2 - d1)
            } else {
                (pt1, c2, d1 - d2)
            };
            let mut extension = extension_length(wire, c_far, delta_d).round();

            let outcome = if length + extension > MAX_STRETCH * length {
                let buffer = &self.units.buffer;
                let n = tree.node_mut(node);
                n.buffered = true;
                n.resistance = buffer.output_resistance;
                n.capacitance = buffer.input_capacitance;
                n.buffer_delay = (d1 - d2).abs();
                debug!(
                    "Node {}: buffered instead of extending {} by {}, absorbs {:.3}",
                    id, length, extension, n.buffer_delay
                );
                extension = 0.0;
                self.stats.buffered += 1;
                MergeOutcome::ExtendedBuffered
            } else {
                debug!("Node {}: extending {} by {}", id, length, extension);
                self.stats.extended += 1;
                MergeOutcome::ExtendedNoBuffer
            };

            let candidates: Vec<Point> = find_points(anchor, length + extension)
                .into_iter()
                .filter(|p| p.x == anchor.x && layout.contains(p.x, p.y))
                .collect();
            let candidates = filter_points(&candidates, self.config.min_candidate_separation);

            let plan = if candidates.is_empty() {
                vec![anchor]
            } else {
                embed(&candidates, None)
            };
            (outcome, plan)
        };

        if outcome == MergeOutcome::InRange {
            self.stats.in_range += 1;
        }
        self.stats.merges += 1;
        self.place_along_ancestors(tree, node, plan, p1.z);
        Ok(outcome)
    }

    /// Hand the planned coordinates to `node` and then its ancestors, stopping below the root
    /// (the root only takes a coordinate from its own merge).
    fn place_along_ancestors(
        &mut self,
        tree: &mut ClockTree,
        node: NodeIndex,
        plan: Vec<Point>,
        tier: i32,
    ) {
        let root = tree.root();
        let targets: Vec<NodeIndex> = if node == root {
            vec![root]
        } else {
            tree.ancestors(node).take_while(|idx| *idx != root).collect()
        };

        for (idx, p) in targets.into_iter().zip(plan) {
            let p = match self.find_nearest_free_point(round_split(p)) {
                FreePoint::Free(p) => p,
                FreePoint::Exhausted(p) => {
                    warn!(
                        "No free cell within {} of ({}, {}), placing on a sink",
                        self.config.free_point_search_radius, p.x, p.y
                    );
                    self.stats.infeasible_embeddings += 1;
                    p
                }
            };
            let n = tree.node_mut(idx);
            n.pos = Some(GridPosition::new(p.x as i32, p.y as i32, tier));
            n.kind = NodeKind::MergingPoint;
        }
    }
}
