//! Density clustering of a tier's sinks, bounding how many vias the tier needs.
//!
//! Region growing in the DBSCAN manner, except that there is no separate noise label: a point
//! without enough neighbours stays in cluster 0 and can still be absorbed by a cluster grown later.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use log::{debug, info};
use tiercts_common::ClusterId;

use crate::core::{ClockTree, NodeIndex, Point};

#[cfg(test)]
mod test;

#[derive(Clone, Debug)]
pub struct DbscanParams {
    /// Neighbourhood radius (Euclidean)
    pub eps: f64,
    /// Neighbours (the point itself included) a point needs to seed or extend a cluster
    pub min_pts: usize,
    /// Number of clusters retained, largest first
    pub bound: usize,
}

/// Indices of every point within `eps` of `points[p]`, `p` included
fn region_query(points: &[Point], p: usize, eps: f64) -> Vec<usize> {
    points
        .iter()
        .enumerate()
        .filter(|(_, q)| nalgebra::distance(&points[p], *q) <= eps)
        .map(|(i, _)| i)
        .collect()
}

/// Label every point with a cluster. At most `params.bound` clusters survive, numbered densely
/// from 1 in the order they were found; every other point is labelled 0.
pub fn dbscan(points: &[Point], params: &DbscanParams) -> Vec<ClusterId> {
    let mut labels = vec![0u32; points.len()];
    let mut next_label = 0;

    for p in 0..points.len() {
        if labels[p] != 0 {
            continue;
        }
        let mut frontier = region_query(points, p, params.eps);
        if frontier.len() < params.min_pts {
            continue;
        }

        next_label += 1;
        labels[p] = next_label;
        let mut i = 0;
        while i < frontier.len() {
            let q = frontier[i];
            i += 1;
            if labels[q] != 0 {
                continue;
            }
            labels[q] = next_label;
            let neighbours = region_query(points, q, params.eps);
            if neighbours.len() >= params.min_pts {
                frontier.extend(neighbours);
            }
        }
    }

    let sizes = labels.iter().filter(|l| **l != 0).counts();
    let kept: Vec<u32> = sizes
        .into_iter()
        .sorted_by(|a, b| (b.1, b.0).cmp(&(a.1, a.0)))
        .take(params.bound)
        .map(|(label, _)| *label)
        .sorted()
        .collect();
    debug!(
        "{} clusters found, keeping {}",
        next_label,
        kept.len()
    );

    let renumber: HashMap<u32, u32> = kept
        .iter()
        .enumerate()
        .map(|(i, old)| (*old, i as u32 + 1))
        .collect();
    labels
        .into_iter()
        .map(|l| ClusterId(renumber.get(&l).copied().unwrap_or(0)))
        .collect()
}

/// Grouping of a tier tree's leaves by cluster. Does not own the nodes.
#[derive(Clone, Debug, Default)]
pub struct Clusters {
    members: BTreeMap<ClusterId, Vec<NodeIndex>>,
}

impl Clusters {
    /// Cluster the leaves of `tree` by position and tag each leaf with its cluster.
    pub fn assign(tree: &mut ClockTree, params: &DbscanParams) -> Self {
        let _span = tracing::info_span!("clustering", eps = params.eps).entered();

        let leaves: Vec<NodeIndex> = tree.leaves().collect();
        let points: Vec<Point> = leaves
            .iter()
            .filter_map(|idx| tree.node(*idx).sink())
            .map(|s| Point::new(s.x as f64, s.y as f64))
            .collect();
        let labels = dbscan(&points, params);

        let mut members: BTreeMap<ClusterId, Vec<NodeIndex>> = BTreeMap::new();
        for (idx, label) in leaves.into_iter().zip(labels) {
            tree.node_mut(idx).cluster = Some(label);
            members.entry(label).or_default().push(idx);
        }

        let clusters = Self { members };
        info!(
            "{} clusters over {} sinks, {} unclustered",
            clusters.used_count(),
            points.len(),
            clusters.members(ClusterId::UNCLUSTERED).len()
        );
        clusters
    }

    /// Ids of the retained clusters, ascending. Cluster 0 is not included.
    pub fn retained(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.members.keys().copied().filter(|c| c.is_clustered())
    }

    pub fn used_count(&self) -> usize {
        self.retained().count()
    }

    pub fn members(&self, id: ClusterId) -> &[NodeIndex] {
        self.members.get(&id).map(|m| &m[..]).unwrap_or(&[])
    }

    /// `(ceil(mean x), floor(mean y))` over the cluster's leaves
    pub fn centroid(&self, tree: &ClockTree, id: ClusterId) -> Option<(i32, i32)> {
        let members = self.members(id);
        if members.is_empty() {
            return None;
        }
        let (sx, sy) = members
            .iter()
            .filter_map(|idx| tree.node(*idx).sink())
            .fold((0.0, 0.0), |(sx, sy), s| (sx + s.x as f64, sy + s.y as f64));
        let n = members.len() as f64;
        Some(((sx / n).ceil() as i32, (sy / n).floor() as i32))
    }
}
