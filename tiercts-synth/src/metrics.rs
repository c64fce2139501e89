//! Wirelength figures reported per tier.

use tiercts_common::Sink;

use crate::core::ClockTree;

/// Manhattan length of a minimum spanning tree over `sinks` (Prim). The lower bound a routed tree
/// over the same sinks is compared against.
pub fn ideal_wirelength(sinks: &[Sink]) -> i64 {
    if sinks.len() < 2 {
        return 0;
    }

    let manhattan = |a: &Sink, b: &Sink| ((a.x - b.x).abs() + (a.y - b.y).abs()) as i64;
    let mut in_tree = vec![false; sinks.len()];
    let mut best = vec![i64::MAX; sinks.len()];
    best[0] = 0;
    let mut total = 0;

    for _ in 0..sinks.len() {
        let next = (0..sinks.len())
            .filter(|i| !in_tree[*i])
            .min_by_key(|i| best[*i]);
        let u = match next {
            Some(u) => u,
            None => break,
        };
        in_tree[u] = true;
        total += best[u];

        for v in 0..sinks.len() {
            if !in_tree[v] {
                best[v] = best[v].min(manhattan(&sinks[u], &sinks[v]));
            }
        }
    }
    total
}

/// Planar Manhattan length of every parent to child edge. Edges touching a node without a
/// position are skipped.
pub fn tree_wirelength(tree: &ClockTree) -> i64 {
    tree.edges()
        .filter_map(|(p, c)| match (tree.node(p).pos, tree.node(c).pos) {
            (Some(a), Some(b)) => Some(a.planar_distance(&b) as i64),
            _ => None,
        })
        .sum()
}
