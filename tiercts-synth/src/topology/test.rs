use super::*;
use crate::core::{check_chain_for_error, NodeKind};
use crate::sinks;
use std::collections::HashSet;

fn source_at(z: i32) -> ClockSource {
    ClockSource {
        x: 0,
        y: 0,
        z,
        output_resistance: 10.0,
    }
}

fn leaf_positions(tree: &ClockTree) -> Vec<(i32, i32, i32)> {
    tree.leaf_sinks().map(|s| (s.x, s.y, s.z)).collect()
}

fn assert_well_formed(tree: &ClockTree, expected_leaves: usize) {
    let order = tree.preorder();
    assert_eq!(order.len(), tree.len(), "Every node is reachable from the root");
    assert_eq!(tree.len(), 2 * expected_leaves - 1);

    for idx in order {
        let node = tree.node(idx);
        match node.children() {
            Some((l, r)) => {
                assert_ne!(l, r);
                assert_eq!(tree.node(l).parent(), Some(idx));
                assert_eq!(tree.node(r).parent(), Some(idx));
                assert!(node.sink().is_none());
            }
            None => assert!(node.sink().is_some()),
        }
    }
}

#[test]
fn four_corners_split_on_x_then_y() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let mut builder = TopologyBuilder::new(&source_at(0));
    let tree = builder.build(
        sinks![
            (0, 0, 0, 1.0),
            (10, 0, 0, 1.0),
            (0, 10, 0, 1.0),
            (10, 10, 0, 1.0),
        ],
        2,
    )?;

    assert_well_formed(&tree, 4);
    assert_eq!(tree.leaves().count(), 4);

    let (left, right) = tree.node(tree.root()).children().expect("Root is internal");
    let side = |idx| {
        let (a, b) = tree.node(idx).children().expect("Second level is internal");
        (
            tree.node(a).sink().map(|s| (s.x, s.y)),
            tree.node(b).sink().map(|s| (s.x, s.y)),
        )
    };
    assert_eq!(side(left), (Some((0, 0)), Some((0, 10))));
    assert_eq!(side(right), (Some((10, 0)), Some((10, 10))));

    Ok(())
}

#[test]
fn ids_follow_creation_order() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let tree = builder.build(
        sinks![
            (0, 0, 0, 1.0),
            (10, 0, 0, 1.0),
            (0, 10, 0, 1.0),
            (10, 10, 0, 1.0),
        ],
        2,
    )?;

    let ids: Vec<_> = tree.preorder().into_iter().map(|i| tree.node(i).id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(builder.allocated(), 7);

    // A second tree from the same builder continues the sequence
    let second = builder.build(sinks![(1, 1, 0, 1.0)], 2)?;
    assert_eq!(second.node(second.root()).id, 7);
    assert_eq!(second.node(second.root()).kind, NodeKind::Leaf);

    Ok(())
}

#[test]
fn forced_z_cut_separates_dies() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let tree = builder.build(sinks![(0, 0, 0, 1.0), (100, 0, 2, 1.0)], 1)?;

    let (left, right) = tree.node(tree.root()).children().expect("Root is internal");
    assert_eq!(tree.node(left).sink().map(|s| s.z), Some(2));
    assert_eq!(tree.node(right).sink().map(|s| s.z), Some(0));

    Ok(())
}

#[test]
fn z_cut_follows_source_tier() {
    let tiers = vec![0, 1, 2, 3];

    let (top, bottom) = z_cut(tiers.clone(), |z| *z, 0);
    assert_eq!((top, bottom), (vec![1, 2, 3], vec![0]));

    let (top, bottom) = z_cut(tiers.clone(), |z| *z, 5);
    assert_eq!((top, bottom), (vec![3], vec![0, 1, 2]));

    let (top, bottom) = z_cut(tiers, |z| *z, 2);
    assert_eq!((top, bottom), (vec![2, 3], vec![0, 1]));
}

#[test]
fn median_truncates_even_sets() {
    assert_eq!(median(&mut []), None);
    assert_eq!(median(&mut [7]), Some(7));
    assert_eq!(median(&mut [10, 0, 0, 10]), Some(5));
    assert_eq!(median(&mut [0, 3]), Some(1));
    assert_eq!(median(&mut [9, 1, 4]), Some(4));
}

#[test]
fn empty_input_is_rejected() {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let err = builder
        .build(Vec::new(), 4)
        .expect_err("Build over no sinks unexpectedly succeeded");

    assert!(check_chain_for_error(&err, |e| matches!(
        e.downcast_ref(),
        Some(SynthError::EmptyInput)
    )));
    assert_eq!(builder.allocated(), 0);
}

#[test]
fn coincident_sinks_still_terminate() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let tree = builder.build(
        sinks![
            (3, 3, 0, 1.0),
            (3, 3, 0, 2.0),
            (3, 3, 0, 3.0),
            (3, 3, 1, 4.0),
            (4, 3, 1, 5.0),
        ],
        8,
    )?;

    assert_well_formed(&tree, 5);
    let caps: HashSet<_> = tree
        .leaf_sinks()
        .map(|s| s.input_capacitance as u32)
        .collect();
    assert_eq!(caps, (1..=5).collect::<HashSet<u32>>());

    Ok(())
}

/// Dies of the leaves below `top`, in leaf order
fn dies_below(tree: &ClockTree, top: NodeIndex) -> Vec<i32> {
    tree.leaves()
        .filter(|idx| tree.ancestors(*idx).any(|a| a == top))
        .filter_map(|idx| tree.node(idx).sink().map(|s| s.z))
        .collect()
}

#[test]
fn stacked_sinks_are_cut_between_dies() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let tree = builder.build(
        sinks![
            (3, 3, 0, 1.0),
            (3, 3, 1, 1.0),
            (3, 3, 1, 1.0),
            (3, 3, 0, 1.0),
        ],
        4,
    )?;

    assert_well_formed(&tree, 4);
    let (left, right) = tree.node(tree.root()).children().expect("Root is internal");
    assert_eq!(dies_below(&tree, left), vec![1, 1]);
    assert_eq!(dies_below(&tree, right), vec![0, 0]);

    Ok(())
}

#[test]
fn stacked_sinks_follow_the_source_tier() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(2));
    let tree = builder.build(
        sinks![(7, 1, 0, 1.0), (7, 1, 1, 1.0), (7, 1, 2, 1.0)],
        8,
    )?;

    let (left, right) = tree.node(tree.root()).children().expect("Root is internal");
    assert_eq!(dies_below(&tree, left), vec![2]);
    let mut lower = dies_below(&tree, right);
    lower.sort_unstable();
    assert_eq!(lower, vec![0, 1]);

    Ok(())
}

#[test]
fn cross_tier_neighbours_keep_their_coordinates() -> Result<()> {
    let mut builder = TopologyBuilder::new(&source_at(0));
    let input = sinks![(5, 5, 0, 1.0), (5, 5, 1, 1.0), (6, 5, 2, 1.0)];
    let tree = builder.build(input.clone(), 4)?;

    let mut got = leaf_positions(&tree);
    got.sort();
    let mut want: Vec<_> = input.iter().map(|s| (s.x, s.y, s.z)).collect();
    want.sort();
    assert_eq!(got, want);

    Ok(())
}

#[test]
fn every_sink_lands_in_exactly_one_leaf() -> Result<()> {
    // Simple LCG so the sets are reproducible
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move |m: i32| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((state >> 33) % m as u64) as i32
    };

    for (count, balance) in [(2, 1), (7, 1), (16, 3), (33, 8), (64, 69)] {
        let input: Vec<Sink> = (0..count)
            .map(|i| Sink::pin(next(40), next(40), next(3), 1.0 + i as f64))
            .collect();

        let mut builder = TopologyBuilder::new(&source_at(1));
        let tree = builder.build(input.clone(), balance)?;
        assert_well_formed(&tree, count);

        // Capacitances are unique, so they identify the sink
        let mut got: Vec<_> = tree
            .leaf_sinks()
            .map(|s| (s.input_capacitance as i64, s.x, s.y, s.z))
            .collect();
        got.sort();
        let want: Vec<_> = input
            .iter()
            .map(|s| (s.input_capacitance as i64, s.x, s.y, s.z))
            .collect();
        assert_eq!(got, want);
    }

    Ok(())
}

#[test]
fn die_span_of_empty_set_is_an_error() {
    assert!(die_span(&[]).is_err());
    assert_eq!(
        die_span(&sinks![(0, 0, 2, 1.0), (0, 0, 5, 1.0)]).ok(),
        Some((2, 5))
    );
}
