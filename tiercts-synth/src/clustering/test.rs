use super::*;
use crate::sinks;
use crate::topology::TopologyBuilder;
use anyhow::Result;
use tiercts_common::{ClockSource, Sink};

fn points(coords: &[(i32, i32)]) -> Vec<Point> {
    coords
        .iter()
        .map(|(x, y)| Point::new(*x as f64, *y as f64))
        .collect()
}

fn params(bound: usize) -> DbscanParams {
    DbscanParams {
        eps: 1.5,
        min_pts: 4,
        bound,
    }
}

const SMALL_GROUP: [(i32, i32); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];
const LARGE_GROUP: [(i32, i32); 6] = [(20, 0), (21, 0), (22, 0), (20, 1), (21, 1), (22, 1)];
const MEDIUM_GROUP: [(i32, i32); 5] = [(40, 0), (41, 0), (40, 1), (41, 1), (42, 0)];

fn three_groups() -> Vec<(i32, i32)> {
    SMALL_GROUP
        .iter()
        .chain(LARGE_GROUP.iter())
        .chain(MEDIUM_GROUP.iter())
        .chain([(100, 100)].iter())
        .copied()
        .collect()
}

#[test]
fn every_dense_group_is_found() {
    let labels = dbscan(&points(&three_groups()), &params(70));

    let ids: Vec<u32> = labels.iter().map(|c| c.0).collect();
    assert_eq!(&ids[0..4], &[1; 4]);
    assert_eq!(&ids[4..10], &[2; 6]);
    assert_eq!(&ids[10..15], &[3; 5]);
    assert_eq!(ids[15], 0);
}

#[test]
fn bound_keeps_largest_and_renumbers_densely() {
    let labels = dbscan(&points(&three_groups()), &params(2));

    let ids: Vec<u32> = labels.iter().map(|c| c.0).collect();
    // The smallest group is dropped, the other two keep their discovery order
    assert_eq!(&ids[0..4], &[0; 4]);
    assert_eq!(&ids[4..10], &[1; 6]);
    assert_eq!(&ids[10..15], &[2; 5]);
    assert_eq!(ids[15], 0);

    let used: std::collections::BTreeSet<u32> = ids.into_iter().filter(|i| *i != 0).collect();
    assert_eq!(used.into_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn zero_bound_leaves_everything_unclustered() {
    let labels = dbscan(&points(&three_groups()), &params(0));
    assert!(labels.iter().all(|c| !c.is_clustered()));
}

#[test]
fn sparse_neighbour_of_a_dense_point_is_absorbed() {
    // (2, 1) only has 3 neighbours, but it sits next to the dense (1, 1)
    let coords = [(2, 1), (0, 0), (1, 0), (0, 1), (1, 1), (9, 9)];
    let labels = dbscan(&points(&coords), &params(70));

    let ids: Vec<u32> = labels.iter().map(|c| c.0).collect();
    assert_eq!(ids, vec![1, 1, 1, 1, 1, 0]);
}

#[test]
fn empty_input_has_no_clusters() {
    assert!(dbscan(&[], &params(70)).is_empty());
}

#[test]
fn leaves_are_tagged_and_grouped() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let sinks: Vec<Sink> = MEDIUM_GROUP
        .iter()
        .chain(LARGE_GROUP.iter())
        .chain([(90, 90)].iter())
        .map(|(x, y)| Sink::pin(*x, *y, 0, 1.0))
        .collect();
    let source = ClockSource {
        x: 0,
        y: 0,
        z: 0,
        output_resistance: 1.0,
    };
    let mut tree = TopologyBuilder::new(&source).build(sinks, 69)?;
    tree.assign_leaf_locations();

    let clusters = Clusters::assign(&mut tree, &params(70));

    assert_eq!(clusters.used_count(), 2);
    assert_eq!(
        clusters.retained().collect::<Vec<_>>(),
        vec![ClusterId(1), ClusterId(2)]
    );
    assert_eq!(clusters.members(ClusterId::UNCLUSTERED).len(), 1);
    assert!(clusters.members(ClusterId(3)).is_empty());

    for id in clusters.retained() {
        for idx in clusters.members(id) {
            assert_eq!(tree.node(*idx).cluster, Some(id));
        }
    }
    // Internal nodes are left untagged
    assert_eq!(tree.node(tree.root()).cluster, None);

    let centroids: Vec<_> = clusters
        .retained()
        .filter_map(|id| clusters.centroid(&tree, id))
        .sorted()
        .collect();
    assert_eq!(centroids, vec![(21, 0), (41, 0)]);
    assert_eq!(clusters.centroid(&tree, ClusterId(7)), None);

    Ok(())
}

#[test]
fn coincident_sinks_form_one_cluster() -> Result<()> {
    let sinks = sinks![
        (5, 5, 0, 1.0),
        (5, 5, 0, 1.0),
        (5, 5, 0, 1.0),
        (5, 5, 0, 1.0),
    ];
    let source = ClockSource {
        x: 0,
        y: 0,
        z: 0,
        output_resistance: 1.0,
    };
    let mut tree = TopologyBuilder::new(&source).build(sinks, 69)?;
    let clusters = Clusters::assign(&mut tree, &params(70));

    assert_eq!(clusters.used_count(), 1);
    assert_eq!(clusters.members(ClusterId(1)).len(), 4);
    assert_eq!(clusters.centroid(&tree, ClusterId(1)), Some((5, 5)));

    Ok(())
}
