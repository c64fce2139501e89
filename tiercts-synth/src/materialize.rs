//! Turns one cluster of a tier topology into its own zero-skew sub-tree, rooted at a via.

use anyhow::{Context, Result};
use log::{debug, info};
use tiercts_common::{ClusterId, GridPosition, PhysicalUnits, Sink};

use crate::clustering::Clusters;
use crate::config::EmbeddingConfig;
use crate::core::{ClockTree, NodeKind, SynthError};
use crate::merge::{MergeStats, ZeroSkewMerger};
use crate::timing;
use crate::topology::TopologyBuilder;

/// A cluster's synthesized sub-tree and the via-sink standing in for it on the tier above
#[derive(Debug)]
pub struct MaterializedCluster {
    pub cluster: ClusterId,
    pub tree: ClockTree,
    pub via: Sink,
    pub stats: MergeStats,
}

pub struct Materializer<'a> {
    units: &'a PhysicalUnits,
    embedding: &'a EmbeddingConfig,
    balance: u32,
}

impl<'a> Materializer<'a> {
    pub fn new(units: &'a PhysicalUnits, embedding: &'a EmbeddingConfig, balance: u32) -> Self {
        Self {
            units,
            embedding,
            balance,
        }
    }

    /// Build, time and merge a private topology over the leaves of cluster `id` in `tier_tree`.
    /// The via-sink lands on `tier` at the merged root.
    pub fn materialize(
        &self,
        builder: &mut TopologyBuilder,
        tier_tree: &ClockTree,
        clusters: &Clusters,
        id: ClusterId,
        tier: i32,
    ) -> Result<MaterializedCluster> {
        let _span = tracing::info_span!("materialize", cluster = id.0, tier).entered();

        let sinks: Vec<Sink> = clusters
            .members(id)
            .iter()
            .filter_map(|idx| tier_tree.node(*idx).sink())
            .cloned()
            .collect();
        if let Some((cx, cy)) = clusters.centroid(tier_tree, id) {
            info!(
                "Cluster {} of tier {}: {} sinks around ({}, {})",
                id,
                tier,
                sinks.len(),
                cx,
                cy
            );
        }

        let mut tree = builder
            .build(sinks, self.balance)
            .with_context(|| format!("Building sub-topology of cluster {}", id))?;
        tree.set_cluster(id);
        tree.assign_leaf_locations();

        let via_resistance = self.units.via.resistance;
        timing::analyze(&mut tree, via_resistance, &self.units.buffer);
        let stats = ZeroSkewMerger::new(self.units, self.embedding, &tree).run(&mut tree);

        let root = tree.root();
        let pos = tree.node(root).pos.ok_or(SynthError::UnresolvedGeometry {
            node: tree.node(root).id,
        })?;
        tree.node_mut(root).kind = NodeKind::Miv;
        timing::analyze(&mut tree, via_resistance, &self.units.buffer);

        let root_node = tree.node(root);
        let via = Sink::via(
            GridPosition::new(pos.x, pos.y, tier),
            self.units.via.capacitance + root_node.capacitance,
            root_node.elmore_delay,
            id,
        );
        debug!(
            "Cluster {} via at ({}, {}, {}), delay {:.3}",
            id, via.x, via.y, via.z, via.delay
        );
        tree.debug_dump();

        Ok(MaterializedCluster {
            cluster: id,
            tree,
            via,
            stats,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clustering::DbscanParams;
    use crate::core::check_chain_for_error;
    use crate::sinks;
    use approx::assert_relative_eq;
    use tiercts_common::{
        BufferUnit, ClockSource, Layout, PhysicalUnits, SinkKind, ViaUnit, WireUnit,
    };

    fn units() -> PhysicalUnits {
        PhysicalUnits {
            layout: Layout {
                width: 100.0,
                height: 100.0,
                die_count: 2,
            },
            wire: WireUnit {
                resistance: 0.1,
                capacitance: 0.2,
            },
            buffer: BufferUnit {
                output_resistance: 100.0,
                input_capacitance: 2.0,
                intrinsic_delay: 7.0,
            },
            via: ViaUnit {
                resistance: 5.0,
                capacitance: 1.5,
            },
            source: ClockSource {
                x: 50,
                y: 50,
                z: 0,
                output_resistance: 10.0,
            },
        }
    }

    /// One dense square of four sinks and a far-away straggler
    fn clustered_tier(builder: &mut TopologyBuilder) -> (ClockTree, Clusters) {
        let sinks = sinks![
            (0, 0, 0, 1.0),
            (10, 0, 0, 1.0),
            (0, 10, 0, 1.0),
            (10, 10, 0, 1.0),
            (90, 90, 0, 1.0),
        ];
        let mut tree = builder.build(sinks, 4).unwrap();
        tree.assign_leaf_locations();
        let clusters = Clusters::assign(
            &mut tree,
            &DbscanParams {
                eps: 15.0,
                min_pts: 3,
                bound: 4,
            },
        );
        (tree, clusters)
    }

    #[test]
    fn cluster_becomes_via_at_merged_root() {
        let _ = tracing_subscriber::fmt::try_init();

        let units = units();
        let embedding = EmbeddingConfig::default();
        let mut builder = TopologyBuilder::new(&units.source);
        let (tier_tree, clusters) = clustered_tier(&mut builder);
        assert_eq!(clusters.retained().collect::<Vec<_>>(), vec![ClusterId(1)]);

        let result = Materializer::new(&units, &embedding, 2)
            .materialize(&mut builder, &tier_tree, &clusters, ClusterId(1), 0)
            .unwrap();

        assert_eq!(result.tree.leaves().count(), 4);
        assert!(result
            .tree
            .preorder()
            .into_iter()
            .all(|idx| result.tree.node(idx).cluster == Some(ClusterId(1))));

        let root = result.tree.node(result.tree.root());
        assert_eq!(root.kind, NodeKind::Miv);
        let pos = root.pos.unwrap();
        assert_eq!((pos.x, pos.y), (5, 5));

        assert_eq!(result.via.kind, SinkKind::Via);
        assert_eq!(result.via.cluster, Some(ClusterId(1)));
        assert_eq!((result.via.x, result.via.y, result.via.z), (5, 5, 0));
        assert_relative_eq!(result.via.delay, root.elmore_delay);
        assert_relative_eq!(result.via.input_capacitance, 1.5 + root.capacitance);
        assert_eq!(result.stats.merges, 3);
    }

    #[test]
    fn sub_topology_ids_continue_the_tier_sequence() {
        let units = units();
        let embedding = EmbeddingConfig::default();
        let mut builder = TopologyBuilder::new(&units.source);
        let (tier_tree, clusters) = clustered_tier(&mut builder);
        let before = builder.allocated();

        let result = Materializer::new(&units, &embedding, 2)
            .materialize(&mut builder, &tier_tree, &clusters, ClusterId(1), 0)
            .unwrap();

        assert_eq!(result.tree.node(result.tree.root()).id, before);
        assert_eq!(builder.allocated(), before + 7);
    }

    #[test]
    fn empty_cluster_is_rejected() -> anyhow::Result<()> {
        let units = units();
        let embedding = EmbeddingConfig::default();
        let mut builder = TopologyBuilder::new(&units.source);
        let (tier_tree, clusters) = clustered_tier(&mut builder);

        let err = Materializer::new(&units, &embedding, 2)
            .materialize(&mut builder, &tier_tree, &clusters, ClusterId(9), 0)
            .unwrap_err();

        assert!(check_chain_for_error(&err, |e| matches!(
            e.downcast_ref(),
            Some(SynthError::EmptyInput)
        )));
        Ok(())
    }
}
