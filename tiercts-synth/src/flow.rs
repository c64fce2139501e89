//! Tier-by-tier synthesis: each die is clustered into sub-trees, and the vias rooting them join the
//! sinks of the die above.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use tiercts_common::{ClusterId, PhysicalUnits, Sink};

use crate::clustering::{Clusters, DbscanParams};
use crate::config::Config;
use crate::core::ClockTree;
use crate::materialize::{MaterializedCluster, Materializer};
use crate::merge::MergeStats;
use crate::metrics::{ideal_wirelength, tree_wirelength};
use crate::timing;
use crate::topology::{die_span, TopologyBuilder};

#[derive(Clone, Debug, Default, Serialize)]
pub struct TierReport {
    pub tier: i32,
    /// Sinks on this die, vias from the die below included
    pub sinks: usize,
    pub incoming_vias: usize,
    pub clusters: usize,
    pub unclustered: usize,
    /// Clusters whose sub-tree could not be completed, and so have no via
    pub dropped_clusters: Vec<ClusterId>,
    pub vias: Vec<Sink>,
    pub ideal_wirelength: i64,
    pub zero_skew_wirelength: i64,
    pub merges: MergeStats,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
    pub tiers: Vec<TierReport>,
    pub failed_tiers: Vec<i32>,
    pub ideal_wirelength: i64,
    pub zero_skew_wirelength: i64,
    pub merges: MergeStats,
}

impl RunSummary {
    fn record(&mut self, report: &TierReport) {
        self.ideal_wirelength += report.ideal_wirelength;
        self.zero_skew_wirelength += report.zero_skew_wirelength;
        self.merges += &report.merges;
        self.tiers.push(report.clone());
    }
}

/// Everything produced for one die
#[derive(Debug)]
pub struct TierResult {
    pub tier: i32,
    /// Topology over the whole die, its leaves tagged with their cluster
    pub tree: ClockTree,
    pub clusters: Clusters,
    pub subtrees: Vec<MaterializedCluster>,
    pub report: TierReport,
}

/// Sinks grouped by die, lowest die first
pub fn group_by_tier(sinks: Vec<Sink>) -> BTreeMap<i32, Vec<Sink>> {
    let mut tiers: BTreeMap<i32, Vec<Sink>> = BTreeMap::new();
    for sink in sinks {
        tiers.entry(sink.z).or_default().push(sink);
    }
    tiers
}

/// Owns the node id allocator for a whole run
pub struct Synthesizer<'a> {
    units: &'a PhysicalUnits,
    config: &'a Config,
    builder: TopologyBuilder,
}

impl<'a> Synthesizer<'a> {
    pub fn new(units: &'a PhysicalUnits, config: &'a Config) -> Self {
        Self {
            units,
            config,
            builder: TopologyBuilder::new(&units.source),
        }
    }

    /// Synthesize every die in ascending order, handing each finished die to `on_tier`. A die
    /// that fails is logged and skipped; an error from `on_tier` ends the run.
    pub fn run<F>(&mut self, sinks: Vec<Sink>, mut on_tier: F) -> Result<RunSummary>
    where
        F: FnMut(&TierResult) -> Result<()>,
    {
        let _span = tracing::info_span!("synthesis", sinks = sinks.len()).entered();

        let mut summary = RunSummary::default();
        let mut vias_below: BTreeMap<i32, Vec<Sink>> = BTreeMap::new();

        for (tier, mut tier_sinks) in group_by_tier(sinks) {
            let incoming = vias_below.remove(&(tier - 1)).unwrap_or_default();
            for (z, dropped) in std::mem::take(&mut vias_below) {
                warn!(
                    "{} vias of tier {} have no sinks on the tier above to join",
                    dropped.len(),
                    z
                );
            }
            let incoming_vias = incoming.len();
            tier_sinks.extend(incoming);

            let result = match self.synthesize_tier(tier, tier_sinks) {
                Ok(mut result) => {
                    result.report.incoming_vias = incoming_vias;
                    result
                }
                Err(e) => {
                    error!("Tier {} failed: {:?}", tier, e);
                    summary.failed_tiers.push(tier);
                    continue;
                }
            };

            on_tier(&result).with_context(|| format!("Handling results of tier {}", tier))?;
            summary.record(&result.report);
            vias_below.insert(tier, result.report.vias);
        }

        info!(
            "{} tiers, ideal wirelength {}, zero-skew wirelength {}",
            summary.tiers.len(),
            summary.ideal_wirelength,
            summary.zero_skew_wirelength
        );
        Ok(summary)
    }

    /// Topology, first timing pass, clustering and one sub-tree per cluster for a single die
    pub fn synthesize_tier(&mut self, tier: i32, sinks: Vec<Sink>) -> Result<TierResult> {
        let _span = tracing::info_span!("tier", tier).entered();
        let config = self.config;
        let units = self.units;

        let mut report = TierReport {
            tier,
            sinks: sinks.len(),
            ideal_wirelength: ideal_wirelength(&sinks),
            ..Default::default()
        };

        let (low, high) =
            die_span(&sinks).with_context(|| format!("Tier {} has no sinks", tier))?;
        debug!("Tier {} sinks span dies {} to {}", tier, low, high);

        let mut tree = self
            .builder
            .build(sinks, config.topology.balance)
            .with_context(|| format!("Building topology of tier {}", tier))?;
        tree.assign_leaf_locations();
        timing::analyze(&mut tree, units.source.output_resistance, &units.buffer);

        let params = DbscanParams {
            eps: config.cluster.eps_fraction * units.layout.width,
            min_pts: config.cluster.min_pts,
            bound: config.cluster.bound,
        };
        let clusters = Clusters::assign(&mut tree, &params);
        report.clusters = clusters.used_count();
        report.unclustered = clusters.members(ClusterId::UNCLUSTERED).len();

        let mut ids: Vec<ClusterId> = clusters.retained().collect();
        if config.cluster.materialize_unclustered && report.unclustered > 0 {
            ids.push(ClusterId::UNCLUSTERED);
        } else if report.unclustered > 0 {
            debug!(
                "{} unclustered sinks of tier {} get no via",
                report.unclustered, tier
            );
        }

        let materializer =
            Materializer::new(units, &config.embedding, config.topology.balance);
        let mut subtrees = Vec::with_capacity(ids.len());
        for id in ids {
            match materializer.materialize(&mut self.builder, &tree, &clusters, id, tier) {
                Ok(m) => {
                    report.zero_skew_wirelength += tree_wirelength(&m.tree);
                    report.merges += &m.stats;
                    report.vias.push(m.via.clone());
                    subtrees.push(m);
                }
                Err(e) => {
                    error!("Cluster {} of tier {} dropped: {:?}", id, tier, e);
                    report.dropped_clusters.push(id);
                }
            }
        }

        info!(
            "Tier {}: {} sinks, {} vias, wirelength {} (ideal {})",
            tier,
            report.sinks,
            report.vias.len(),
            report.zero_skew_wirelength,
            report.ideal_wirelength
        );

        Ok(TierResult {
            tier,
            tree,
            clusters,
            subtrees,
            report,
        })
    }
}
