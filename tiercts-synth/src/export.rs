//! Text dumps of the synthesized trees and the clustering, plus the JSON run summary.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use tiercts_common::ClusterId;

use crate::core::{ClockTree, NodeIndex, NodeKind};
use crate::flow::{RunSummary, TierResult};

const POINTS_AND_LINES_PREFIX: &str = "zeroskew_points_and_lines_z_";
const CLUSTERS_PREFIX: &str = "dbscan_results_z_";
pub const SUMMARY_FILE: &str = "summary.json";

pub fn points_and_lines_path(dir: &Path, tier: i32) -> PathBuf {
    dir.join(format!("{}{}.txt", POINTS_AND_LINES_PREFIX, tier))
}

pub fn clusters_path(dir: &Path, tier: i32) -> PathBuf {
    dir.join(format!("{}{}.csv", CLUSTERS_PREFIX, tier))
}

/// Remove the dumps of an earlier run from `dir`, which is created when missing. Every dump is
/// opened in append mode, so leftovers would otherwise be extended.
pub fn clear_stale(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Creating {}", dir.display()))?;

    for entry in fs::read_dir(dir).with_context(|| format!("Listing {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let stale = name.starts_with(POINTS_AND_LINES_PREFIX)
            || name.starts_with(CLUSTERS_PREFIX)
            || name == SUMMARY_FILE;
        if stale && entry.file_type()?.is_file() {
            debug!("Removing stale {}", name);
            fs::remove_file(entry.path())
                .with_context(|| format!("Removing {}", entry.path().display()))?;
        }
    }
    Ok(())
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Opening {}", path.display()))
}

/// Append `tree` as point and line records, parents before children
pub fn write_points_and_lines(out: &mut impl Write, tree: &ClockTree) -> Result<()> {
    fn visit(out: &mut impl Write, tree: &ClockTree, idx: NodeIndex) -> Result<()> {
        let node = tree.node(idx);
        let pos = match node.pos {
            Some(p) => p,
            None => return Ok(()),
        };

        if node.is_leaf() {
            writeln!(out, "P {} {} (Leaf Node)", pos.x, pos.y)?;
        } else if node.kind == NodeKind::Miv {
            writeln!(out, "P {} {} (MIV Node)", pos.x, pos.y)?;
        } else {
            writeln!(out, "P {} {}", pos.x, pos.y)?;
        }

        if let Some((l, r)) = node.children() {
            for child in [l, r] {
                if let Some(c) = tree.node(child).pos {
                    writeln!(out, "L {} {} {} {}", pos.x, pos.y, c.x, c.y)?;
                }
                visit(&mut *out, tree, child)?;
            }
        }
        Ok(())
    }

    writeln!(out)?;
    writeln!(out, "# New Subtree")?;
    visit(out, tree, tree.root())
}

/// Append one `x,y,cluster,z` row per leaf sink of the tier topology
pub fn write_cluster_rows(out: &mut impl Write, tree: &ClockTree, tier: i32) -> Result<()> {
    for idx in tree.leaves() {
        let node = tree.node(idx);
        if let Some(sink) = node.sink() {
            let cluster = node.cluster.unwrap_or(ClusterId::UNCLUSTERED);
            writeln!(out, "{},{},{},{}", sink.x, sink.y, cluster, tier)?;
        }
    }
    Ok(())
}

/// Write both dumps of a finished tier into `dir`
pub fn export_tier(dir: &Path, result: &TierResult) -> Result<()> {
    let _span = tracing::debug_span!("export", tier = result.tier).entered();

    let path = points_and_lines_path(dir, result.tier);
    let mut out = BufWriter::new(open_append(&path)?);
    for subtree in result.subtrees.iter() {
        write_points_and_lines(&mut out, &subtree.tree)
            .with_context(|| format!("Writing {}", path.display()))?;
    }
    out.flush()?;

    let path = clusters_path(dir, result.tier);
    let file = open_append(&path)?;
    let empty = file.metadata()?.len() == 0;
    let mut out = BufWriter::new(file);
    if empty {
        writeln!(out, "x,y,cluster,z")?;
    }
    write_cluster_rows(&mut out, &result.tree, result.tier)
        .with_context(|| format!("Writing {}", path.display()))?;
    out.flush()?;

    info!(
        "Exported {} sub-trees of tier {} to {}",
        result.subtrees.len(),
        result.tier,
        dir.display()
    );
    Ok(())
}

pub fn write_summary(dir: &Path, summary: &RunSummary) -> Result<()> {
    let path = dir.join(SUMMARY_FILE);
    let out = BufWriter::new(
        File::create(&path).with_context(|| format!("Creating {}", path.display()))?,
    );
    serde_json::to_writer_pretty(out, summary)
        .with_context(|| format!("Writing {}", path.display()))?;
    Ok(())
}
