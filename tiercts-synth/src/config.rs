//! Global registry for configuration of the various synthesis stages.
//!

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration variables related to input/output operations
#[derive(Clone, Debug, Serialize)]
pub struct IOConfig {
    /// Input file name (a benchmark description, see `tiercts_common::benchmark`)
    pub input_file: PathBuf,
    /// Directory receiving the per-tier dumps and the run summary
    pub output_directory: PathBuf,
}

/// Configuration of the topology builder
#[derive(Clone, Debug, Serialize)]
pub struct TopologyConfig {
    /// Planar splitting budget per tier. Once spent, sets spanning several dies are cut between
    /// dies.
    pub balance: u32,
}

/// Configuration of the per-tier density clustering
#[derive(Clone, Debug, Serialize)]
pub struct ClusterConfig {
    /// Neighbourhood radius, as a fraction of the layout width
    pub eps_fraction: f64,
    /// Neighbours needed for a sink to seed or extend a cluster
    pub min_pts: usize,
    /// Maximum number of clusters, and therefore vias, per tier
    pub bound: usize,
    /// Also synthesize a sub-tree (and via) over the sinks left out of every cluster
    pub materialize_unclustered: bool,
}

/// Configuration of the zero-skew merge point placement
#[derive(Clone, Debug, Serialize)]
pub struct EmbeddingConfig {
    /// Largest Chebyshev radius searched when a merge point lands on a sink
    pub free_point_search_radius: i32,
    /// Candidate merge points closer than this to an earlier candidate are dropped
    pub min_candidate_separation: f64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            free_point_search_radius: 5,
            min_candidate_separation: 1.5,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ExportConfig {
    /// Write the per-tier text and CSV dumps next to the summary
    pub write_dumps: bool,
}

/// Overall synthesis configuration
#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub io: IOConfig,
    pub topology: TopologyConfig,
    pub cluster: ClusterConfig,
    pub embedding: EmbeddingConfig,
    pub export: ExportConfig,
}

fn parse_arg<T>(matches: &clap::ArgMatches, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .ok_or_else(|| anyhow!("Missing {}", name))?
        .parse()
        .with_context(|| anyhow!("Parse {}", name))
}

impl Config {
    /// Construct a configuration from the clap argument matches
    pub fn from_args(matches: &clap::ArgMatches) -> Result<Self> {
        let bound: usize = parse_arg(matches, "VIA_BOUND")?;
        let balance = match matches.value_of("BALANCE") {
            Some(b) => b.parse().context("Parse BALANCE")?,
            None => default_balance(bound),
        };

        Ok(Config {
            io: IOConfig {
                input_file: PathBuf::from(
                    matches
                        .value_of_os("INPUT")
                        .ok_or_else(|| anyhow!("Missing INPUT"))?,
                ),
                output_directory: PathBuf::from(
                    matches
                        .value_of_os("OUTPUT_DIR")
                        .ok_or_else(|| anyhow!("Missing OUTPUT_DIR"))?,
                ),
            },
            topology: TopologyConfig { balance },
            cluster: ClusterConfig {
                eps_fraction: parse_arg(matches, "EPS_FRACTION")?,
                min_pts: parse_arg(matches, "MIN_PTS")?,
                bound,
                materialize_unclustered: matches.is_present("MATERIALIZE_UNCLUSTERED"),
            },
            embedding: EmbeddingConfig {
                free_point_search_radius: parse_arg(matches, "FREE_POINT_RADIUS")?,
                ..Default::default()
            },
            export: ExportConfig {
                write_dumps: !matches.is_present("NO_DUMPS"),
            },
        })
    }
}

/// One planar split fewer than the via bound, so the last level of the budget is a die cut
pub fn default_balance(bound: usize) -> u32 {
    bound.saturating_sub(1) as u32
}

#[cfg(test)]
impl Config {
    /// Defaults of the command line, writing to `output_directory`
    pub fn for_test(output_directory: PathBuf) -> Self {
        Config {
            io: IOConfig {
                input_file: PathBuf::new(),
                output_directory,
            },
            topology: TopologyConfig {
                balance: default_balance(70),
            },
            cluster: ClusterConfig {
                eps_fraction: 0.085,
                min_pts: 4,
                bound: 70,
                materialize_unclustered: false,
            },
            embedding: EmbeddingConfig::default(),
            export: ExportConfig { write_dumps: true },
        }
    }
}
