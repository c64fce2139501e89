mod clustering;
mod config;
mod core;
mod embedding;
mod export;
mod flow;
mod materialize;
mod merge;
mod metrics;
mod timing;
mod topology;

use anyhow::{Context, Result};
use log::info;
use tiercts_common::benchmark::read_benchmark;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::flow::Synthesizer;

fn parse_args() -> Result<Config> {
    use clap::{App, Arg};
    let matches = App::new("TierCTS")
        .version(env!("CARGO_PKG_VERSION"))
        .author(clap::crate_authors!())
        .about("Zero-skew clock tree synthesis for stacked dies")
        .arg(
            Arg::with_name("INPUT")
                .help("Benchmark describing the technology and the clock sinks")
                .index(1)
                .required(true),
        )
        .arg(
            Arg::with_name("OUTPUT_DIR")
                .help("Directory receiving the per-tier dumps and summary.json")
                .index(2)
                .default_value("."),
        )
        .arg(
            Arg::with_name("VIA_BOUND")
                .long("via-bound")
                .value_name("VIAS")
                .help("Most clusters, and so vias, kept per tier")
                .default_value("70"),
        )
        .arg(
            Arg::with_name("BALANCE")
                .long("balance")
                .value_name("BALANCE")
                .help("Planar splitting budget per tier [default: via bound - 1]"),
        )
        .arg(
            Arg::with_name("EPS_FRACTION")
                .long("eps-fraction")
                .value_name("FRACTION")
                .help("Clustering radius as a fraction of the layout width")
                .default_value("0.085"),
        )
        .arg(
            Arg::with_name("MIN_PTS")
                .long("min-pts")
                .value_name("COUNT")
                .help("Neighbours needed to seed a cluster")
                .default_value("4"),
        )
        .arg(
            Arg::with_name("FREE_POINT_RADIUS")
                .long("free-point-radius")
                .value_name("CELLS")
                .help("How far a merge point may be moved off a sink")
                .default_value("5"),
        )
        .arg(
            Arg::with_name("MATERIALIZE_UNCLUSTERED")
                .long("materialize-unclustered")
                .help("Also route the unclustered sinks of each tier through a via"),
        )
        .arg(
            Arg::with_name("NO_DUMPS")
                .long("no-dumps")
                .help("Only write summary.json"),
        )
        .get_matches();

    Config::from_args(&matches)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let config = parse_args()?;

    let benchmark = read_benchmark(&config.io.input_file)
        .with_context(|| format!("Reading {}", config.io.input_file.display()))?;
    info!(
        "{} sinks over {} dies",
        benchmark.sinks.len(),
        benchmark.units.layout.die_count
    );

    let out_dir = &config.io.output_directory;
    export::clear_stale(out_dir)?;

    let mut synthesizer = Synthesizer::new(&benchmark.units, &config);
    let summary = synthesizer.run(benchmark.sinks, |result| {
        if config.export.write_dumps {
            export::export_tier(out_dir, result)?;
        }
        Ok(())
    })?;

    export::write_summary(out_dir, &summary)?;
    info!(
        "Ideal wirelength {}, zero-skew wirelength {}, {} tiers failed",
        summary.ideal_wirelength,
        summary.zero_skew_wirelength,
        summary.failed_tiers.len()
    );

    Ok(())
}
