//! Reader for the plain-text benchmark format.
//!
//! The file is line oriented, whitespace separated:
//!
//! ```text
//! <width> <height> <die count>
//! <wire R/um> <wire C/um>
//! <buffer Rout> <buffer Cin> <buffer intrinsic delay>
//! <via R> <via C>
//! <source x> <source y> <source z> <source Rout>
//! <sink count>
//! <x> <y> <z> <Cin>          (one line per sink)
//! ```
//!
//! Anything after the expected fields of a line is ignored, so the lines may carry comments.

use anyhow::{anyhow, Context, Result};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use crate::units::{BufferUnit, ClockSource, Layout, PhysicalUnits, ViaUnit, WireUnit};
use crate::Sink;

/// Error generated when the benchmark text does not match the expected layout
#[derive(Debug, PartialEq, Eq)]
pub enum BenchmarkParseError {
    UnexpectedEof {
        section: &'static str,
    },
    MissingField {
        section: &'static str,
        field: &'static str,
    },
    BadToken {
        section: &'static str,
        field: &'static str,
        token: String,
    },
}

impl Display for BenchmarkParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEof { section } => {
                write!(f, "input ended before the {} section", section)
            }
            Self::MissingField { section, field } => {
                write!(f, "{} line is missing the {} field", section, field)
            }
            Self::BadToken {
                section,
                field,
                token,
            } => write!(f, "{} field {} could not parse {:?}", section, field, token),
        }
    }
}

impl std::error::Error for BenchmarkParseError {}

/// Everything a benchmark file describes
#[derive(Clone, Debug)]
pub struct Benchmark {
    pub units: PhysicalUnits,
    pub sinks: Vec<Sink>,
}

struct Line<'a> {
    section: &'static str,
    tokens: Vec<&'a str>,
}

impl<'a> Line<'a> {
    fn field<T: FromStr>(&self, idx: usize, field: &'static str) -> Result<T, BenchmarkParseError> {
        let token = self
            .tokens
            .get(idx)
            .ok_or(BenchmarkParseError::MissingField {
                section: self.section,
                field,
            })?;
        token.parse().map_err(|_| BenchmarkParseError::BadToken {
            section: self.section,
            field,
            token: token.to_string(),
        })
    }
}

struct Lines<'a, I: Iterator<Item = &'a str>> {
    inner: I,
}

impl<'a, I: Iterator<Item = &'a str>> Lines<'a, I> {
    fn next(&mut self, section: &'static str) -> Result<Line<'a>, BenchmarkParseError> {
        loop {
            let line = self
                .inner
                .next()
                .ok_or(BenchmarkParseError::UnexpectedEof { section })?;
            let tokens: Vec<_> = line.split_whitespace().collect();
            if !tokens.is_empty() {
                return Ok(Line { section, tokens });
            }
        }
    }
}

/// Parse benchmark text already held in memory
pub fn parse_benchmark(text: &str) -> Result<Benchmark> {
    let mut lines = Lines {
        inner: text.lines(),
    };

    let l = lines.next("layout")?;
    let layout = Layout {
        width: l.field(0, "width")?,
        height: l.field(1, "height")?,
        die_count: l.field(2, "die count")?,
    };

    let l = lines.next("wire")?;
    let wire = WireUnit {
        resistance: l.field(0, "resistance")?,
        capacitance: l.field(1, "capacitance")?,
    };

    let l = lines.next("buffer")?;
    let buffer = BufferUnit {
        output_resistance: l.field(0, "output resistance")?,
        input_capacitance: l.field(1, "input capacitance")?,
        intrinsic_delay: l.field(2, "intrinsic delay")?,
    };

    let l = lines.next("via")?;
    let via = ViaUnit {
        resistance: l.field(0, "resistance")?,
        capacitance: l.field(1, "capacitance")?,
    };

    let l = lines.next("clock source")?;
    let source = ClockSource {
        x: l.field(0, "x")?,
        y: l.field(1, "y")?,
        z: l.field(2, "z")?,
        output_resistance: l.field(3, "output resistance")?,
    };

    let sink_count: usize = lines.next("sink count")?.field(0, "count")?;
    let mut sinks = Vec::with_capacity(sink_count);
    for i in 0..sink_count {
        let l = lines.next("sink")?;
        let sink = (|| -> Result<Sink, BenchmarkParseError> {
            Ok(Sink::pin(
                l.field(0, "x")?,
                l.field(1, "y")?,
                l.field(2, "z")?,
                l.field(3, "input capacitance")?,
            ))
        })()
        .with_context(|| anyhow!("Parsing sink {} of {}", i, sink_count))?;
        sinks.push(sink);
    }

    Ok(Benchmark {
        units: PhysicalUnits {
            layout,
            wire,
            buffer,
            via,
            source,
        },
        sinks,
    })
}

/// Read and parse a benchmark file
pub fn read_benchmark(path: &Path) -> Result<Benchmark> {
    let text = std::fs::read_to_string(path)
        .with_context(|| anyhow!("Reading benchmark {}", path.display()))?;
    parse_benchmark(&text).with_context(|| anyhow!("Parsing benchmark {}", path.display()))
}
