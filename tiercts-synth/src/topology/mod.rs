//! Recursive construction of the binary clock topology over a sink set.
//!
//! Each level either cuts the set between dies ("Z-cut") or at the median of the planar axis with
//! the larger span (x on a tie). The `balance` budget limits how many planar splits are taken before the
//! builder is forced to separate the dies.

use anyhow::Result;
use itertools::Itertools;
use log::debug;
use tiercts_common::{extent, Axis, ClockSource, Sink};

use crate::core::{ClockTree, NodeContents, NodeIndex, PlacementNode, SynthError};

#[cfg(test)]
mod test;

/// A sink together with the planar key used to split it. Keys start out as the sink coordinates
/// and are nudged apart when sinks on different dies nearly coincide. The sink itself is never
/// modified.
#[derive(Clone, Debug)]
struct KeyedSink {
    x: i32,
    y: i32,
    sink: Sink,
}

impl KeyedSink {
    fn key(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.sink.z,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Split {
    /// Every sink shares one planar position but the set spans several dies
    DegenerateZCut,
    /// The planar budget is spent and the set still spans several dies
    ForcedZCut,
    Median(Axis),
}

/// Builds clock topologies, handing out node ids from a counter owned by the builder. Ids stay
/// unique across every tree built by the same instance.
#[derive(Debug)]
pub struct TopologyBuilder {
    next_id: u32,
    source_tier: i32,
}

impl TopologyBuilder {
    pub fn new(source: &ClockSource) -> Self {
        Self {
            next_id: 0,
            source_tier: source.z,
        }
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of ids handed out so far
    pub fn allocated(&self) -> u32 {
        self.next_id
    }

    /// Build a topology whose leaves hold exactly `sinks`.
    pub fn build(&mut self, sinks: Vec<Sink>, balance: u32) -> Result<ClockTree> {
        if sinks.is_empty() {
            return Err(SynthError::EmptyInput.into());
        }
        let _span = tracing::debug_span!("build_topology", sinks = sinks.len(), balance).entered();

        let keyed: Vec<KeyedSink> = sinks
            .into_iter()
            .map(|sink| KeyedSink {
                x: sink.x,
                y: sink.y,
                sink,
            })
            .collect();
        let mut arena = Vec::with_capacity(2 * keyed.len() - 1);
        let root = self.build_node(&mut arena, keyed, balance);

        Ok(ClockTree::from_arena(arena, root))
    }

    fn build_node(
        &mut self,
        arena: &mut Vec<PlacementNode>,
        mut sinks: Vec<KeyedSink>,
        balance: u32,
    ) -> NodeIndex {
        if sinks.len() == 1 {
            if let Some(k) = sinks.pop() {
                let id = self.allocate_id();
                arena.push(PlacementNode::new(id, NodeContents::Leaf(k.sink)));
                return NodeIndex(arena.len() - 1);
            }
        }

        // Parents take their id before either subtree is built
        let id = self.allocate_id();
        let split = if stacked_on_one_point(&sinks) {
            Split::DegenerateZCut
        } else {
            separate_cross_tier_neighbours(&mut sinks);
            choose_split(&sinks, balance)
        };
        let (left, right, left_balance, right_balance) = match split {
            Split::DegenerateZCut => {
                let (top, bottom) = z_cut(sinks, |k| k.sink.z, self.source_tier);
                (top, bottom, 0, 0)
            }
            Split::ForcedZCut => {
                let (top, bottom) = z_cut(sinks, |k| k.sink.z, self.source_tier);
                (top, bottom, 1, 1)
            }
            Split::Median(axis) => {
                let (below, rest) = median_split(sinks, axis);
                (below, rest, balance / 2, balance - balance / 2)
            }
        };
        debug!(
            "Node {}: {:?} into {} + {} sinks",
            id,
            split,
            left.len(),
            right.len()
        );

        let left = self.build_node(arena, left, left_balance);
        let right = self.build_node(arena, right, right_balance);
        arena.push(PlacementNode::new(id, NodeContents::Internal { left, right }));
        NodeIndex(arena.len() - 1)
    }
}

fn choose_split(sinks: &[KeyedSink], balance: u32) -> Split {
    let span = |axis| {
        sinks
            .iter()
            .map(|k| k.key(axis))
            .minmax()
            .into_option()
            .map(|(lo, hi)| hi - lo)
            .unwrap_or(0)
    };
    let (dx, dy, dz) = (span(Axis::X), span(Axis::Y), span(Axis::Z));

    if dz >= 1 && balance == 1 {
        Split::ForcedZCut
    } else if dx >= dy {
        Split::Median(Axis::X)
    } else {
        Split::Median(Axis::Y)
    }
}

/// Whether every sink shares one planar position while the set spans several dies. Checked on
/// the sink coordinates themselves, before any key is nudged.
fn stacked_on_one_point(sinks: &[KeyedSink]) -> bool {
    let mut planar = sinks.iter().map(|k| (k.sink.x, k.sink.y));
    let first = match planar.next() {
        Some(p) => p,
        None => return false,
    };
    planar.all(|p| p == first) && sinks.iter().map(|k| k.sink.z).dedup().nth(1).is_some()
}

/// Push apart sinks that sit within one grid step of each other on different dies, so the planar
/// median can separate them. The later sink of each such pair moves one step along both axes.
fn separate_cross_tier_neighbours(sinks: &mut [KeyedSink]) {
    for i in 0..sinks.len() {
        for j in (i + 1)..sinks.len() {
            let (a, b) = (&sinks[i], &sinks[j]);
            if (a.x - b.x).abs() <= 1 && (a.y - b.y).abs() <= 1 && a.sink.z != b.sink.z {
                sinks[j].x += 1;
                sinks[j].y += 1;
            }
        }
    }
}

/// Median of a set of grid coordinates. Even-sized sets average the two middle values, rounding
/// toward zero.
pub fn median(values: &mut [i32]) -> Option<i32> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2)
    } else {
        Some(values[mid])
    }
}

/// Split at the median of `axis`: keys strictly below it go left, the rest right. Sets whose keys
/// all land on one side are split by count instead.
fn median_split(sinks: Vec<KeyedSink>, axis: Axis) -> (Vec<KeyedSink>, Vec<KeyedSink>) {
    let mut keys: Vec<_> = sinks.iter().map(|k| k.key(axis)).collect();
    let m = match median(&mut keys) {
        Some(m) => m,
        None => return (Vec::new(), Vec::new()),
    };

    let (below, rest): (Vec<_>, Vec<_>) = sinks.into_iter().partition(|k| k.key(axis) < m);
    if !below.is_empty() && !rest.is_empty() {
        return (below, rest);
    }

    debug!("Median {} on {:?} leaves one side empty, splitting by count", m, axis);
    let mut all = if below.is_empty() { rest } else { below };
    all.sort_by_key(|k| (k.key(axis), k.key(other_planar(axis))));
    let upper = all.split_off(all.len() / 2);
    (all, upper)
}

fn other_planar(axis: Axis) -> Axis {
    match axis {
        Axis::X => Axis::Y,
        _ => Axis::X,
    }
}

/// Partition a set spanning several dies into an upper and a lower group, relative to the die
/// `source_tier` of the clock source. The upper group is returned first.
///
/// When the source sits at or below the lowest die the bottom die alone forms the lower group;
/// when it sits at or above the highest die the top die alone forms the upper group. Otherwise
/// dies at or above the source are upper.
pub fn z_cut<T>(items: Vec<T>, z_of: impl Fn(&T) -> i32, source_tier: i32) -> (Vec<T>, Vec<T>) {
    let (min_z, max_z) = match items.iter().map(&z_of).minmax().into_option() {
        Some(v) => v,
        None => return (Vec::new(), Vec::new()),
    };

    if source_tier <= min_z {
        let (bottom, top): (Vec<_>, Vec<_>) = items.into_iter().partition(|i| z_of(i) == min_z);
        (top, bottom)
    } else if source_tier >= max_z {
        items.into_iter().partition(|i| z_of(i) == max_z)
    } else {
        items.into_iter().partition(|i| z_of(i) >= source_tier)
    }
}

/// Smallest and largest die index of a sink set, or an error for an empty set
pub fn die_span(sinks: &[Sink]) -> Result<(i32, i32)> {
    Ok(extent(sinks, Axis::Z).ok_or(SynthError::EmptyInput)?)
}
