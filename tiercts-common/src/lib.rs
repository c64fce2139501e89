pub mod benchmark;
pub mod units;

pub use units::{BufferUnit, ClockSource, Layout, PhysicalUnits, ViaUnit, WireUnit};

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Position on the integer routing grid. `z` is the die (tier) index, counted from the bottom of
/// the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridPosition {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Manhattan distance in the plane of a die. Tiers are ignored, a via carries the signal
    /// between them.
    #[inline]
    pub fn planar_distance(&self, other: &Self) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    #[inline]
    pub fn same_planar(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Display for GridPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Identifier of a density cluster inside one tier. Id 0 is reserved for sinks which did not
/// end up in any retained cluster.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClusterId(pub u32);

impl ClusterId {
    pub const UNCLUSTERED: ClusterId = ClusterId(0);

    #[inline]
    pub fn is_clustered(self) -> bool {
        self.0 != 0
    }
}

impl Display for ClusterId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SinkKind {
    /// A clock pin read from the benchmark
    Pin,
    /// The root of a clustered sub-tree from the tier below, standing in for the via that
    /// connects it
    Via,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// A clock terminal.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Sink {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// Load presented to the clock net, in fF
    pub input_capacitance: f64,
    /// Delay already accumulated below this sink, in the same unit as the Elmore delays. Always 0
    /// for pins.
    pub delay: f64,
    pub cluster: Option<ClusterId>,
    pub kind: SinkKind,
}

impl Sink {
    pub fn pin(x: i32, y: i32, z: i32, input_capacitance: f64) -> Self {
        Self {
            x,
            y,
            z,
            input_capacitance,
            delay: 0.0,
            cluster: None,
            kind: SinkKind::Pin,
        }
    }

    pub fn via(
        pos: GridPosition,
        input_capacitance: f64,
        delay: f64,
        cluster: ClusterId,
    ) -> Self {
        Self {
            x: pos.x,
            y: pos.y,
            z: pos.z,
            input_capacitance,
            delay,
            cluster: Some(cluster),
            kind: SinkKind::Via,
        }
    }

    #[inline]
    pub fn position(&self) -> GridPosition {
        GridPosition::new(self.x, self.y, self.z)
    }

    #[inline]
    pub fn coord(&self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Smallest and largest value of `axis` over `sinks`, or `None` for an empty set.
pub fn extent(sinks: &[Sink], axis: Axis) -> Option<(i32, i32)> {
    match sinks.iter().map(|s| s.coord(axis)).minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extent_of_empty_set_is_none() {
        assert_eq!(extent(&[], Axis::X), None);
    }

    #[test]
    fn extent_spans_all_axes() {
        let sinks = [
            Sink::pin(3, 9, 1, 1.0),
            Sink::pin(-2, 4, 3, 1.0),
            Sink::pin(7, 5, 2, 1.0),
        ];

        assert_eq!(extent(&sinks, Axis::X), Some((-2, 7)));
        assert_eq!(extent(&sinks, Axis::Y), Some((4, 9)));
        assert_eq!(extent(&sinks, Axis::Z), Some((1, 3)));
    }

    #[test]
    fn planar_distance_ignores_tier() {
        let a = GridPosition::new(0, 0, 0);
        let b = GridPosition::new(3, -4, 5);
        assert_eq!(a.planar_distance(&b), 7);
        assert!(!a.same_planar(&b));
        assert!(b.same_planar(&GridPosition::new(3, -4, 0)));
    }
}
