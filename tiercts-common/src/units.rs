//! Process constants shared by every stage of the synthesis. Loaded once per run and read-only
//! afterwards.

use serde::Serialize;

/// Placement region of every die in the stack
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Layout {
    /// Size along the x axis, in um
    pub width: f64,
    /// Size along the y axis, in um
    pub height: f64,
    pub die_count: u32,
}

impl Layout {
    /// Whether a planar point lies inside the region (edges included)
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        0.0 <= x && x <= self.width && 0.0 <= y && y <= self.height
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireUnit {
    /// ohm/um
    pub resistance: f64,
    /// fF/um
    pub capacitance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BufferUnit {
    /// ohm
    pub output_resistance: f64,
    /// fF
    pub input_capacitance: f64,
    pub intrinsic_delay: f64,
}

/// Inter-die via (MIV/TSV) parasitics
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ViaUnit {
    /// ohm
    pub resistance: f64,
    /// fF
    pub capacitance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClockSource {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    /// ohm
    pub output_resistance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhysicalUnits {
    pub layout: Layout,
    pub wire: WireUnit,
    pub buffer: BufferUnit,
    pub via: ViaUnit,
    pub source: ClockSource,
}
