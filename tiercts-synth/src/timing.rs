//! Lumped Elmore model over a clock topology.
//!
//! The delay at a node is the total resistance from the driver down to the node times the
//! capacitance below it, plus the intrinsic delay of a buffer sitting on the node.

use log::debug;
use tiercts_common::BufferUnit;

use crate::core::{ClockTree, NodeContents};

/// Bottom-up capacitance pass. Returns the capacitance seen at the root.
///
/// A buffered node keeps its own stored capacitance, which hides everything below it from its
/// parent.
pub fn propagate_capacitance(tree: &mut ClockTree) -> f64 {
    for idx in tree.postorder() {
        let node = tree.node(idx);
        if node.buffered {
            continue;
        }
        let capacitance = match node.contents {
            NodeContents::Leaf(ref sink) => sink.input_capacitance,
            NodeContents::Internal { left, right } => {
                tree.node(left).capacitance + tree.node(right).capacitance
            }
        };
        tree.node_mut(idx).capacitance = capacitance;
    }

    tree.node(tree.root()).capacitance
}

/// Top-down delay pass, with the root driven through `source_resistance`.
pub fn propagate_delay(tree: &mut ClockTree, source_resistance: f64, buffer: &BufferUnit) {
    let mut stack = vec![(tree.root(), source_resistance)];
    while let Some((idx, inherited)) = stack.pop() {
        let node = tree.node_mut(idx);
        let total_resistance = inherited + node.resistance;

        let mut delay = total_resistance * node.capacitance;
        if node.buffered {
            delay += buffer.intrinsic_delay;
        }
        if let NodeContents::Leaf(ref sink) = node.contents {
            // Via sinks carry the delay of the sub-tree they stand for
            delay += sink.delay;
        }
        node.elmore_delay = delay;

        if let Some((l, r)) = node.children() {
            stack.push((r, total_resistance));
            stack.push((l, total_resistance));
        }
    }
}

/// Run both passes, capacitance first. Returns the root delay.
pub fn analyze(tree: &mut ClockTree, source_resistance: f64, buffer: &BufferUnit) -> f64 {
    let _span = tracing::debug_span!("timing", nodes = tree.len()).entered();

    let capacitance = propagate_capacitance(tree);
    propagate_delay(tree, source_resistance, buffer);

    let delay = tree.node(tree.root()).elmore_delay;
    debug!(
        "Root capacitance {:.3}, root delay {:.3}",
        capacitance, delay
    );
    delay
}
