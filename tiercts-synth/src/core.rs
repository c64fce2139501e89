use std::fmt::Display;

use log::debug;
use nalgebra::Point2;
use serde::Serialize;
use tiercts_common::{ClusterId, GridPosition, Sink, SinkKind};

/// Real-valued planar point used by the geometric searches. Carries no tree relationships.
pub type Point = Point2<f64>;

/// Index of a node inside the arena of its [`ClockTree`]
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Leaf,
    Internal,
    MergingPoint,
    ClusterRoot,
    /// Root of a cluster sub-tree, where the via to the tier above lands
    Miv,
    ClockSource,
}

#[derive(Clone, Debug)]
pub enum NodeContents {
    Leaf(Sink),
    Internal { left: NodeIndex, right: NodeIndex },
}

/// A node of the binary clock topology.
#[derive(Clone, Debug)]
pub struct PlacementNode {
    /// Creation-ordered identifier, unique across every tree produced by one
    /// [`crate::topology::TopologyBuilder`]
    pub id: u32,
    /// `None` until the node has been embedded
    pub pos: Option<GridPosition>,
    /// Downstream capacitance seen at this node
    pub capacitance: f64,
    /// Resistance of the segment driving this node
    pub resistance: f64,
    pub elmore_delay: f64,
    pub buffered: bool,
    /// Timing imbalance absorbed by the buffer, recorded when the buffer is inserted
    pub buffer_delay: f64,
    pub kind: NodeKind,
    pub cluster: Option<ClusterId>,
    pub(crate) parent: Option<NodeIndex>,
    pub(crate) contents: NodeContents,
}

impl PlacementNode {
    pub(crate) fn new(id: u32, contents: NodeContents) -> Self {
        let kind = match contents {
            NodeContents::Leaf(_) => NodeKind::Leaf,
            NodeContents::Internal { .. } => NodeKind::Internal,
        };
        Self {
            id,
            pos: None,
            capacitance: 0.0,
            resistance: 0.0,
            elmore_delay: 0.0,
            buffered: false,
            buffer_delay: 0.0,
            kind,
            cluster: None,
            parent: None,
            contents,
        }
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.contents, NodeContents::Leaf(_))
    }

    #[inline]
    pub fn sink(&self) -> Option<&Sink> {
        match &self.contents {
            NodeContents::Leaf(s) => Some(s),
            NodeContents::Internal { .. } => None,
        }
    }

    #[inline]
    pub fn children(&self) -> Option<(NodeIndex, NodeIndex)> {
        match self.contents {
            NodeContents::Leaf(_) => None,
            NodeContents::Internal { left, right } => Some((left, right)),
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }
}

/// Arena-backed binary clock tree. Every node except the root has exactly one parent, and child
/// slots are never shared.
#[derive(Clone, Debug)]
pub struct ClockTree {
    nodes: Vec<PlacementNode>,
    root: NodeIndex,
}

impl ClockTree {
    /// Assemble a tree from an arena. Parent links are rebuilt from the child slots.
    pub(crate) fn from_arena(mut nodes: Vec<PlacementNode>, root: NodeIndex) -> Self {
        for i in 0..nodes.len() {
            if let Some((l, r)) = nodes[i].children() {
                nodes[l.0].parent = Some(NodeIndex(i));
                nodes[r.0].parent = Some(NodeIndex(i));
            }
        }
        nodes[root.0].parent = None;
        Self { nodes, root }
    }

    #[inline]
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    #[inline]
    pub fn node(&self, idx: NodeIndex) -> &PlacementNode {
        &self.nodes[idx.0]
    }

    #[inline]
    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut PlacementNode {
        &mut self.nodes[idx.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Node indices with every parent before its children, left subtree first
    pub fn preorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            if let Some((l, r)) = self.node(idx).children() {
                stack.push(r);
                stack.push(l);
            }
        }
        order
    }

    /// Node indices with every child before its parent
    pub fn postorder(&self) -> Vec<NodeIndex> {
        // Reversing a (node, right, left) preorder yields (left, right, node)
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            if let Some((l, r)) = self.node(idx).children() {
                stack.push(l);
                stack.push(r);
            }
        }
        order.reverse();
        order
    }

    pub fn leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.preorder()
            .into_iter()
            .filter(move |idx| self.node(*idx).is_leaf())
    }

    pub fn leaf_sinks(&self) -> impl Iterator<Item = &Sink> + '_ {
        self.leaves().filter_map(move |idx| self.node(idx).sink())
    }

    /// `idx` followed by each of its ancestors up to and including the root
    pub fn ancestors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        std::iter::successors(Some(idx), move |i| self.node(*i).parent)
    }

    /// Every (parent, child) edge, in preorder of the child
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex)> + '_ {
        self.preorder()
            .into_iter()
            .filter_map(move |idx| self.node(idx).parent.map(|p| (p, idx)))
    }

    /// Resolve every leaf's position from the sink it owns
    pub fn assign_leaf_locations(&mut self) {
        for node in self.nodes.iter_mut() {
            if let NodeContents::Leaf(sink) = &node.contents {
                node.pos = Some(sink.position());
                node.kind = NodeKind::Leaf;
            }
        }
    }

    /// Tag every node of the tree with the same cluster
    pub fn set_cluster(&mut self, cluster: ClusterId) {
        for node in self.nodes.iter_mut() {
            node.cluster = Some(cluster);
        }
    }

    pub fn debug_dump(&self) {
        fn visit(tree: &ClockTree, idx: NodeIndex, depth: usize) {
            let node = tree.node(idx);
            debug!(
                "{:indent$}{}",
                "",
                NodeSummary(node),
                indent = depth * 4
            );
            if let Some((l, r)) = node.children() {
                visit(tree, l, depth + 1);
                visit(tree, r, depth + 1);
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            visit(self, self.root, 0);
        }
    }
}

struct NodeSummary<'a>(&'a PlacementNode);

impl<'a> Display for NodeSummary<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let n = self.0;
        write!(f, "{:?} #{}", n.kind, n.id)?;
        match n.cluster {
            Some(c) => write!(f, " cluster {}", c)?,
            None => write!(f, " unassigned")?,
        }
        match n.pos {
            Some(p) => write!(f, " at {}", p)?,
            None => write!(f, " unresolved")?,
        }
        write!(f, " C={:.3} delay={:.3}", n.capacitance, n.elmore_delay)?;
        if n.buffered {
            write!(f, " buffered (absorbs {:.3})", n.buffer_delay)?;
        }
        if let Some(s) = n.sink() {
            if s.kind == SinkKind::Via {
                write!(f, " via sink carrying {:.3}", s.delay)?;
            }
        }
        Ok(())
    }
}

/// Errors raised by the synthesis core
#[derive(Debug, PartialEq, Eq)]
pub enum SynthError {
    /// A topology was requested over an empty sink set
    EmptyInput,
    /// A merge was attempted before both children of `node` had been embedded
    UnresolvedGeometry { node: u32 },
}

impl std::error::Error for SynthError {}

impl Display for SynthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "sink set is empty"),
            Self::UnresolvedGeometry { node } => {
                write!(f, "node {} has a child without a resolved position", node)
            }
        }
    }
}

/// Build a `Vec<Sink>` of pins from `(x, y, z, cap)` tuples
#[cfg(test)]
#[macro_export]
macro_rules! sinks {
    ($(($x:expr, $y:expr, $z:expr, $c:expr)),* $(,)?) => {
        vec![$(tiercts_common::Sink::pin($x, $y, $z, $c)),*]
    };
}

/// Search the chain of an error for one matching `predicate`
#[cfg(test)]
pub(crate) fn check_chain_for_error(
    err: &anyhow::Error,
    predicate: impl FnMut(&&(dyn std::error::Error + 'static)) -> bool,
) -> bool {
    err.chain().find(predicate).is_some()
}
