use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak},
};

use petgraph::Graph as PetGraph;
use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
};

use crate::WithDType;

mod dump;

pub use dump::debug_dump_computational_graph;

/// Stable index of a value node. Ids are handed out in creation order and
/// never reused, so a node can only reference lower ids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ArrayNodeId(usize);

impl ArrayNodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ArrayNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayNode<{}>", self.0)
    }
}

/// Stable index of an edge record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OpNodeId(usize);

impl OpNodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum BinaryOpType {
    Add,
    Mul,
}

impl BinaryOpType {
    /// The symbolic tag recorded in the graph.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Mul => "mul",
        }
    }

    pub fn as_fn<T: WithDType>(&self) -> fn(T, T) -> T {
        match self {
            Self::Add => T::add_elem,
            Self::Mul => T::mul_elem,
        }
    }
}

impl fmt::Display for BinaryOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value node: the provenance of one array value.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ArrayNode {
    id: ArrayNodeId,
    producer: Option<OpNodeId>,
}

impl ArrayNode {
    pub fn id(&self) -> ArrayNodeId {
        self.id
    }

    /// The edge record that produced this value, `None` for a leaf.
    pub fn producer(&self) -> Option<OpNodeId> {
        self.producer
    }

    pub fn is_leaf(&self) -> bool {
        self.producer.is_none()
    }
}

/// An edge record: one operation and its operands, left before right.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct OpNode {
    id: OpNodeId,
    operator: BinaryOpType,
    operands: Vec<ArrayNodeId>,
}

impl OpNode {
    pub fn id(&self) -> OpNodeId {
        self.id
    }

    pub fn operator(&self) -> BinaryOpType {
        self.operator
    }

    pub fn name(&self) -> &'static str {
        self.operator.name()
    }

    pub fn operands(&self) -> &[ArrayNodeId] {
        &self.operands
    }
}

/// Held by every array bound to a value node. A node stays alive across
/// [`Graph::sweep`] while a handle to it, or to any node derived from it, exists.
#[derive(Debug)]
pub(crate) struct NodeHandle {
    id: ArrayNodeId,
}

impl NodeHandle {
    pub(crate) fn id(&self) -> ArrayNodeId {
        self.id
    }
}

/// What a [`Graph::sweep`] released.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Swept {
    pub nodes: usize,
    pub ops: usize,
}

#[derive(Default)]
struct GraphInner {
    nodes: Vec<Option<ArrayNode>>,
    ops: Vec<Option<OpNode>>,
    roots: Vec<Weak<NodeHandle>>,
}

impl GraphInner {
    fn node(&self, id: ArrayNodeId) -> Option<&ArrayNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn op(&self, id: OpNodeId) -> Option<&OpNode> {
        self.ops.get(id.0).and_then(Option::as_ref)
    }

    fn push_node(&mut self, producer: Option<OpNodeId>) -> Arc<NodeHandle> {
        let id = ArrayNodeId(self.nodes.len());
        self.nodes.push(Some(ArrayNode { id, producer }));
        let handle = Arc::new(NodeHandle { id });
        self.roots.push(Arc::downgrade(&handle));
        handle
    }
}

/// Append-only arena recording how every array value was derived.
///
/// Cloning a `Graph` yields another handle to the same arena.
#[derive(Clone, Default)]
pub struct Graph {
    inner: Arc<RwLock<GraphInner>>,
}

impl Graph {
    /// Create an empty Graph
    pub fn empty() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, GraphInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GraphInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles refer to the same arena.
    pub fn same_graph(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Add a value node without a producer.
    pub(crate) fn add_leaf(&self) -> Arc<NodeHandle> {
        self.write().push_node(None)
    }

    /// Record `operator` applied to `operands` and return the node of its result.
    ///
    /// The edge record and the node it produces are created together, so a
    /// node's producer is fixed at creation and never reassigned.
    pub(crate) fn add_op(
        &self,
        operator: BinaryOpType,
        operands: Vec<ArrayNodeId>,
    ) -> Arc<NodeHandle> {
        let mut inner = self.write();
        debug_assert!(operands
            .iter()
            .all(|id| inner.node(*id).is_some() && id.0 < inner.nodes.len()));
        let op_id = OpNodeId(inner.ops.len());
        log::trace!("recording {operator} over {operands:?} as op {}", op_id.0);
        inner.ops.push(Some(OpNode {
            id: op_id,
            operator,
            operands,
        }));
        inner.push_node(Some(op_id))
    }

    pub fn node(&self, id: ArrayNodeId) -> Option<ArrayNode> {
        self.read().node(id).cloned()
    }

    pub fn op(&self, id: OpNodeId) -> Option<OpNode> {
        self.read().op(id).cloned()
    }

    /// The edge record that produced `id`, if any.
    pub fn producer(&self, id: ArrayNodeId) -> Option<OpNode> {
        let inner = self.read();
        inner
            .node(id)
            .and_then(|node| node.producer)
            .and_then(|op| inner.op(op))
            .cloned()
    }

    /// Number of value nodes currently held.
    pub fn node_count(&self) -> usize {
        self.read().nodes.iter().flatten().count()
    }

    /// Number of edge records currently held.
    pub fn op_count(&self) -> usize {
        self.read().ops.iter().flatten().count()
    }

    /// Free every node and edge record that no live array can reach.
    ///
    /// Ids of freed entries are retired, not reused.
    pub fn sweep(&self) -> Swept {
        let mut inner = self.write();
        inner.roots.retain(|root| root.strong_count() > 0);

        let mut live_nodes = vec![false; inner.nodes.len()];
        let mut live_ops = vec![false; inner.ops.len()];
        let mut stack: Vec<ArrayNodeId> = inner
            .roots
            .iter()
            .filter_map(Weak::upgrade)
            .map(|handle| handle.id)
            .collect();
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut live_nodes[id.0], true) {
                continue;
            }
            let Some(op_id) = inner.node(id).and_then(|node| node.producer) else {
                continue;
            };
            live_ops[op_id.0] = true;
            if let Some(op) = inner.op(op_id) {
                stack.extend(op.operands.iter().copied());
            }
        }

        let mut swept = Swept::default();
        for (slot, live) in inner.nodes.iter_mut().zip(&live_nodes) {
            if !live && slot.take().is_some() {
                swept.nodes += 1;
            }
        }
        for (slot, live) in inner.ops.iter_mut().zip(&live_ops) {
            if !live && slot.take().is_some() {
                swept.ops += 1;
            }
        }
        log::debug!(
            "graph sweep freed {} nodes and {} ops",
            swept.nodes,
            swept.ops
        );
        swept
    }

    pub fn to_petgraph(&self) -> PetGraph<String, ()> {
        let inner = self.read();
        let mut g = PetGraph::<String, ()>::new();
        let mut node_map: Vec<Option<NodeIndex>> = vec![None; inner.nodes.len()];
        let mut op_map: Vec<Option<NodeIndex>> = vec![None; inner.ops.len()];

        for node in inner.nodes.iter().flatten() {
            node_map[node.id.0] = Some(g.add_node(node.id.to_string()));
        }
        for op in inner.ops.iter().flatten() {
            let dst = g.add_node(format!("Op<{}>", op.name()));
            op_map[op.id.0] = Some(dst);
            for operand in &op.operands {
                if let Some(src) = node_map[operand.0] {
                    g.add_edge(src, dst, ());
                }
            }
        }
        for node in inner.nodes.iter().flatten() {
            if let (Some(op_id), Some(dst)) = (node.producer, node_map[node.id.0]) {
                if let Some(src) = op_map[op_id.0] {
                    g.add_edge(src, dst, ());
                }
            }
        }

        g
    }

    /// Produce a DOT format string of this graph.
    pub fn to_dot(&self) -> String {
        let g = self.to_petgraph();
        format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel]))
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.node_count())
            .field("ops", &self.op_count())
            .finish()
    }
}
