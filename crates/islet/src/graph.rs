// Graph: the island handed to an executable
//
// A graph is a flat list of nodes addressed by `NodeId`. Two kinds:
//
//   Op   - a kernel unit, its operands and the data nodes it writes
//   Data - a resource slot, tagged Input / Output / Internal, with metadata
//
// Operands are either data nodes or constants baked into the operation (a
// threshold, a kernel size...). The builder does no validation; structure is
// checked when an executable is compiled from a node list.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use islet_core::Meta;

use crate::exec::KernelUnit;

/// Index of a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a data node at the island boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTag {
    /// Bound by the caller for each run, read only.
    Input,
    /// Produced inside the island, handed back to the caller.
    Output,
    /// Produced and consumed inside the island.
    Internal,
}

/// A constant operation argument.
#[derive(Clone)]
pub struct ConstArg {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ConstArg {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ConstArg {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub fn value(&self) -> &(dyn Any + Send + Sync) {
        self.value.as_ref()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ConstArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Const<{}>", self.type_name)
    }
}

/// An operation operand.
#[derive(Debug, Clone)]
pub enum Operand {
    Data(NodeId),
    Const(ConstArg),
}

impl Operand {
    pub fn constant<T: Any + Send + Sync>(value: T) -> Self {
        Operand::Const(ConstArg::new(value))
    }
}

impl From<NodeId> for Operand {
    fn from(id: NodeId) -> Self {
        Operand::Data(id)
    }
}

#[derive(Debug, Clone)]
pub struct OpNode {
    pub name: String,
    pub kernel: KernelUnit,
    pub operands: Vec<Operand>,
    pub outputs: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct DataNode {
    pub name: String,
    pub tag: DataTag,
    pub meta: Meta,
}

#[derive(Debug, Clone)]
pub enum Node {
    Op(OpNode),
    Data(DataNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Op(op) => &op.name,
            Node::Data(d) => &d.name,
        }
    }
}

/// A dataflow graph under construction.
///
/// ```ignore
/// let mut g = Graph::new();
/// let src = g.input("src", Meta::Mat(desc));
/// let dst = g.output("dst", Meta::Mat(desc));
/// g.add_op("inc", kernel, vec![src.into()], vec![dst]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_data(&mut self, name: impl Into<String>, tag: DataTag, meta: Meta) -> NodeId {
        self.push(Node::Data(DataNode {
            name: name.into(),
            tag,
            meta,
        }))
    }

    pub fn input(&mut self, name: impl Into<String>, meta: Meta) -> NodeId {
        self.add_data(name, DataTag::Input, meta)
    }

    pub fn output(&mut self, name: impl Into<String>, meta: Meta) -> NodeId {
        self.add_data(name, DataTag::Output, meta)
    }

    pub fn internal(&mut self, name: impl Into<String>, meta: Meta) -> NodeId {
        self.add_data(name, DataTag::Internal, meta)
    }

    pub fn add_op(
        &mut self,
        name: impl Into<String>,
        kernel: KernelUnit,
        operands: Vec<Operand>,
        outputs: Vec<NodeId>,
    ) -> NodeId {
        self.push(Node::Op(OpNode {
            name: name.into(),
            kernel,
            operands,
            outputs,
        }))
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn op(&self, id: NodeId) -> Option<&OpNode> {
        match self.node(id)? {
            Node::Op(op) => Some(op),
            Node::Data(_) => None,
        }
    }

    pub fn data(&self, id: NodeId) -> Option<&DataNode> {
        match self.node(id)? {
            Node::Data(d) => Some(d),
            Node::Op(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node id, in insertion order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        (0..self.nodes.len()).map(NodeId).collect()
    }
}
