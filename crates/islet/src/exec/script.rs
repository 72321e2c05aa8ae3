// Execution script: the island, compiled once
//
// Building a script does all the structural work up front, so a run is a
// plain walk over a flat list:
//
//   1. Resolve the node list. Data nodes get a resource slot each, in list
//      order; every reference an operation makes is resolved to a slot index
//      (or kept as a constant).
//   2. Check producers: at most one per data node, none for external inputs,
//      exactly one for internal and output nodes.
//   3. Order operations topologically (Kahn). Among ready operations the one
//      listed first in the node list goes first, so the order is a function
//      of the island alone.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use islet_core::{Error, Meta, Result};

use super::kernel::KernelUnit;
use crate::graph::{ConstArg, DataTag, Graph, Node, NodeId, Operand};

/// A data node of the island and its resource slot.
#[derive(Debug, Clone)]
pub struct DataInfo {
    pub id: NodeId,
    pub name: String,
    pub tag: DataTag,
    pub meta: Meta,
}

/// An operand, resolved.
#[derive(Debug, Clone)]
pub enum ArgRef {
    /// Resource slot of a data operand.
    Slot(usize),
    Const(ConstArg),
}

/// One operation of the script.
#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub op: NodeId,
    pub name: String,
    pub kernel: KernelUnit,
    pub args: Vec<ArgRef>,
    /// Resource slots of the outputs, in output order.
    pub outputs: Vec<usize>,
    /// Expected metadata of each output.
    pub out_metas: Vec<Meta>,
}

/// The linear execution plan of an island.
#[derive(Debug, Clone)]
pub struct ExecutionScript {
    entries: Vec<ScriptEntry>,
    data: Vec<DataInfo>,
    slots: HashMap<NodeId, usize>,
}

impl ExecutionScript {
    /// Compile the island made of `nodes` (ids into `graph`).
    pub fn build(graph: &Graph, nodes: &[NodeId]) -> Result<Self> {
        // Resource slots
        let mut data = Vec::new();
        let mut slots = HashMap::new();
        let mut ops = Vec::new();
        for &id in nodes {
            let node = graph.node(id).ok_or_else(|| Error::DanglingNode {
                node: id.to_string(),
                target: id.0,
            })?;
            match node {
                Node::Data(d) => {
                    if slots.insert(id, data.len()).is_some() {
                        return Err(Error::msg(format!("node {id} is listed twice")));
                    }
                    data.push(DataInfo {
                        id,
                        name: d.name.clone(),
                        tag: d.tag,
                        meta: d.meta,
                    });
                }
                Node::Op(op) => {
                    if ops.iter().any(|&(other, _)| other == id) {
                        return Err(Error::msg(format!("node {id} is listed twice")));
                    }
                    ops.push((id, op));
                }
            }
        }

        let resolve = |op: &str, target: NodeId| {
            slots.get(&target).copied().ok_or_else(|| Error::DanglingNode {
                node: op.to_string(),
                target: target.0,
            })
        };

        // Operands, outputs and producers
        let mut producer: Vec<Option<usize>> = vec![None; data.len()];
        let mut entries = Vec::with_capacity(ops.len());
        for (pos, &(id, op)) in ops.iter().enumerate() {
            let args = op
                .operands
                .iter()
                .map(|operand| match operand {
                    Operand::Data(target) => resolve(&op.name, *target).map(ArgRef::Slot),
                    Operand::Const(c) => Ok(ArgRef::Const(c.clone())),
                })
                .collect::<Result<Vec<_>>>()?;

            let mut outputs = Vec::with_capacity(op.outputs.len());
            for &target in &op.outputs {
                let slot = resolve(&op.name, target)?;
                let info = &data[slot];
                if info.tag == DataTag::Input {
                    return Err(Error::Producer {
                        node: info.name.clone(),
                        reason: format!("external input written by '{}'", op.name),
                    });
                }
                if let Some(first) = producer[slot] {
                    return Err(Error::Producer {
                        node: info.name.clone(),
                        reason: format!(
                            "produced by both '{}' and '{}'",
                            ops[first].1.name, op.name
                        ),
                    });
                }
                producer[slot] = Some(pos);
                outputs.push(slot);
            }

            entries.push(ScriptEntry {
                op: id,
                name: op.name.clone(),
                kernel: op.kernel.clone(),
                args,
                out_metas: outputs.iter().map(|&s| data[s].meta).collect(),
                outputs,
            });
        }

        for (slot, info) in data.iter().enumerate() {
            if info.tag != DataTag::Input && producer[slot].is_none() {
                return Err(Error::Producer {
                    node: info.name.clone(),
                    reason: "no operation of the island produces it".to_string(),
                });
            }
        }

        let order = topo_order(&entries, &producer)?;
        let mut entries: Vec<Option<ScriptEntry>> = entries.into_iter().map(Some).collect();
        let entries = order
            .into_iter()
            .filter_map(|pos| entries[pos].take())
            .collect();

        Ok(ExecutionScript {
            entries,
            data,
            slots,
        })
    }

    pub fn entries(&self) -> &[ScriptEntry] {
        &self.entries
    }

    pub fn data(&self) -> &[DataInfo] {
        &self.data
    }

    /// Resource slot of data node `id`.
    pub fn slot(&self, id: NodeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    /// Operation ids in execution order.
    pub fn order(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.op).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Kahn's algorithm over operation positions. Ready operations are taken
/// lowest position first.
fn topo_order(entries: &[ScriptEntry], producer: &[Option<usize>]) -> Result<Vec<usize>> {
    let n = entries.len();
    let mut indegree = vec![0usize; n];
    let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (pos, entry) in entries.iter().enumerate() {
        for arg in &entry.args {
            if let ArgRef::Slot(slot) = arg {
                if let Some(p) = producer[*slot] {
                    indegree[pos] += 1;
                    consumers[p].push(pos);
                }
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&pos| indegree[pos] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(pos)) = ready.pop() {
        order.push(pos);
        for &c in &consumers[pos] {
            indegree[c] -= 1;
            if indegree[c] == 0 {
                ready.push(Reverse(c));
            }
        }
    }

    if order.len() < n {
        let stuck = (0..n).find(|&pos| indegree[pos] > 0).unwrap_or(0);
        return Err(Error::Cycle(entries[stuck].name.clone()));
    }
    Ok(order)
}
