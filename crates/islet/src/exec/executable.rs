use islet_core::{Error, Meta, OpaqueRef, Result, Scalar, Value, VectorRef};
use islet_device::{AnyBuffer, Device};
use tracing::{debug, info, trace};

use super::context::{Arg, ExecutionContext};
use super::magazine::Magazine;
use super::script::{ArgRef, ExecutionScript, ScriptEntry};
use crate::config::IslandConfig;
use crate::graph::{DataTag, Graph, NodeId};

/// A run argument binding an external input.
pub type InObj<'a> = (NodeId, &'a Value);

/// A run argument binding an external output object.
pub type OutObj<'a> = (NodeId, &'a mut Value);

/// Backend name reported by device executables.
pub const DEVICE_BACKEND_NAME: &str = "islet.device";

/// Executes one island on a device queue.
///
/// The execution script is computed once, at construction, and never
/// re-derived. `run` borrows the executable mutably, so two runs of the same
/// executable can never overlap.
///
/// # Usage
/// ```ignore
/// let mut exe = GraphExecutable::new(&graph, &nodes, device, IslandConfig::default())?;
/// exe.run(&[(src, &input)], vec![(dst, &mut output)])?;
/// ```
pub struct GraphExecutable {
    script: ExecutionScript,
    device: Device,
    config: IslandConfig,
    runs: u64,
}

impl GraphExecutable {
    pub fn new(
        graph: &Graph,
        nodes: &[NodeId],
        device: Device,
        config: IslandConfig,
    ) -> Result<Self> {
        let script = ExecutionScript::build(graph, nodes)?;
        info!(
            device = device.name(),
            ops = script.len(),
            data = script.data().len(),
            "compiled island"
        );
        Ok(GraphExecutable {
            script,
            device,
            config,
            runs: 0,
        })
    }

    pub fn script(&self) -> &ExecutionScript {
        &self.script
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &IslandConfig {
        &self.config
    }

    /// Number of completed runs.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// Always `false`: the script is fixed at construction.
    pub fn can_reshape(&self) -> bool {
        false
    }

    pub fn reshape(&mut self, _graph: &Graph) -> Result<()> {
        Err(Error::ReshapeUnsupported {
            backend: DEVICE_BACKEND_NAME,
        })
    }

    /// Run the island once.
    ///
    /// Every external input must be bound exactly once. Output objects are
    /// optional: an unbound output is computed and dropped. A bound output
    /// already holding a matrix is written in place; any other previous value
    /// is ignored.
    ///
    /// Output objects are only updated when the whole run succeeds. On error
    /// they keep the values they had before the call, apart from the contents
    /// of matrices written in place.
    pub fn run<'a>(&mut self, inputs: &[InObj<'a>], outputs: Vec<OutObj<'a>>) -> Result<()> {
        let mut magazine = Magazine::new(self.script.data().len());
        if let Err(e) = self.bind(&mut magazine, inputs, outputs) {
            magazine.finish(false);
            return Err(e);
        }

        let executed = self.execute(&mut magazine);
        // Device work is joined on every path; a step error wins over a
        // device error it may have caused.
        let joined = self.device.wait();
        let leftovers = magazine.finish(executed.is_ok() && joined.is_ok());
        self.recycle(leftovers);

        executed?;
        joined?;
        self.runs += 1;
        Ok(())
    }

    fn bind<'a>(
        &self,
        magazine: &mut Magazine<'a>,
        inputs: &[InObj<'a>],
        outputs: Vec<OutObj<'a>>,
    ) -> Result<()> {
        let data = self.script.data();
        let lookup = |id: NodeId, expected: DataTag| -> Result<usize> {
            let slot = self.script.slot(id).ok_or_else(|| Error::BadBinding {
                node: id.0,
                reason: "not a data node of this island".to_string(),
            })?;
            if data[slot].tag != expected {
                return Err(Error::BadBinding {
                    node: id.0,
                    reason: format!(
                        "'{}' is {:?}, not {:?}",
                        data[slot].name, data[slot].tag, expected
                    ),
                });
            }
            Ok(slot)
        };

        for &(id, value) in inputs {
            let slot = lookup(id, DataTag::Input)?;
            let info = &data[slot];
            if !info.meta.accepts(value) {
                return Err(Error::MetaMismatch {
                    name: info.name.clone(),
                    expected: info.meta.to_string(),
                    got: value.meta().to_string(),
                });
            }
            if !magazine.bind_input(slot, value) {
                return Err(Error::BadBinding {
                    node: id.0,
                    reason: format!("'{}' is bound twice", info.name),
                });
            }
        }

        for (id, value) in outputs {
            let slot = lookup(id, DataTag::Output)?;
            if !magazine.bind_output(slot, value) {
                return Err(Error::BadBinding {
                    node: id.0,
                    reason: format!("'{}' is bound twice", data[slot].name),
                });
            }
        }

        for (slot, info) in data.iter().enumerate() {
            if info.tag == DataTag::Input && !magazine.is_bound(slot) {
                return Err(Error::UnboundInput(info.name.clone()));
            }
        }
        Ok(())
    }

    fn execute(&self, magazine: &mut Magazine<'_>) -> Result<()> {
        for (index, entry) in self.script.entries().iter().enumerate() {
            debug!(step = index, op = %entry.name, "running step");
            self.step(magazine, entry)
                .map_err(|e| e.at_step(index, entry.name.clone()))?;
        }
        Ok(())
    }

    fn step(&self, magazine: &mut Magazine<'_>, entry: &ScriptEntry) -> Result<()> {
        let mut results: Vec<Value> = entry.outputs.iter().map(|&s| magazine.take(s)).collect();
        let outcome = self.apply(magazine, entry, &mut results);
        for (&slot, value) in entry.outputs.iter().zip(results) {
            magazine.put(slot, value);
        }
        outcome
    }

    fn apply(
        &self,
        magazine: &Magazine<'_>,
        entry: &ScriptEntry,
        results: &mut [Value],
    ) -> Result<()> {
        for (value, meta) in results.iter_mut().zip(&entry.out_metas) {
            if value.is_empty() {
                *value = allocate(&self.device, meta)?;
            }
        }

        let args = entry
            .args
            .iter()
            .map(|a| match a {
                ArgRef::Slot(slot) => Arg::Value(magazine.get(*slot)),
                ArgRef::Const(c) => Arg::Const(c),
            })
            .collect();
        let mut ctx = ExecutionContext::new(&entry.name, &self.device, args, results);
        entry.kernel.apply(&mut ctx)?;

        if self.config.check_output_metas {
            for ((value, meta), &slot) in results
                .iter()
                .zip(&entry.out_metas)
                .zip(&entry.outputs)
            {
                if !meta.accepts(value) {
                    return Err(Error::MetaMismatch {
                        name: self.script.data()[slot].name.clone(),
                        expected: meta.to_string(),
                        got: value.meta().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Return uniquely owned internal matrix buffers to the device pool.
    fn recycle(&self, leftovers: Vec<(usize, Value)>) {
        if !self.config.reuse_internal_buffers {
            return;
        }
        let data = self.script.data();
        for (slot, value) in leftovers {
            if data[slot].tag != DataTag::Internal {
                continue;
            }
            let Value::Mat(mat) = value else { continue };
            if mat.handle_count() != 1 {
                continue;
            }
            if let Some(buffer) = AnyBuffer::from_rmat(&mat) {
                drop(mat);
                if self.device.reclaim_any(buffer) {
                    trace!(node = %data[slot].name, "internal buffer returned to pool");
                }
            }
        }
    }
}

/// Initial value of an output slot with metadata `meta`.
///
/// Matrices are allocated on the device, zero filled.
fn allocate(device: &Device, meta: &Meta) -> Result<Value> {
    Ok(match meta {
        Meta::Empty => Value::Empty,
        Meta::Mat(desc) => {
            let range = desc.to_buffer_range()?;
            Value::Mat(AnyBuffer::zeros(device, desc.depth, &range)?.into_rmat()?)
        }
        Meta::Scalar => Value::Scalar(Scalar::default()),
        Meta::Sequence => Value::Sequence(VectorRef::new()),
        Meta::Opaque => Value::Opaque(OpaqueRef::new()),
    })
}
