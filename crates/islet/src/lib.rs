//! # islet
//!
//! Execution backend for dataflow graph islands running on a device queue.
//!
//! An island is a subgraph of operations assigned to one backend. islet
//! compiles it once into a linear execution script, then runs it on demand:
//! inputs are bound, each operation's kernel is invoked in order with a
//! per-step [`ExecutionContext`], and device work is joined before outputs are
//! handed back.
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `islet-core` | Element types, descriptors, generic matrices, run-time values, errors |
//! | `islet-device` | Device, in-order queue, buffers, host mappings, buffer adapter |
//! | `islet` | Graph model, execution script, executor, backend registry |
//!
//! ## Usage
//!
//! ```ignore
//! let device = Device::default_device()?;
//! let inc = DeviceBackend::kernel("inc", |ctx| {
//!     let src = ctx.input_buffer::<u8>(0)?.clone();
//!     let dst = ctx.output_buffer::<u8>(0)?.clone();
//!     ctx.queue().submit(move |dev| dev.parallel_map(&src, &dst, |v: u8| v + 1))
//! });
//!
//! let mut g = Graph::new();
//! let src = g.input("src", Meta::Mat(desc));
//! let dst = g.output("dst", Meta::Mat(desc));
//! let op = g.add_op("inc", inc, vec![src.into()], vec![dst]);
//!
//! let mut exe = GraphExecutable::new(&g, &[src, op, dst], device, IslandConfig::default())?;
//! exe.run(&[(src, &input)], vec![(dst, &mut output)])?;
//! ```

pub mod backend;
pub mod config;
pub mod exec;
pub mod graph;

pub use backend::{BackendRegistry, DeviceBackend, IslandBackend, IslandExecutable};
pub use config::IslandConfig;
pub use exec::{
    DeviceKernel, ExecutionContext, ExecutionScript, GraphExecutable, InObj, KernelUnit, OutObj,
};
pub use graph::{ConstArg, DataTag, Graph, Node, NodeId, Operand};

pub use islet_core::{Error, ErrorKind, Meta, Result, Value};
pub use islet_device::{Device, DeviceConfig};
