// Executor: runs a compiled island on a device queue
//
// COMPONENTS:
//
//   ExecutionScript   - operations in topological order, operands resolved to
//                       resource slots, computed once per executable
//   Magazine          - the resource table of one run (borrowed inputs,
//                       held output objects, owned internal values)
//   ExecutionContext  - what a kernel sees: positional inputs, typed output
//                       slots, the device queue
//   KernelUnit        - a named kernel callback
//   GraphExecutable   - ties the above together
//
// WORKFLOW:
//
//   1. Compile:  GraphExecutable::new(&graph, &nodes, device, config)
//   2. Run:      exe.run(&[(src, &input)], vec![(dst, &mut output)])
//                  bind -> for each entry: take outputs, apply kernel,
//                  check metas, publish -> join queue -> write back outputs
//                  (only when every step and the join succeeded)
//   3. Reshape:  always refused

mod context;
mod executable;
mod kernel;
mod magazine;
mod script;

pub use context::ExecutionContext;
pub use executable::{GraphExecutable, InObj, OutObj, DEVICE_BACKEND_NAME};
pub use kernel::{DeviceKernel, KernelFn, KernelUnit};
pub use magazine::Magazine;
pub use script::{ArgRef, DataInfo, ExecutionScript, ScriptEntry};
