//! # islet-device
//!
//! A small accelerator runtime with the execution model islet schedules on.
//!
//! - [`Device`] owns exactly one in-order [`Queue`], serviced by a dedicated
//!   worker thread, and a [`BufferPool`] caching released storage.
//! - [`Buffer`] is a typed device buffer with a 1 to 3 dimensional range.
//! - [`AccessScope`] maps a buffer for host access after forcing completion of
//!   previously submitted work; [`DeviceScope`] is what commands see.
//! - [`BufferAdapter`] presents a `[rows, cols, channels]` buffer as a generic
//!   matrix ([`islet_core::RMat`]).
//!
//! Device memory is host RAM. The synchronization contracts are those of a
//! real accelerator: submission is asynchronous and host mappings block until
//! the queue is idle.

pub mod adapter;
pub mod buffer;
pub mod device;
pub mod pool;
pub mod queue;
pub mod scope;

pub use adapter::{describe, BufferAdapter};
pub use buffer::{AnyBuffer, Buffer, MAX_DIMS};
pub use device::{Device, DeviceConfig};
pub use pool::{BufferPool, PoolStats};
pub use queue::{Command, Queue, QueueStats};
pub use scope::{AccessMode, AccessScope, DeviceScope, MappingStats};
