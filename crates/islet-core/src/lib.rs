//! # islet-core
//!
//! Shared vocabulary of the islet execution backend.
//!
//! This crate provides:
//! - [`Depth`] / [`Element`]: the closed set of element types a buffer can hold
//! - [`BufferDescriptor`] / [`MatrixDescriptor`]: buffer and matrix metadata,
//!   and the policies translating one into the other
//! - [`RMat`] / [`MatrixAdapter`] / [`MatView`]: the generic matrix handle and
//!   its scoped host views
//! - [`Value`] / [`Meta`]: what a data node holds at run time, and what it is
//!   expected to hold
//! - [`Error`]: the error type shared by every islet crate

pub mod desc;
pub mod dtype;
pub mod error;
pub mod mat;
pub mod value;

pub use desc::{
    default_desc_policy, to_matrix_desc, BufferDescriptor, DescPolicy, MatrixDescriptor, Size,
    MAX_CHANNELS,
};
pub use dtype::{Depth, Element};
pub use error::{Error, ErrorKind, Result};
pub use mat::{
    default_data_policy, Access, DataPolicy, MappedMemory, MatView, MatrixAdapter, RMat,
};
pub use value::{Meta, OpaqueRef, Scalar, Value, VectorRef};
