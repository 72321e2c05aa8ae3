use std::any::Any;

use islet_core::{
    default_data_policy, default_desc_policy, to_matrix_desc, Access, BufferDescriptor,
    DataPolicy, DescPolicy, Element, MatView, MatrixAdapter, MatrixDescriptor, RMat, Result,
};

use crate::buffer::{AnyBuffer, Buffer};
use crate::scope::{AccessMode, AccessScope};

/// Describe a device buffer.
///
/// The range must be `[rows, cols, channels]`.
pub fn describe<T: Element>(buffer: &Buffer<T>) -> Result<BufferDescriptor> {
    BufferDescriptor::from_range(T::DEPTH, buffer.range())
}

/// Presents a device buffer as a generic matrix.
///
/// Host access goes through an [`AccessScope`] owned by the returned view, so
/// the device mapping is released when the view is dropped.
pub struct BufferAdapter<T: Element> {
    buffer: Buffer<T>,
    buffer_desc: BufferDescriptor,
    desc: MatrixDescriptor,
    data_policy: DataPolicy,
}

impl<T: Element> BufferAdapter<T> {
    pub fn new(buffer: Buffer<T>) -> Result<Self> {
        Self::with_policies(buffer, default_desc_policy(), default_data_policy())
    }

    pub fn with_policies(
        buffer: Buffer<T>,
        desc_policy: DescPolicy,
        data_policy: DataPolicy,
    ) -> Result<Self> {
        let buffer_desc = describe(&buffer)?;
        let desc = to_matrix_desc(&buffer_desc, &desc_policy);
        Ok(BufferAdapter {
            buffer,
            buffer_desc,
            desc,
            data_policy,
        })
    }

    pub fn buffer(&self) -> &Buffer<T> {
        &self.buffer
    }

    pub fn buffer_desc(&self) -> &BufferDescriptor {
        &self.buffer_desc
    }

    pub fn into_rmat(self) -> RMat {
        RMat::new(self)
    }
}

impl<T: Element> MatrixAdapter for BufferAdapter<T> {
    fn desc(&self) -> MatrixDescriptor {
        self.desc
    }

    fn access(&self, access: Access) -> Result<MatView<'_>> {
        let mode = match access {
            Access::R => AccessMode::Read,
            Access::W => AccessMode::Write,
        };
        let scope = AccessScope::open(&self.buffer, mode)?;
        (self.data_policy)(&self.desc, access, Box::new(scope))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl AnyBuffer {
    /// Wrap the buffer in a generic matrix handle with default policies.
    pub fn into_rmat(self) -> Result<RMat> {
        crate::with_any_buffer!(self, b => BufferAdapter::new(b).map(RMat::new))
    }

    /// The device buffer behind a generic matrix, if it is a [`BufferAdapter`].
    pub fn from_rmat(mat: &RMat) -> Option<AnyBuffer> {
        fn typed<T: Element>(mat: &RMat) -> Option<Buffer<T>> {
            mat.get::<BufferAdapter<T>>().map(|a| a.buffer().clone())
        }
        typed::<u8>(mat)
            .map(AnyBuffer::U8)
            .or_else(|| typed::<i8>(mat).map(AnyBuffer::S8))
            .or_else(|| typed::<u16>(mat).map(AnyBuffer::U16))
            .or_else(|| typed::<i16>(mat).map(AnyBuffer::S16))
            .or_else(|| typed::<i32>(mat).map(AnyBuffer::S32))
            .or_else(|| typed::<f32>(mat).map(AnyBuffer::F32))
            .or_else(|| typed::<f64>(mat).map(AnyBuffer::F64))
    }
}
