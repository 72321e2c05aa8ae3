use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::desc::MatrixDescriptor;
use crate::dtype::Element;
use crate::error::{Error, Result};

/// Host access requested on a generic matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    R,
    W,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::R => write!(f, "read"),
            Access::W => write!(f, "write"),
        }
    }
}

/// A region of memory mapped for host access.
///
/// Implementors own whatever keeps the mapping alive (a lock guard, a device
/// mapping...). Dropping the implementor releases it.
pub trait MappedMemory {
    fn bytes(&self) -> &[u8];

    /// Mutable bytes, or `None` when the region is mapped read-only.
    fn bytes_mut(&mut self) -> Option<&mut [u8]>;
}

impl MappedMemory for &[u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        None
    }
}

impl MappedMemory for &mut [u8] {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        Some(&mut **self)
    }
}

/// A host view of a matrix.
///
/// The view owns the mapping it was built over: as long as the view lives the
/// memory stays mapped, and dropping the view releases it.
pub struct MatView<'a> {
    desc: MatrixDescriptor,
    step: usize,
    access: Access,
    mem: Box<dyn MappedMemory + 'a>,
}

impl<'a> MatView<'a> {
    /// Build a view with an explicit row stride in bytes.
    pub fn new(
        desc: MatrixDescriptor,
        step: usize,
        access: Access,
        mem: Box<dyn MappedMemory + 'a>,
    ) -> Result<Self> {
        let row_bytes = desc.row_bytes();
        if step < row_bytes {
            return Err(Error::msg(format!(
                "row step {step} is smaller than a row of {desc} ({row_bytes} bytes)"
            )));
        }
        let needed = match desc.size.height {
            0 => 0,
            h => step * (h - 1) + row_bytes,
        };
        let have = mem.bytes().len();
        if have < needed {
            return Err(Error::msg(format!(
                "mapped region of {have} bytes cannot hold {desc} ({needed} bytes)"
            )));
        }
        Ok(MatView {
            desc,
            step,
            access,
            mem,
        })
    }

    /// Build a densely packed view (step == row size).
    pub fn dense(
        desc: MatrixDescriptor,
        access: Access,
        mem: Box<dyn MappedMemory + 'a>,
    ) -> Result<Self> {
        Self::new(desc, desc.row_bytes(), access, mem)
    }

    pub fn desc(&self) -> &MatrixDescriptor {
        &self.desc
    }

    /// Row stride in bytes.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn bytes(&self) -> &[u8] {
        self.mem.bytes()
    }

    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        if self.access != Access::W {
            return Err(Error::msg("matrix view is mapped read-only"));
        }
        self.mem
            .bytes_mut()
            .ok_or_else(|| Error::msg("matrix view is mapped read-only"))
    }

    /// All elements as a typed slice.
    pub fn as_slice<T: Element>(&self) -> Result<&[T]> {
        self.check_depth::<T>()?;
        cast(self.mem.bytes())
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T]> {
        self.check_depth::<T>()?;
        cast_mut(self.bytes_mut()?)
    }

    /// Elements of row `y` (all channels interleaved).
    pub fn row<T: Element>(&self, y: usize) -> Result<&[T]> {
        self.check_depth::<T>()?;
        let range = self.row_range(y)?;
        cast(&self.mem.bytes()[range])
    }

    pub fn row_mut<T: Element>(&mut self, y: usize) -> Result<&mut [T]> {
        self.check_depth::<T>()?;
        let range = self.row_range(y)?;
        cast_mut(&mut self.bytes_mut()?[range])
    }

    fn row_range(&self, y: usize) -> Result<std::ops::Range<usize>> {
        if y >= self.desc.size.height {
            return Err(Error::IndexOutOfRange {
                what: "row",
                index: y,
                len: self.desc.size.height,
            });
        }
        let start = y * self.step;
        Ok(start..start + self.desc.row_bytes())
    }

    fn check_depth<T: Element>(&self) -> Result<()> {
        if T::DEPTH != self.desc.depth {
            return Err(Error::TypeMismatch {
                what: "matrix view",
                index: 0,
                expected: self.desc.depth.to_string(),
                found: T::DEPTH.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MatView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatView")
            .field("desc", &self.desc)
            .field("step", &self.step)
            .field("access", &self.access)
            .finish()
    }
}

fn cast<T: Element>(bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes).map_err(|e| Error::msg(format!("cannot view bytes: {e}")))
}

fn cast_mut<T: Element>(bytes: &mut [u8]) -> Result<&mut [T]> {
    bytemuck::try_cast_slice_mut(bytes).map_err(|e| Error::msg(format!("cannot view bytes: {e}")))
}

/// Builds the host matrix view over a freshly mapped region.
pub type DataPolicy = Arc<
    dyn for<'a> Fn(&MatrixDescriptor, Access, Box<dyn MappedMemory + 'a>) -> Result<MatView<'a>>
        + Send
        + Sync,
>;

fn dense_view<'a>(
    desc: &MatrixDescriptor,
    access: Access,
    mem: Box<dyn MappedMemory + 'a>,
) -> Result<MatView<'a>> {
    MatView::dense(*desc, access, mem)
}

/// Densely packed view over the mapped region.
pub fn default_data_policy() -> DataPolicy {
    Arc::new(dense_view)
}

/// Something that can present itself as a generic matrix.
pub trait MatrixAdapter: Send + Sync + 'static {
    fn desc(&self) -> MatrixDescriptor;

    /// Map the matrix for host access. Dropping the view unmaps it.
    fn access(&self, access: Access) -> Result<MatView<'_>>;

    fn as_any(&self) -> &dyn Any;
}

/// Reference-counted handle to a generic matrix.
///
/// Cloning shares the underlying adapter.
#[derive(Clone)]
pub struct RMat(Arc<dyn MatrixAdapter>);

impl RMat {
    pub fn new<A: MatrixAdapter>(adapter: A) -> Self {
        RMat(Arc::new(adapter))
    }

    pub fn desc(&self) -> MatrixDescriptor {
        self.0.desc()
    }

    pub fn access(&self, access: Access) -> Result<MatView<'_>> {
        self.0.access(access)
    }

    /// Recover the concrete adapter, if it is an `A`.
    pub fn get<A: MatrixAdapter>(&self) -> Option<&A> {
        self.0.as_any().downcast_ref::<A>()
    }

    /// Whether both handles share the same adapter.
    pub fn ptr_eq(&self, other: &RMat) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to the adapter.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl fmt::Debug for RMat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RMat({})", self.desc())
    }
}
