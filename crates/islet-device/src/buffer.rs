use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use islet_core::{Depth, Element, Error, Result};

use crate::device::Device;
use crate::queue::Queue;
use crate::scope::{AccessMode, AccessScope, MappingStats};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Largest number of dimensions a buffer range can have.
pub const MAX_DIMS: usize = 3;

#[derive(Default)]
pub(crate) struct MapCounters {
    pub(crate) opened: AtomicU64,
    pub(crate) released: AtomicU64,
}

pub(crate) struct BufferInner<T> {
    pub(crate) id: u64,
    pub(crate) range: Vec<usize>,
    pub(crate) data: RwLock<Vec<T>>,
    pub(crate) queue: Queue,
    pub(crate) maps: MapCounters,
}

/// A typed device buffer with a 1 to 3 dimensional range.
///
/// `Buffer` is a handle: cloning it shares the same device memory. Host code
/// reaches the memory through an [`AccessScope`]; device commands reach it
/// through the [`DeviceScope`](crate::DeviceScope) they are handed.
pub struct Buffer<T: Element> {
    pub(crate) inner: Arc<BufferInner<T>>,
}

impl<T: Element> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Buffer {
            inner: self.inner.clone(),
        }
    }
}

fn check_range(range: &[usize]) -> Result<()> {
    if range.is_empty() || range.len() > MAX_DIMS {
        return Err(Error::Dimensionality {
            dims: range.to_vec(),
            reason: format!("a buffer range has 1 to {MAX_DIMS} dimensions"),
        });
    }
    Ok(())
}

impl<T: Element> Buffer<T> {
    fn from_storage(device: &Device, range: &[usize], data: Vec<T>) -> Self {
        Buffer {
            inner: Arc::new(BufferInner {
                id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
                range: range.to_vec(),
                data: RwLock::new(data),
                queue: device.queue().clone(),
                maps: MapCounters::default(),
            }),
        }
    }

    /// Allocate a buffer. Contents are unspecified (pooled storage is reused
    /// as is).
    pub fn new(device: &Device, range: &[usize]) -> Result<Self> {
        check_range(range)?;
        let n = range.iter().product();
        Ok(Self::from_storage(device, range, device.alloc(n, false)))
    }

    /// Allocate a zero-filled buffer.
    pub fn zeros(device: &Device, range: &[usize]) -> Result<Self> {
        check_range(range)?;
        let n = range.iter().product();
        Ok(Self::from_storage(device, range, device.alloc(n, true)))
    }

    /// Create a buffer holding `data`, laid out row-major over `range`.
    pub fn from_vec(device: &Device, range: &[usize], data: Vec<T>) -> Result<Self> {
        check_range(range)?;
        let n: usize = range.iter().product();
        if data.len() != n {
            return Err(Error::msg(format!(
                "buffer range {range:?} holds {n} elements, got {}",
                data.len()
            )));
        }
        Ok(Self::from_storage(device, range, data))
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn range(&self) -> &[usize] {
        &self.inner.range
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.inner.range.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn depth(&self) -> Depth {
        T::DEPTH
    }

    /// The queue this buffer's device commands run on.
    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }

    /// Whether both handles share the same device memory.
    pub fn ptr_eq(&self, other: &Buffer<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Host mapping counters of this buffer.
    pub fn mapping_stats(&self) -> MappingStats {
        // A release landing between the two loads can make the pair look
        // inverted for a moment.
        let opened = self.inner.maps.opened.load(Ordering::Acquire);
        let released = self.inner.maps.released.load(Ordering::Acquire);
        MappingStats {
            opened,
            released,
            live: opened.saturating_sub(released),
        }
    }

    /// Copy the contents to the host. Waits for pending device work.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        let scope = AccessScope::open(self, AccessMode::Read)?;
        Ok(scope.as_slice().to_vec())
    }

    /// Copy the contents to the host, widened to f64.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let scope = AccessScope::open(self, AccessMode::Read)?;
        Ok(scope.as_slice().iter().map(|v| v.as_f64()).collect())
    }

    /// Enqueue a command setting every element to `value` (saturated).
    pub fn fill(&self, value: f64) -> Result<()> {
        let target = self.clone();
        let v = T::saturate_from(value);
        self.inner.queue.submit(move |scope| {
            let mut data = scope.write(&target)?;
            data.iter_mut().for_each(|x| *x = v);
            Ok(())
        })
    }

    /// Take the storage back, if this is the only handle.
    pub(crate) fn into_storage(self) -> std::result::Result<Vec<T>, Buffer<T>> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => Ok(inner
                .data
                .into_inner()
                .unwrap_or_else(std::sync::PoisonError::into_inner)),
            Err(inner) => Err(Buffer { inner }),
        }
    }
}

impl<T: Element> std::fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Buffer<{}>#{}{:?}", T::DEPTH, self.inner.id, self.inner.range)
    }
}

/// A buffer of any supported element type.
#[derive(Debug, Clone)]
pub enum AnyBuffer {
    U8(Buffer<u8>),
    S8(Buffer<i8>),
    U16(Buffer<u16>),
    S16(Buffer<i16>),
    S32(Buffer<i32>),
    F32(Buffer<f32>),
    F64(Buffer<f64>),
}

/// Run `$body` with `$b` bound to the typed buffer inside an [`AnyBuffer`].
#[macro_export]
macro_rules! with_any_buffer {
    ($buf:expr, $b:ident => $body:expr) => {
        match $buf {
            $crate::AnyBuffer::U8($b) => $body,
            $crate::AnyBuffer::S8($b) => $body,
            $crate::AnyBuffer::U16($b) => $body,
            $crate::AnyBuffer::S16($b) => $body,
            $crate::AnyBuffer::S32($b) => $body,
            $crate::AnyBuffer::F32($b) => $body,
            $crate::AnyBuffer::F64($b) => $body,
        }
    };
}

impl AnyBuffer {
    /// Allocate a zero-filled buffer of element depth `depth`.
    pub fn zeros(device: &Device, depth: Depth, range: &[usize]) -> Result<Self> {
        Ok(match depth {
            Depth::U8 => AnyBuffer::U8(Buffer::zeros(device, range)?),
            Depth::S8 => AnyBuffer::S8(Buffer::zeros(device, range)?),
            Depth::U16 => AnyBuffer::U16(Buffer::zeros(device, range)?),
            Depth::S16 => AnyBuffer::S16(Buffer::zeros(device, range)?),
            Depth::S32 => AnyBuffer::S32(Buffer::zeros(device, range)?),
            Depth::F32 => AnyBuffer::F32(Buffer::zeros(device, range)?),
            Depth::F64 => AnyBuffer::F64(Buffer::zeros(device, range)?),
        })
    }

    pub fn depth(&self) -> Depth {
        with_any_buffer!(self, b => b.depth())
    }

    pub fn id(&self) -> u64 {
        with_any_buffer!(self, b => b.id())
    }

    pub fn range(&self) -> &[usize] {
        with_any_buffer!(self, b => b.range())
    }

    pub fn len(&self) -> usize {
        with_any_buffer!(self, b => b.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        with_any_buffer!(self, b => b.to_f64_vec())
    }

    pub fn fill(&self, value: f64) -> Result<()> {
        with_any_buffer!(self, b => b.fill(value))
    }
}

macro_rules! impl_from_buffer {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Buffer<$t>> for AnyBuffer {
                fn from(b: Buffer<$t>) -> Self {
                    AnyBuffer::$variant(b)
                }
            }
        )*
    };
}

impl_from_buffer! {
    u8 => U8,
    i8 => S8,
    u16 => U16,
    i16 => S16,
    i32 => S32,
    f32 => F32,
    f64 => F64,
}
