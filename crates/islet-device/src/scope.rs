// Scopes: the two ways of reaching device memory
//
//   AccessScope  - host side. Waits for the queue, then maps one buffer for
//                  read or write. The mapping lives exactly as long as the
//                  scope value; dropping it unmaps, whatever the exit path.
//   DeviceScope  - device side. Handed to every command by the queue worker.
//                  Never blocks: a buffer that is mapped on the host makes the
//                  command fail instead.

use std::sync::atomic::Ordering;
use std::sync::{RwLockReadGuard, RwLockWriteGuard, TryLockError};

use islet_core::{Element, Error, MappedMemory, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::buffer::Buffer;

/// Device access mode requested for a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
    DiscardWrite,
}

impl AccessMode {
    pub fn name(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::ReadWrite => "read_write",
            AccessMode::DiscardWrite => "discard_write",
        }
    }
}

/// Host mapping counters of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MappingStats {
    pub opened: u64,
    pub released: u64,
    /// Mappings currently open.
    pub live: u64,
}

enum Mapping<'a, T> {
    Read(RwLockReadGuard<'a, Vec<T>>),
    Write(RwLockWriteGuard<'a, Vec<T>>),
}

/// A live host mapping of a [`Buffer`].
///
/// Only [`AccessMode::Read`] and [`AccessMode::Write`] are supported. Any other
/// mode is refused before anything is touched: no queue wait, no mapping, no
/// counter change.
pub struct AccessScope<'a, T: Element> {
    buffer: &'a Buffer<T>,
    mapping: Mapping<'a, T>,
}

impl<'a, T: Element> AccessScope<'a, T> {
    /// Map `buffer` for host access. Blocks until all previously submitted
    /// device work has completed.
    pub fn open(buffer: &'a Buffer<T>, mode: AccessMode) -> Result<Self> {
        let write = match mode {
            AccessMode::Read => false,
            AccessMode::Write => true,
            other => return Err(Error::UnsupportedAccess { mode: other.name() }),
        };
        buffer.queue().wait()?;

        let conflict = |held: &'static str| Error::MappingConflict {
            buffer: buffer.id(),
            held,
        };
        let data = &buffer.inner.data;
        let mapping = if write {
            match data.try_write() {
                Ok(g) => Mapping::Write(g),
                Err(TryLockError::Poisoned(p)) => Mapping::Write(p.into_inner()),
                Err(TryLockError::WouldBlock) => return Err(conflict("host access")),
            }
        } else {
            match data.try_read() {
                Ok(g) => Mapping::Read(g),
                Err(TryLockError::Poisoned(p)) => Mapping::Read(p.into_inner()),
                Err(TryLockError::WouldBlock) => return Err(conflict("write")),
            }
        };

        buffer.inner.maps.opened.fetch_add(1, Ordering::AcqRel);
        debug!(buffer = buffer.id(), mode = mode.name(), "mapped buffer");
        Ok(AccessScope { buffer, mapping })
    }

    pub fn mode(&self) -> AccessMode {
        match self.mapping {
            Mapping::Read(_) => AccessMode::Read,
            Mapping::Write(_) => AccessMode::Write,
        }
    }

    pub fn buffer(&self) -> &Buffer<T> {
        self.buffer
    }

    pub fn as_slice(&self) -> &[T] {
        match &self.mapping {
            Mapping::Read(g) => g.as_slice(),
            Mapping::Write(g) => g.as_slice(),
        }
    }

    /// Mutable elements. Fails on a read mapping.
    pub fn as_mut_slice(&mut self) -> Result<&mut [T]> {
        match &mut self.mapping {
            Mapping::Write(g) => Ok(g.as_mut_slice()),
            Mapping::Read(_) => Err(Error::msg(format!(
                "buffer {} is mapped read-only",
                self.buffer.id()
            ))),
        }
    }
}

impl<T: Element> MappedMemory for AccessScope<'_, T> {
    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.as_mut_slice().ok().map(bytemuck::cast_slice_mut)
    }
}

impl<T: Element> Drop for AccessScope<'_, T> {
    fn drop(&mut self) {
        self.buffer.inner.maps.released.fetch_add(1, Ordering::AcqRel);
        debug!(buffer = self.buffer.id(), mode = self.mode().name(), "released buffer");
    }
}

/// Device-side view of memory, handed to commands by the queue worker.
pub struct DeviceScope {
    accesses: u64,
}

impl DeviceScope {
    pub(crate) fn new() -> Self {
        DeviceScope { accesses: 0 }
    }

    /// Number of buffer accesses made through this scope so far.
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    /// Device read access. Fails if the buffer is mapped for write on the host.
    pub fn read<'b, T: Element>(
        &mut self,
        buffer: &'b Buffer<T>,
    ) -> Result<RwLockReadGuard<'b, Vec<T>>> {
        self.accesses += 1;
        match buffer.inner.data.try_read() {
            Ok(g) => Ok(g),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::device(format!(
                "buffer {} is mapped on the host",
                buffer.id()
            ))),
        }
    }

    /// Device write access. Fails if the buffer is mapped on the host.
    pub fn write<'b, T: Element>(
        &mut self,
        buffer: &'b Buffer<T>,
    ) -> Result<RwLockWriteGuard<'b, Vec<T>>> {
        self.accesses += 1;
        match buffer.inner.data.try_write() {
            Ok(g) => Ok(g),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(Error::device(format!(
                "buffer {} is mapped on the host",
                buffer.id()
            ))),
        }
    }

    /// Data-parallel elementwise map `dst[i] = f(src[i])`.
    pub fn parallel_map<S, D, F>(&mut self, src: &Buffer<S>, dst: &Buffer<D>, f: F) -> Result<()>
    where
        S: Element,
        D: Element,
        F: Fn(S) -> D + Send + Sync,
    {
        if src.id() == dst.id() {
            return Err(Error::device(format!(
                "parallel_map source and destination are the same buffer ({})",
                src.id()
            )));
        }
        if src.len() != dst.len() {
            return Err(Error::device(format!(
                "parallel_map length mismatch: {} vs {}",
                src.len(),
                dst.len()
            )));
        }
        let input = self.read(src)?;
        let mut output = self.write(dst)?;
        output
            .par_iter_mut()
            .zip(input.par_iter())
            .for_each(|(d, s)| *d = f(*s));
        Ok(())
    }
}
