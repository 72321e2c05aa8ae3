use std::fmt;
use std::sync::Arc;

use crate::dtype::Depth;
use crate::error::{Error, Result};

// Descriptors: the metadata side of a device buffer
//
// A device buffer is described twice:
//
//   BufferDescriptor - what the device knows: element depth, channel count,
//                      2-D extent, planar flag. Derived from the buffer itself.
//   MatrixDescriptor - what the rest of the pipeline reasons about when it
//                      handles a generic matrix.
//
// Translation from the first to the second goes through a caller-supplied
// policy. The policy owns the depth/channel mapping; this module only forwards.

/// Largest channel count a matrix descriptor can carry.
pub const MAX_CHANNELS: usize = 512;

/// 2-D extent in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub fn new(width: usize, height: usize) -> Self {
        Size { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Shape and type of a device buffer, as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub depth: Depth,
    pub chan: usize,
    pub size: Size,
    pub planar: bool,
}

impl BufferDescriptor {
    /// Describe a buffer of element depth `depth` from its range.
    ///
    /// The range must be `[rows, cols, channels]`: two spatial dimensions
    /// followed by the channel dimension. Single-channel buffers are planar.
    ///
    /// Width is taken from `range[1]` and height from `range[0]`, matching the
    /// row-major storage of the buffer, rather than reading width from
    /// `range[0]`.
    pub fn from_range(depth: Depth, dims: &[usize]) -> Result<Self> {
        if dims.len() != 3 {
            return Err(Error::Dimensionality {
                dims: dims.to_vec(),
                reason: format!("expected 3 dimensions (rows, cols, channels), got {}", dims.len()),
            });
        }
        let (rows, cols, chan) = (dims[0], dims[1], dims[2]);
        if chan == 0 || chan > MAX_CHANNELS {
            return Err(Error::Dimensionality {
                dims: dims.to_vec(),
                reason: format!("channel count must be in 1..={MAX_CHANNELS}"),
            });
        }
        if rows == 0 || cols == 0 {
            return Err(Error::Dimensionality {
                dims: dims.to_vec(),
                reason: "spatial extent must be non-empty".to_string(),
            });
        }
        Ok(BufferDescriptor {
            depth,
            chan,
            size: Size::new(cols, rows),
            planar: chan == 1,
        })
    }

    /// Bit depth of one element.
    pub fn bits(&self) -> u32 {
        self.depth.bits()
    }
}

/// Shape and type of a generic matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixDescriptor {
    pub depth: Depth,
    pub chan: usize,
    pub size: Size,
    pub planar: bool,
}

impl MatrixDescriptor {
    pub fn new(depth: Depth, chan: usize, size: Size) -> Self {
        MatrixDescriptor {
            depth,
            chan,
            size,
            planar: false,
        }
    }

    /// Mark the descriptor planar (channels stored as separate planes).
    pub fn as_planar(mut self) -> Self {
        self.planar = true;
        self
    }

    /// Bytes taken by one pixel (all channels).
    pub fn elem_size(&self) -> usize {
        self.depth.size_in_bytes() * self.chan
    }

    /// Bytes taken by one densely packed row.
    pub fn row_bytes(&self) -> usize {
        self.elem_size() * self.size.width
    }

    /// Total number of scalar elements.
    pub fn elem_count(&self) -> usize {
        self.size.area() * self.chan
    }

    /// Equal up to the planar flag of single-channel matrices, where planar
    /// and interleaved storage coincide.
    pub fn same_layout(&self, other: &MatrixDescriptor) -> bool {
        self.depth == other.depth
            && self.chan == other.chan
            && self.size == other.size
            && (self.planar == other.planar || self.chan == 1)
    }

    /// The `[rows, cols, channels]` range of an interleaved device buffer
    /// holding a matrix of this descriptor.
    pub fn to_buffer_range(&self) -> Result<[usize; 3]> {
        if self.planar && self.chan > 1 {
            return Err(Error::msg(format!(
                "planar {}-channel matrices have no interleaved buffer layout",
                self.chan
            )));
        }
        Ok([self.size.height, self.size.width, self.chan])
    }
}

impl fmt::Display for MatrixDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}C{} {}", self.depth, self.chan, self.size)?;
        if self.planar {
            write!(f, " planar")?;
        }
        Ok(())
    }
}

/// Translation from a buffer descriptor to a matrix descriptor.
pub type DescPolicy = Arc<dyn Fn(&BufferDescriptor) -> MatrixDescriptor + Send + Sync>;

/// The field-by-field translation.
pub fn default_desc_policy() -> DescPolicy {
    Arc::new(|desc: &BufferDescriptor| MatrixDescriptor {
        depth: desc.depth,
        chan: desc.chan,
        size: desc.size,
        planar: desc.planar,
    })
}

/// Translate `desc` through `policy`. No validation beyond forwarding.
pub fn to_matrix_desc(desc: &BufferDescriptor, policy: &DescPolicy) -> MatrixDescriptor {
    policy(desc)
}
