use std::fmt;

use num_traits::{Bounded, NumCast, ToPrimitive, Zero};

// Depth: element types a device buffer or a matrix view can hold
//
//   U8  / S8  - 8-bit unsigned / signed, image data and masks
//   U16 / S16 - 16-bit integers, depth maps and raw sensor data
//   S32       - 32-bit signed integer, labels and accumulators
//   F32 / F64 - IEEE floats
//
// The set is closed. A Rust type is a device element if and only if it
// implements `Element`, and `Element` is implemented for exactly the seven
// primitive types below, so the element type -> matrix depth mapping is a
// total function checked at compile time.

/// Matrix element depth, the runtime tag of an [`Element`] type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Depth {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
    F64,
}

impl Depth {
    /// Every supported depth, in tag order.
    pub const ALL: [Depth; 7] = [
        Depth::U8,
        Depth::S8,
        Depth::U16,
        Depth::S16,
        Depth::S32,
        Depth::F32,
        Depth::F64,
    ];

    /// Size of one element in bytes.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            Depth::U8 | Depth::S8 => 1,
            Depth::U16 | Depth::S16 => 2,
            Depth::S32 | Depth::F32 => 4,
            Depth::F64 => 8,
        }
    }

    /// Size of one element in bits.
    pub fn bits(&self) -> u32 {
        (self.size_in_bytes() * 8) as u32
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Depth::F32 | Depth::F64)
    }

    pub fn is_signed(&self) -> bool {
        !matches!(self, Depth::U8 | Depth::U16)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Depth::U8 => "8u",
            Depth::S8 => "8s",
            Depth::U16 => "16u",
            Depth::S16 => "16s",
            Depth::S32 => "32s",
            Depth::F32 => "32f",
            Depth::F64 => "64f",
        };
        write!(f, "{}", s)
    }
}

/// Trait implemented by the Rust types a device buffer can store.
///
/// `Pod` lets a mapped region be viewed as raw bytes and back without
/// copying; the numeric bounds give saturating conversions from `f64`.
pub trait Element:
    bytemuck::Pod + NumCast + Bounded + Zero + PartialEq + Send + Sync + fmt::Debug + 'static
{
    /// The matrix depth this type maps to.
    const DEPTH: Depth;

    /// Widen to f64 (lossless for every supported type).
    fn as_f64(self) -> f64 {
        ToPrimitive::to_f64(&self).unwrap_or(0.0)
    }

    /// Saturating conversion from f64. Integers round to nearest, NaN maps to zero.
    fn saturate_from(v: f64) -> Self {
        if v.is_nan() {
            return Self::zero();
        }
        let v = if Self::DEPTH.is_float() { v } else { v.round() };
        <Self as NumCast>::from(v).unwrap_or_else(|| {
            if v < 0.0 {
                Self::min_value()
            } else {
                Self::max_value()
            }
        })
    }
}

macro_rules! impl_element {
    ($($t:ty => $depth:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DEPTH: Depth = Depth::$depth;
            }
        )*
    };
}

impl_element! {
    u8 => U8,
    i8 => S8,
    u16 => U16,
    i16 => S16,
    i32 => S32,
    f32 => F32,
    f64 => F64,
}

/// Dispatch on a runtime [`Depth`], binding the matching element type.
///
/// ```ignore
/// let bytes = with_element!(depth, T => std::mem::size_of::<T>());
/// ```
#[macro_export]
macro_rules! with_element {
    ($depth:expr, $t:ident => $body:expr) => {
        match $depth {
            $crate::Depth::U8 => {
                type $t = u8;
                $body
            }
            $crate::Depth::S8 => {
                type $t = i8;
                $body
            }
            $crate::Depth::U16 => {
                type $t = u16;
                $body
            }
            $crate::Depth::S16 => {
                type $t = i16;
                $body
            }
            $crate::Depth::S32 => {
                type $t = i32;
                $body
            }
            $crate::Depth::F32 => {
                type $t = f32;
                $body
            }
            $crate::Depth::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}
