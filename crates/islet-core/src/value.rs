use std::any::{type_name, Any};
use std::fmt;
use std::ops::{Index, IndexMut};

use crate::desc::MatrixDescriptor;
use crate::mat::RMat;

/// Up to four f64 channels, the scalar argument type of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scalar(pub [f64; 4]);

impl Scalar {
    /// Scalar with `v` in the first channel and zeros elsewhere.
    pub fn new(v: f64) -> Self {
        Scalar([v, 0.0, 0.0, 0.0])
    }

    /// Scalar with `v` in every channel.
    pub fn all(v: f64) -> Self {
        Scalar([v; 4])
    }
}

impl Index<usize> for Scalar {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.0[i]
    }
}

impl IndexMut<usize> for Scalar {
    fn index_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.0[i]
    }
}

/// Type-erased growable sequence (`Vec<T>` for some `T`).
///
/// An unset reference takes its element type from the first `wref` call.
#[derive(Default)]
pub struct VectorRef {
    data: Option<Box<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl VectorRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec<T: Send + Sync + 'static>(v: Vec<T>) -> Self {
        VectorRef {
            data: Some(Box::new(v)),
            type_name: type_name::<Vec<T>>(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.data.is_some()
    }

    /// Stored type name, or `"unset"`.
    pub fn type_name(&self) -> &'static str {
        if self.data.is_some() {
            self.type_name
        } else {
            "unset"
        }
    }

    pub fn rref<T: 'static>(&self) -> Option<&Vec<T>> {
        self.data.as_ref()?.downcast_ref()
    }

    /// Mutable access, initializing an empty `Vec<T>` if unset.
    /// Returns `None` when the sequence already holds another element type.
    pub fn wref<T: Send + Sync + 'static>(&mut self) -> Option<&mut Vec<T>> {
        if self.data.is_none() {
            *self = Self::from_vec(Vec::<T>::new());
        }
        self.data.as_mut()?.downcast_mut()
    }

    pub(crate) fn payload(&self) -> Option<&dyn Any> {
        self.data.as_deref().map(|d| d as &dyn Any)
    }
}

impl fmt::Debug for VectorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VectorRef<{}>", self.type_name())
    }
}

/// Type-erased single value of an arbitrary type.
#[derive(Default)]
pub struct OpaqueRef {
    data: Option<Box<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl OpaqueRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value<T: Send + Sync + 'static>(v: T) -> Self {
        OpaqueRef {
            data: Some(Box::new(v)),
            type_name: type_name::<T>(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.data.is_some()
    }

    pub fn type_name(&self) -> &'static str {
        if self.data.is_some() {
            self.type_name
        } else {
            "unset"
        }
    }

    pub fn rref<T: 'static>(&self) -> Option<&T> {
        self.data.as_ref()?.downcast_ref()
    }

    /// Mutable access, initializing `T::default()` if unset.
    pub fn wref<T: Default + Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        if self.data.is_none() {
            *self = Self::from_value(T::default());
        }
        self.data.as_mut()?.downcast_mut()
    }

    pub(crate) fn payload(&self) -> Option<&dyn Any> {
        self.data.as_deref().map(|d| d as &dyn Any)
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueRef<{}>", self.type_name())
    }
}

/// A run-time value held by a data node.
#[derive(Debug, Default)]
pub enum Value {
    #[default]
    Empty,
    Mat(RMat),
    Scalar(Scalar),
    Sequence(VectorRef),
    Opaque(OpaqueRef),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Mat(_) => "matrix",
            Value::Scalar(_) => "scalar",
            Value::Sequence(_) => "sequence",
            Value::Opaque(_) => "opaque",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// The payload a typed accessor downcasts: the `RMat`, the `Scalar`, the
    /// sequence's `Vec<T>` or the opaque `T`.
    pub fn payload(&self) -> Option<&dyn Any> {
        match self {
            Value::Empty => None,
            Value::Mat(m) => Some(m as &dyn Any),
            Value::Scalar(s) => Some(s as &dyn Any),
            Value::Sequence(v) => v.payload(),
            Value::Opaque(o) => o.payload(),
        }
    }

    /// Name of the payload type, for error messages.
    pub fn payload_type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Mat(_) => type_name::<RMat>(),
            Value::Scalar(_) => type_name::<Scalar>(),
            Value::Sequence(v) => v.type_name(),
            Value::Opaque(o) => o.type_name(),
        }
    }

    pub fn as_mat(&self) -> Option<&RMat> {
        match self {
            Value::Mat(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&VectorRef> {
        match self {
            Value::Sequence(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&OpaqueRef> {
        match self {
            Value::Opaque(o) => Some(o),
            _ => None,
        }
    }

    /// The metadata describing this value.
    pub fn meta(&self) -> Meta {
        match self {
            Value::Empty => Meta::Empty,
            Value::Mat(m) => Meta::Mat(m.desc()),
            Value::Scalar(_) => Meta::Scalar,
            Value::Sequence(_) => Meta::Sequence,
            Value::Opaque(_) => Meta::Opaque,
        }
    }
}

impl From<RMat> for Value {
    fn from(m: RMat) -> Self {
        Value::Mat(m)
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<VectorRef> for Value {
    fn from(v: VectorRef) -> Self {
        Value::Sequence(v)
    }
}

impl From<OpaqueRef> for Value {
    fn from(o: OpaqueRef) -> Self {
        Value::Opaque(o)
    }
}

/// Expected metadata of a data node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Meta {
    /// Unconstrained.
    #[default]
    Empty,
    Mat(MatrixDescriptor),
    Scalar,
    Sequence,
    Opaque,
}

impl Meta {
    /// Whether `value` satisfies this metadata. `Empty` accepts anything.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value.meta()) {
            (Meta::Empty, _) => true,
            (Meta::Mat(want), Meta::Mat(got)) => want.same_layout(&got),
            (want, got) => *want == got,
        }
    }
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Meta::Empty => write!(f, "empty"),
            Meta::Mat(d) => write!(f, "matrix {d}"),
            Meta::Scalar => write!(f, "scalar"),
            Meta::Sequence => write!(f, "sequence"),
            Meta::Opaque => write!(f, "opaque"),
        }
    }
}
