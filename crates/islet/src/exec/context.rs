use std::any::{type_name, Any};

use islet_core::{Element, Error, RMat, Result, Scalar, Value};
use islet_device::{Buffer, BufferAdapter, Device, Queue};

use crate::graph::ConstArg;

/// A resolved operation argument.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Arg<'a> {
    Value(&'a Value),
    Const(&'a ConstArg),
}

/// Per-step state handed to a kernel callback.
///
/// Inputs are positional and read only. Outputs are the values of the step's
/// output data nodes; whatever a kernel leaves in them is published to the
/// resource table once the callback returns.
pub struct ExecutionContext<'a> {
    op: &'a str,
    device: &'a Device,
    args: Vec<Arg<'a>>,
    results: &'a mut [Value],
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        op: &'a str,
        device: &'a Device,
        args: Vec<Arg<'a>>,
        results: &'a mut [Value],
    ) -> Self {
        ExecutionContext {
            op,
            device,
            args,
            results,
        }
    }

    /// Name of the operation being executed.
    pub fn op_name(&self) -> &str {
        self.op
    }

    pub fn device(&self) -> &Device {
        self.device
    }

    /// The device queue kernels submit their commands to.
    pub fn queue(&self) -> &Queue {
        self.device.queue()
    }

    pub fn num_inputs(&self) -> usize {
        self.args.len()
    }

    pub fn num_outputs(&self) -> usize {
        self.results.len()
    }

    // Inputs

    fn arg(&self, index: usize) -> Result<Arg<'a>> {
        self.args.get(index).copied().ok_or(Error::IndexOutOfRange {
            what: "input",
            index,
            len: self.args.len(),
        })
    }

    /// Input `index` as a `T`.
    ///
    /// Data operands resolve to their payload: the `RMat` of a matrix, the
    /// `Scalar`, the `Vec<E>` of a sequence or the `T` of an opaque value.
    /// Constant operands resolve to the constant.
    pub fn input<T: Any>(&self, index: usize) -> Result<&T> {
        let (payload, found) = match self.arg(index)? {
            Arg::Value(v) => (v.payload(), v.payload_type_name()),
            Arg::Const(c) => (Some(c.value() as &dyn Any), c.type_name()),
        };
        payload
            .and_then(|p| p.downcast_ref::<T>())
            .ok_or_else(|| Error::TypeMismatch {
                what: "input",
                index,
                expected: type_name::<T>().to_string(),
                found: found.to_string(),
            })
    }

    pub fn input_matrix(&self, index: usize) -> Result<&RMat> {
        self.input::<RMat>(index)
    }

    /// The device buffer behind matrix input `index`.
    pub fn input_buffer<T: Element>(&self, index: usize) -> Result<&Buffer<T>> {
        let mat = self.input_matrix(index)?;
        device_buffer(mat, "input", index)
    }

    pub fn input_scalar(&self, index: usize) -> Result<&Scalar> {
        self.input::<Scalar>(index)
    }

    pub fn input_sequence<T: Any>(&self, index: usize) -> Result<&Vec<T>> {
        self.input::<Vec<T>>(index)
    }

    pub fn input_opaque<T: Any>(&self, index: usize) -> Result<&T> {
        self.input::<T>(index)
    }

    // Outputs

    fn result(&mut self, index: usize) -> Result<&mut Value> {
        let len = self.results.len();
        self.results.get_mut(index).ok_or(Error::IndexOutOfRange {
            what: "output",
            index,
            len,
        })
    }

    /// Replace output `index` with `value`.
    pub fn set_output(&mut self, index: usize, value: Value) -> Result<()> {
        *self.result(index)? = value;
        Ok(())
    }

    pub fn output_matrix(&mut self, index: usize) -> Result<&mut RMat> {
        match self.result(index)? {
            Value::Mat(m) => Ok(m),
            other => Err(output_mismatch::<RMat>(index, other)),
        }
    }

    /// The device buffer behind matrix output `index`.
    pub fn output_buffer<T: Element>(&mut self, index: usize) -> Result<&Buffer<T>> {
        let mat = self.output_matrix(index)?;
        device_buffer(mat, "output", index)
    }

    pub fn output_scalar(&mut self, index: usize) -> Result<&mut Scalar> {
        let slot = self.result(index)?;
        if slot.is_empty() {
            *slot = Value::Scalar(Scalar::default());
        }
        match slot {
            Value::Scalar(s) => Ok(s),
            other => Err(output_mismatch::<Scalar>(index, other)),
        }
    }

    /// Output `index` as a `Vec<T>`, created empty on first access.
    pub fn output_sequence<T: Send + Sync + 'static>(&mut self, index: usize) -> Result<&mut Vec<T>> {
        let slot = self.result(index)?;
        if slot.is_empty() {
            *slot = Value::Sequence(Default::default());
        }
        let found = slot.payload_type_name();
        match slot {
            Value::Sequence(v) => v.wref::<T>().ok_or_else(|| Error::TypeMismatch {
                what: "output",
                index,
                expected: type_name::<Vec<T>>().to_string(),
                found: found.to_string(),
            }),
            other => Err(output_mismatch::<Vec<T>>(index, other)),
        }
    }

    /// Output `index` as a `T`, created with `T::default()` on first access.
    pub fn output_opaque<T: Default + Send + Sync + 'static>(
        &mut self,
        index: usize,
    ) -> Result<&mut T> {
        let slot = self.result(index)?;
        if slot.is_empty() {
            *slot = Value::Opaque(Default::default());
        }
        let found = slot.payload_type_name();
        match slot {
            Value::Opaque(o) => o.wref::<T>().ok_or_else(|| Error::TypeMismatch {
                what: "output",
                index,
                expected: type_name::<T>().to_string(),
                found: found.to_string(),
            }),
            other => Err(output_mismatch::<T>(index, other)),
        }
    }
}

fn output_mismatch<T>(index: usize, found: &Value) -> Error {
    Error::TypeMismatch {
        what: "output",
        index,
        expected: type_name::<T>().to_string(),
        found: found.payload_type_name().to_string(),
    }
}

fn device_buffer<'m, T: Element>(
    mat: &'m RMat,
    what: &'static str,
    index: usize,
) -> Result<&'m Buffer<T>> {
    mat.get::<BufferAdapter<T>>()
        .map(|a| a.buffer())
        .ok_or_else(|| Error::TypeMismatch {
            what,
            index,
            expected: format!("device buffer of {}", T::DEPTH),
            found: format!("{:?}", mat),
        })
}
