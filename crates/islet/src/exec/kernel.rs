use std::fmt;
use std::sync::Arc;

use islet_core::{Error, Result};

use super::context::ExecutionContext;

/// The callback type of a kernel unit.
pub type KernelFn = Arc<dyn Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync>;

/// A named kernel callback, as packaged by the device backend.
///
/// Cloning shares the callback.
#[derive(Clone)]
pub struct KernelUnit {
    name: String,
    f: Option<KernelFn>,
}

impl KernelUnit {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        KernelUnit {
            name: name.into(),
            f: Some(Arc::new(f)),
        }
    }

    /// A unit with no callback. Applying it fails.
    pub fn unset(name: impl Into<String>) -> Self {
        KernelUnit {
            name: name.into(),
            f: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_set(&self) -> bool {
        self.f.is_some()
    }

    /// Invoke the callback on `ctx`.
    pub fn apply(&self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        match &self.f {
            Some(f) => f(ctx),
            None => Err(Error::UnsetKernel(self.name.clone())),
        }
    }
}

impl fmt::Debug for KernelUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelUnit")
            .field("name", &self.name)
            .field("set", &self.f.is_some())
            .finish()
    }
}

/// A kernel declared as a type.
///
/// ```ignore
/// struct AddC;
///
/// impl DeviceKernel for AddC {
///     const NAME: &'static str = "core.addc";
///     fn run(ctx: &mut ExecutionContext<'_>) -> Result<()> { ... }
/// }
///
/// let unit = AddC::kernel();
/// ```
pub trait DeviceKernel: 'static {
    const NAME: &'static str;

    fn run(ctx: &mut ExecutionContext<'_>) -> Result<()>;

    fn kernel() -> KernelUnit
    where
        Self: Sized,
    {
        KernelUnit::new(Self::NAME, Self::run)
    }
}
