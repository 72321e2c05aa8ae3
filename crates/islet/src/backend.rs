// Backends: polymorphic island executables and their registry
//
// A pipeline partitions its graph into islands and hands each island to the
// backend it was assigned to. `IslandBackend` compiles an island into an
// `IslandExecutable`; `BackendRegistry` maps backend names to backends. The
// registry is an ordinary value owned by whoever assembles the pipeline.

use islet_core::{Error, Result};
use islet_device::Device;
use tracing::info;

use crate::config::IslandConfig;
use crate::exec::{
    ExecutionContext, GraphExecutable, InObj, KernelUnit, OutObj, DEVICE_BACKEND_NAME,
};
use crate::graph::{Graph, NodeId};

/// A compiled island, whatever backend it runs on.
pub trait IslandExecutable: Send {
    fn can_reshape(&self) -> bool;

    fn reshape(&mut self, graph: &Graph) -> Result<()>;

    fn run<'a>(&mut self, inputs: &[InObj<'a>], outputs: Vec<OutObj<'a>>) -> Result<()>;
}

impl IslandExecutable for GraphExecutable {
    fn can_reshape(&self) -> bool {
        GraphExecutable::can_reshape(self)
    }

    fn reshape(&mut self, graph: &Graph) -> Result<()> {
        GraphExecutable::reshape(self, graph)
    }

    fn run<'a>(&mut self, inputs: &[InObj<'a>], outputs: Vec<OutObj<'a>>) -> Result<()> {
        GraphExecutable::run(self, inputs, outputs)
    }
}

/// Something that compiles islands.
pub trait IslandBackend: Send + Sync {
    fn name(&self) -> &str;

    fn compile(&self, graph: &Graph, nodes: &[NodeId]) -> Result<Box<dyn IslandExecutable>>;
}

/// The device queue backend.
#[derive(Debug, Clone)]
pub struct DeviceBackend {
    device: Device,
    config: IslandConfig,
}

impl DeviceBackend {
    pub const NAME: &'static str = DEVICE_BACKEND_NAME;

    pub fn new(device: Device) -> Self {
        Self::with_config(device, IslandConfig::default())
    }

    pub fn with_config(device: Device, config: IslandConfig) -> Self {
        DeviceBackend { device, config }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn config(&self) -> &IslandConfig {
        &self.config
    }

    /// Package a callback as a kernel unit of this backend.
    pub fn kernel<F>(name: impl Into<String>, f: F) -> KernelUnit
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        KernelUnit::new(name, f)
    }

    /// Add this backend to `registry`.
    pub fn register(self, registry: &mut BackendRegistry) -> Result<()> {
        registry.register(Box::new(self))
    }
}

impl IslandBackend for DeviceBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn compile(&self, graph: &Graph, nodes: &[NodeId]) -> Result<Box<dyn IslandExecutable>> {
        let exe = GraphExecutable::new(graph, nodes, self.device.clone(), self.config.clone())?;
        Ok(Box::new(exe))
    }
}

/// Backends by name, in registration order.
#[derive(Default)]
pub struct BackendRegistry {
    backends: Vec<Box<dyn IslandBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a backend. Names are unique.
    pub fn register(&mut self, backend: Box<dyn IslandBackend>) -> Result<()> {
        if self.get(backend.name()).is_some() {
            return Err(Error::msg(format!(
                "backend '{}' is already registered",
                backend.name()
            )));
        }
        info!(backend = backend.name(), "registered backend");
        self.backends.push(backend);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn IslandBackend> {
        self.backends
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b.as_ref())
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Compile an island with the backend called `name`.
    pub fn compile(
        &self,
        name: &str,
        graph: &Graph,
        nodes: &[NodeId],
    ) -> Result<Box<dyn IslandExecutable>> {
        let backend = self
            .get(name)
            .ok_or_else(|| Error::msg(format!("no backend named '{name}'")))?;
        backend.compile(graph, nodes)
    }
}
