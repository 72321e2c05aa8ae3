use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use islet_core::{Element, Result};
use tracing::{debug, info, warn};

use crate::buffer::{AnyBuffer, Buffer};
use crate::pool::{BufferPool, PoolStats};
use crate::queue::{lock, Queue};

/// Configuration for a [`Device`].
///
/// ```ignore
/// let device = Device::new(DeviceConfig::default().with_name("cam0").with_pool(false))?;
/// ```
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Device name, also used to name the queue worker thread.
    pub name: String,
    /// Cache released buffers for reuse.
    pub pool: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            name: "islet-cpu0".to_string(),
            pool: true,
        }
    }
}

impl DeviceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_pool(mut self, enabled: bool) -> Self {
        self.pool = enabled;
        self
    }
}

struct DeviceInner {
    config: DeviceConfig,
    queue: Queue,
    pool: BufferPool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        self.queue.shutdown();
        if let Some(handle) = lock(&self.worker).take() {
            // The last handle can be released by a command running on the
            // worker itself; joining there would never return.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        debug!(device = %self.config.name, "device released");
    }
}

/// An accelerator owning exactly one in-order queue and a buffer pool.
///
/// Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(config: DeviceConfig) -> Result<Self> {
        let (queue, worker) = Queue::spawn(&config.name)?;
        info!(device = %config.name, pool = config.pool, "device created");
        Ok(Device {
            inner: Arc::new(DeviceInner {
                config,
                queue,
                pool: BufferPool::new(),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    /// A device with the default configuration.
    pub fn default_device() -> Result<Self> {
        Self::new(DeviceConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &Queue {
        &self.inner.queue
    }

    /// Block until the queue is idle. See [`Queue::wait`].
    pub fn wait(&self) -> Result<()> {
        self.inner.queue.wait()
    }

    pub fn same_device(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // Pool helpers

    pub(crate) fn alloc<T: Element>(&self, n: usize, zeroed: bool) -> Vec<T> {
        if !self.inner.config.pool {
            return vec![T::zero(); n];
        }
        if zeroed {
            self.inner.pool.alloc_zeros(n)
        } else {
            self.inner.pool.alloc(n)
        }
    }

    /// Return a buffer's storage to the pool.
    ///
    /// Only a buffer with no other live handle can be reclaimed; returns
    /// whether the storage was cached.
    pub fn reclaim<T: Element>(&self, buffer: Buffer<T>) -> bool {
        if !self.inner.config.pool {
            return false;
        }
        let id = buffer.id();
        match buffer.into_storage() {
            Ok(data) => {
                self.inner.pool.reclaim(data);
                true
            }
            Err(_) => {
                warn!(device = %self.name(), buffer = id, "buffer still shared, not pooled");
                false
            }
        }
    }

    pub fn reclaim_any(&self, buffer: AnyBuffer) -> bool {
        crate::with_any_buffer!(buffer, b => self.reclaim(b))
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.inner.pool.stats()
    }

    /// Release all cached buffers.
    pub fn empty_cache(&self) {
        self.inner.pool.empty_cache();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.config.name)
            .field("queue", &self.inner.queue)
            .finish()
    }
}
