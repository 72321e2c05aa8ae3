// Buffer Pool: caching allocator for device buffer storage
//
// Keeps per-type, per-size free lists of storage taken back from released
// buffers, so an executable running the same graph again allocates nothing.
//
// When a buffer is reclaimed its storage is not freed; it is cached under
// (element depth, element count). A later allocation of the same depth and
// count reuses it. Reused storage keeps its old contents unless the caller
// asks for zeroed memory.
//
// Usage (through Device helpers):
//
//   let buf = Buffer::<u8>::zeros(&device, &[480, 640, 3])?;   // from pool
//   device.reclaim(buf);                                      // return
//   let stats = device.pool_stats();                          // query
//   device.empty_cache();                                     // release

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use islet_core::{Depth, Element};
use tracing::trace;

use crate::queue::lock;

// Pool statistics

/// Snapshot of the pool's allocation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Total bytes currently held in the cache (not in use by buffers).
    pub cached_bytes: usize,
    /// Number of individual buffers currently in the cache.
    pub cached_buffers: usize,
    /// Cumulative cache hits (allocations served from the cache).
    pub hits: u64,
    /// Cumulative cache misses (allocations that fell through to the allocator).
    pub misses: u64,
}

type Storage = Box<dyn Any + Send + Sync>;

/// A device storage caching allocator.
///
/// Free lists are keyed by element depth and element count, so a `Vec<T>`
/// popped from a list is always a `Vec<T>` of the requested length.
pub struct BufferPool {
    buckets: Mutex<HashMap<(Depth, usize), Vec<Storage>>>,

    // Atomic counters, no lock contention on the hot path
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BufferPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        BufferPool {
            buckets: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn try_pop<T: Element>(&self, n: usize) -> Option<Vec<T>> {
        let mut map = lock(&self.buckets);
        let storage = map.get_mut(&(T::DEPTH, n))?.pop()?;
        storage.downcast::<Vec<T>>().ok().map(|b| *b)
    }

    /// Allocate `n` elements, reusing cached storage if available.
    /// The content of reused storage is **unspecified** (not zeroed).
    pub fn alloc<T: Element>(&self, n: usize) -> Vec<T> {
        if let Some(buf) = self.try_pop(n) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            buf
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            vec![T::zero(); n]
        }
    }

    /// Allocate `n` zeroed elements.
    pub fn alloc_zeros<T: Element>(&self, n: usize) -> Vec<T> {
        if let Some(mut buf) = self.try_pop::<T>(n) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            buf.fill(T::zero());
            buf
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            vec![T::zero(); n]
        }
    }

    // Reclaim (return storage to pool)

    pub fn reclaim<T: Element>(&self, storage: Vec<T>) {
        let key = (T::DEPTH, storage.len());
        trace!(depth = %key.0, len = key.1, "storage returned to pool");
        lock(&self.buckets)
            .entry(key)
            .or_default()
            .push(Box::new(storage));
    }

    // Cache management

    /// Release all cached storage.
    pub fn empty_cache(&self) {
        lock(&self.buckets).clear();
    }

    /// Return a snapshot of pool statistics.
    pub fn stats(&self) -> PoolStats {
        let map = lock(&self.buckets);
        let mut cached_buffers = 0usize;
        let mut cached_bytes = 0usize;
        for ((depth, n), stack) in map.iter() {
            cached_buffers += stack.len();
            cached_bytes += n * depth.size_in_bytes() * stack.len();
        }
        PoolStats {
            cached_bytes,
            cached_buffers,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Reset hit/miss counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_same_depth_and_len() {
        let pool = BufferPool::new();
        let a: Vec<u8> = pool.alloc(16);
        assert_eq!(pool.stats().misses, 1);
        pool.reclaim(a);
        assert_eq!(pool.stats().cached_buffers, 1);
        assert_eq!(pool.stats().cached_bytes, 16);

        // Same byte size, different depth: miss.
        let b: Vec<i8> = pool.alloc(16);
        assert_eq!(pool.stats().misses, 2);
        drop(b);

        let c: Vec<u8> = pool.alloc(16);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().cached_buffers, 0);
        drop(c);
    }

    #[test]
    fn test_alloc_zeros_clears_reused_storage() {
        let pool = BufferPool::new();
        pool.reclaim(vec![7.5f32; 4]);
        let v: Vec<f32> = pool.alloc_zeros(4);
        assert_eq!(v, vec![0.0; 4]);
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn test_empty_cache() {
        let pool = BufferPool::new();
        pool.reclaim(vec![1i32; 8]);
        pool.reclaim(vec![1f64; 2]);
        assert_eq!(pool.stats().cached_bytes, 32 + 16);
        pool.empty_cache();
        assert_eq!(pool.stats().cached_buffers, 0);
        pool.reset_stats();
        assert_eq!(pool.stats(), PoolStats::default());
    }
}
