//! Size-classed recycling pool for block storage.
//!
//! Released storage is binned by exact byte length. Almost every block in a
//! buffer is exactly one part long, so each buffer family converges on a
//! single hot bin; odd sizes only appear at the extremities of fixed-range
//! buffers. Bins are capped at `retain` entries, excess storage is freed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::config::DEFAULT_POOL_RETAIN;

/// A pool of reusable block storage, binned by size class.
///
/// Cloning yields a handle to the same pool. The pool is an explicit context
/// object: buffers hold a handle and route every block allocation and release
/// through it, rather than a process-wide singleton.
pub struct BlockPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    bins: Mutex<HashMap<usize, Vec<Box<[u8]>>>>,
    retain: usize,
    /// Number of acquisitions served from a bin instead of the heap.
    recycled: AtomicUsize,
}

impl BlockPool {
    pub fn new() -> Self {
        Self::with_retain(DEFAULT_POOL_RETAIN)
    }

    /// Pool retaining at most `retain` released blocks per size class.
    pub fn with_retain(retain: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                bins: Mutex::new(HashMap::new()),
                retain,
                recycled: AtomicUsize::new(0),
            }),
        }
    }

    /// Hands out zeroed storage of exactly `len` bytes, reusing a pooled
    /// box when the size class has one.
    pub(crate) fn acquire_storage(&self, len: usize) -> Box<[u8]> {
        let pooled = self.inner.bins.lock().get_mut(&len).and_then(Vec::pop);
        match pooled {
            Some(mut storage) => {
                self.inner.recycled.fetch_add(1, Ordering::Relaxed);
                storage.fill(0);
                storage
            }
            None => vec![0u8; len].into_boxed_slice(),
        }
    }

    /// Returns storage to its size class, or drops it when the bin is full.
    pub(crate) fn release_storage(&self, storage: Box<[u8]>) {
        if storage.is_empty() {
            return;
        }
        let mut bins = self.inner.bins.lock();
        let bin = bins.entry(storage.len()).or_default();
        if bin.len() < self.inner.retain {
            bin.push(storage);
        }
    }

    /// Total pooled blocks across all size classes.
    pub fn available(&self) -> usize {
        self.inner.bins.lock().values().map(Vec::len).sum()
    }

    /// Acquisitions served from the pool since creation.
    pub fn recycled(&self) -> usize {
        self.inner.recycled.load(Ordering::Relaxed)
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for BlockPool {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for BlockPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockPool")
            .field("available", &self.available())
            .field("recycled", &self.recycled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_from_empty_pool_allocates_zeroed() {
        let pool = BlockPool::new();
        let storage = pool.acquire_storage(64);
        assert_eq!(storage.len(), 64);
        assert!(storage.iter().all(|&b| b == 0));
        assert_eq!(pool.recycled(), 0);
    }

    #[test]
    fn release_and_reacquire_recycles() {
        let pool = BlockPool::new();
        let mut storage = pool.acquire_storage(128);
        storage.fill(0xAB);
        pool.release_storage(storage);
        assert_eq!(pool.available(), 1);

        let again = pool.acquire_storage(128);
        assert_eq!(pool.recycled(), 1);
        assert!(again.iter().all(|&b| b == 0), "recycled storage re-zeroed");
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn size_classes_are_exact() {
        let pool = BlockPool::new();
        pool.release_storage(vec![0u8; 100].into_boxed_slice());

        let other = pool.acquire_storage(99);
        assert_eq!(other.len(), 99);
        assert_eq!(pool.recycled(), 0, "99-byte request must not hit 100-byte bin");
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn retain_caps_each_bin() {
        let pool = BlockPool::with_retain(2);
        for _ in 0..4 {
            pool.release_storage(vec![0u8; 32].into_boxed_slice());
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn clone_shares_bins() {
        let a = BlockPool::new();
        let b = a.clone();
        a.release_storage(vec![0u8; 16].into_boxed_slice());
        assert_eq!(b.available(), 1);
    }
}
