//! Reference-counted byte storage for materialized parts.

use std::cell::RefCell;
use std::rc::Rc;

use eyre::{ensure, Result};

use super::BlockPool;

/// Runs over the block's bytes exactly once, when the last reference drops.
pub type BlockDestructor = Box<dyn FnOnce(&mut [u8])>;

/// A shared, fixed-size run of bytes backing one or more dense parts.
///
/// Blocks are `Rc`-counted and `!Send + !Sync`; sharing a block between
/// threads requires external synchronization the engine deliberately does
/// not provide. All access is bounds-checked and copy-based, so a stale
/// offset surfaces as an `Err` instead of undefined behavior.
pub struct MemoryBlock {
    inner: Rc<RefCell<Storage>>,
}

struct Storage {
    bytes: Box<[u8]>,
    release: Release,
}

enum Release {
    /// Storage is freed normally.
    Plain,
    /// Storage returns to its pool's size class.
    Pool(BlockPool),
    /// A caller-supplied destructor runs over the bytes first.
    Destructor(Option<BlockDestructor>),
}

impl Drop for Storage {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.bytes);
        match &mut self.release {
            Release::Plain => {}
            Release::Pool(pool) => pool.release_storage(bytes),
            Release::Destructor(dtor) => {
                if let Some(dtor) = dtor.take() {
                    dtor(&mut bytes);
                }
            }
        }
    }
}

impl MemoryBlock {
    /// Allocates `len` zeroed bytes through `pool`. The storage returns to
    /// the pool when the last reference drops.
    pub fn new(pool: &BlockPool, len: usize) -> Result<Self> {
        ensure!(len > 0, "memory block must not be empty");
        Ok(Self::wrap(pool.acquire_storage(len), Release::Pool(pool.clone())))
    }

    /// Wraps caller-provided bytes; they are freed normally on last release.
    pub fn from_vec(bytes: Vec<u8>) -> Result<Self> {
        ensure!(!bytes.is_empty(), "memory block must not be empty");
        Ok(Self::wrap(bytes.into_boxed_slice(), Release::Plain))
    }

    /// Wraps caller-provided bytes and runs `dtor` over them exactly once
    /// when the last reference drops.
    pub fn with_destructor(bytes: Vec<u8>, dtor: BlockDestructor) -> Result<Self> {
        ensure!(!bytes.is_empty(), "memory block must not be empty");
        Ok(Self::wrap(
            bytes.into_boxed_slice(),
            Release::Destructor(Some(dtor)),
        ))
    }

    fn wrap(bytes: Box<[u8]>, release: Release) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Storage { bytes, release })),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `dst.len()` bytes out of the block starting at `offset`.
    pub fn read(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let storage = self.inner.borrow();
        Self::check_span(storage.bytes.len(), offset, dst.len())?;
        dst.copy_from_slice(&storage.bytes[offset..offset + dst.len()]);
        Ok(())
    }

    /// Copies `src` into the block starting at `offset`.
    pub fn write(&self, offset: usize, src: &[u8]) -> Result<()> {
        let mut storage = self.inner.borrow_mut();
        Self::check_span(storage.bytes.len(), offset, src.len())?;
        storage.bytes[offset..offset + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Hands `len` bytes starting at `offset` to `f` for in-place filling.
    /// Used by materialization to route a source fill into the block.
    pub fn fill_via(
        &self,
        offset: usize,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> Result<()>,
    ) -> Result<()> {
        let mut storage = self.inner.borrow_mut();
        Self::check_span(storage.bytes.len(), offset, len)?;
        f(&mut storage.bytes[offset..offset + len])
    }

    fn check_span(block_len: usize, offset: usize, len: usize) -> Result<()> {
        ensure!(
            offset.checked_add(len).is_some_and(|end| end <= block_len),
            "block access out of bounds: [{offset}, {offset}+{len}) in block of {block_len}",
        );
        Ok(())
    }

    /// Number of live references to this block's storage.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// True when `self` and `other` share the same storage.
    pub fn ptr_eq(&self, other: &MemoryBlock) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for MemoryBlock {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for MemoryBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBlock")
            .field("len", &self.len())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
