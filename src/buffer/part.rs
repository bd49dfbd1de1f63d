//! Buffer parts: contiguous segments of the logical offset space.
//!
//! A part is *sparse* while its bytes are not resident (only its source and
//! extent are recorded) and *dense* once a [`MemoryBlock`] slice backs it.
//! Parts tile the buffer's range contiguously: no gaps, no overlaps.
//!
//! Sparse parts are cheap to reshape — enlarging or splitting one only moves
//! offsets, never bytes. Dense parts are never enlarged in place; they are
//! split, and neighbors re-coalesce when they turn out to view adjacent
//! slices of one block.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use eyre::{ensure, Result};

use super::range::ByteRange;
use crate::memory::MemoryBlock;
use crate::source::BufferSource;

/// One contiguous run of a buffer's logical range.
#[derive(Default)]
pub struct BufferPart {
    start: i64,
    len: usize,
    /// Provider of this part's bytes. Weak: the buffer owns the strong
    /// reference, a part must not keep a discarded source alive.
    source: Option<Weak<RefCell<BufferSource>>>,
    /// Source offset corresponding to `start`.
    source_offset: i64,
    block_offset: usize,
    block: Option<MemoryBlock>,
}

impl BufferPart {
    /// New sparse part covering `range`, pulling from `source` at
    /// `source_offset` when materialized.
    pub(crate) fn sparse(
        range: ByteRange,
        source: Option<Weak<RefCell<BufferSource>>>,
        source_offset: i64,
    ) -> Self {
        debug_assert!(!range.is_empty(), "sparse part over empty range {range}");
        Self {
            start: range.start,
            len: range.len(),
            source,
            source_offset,
            block_offset: 0,
            block: None,
        }
    }

    /// New dense part viewing `len` bytes of `block` at `block_offset`.
    pub(crate) fn dense(start: i64, len: usize, block: MemoryBlock, block_offset: usize) -> Self {
        debug_assert!(len > 0);
        debug_assert!(block_offset + len <= block.len());
        Self {
            start,
            len,
            source: None,
            source_offset: 0,
            block_offset,
            block: Some(block),
        }
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> i64 {
        self.start + self.len as i64
    }

    pub fn range(&self) -> ByteRange {
        ByteRange::with_len(self.start, self.len)
    }

    pub fn is_sparse(&self) -> bool {
        self.block.is_none()
    }

    pub(crate) fn block(&self) -> Option<&MemoryBlock> {
        self.block.as_ref()
    }

    pub(crate) fn block_offset(&self) -> usize {
        self.block_offset
    }

    pub(crate) fn source(&self) -> Option<Rc<RefCell<BufferSource>>> {
        self.source.as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Source range this part's extent maps to.
    pub(crate) fn source_range(&self) -> ByteRange {
        ByteRange::with_len(self.source_offset, self.len)
    }

    /// Grows a sparse part in place. Constant time: only the advertised
    /// extent moves, no bytes exist yet.
    pub(crate) fn enlarge(&mut self, at_start: usize, at_end: usize) -> Result<()> {
        ensure!(
            self.is_sparse(),
            "dense part {} cannot be enlarged in place, split it instead",
            self.range()
        );
        self.start -= at_start as i64;
        self.source_offset -= at_start as i64;
        self.len += at_start + at_end;
        Ok(())
    }

    /// Splits off the tail `[at, end)` as a new part, keeping `[start, at)`.
    /// Works for both sparse and dense parts; neither variant copies bytes.
    pub(crate) fn split_off(&mut self, at: i64) -> Result<BufferPart> {
        ensure!(
            self.start < at && at < self.end(),
            "split offset {at} not interior to part {}",
            self.range()
        );
        let head_len = (at - self.start) as usize;
        let tail_len = self.len - head_len;
        let tail = Self {
            start: at,
            len: tail_len,
            source: self.source.clone(),
            source_offset: self.source_offset + head_len as i64,
            block_offset: self.block_offset + head_len,
            block: self.block.clone(),
        };
        self.len = head_len;
        Ok(tail)
    }

    /// Attaches materialized storage, turning the part dense.
    pub(crate) fn attach_block(&mut self, block: MemoryBlock, block_offset: usize) -> Result<()> {
        ensure!(
            self.is_sparse(),
            "part {} is already materialized",
            self.range()
        );
        ensure!(
            block_offset + self.len <= block.len(),
            "block of {} bytes too small for part {} at offset {block_offset}",
            block.len(),
            self.range()
        );
        self.block_offset = block_offset;
        self.block = Some(block);
        Ok(())
    }

    /// Copies bytes out of the part. `part_offset` is relative to `start`.
    pub(crate) fn read(&self, part_offset: usize, dst: &mut [u8]) -> Result<()> {
        let block = self.dense_block(part_offset, dst.len())?;
        block.read(self.block_offset + part_offset, dst)
    }

    /// Copies bytes into the part. `part_offset` is relative to `start`.
    pub(crate) fn write(&self, part_offset: usize, src: &[u8]) -> Result<()> {
        let block = self.dense_block(part_offset, src.len())?;
        block.write(self.block_offset + part_offset, src)
    }

    fn dense_block(&self, part_offset: usize, access_len: usize) -> Result<&MemoryBlock> {
        ensure!(
            part_offset + access_len <= self.len,
            "access [{part_offset}, {part_offset}+{access_len}) past part of {} bytes",
            self.len
        );
        match &self.block {
            Some(block) => Ok(block),
            None => eyre::bail!("sparse part {} accessed without preparation", self.range()),
        }
    }

    /// True when `next` is an adjacent view of the same backing: dense parts
    /// over contiguous slices of one block, or sparse parts over contiguous
    /// ranges of one source.
    pub(crate) fn mergeable_with(&self, next: &BufferPart) -> bool {
        if self.end() != next.start {
            return false;
        }
        match (&self.block, &next.block) {
            (Some(a), Some(b)) => {
                a.ptr_eq(b) && self.block_offset + self.len == next.block_offset
            }
            (None, None) => {
                let same_source = match (&self.source, &next.source) {
                    (Some(a), Some(b)) => Weak::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
                same_source && self.source_offset + self.len as i64 == next.source_offset
            }
            _ => false,
        }
    }

    /// Absorbs a mergeable `next` part; see [`BufferPart::mergeable_with`].
    pub(crate) fn try_absorb(&mut self, next: &BufferPart) -> bool {
        let mergeable = self.mergeable_with(next);
        if mergeable {
            self.len += next.len;
        }
        mergeable
    }
}

impl std::fmt::Debug for BufferPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPart")
            .field("range", &self.range())
            .field("sparse", &self.is_sparse())
            .field("source_offset", &self.source_offset)
            .field("block_offset", &self.block_offset)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BlockPool;

    fn sparse_part(start: i64, len: usize) -> BufferPart {
        BufferPart::sparse(ByteRange::with_len(start, len), None, start)
    }

    #[test]
    fn sparse_until_block_attached() {
        let pool = BlockPool::new();
        let mut part = sparse_part(0, 16);
        assert!(part.is_sparse());
        assert!(part.read(0, &mut [0u8; 1]).is_err());

        let block = MemoryBlock::new(&pool, 16).unwrap();
        part.attach_block(block, 0).unwrap();
        assert!(!part.is_sparse());
        part.write(3, &[7]).unwrap();

        let mut out = [0u8; 1];
        part.read(3, &mut out).unwrap();
        assert_eq!(out[0], 7);
    }

    #[test]
    fn attach_twice_is_an_error() {
        let pool = BlockPool::new();
        let mut part = sparse_part(0, 8);
        part.attach_block(MemoryBlock::new(&pool, 8).unwrap(), 0).unwrap();
        assert!(part
            .attach_block(MemoryBlock::new(&pool, 8).unwrap(), 0)
            .is_err());
    }

    #[test]
    fn enlarge_moves_extent_and_source_offset() {
        let mut part = sparse_part(32, 16);
        part.enlarge(16, 8).unwrap();
        assert_eq!(part.range(), ByteRange::new(16, 56));
        assert_eq!(part.source_range().start, 16);
    }

    #[test]
    fn enlarge_dense_is_an_error() {
        let pool = BlockPool::new();
        let mut part = sparse_part(0, 8);
        part.attach_block(MemoryBlock::new(&pool, 8).unwrap(), 0).unwrap();
        assert!(part.enlarge(8, 0).is_err());
    }

    #[test]
    fn split_sparse_keeps_source_mapping() {
        let mut part = BufferPart::sparse(ByteRange::new(0, 32), None, 100);
        let tail = part.split_off(12).unwrap();

        assert_eq!(part.range(), ByteRange::new(0, 12));
        assert_eq!(tail.range(), ByteRange::new(12, 32));
        assert_eq!(part.source_range().start, 100);
        assert_eq!(tail.source_range().start, 112);
        assert!(tail.is_sparse());
    }

    #[test]
    fn split_dense_shares_the_block() {
        let pool = BlockPool::new();
        let block = MemoryBlock::new(&pool, 16).unwrap();
        block.write(0, &(0u8..16).collect::<Vec<_>>()).unwrap();

        let mut part = BufferPart::dense(0, 16, block, 0);
        let tail = part.split_off(10).unwrap();

        let mut out = [0u8; 2];
        tail.read(0, &mut out).unwrap();
        assert_eq!(out, [10, 11]);

        // Both halves view one block: the pair re-coalesces.
        assert!(part.try_absorb(&tail));
        assert_eq!(part.range(), ByteRange::new(0, 16));
    }

    #[test]
    fn split_at_boundary_is_an_error() {
        let mut part = sparse_part(0, 8);
        assert!(part.split_off(0).is_err());
        assert!(part.split_off(8).is_err());
    }

    #[test]
    fn absorb_rejects_different_blocks() {
        let pool = BlockPool::new();
        let mut a = BufferPart::dense(0, 8, MemoryBlock::new(&pool, 8).unwrap(), 0);
        let b = BufferPart::dense(8, 8, MemoryBlock::new(&pool, 8).unwrap(), 0);
        assert!(!a.try_absorb(&b));
    }

    #[test]
    fn absorb_sparse_requires_contiguous_source_range() {
        let mut a = BufferPart::sparse(ByteRange::new(0, 16), None, 0);
        let b = BufferPart::sparse(ByteRange::new(16, 32), None, 16);
        assert!(a.try_absorb(&b));
        assert_eq!(a.range(), ByteRange::new(0, 32));

        let mut c = BufferPart::sparse(ByteRange::new(32, 40), None, 0);
        let d = BufferPart::sparse(ByteRange::new(40, 48), None, 99);
        assert!(!c.try_absorb(&d), "source offsets not contiguous");
    }
}
