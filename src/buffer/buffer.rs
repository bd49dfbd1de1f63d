//! The buffer: a lazily-paged logical byte range.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::rc::Rc;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use super::cursor::Cursor;
use super::part::BufferPart;
use super::range::{align_down, align_range, ByteRange};
use super::{Endianness, NewlineEncoding};
use crate::config::DEFAULT_PART_SIZE;
use crate::memory::{BlockPool, MemoryBlock};
use crate::source::BufferSource;
use crate::tree::{ChildView, InsertOrder, LeafId, Tree, TreeConfig};

/// Per-subtree byte accounting maintained by the part tree.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct PartAggregate {
    /// Logical bytes covered by the subtree's parts.
    pub total_bytes: u64,
    /// Bytes already materialized into blocks.
    pub dense_bytes: u64,
}

pub(crate) struct PartCfg;

impl TreeConfig for PartCfg {
    type Key = i64;
    type Leaf = BufferPart;
    type Node = PartAggregate;

    fn compare(&self, key: &i64, pivot: &i64) -> Ordering {
        key.cmp(pivot)
    }

    fn leaf_key(&self, leaf: &BufferPart) -> i64 {
        leaf.start()
    }

    fn combine(
        &self,
        left: ChildView<'_, Self>,
        right: ChildView<'_, Self>,
    ) -> PartAggregate {
        let mut agg = PartAggregate::default();
        for child in [left, right] {
            match child {
                ChildView::Leaf(part) => {
                    agg.total_bytes += part.len() as u64;
                    if !part.is_sparse() {
                        agg.dense_bytes += part.len() as u64;
                    }
                }
                ChildView::Node(n) => {
                    agg.total_bytes += n.total_bytes;
                    agg.dense_bytes += n.dense_bytes;
                }
            }
        }
        agg
    }
}

/// A logical byte range tiled by sparse and dense parts.
///
/// Elastic buffers grow their range silently (to part boundaries) on
/// out-of-range access; range-fixed buffers refuse it. See the module docs
/// for the paging model.
pub struct Buffer {
    tree: Tree<PartCfg>,
    range: ByteRange,
    range_fixed: bool,
    part_size: usize,
    endianness: Endianness,
    newline: NewlineEncoding,
    source: Option<Rc<RefCell<BufferSource>>>,
    /// Buffer offset at which source offset 0 lies.
    source_origin: i64,
    pool: BlockPool,
    /// Open-cursor registry, shared with every cursor.
    cursors: Rc<Cell<usize>>,
}

impl Buffer {
    /// Elastic buffer with default part size, endianness and pool.
    pub fn new() -> Self {
        Self {
            tree: Tree::new(PartCfg),
            range: ByteRange::default(),
            range_fixed: false,
            part_size: DEFAULT_PART_SIZE,
            endianness: Endianness::default(),
            newline: NewlineEncoding::default(),
            source: None,
            source_origin: 0,
            pool: BlockPool::new(),
            cursors: Rc::new(Cell::new(0)),
        }
    }

    pub fn builder() -> BufferBuilder {
        BufferBuilder::default()
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn is_range_fixed(&self) -> bool {
        self.range_fixed
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn newline_encoding(&self) -> NewlineEncoding {
        self.newline
    }

    pub fn set_newline_encoding(&mut self, newline: NewlineEncoding) {
        self.newline = newline;
    }

    /// Number of parts currently tiling the range.
    pub fn part_count(&self) -> usize {
        self.tree.len()
    }

    /// Parts in ascending start order.
    pub fn parts(&self) -> impl Iterator<Item = &BufferPart> {
        self.tree.iter().map(|(_, part)| part)
    }

    /// Materialized bytes, read from the tree's aggregates.
    pub fn dense_bytes(&self) -> u64 {
        match self.tree.root_aggregate() {
            Some(agg) => agg.dense_bytes,
            // At most one leaf: no internal node caches an aggregate.
            None => self
                .parts()
                .filter(|p| !p.is_sparse())
                .map(|p| p.len() as u64)
                .sum(),
        }
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.get()
    }

    /// Drops all parts. Fails while any cursor is open; a range-fixed buffer
    /// reverts to one sparse part covering its range.
    pub fn clear(&mut self) -> Result<()> {
        ensure!(
            self.cursors.get() == 0,
            "buffer cleared while {} cursor(s) remain open",
            self.cursors.get()
        );
        self.tree.clear();
        if self.range_fixed {
            self.seed_fixed_range();
        } else {
            self.range = ByteRange::default();
        }
        Ok(())
    }

    fn seed_fixed_range(&mut self) {
        if !self.range.is_empty() {
            let part = self.new_sparse_part(self.range);
            self.tree.insert_initial(part);
        }
    }

    fn new_sparse_part(&self, range: ByteRange) -> BufferPart {
        let source = self.source.as_ref().map(Rc::downgrade);
        BufferPart::sparse(range, source, range.start - self.source_origin)
    }

    // ---- coverage and materialization ----------------------------------

    /// Grows the range (elastic buffers, to part boundaries) so that
    /// `range` is covered by sparse or dense parts.
    fn ensure_covered(&mut self, range: ByteRange) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        if self.range_fixed {
            ensure!(
                self.range.contains_range(range),
                "access {range} outside fixed range {}",
                self.range
            );
            return Ok(());
        }

        let target = align_range(range, self.part_size);
        if self.tree.is_empty() {
            let part = self.new_sparse_part(target);
            self.tree.insert_initial(part);
            self.range = target;
            return Ok(());
        }

        if target.start < self.range.start {
            let grow = (self.range.start - target.start) as usize;
            let first = match self.tree.first() {
                Some(first) => first,
                None => bail!("non-empty range {} with no parts", self.range),
            };
            if self.tree.leaf(first).is_sparse() {
                // The minimum leaf is the one leaf whose key may move.
                self.tree.leaf_mut(first).enlarge(grow, 0)?;
                self.tree.bubble_update(first);
            } else {
                let span = ByteRange::new(target.start, self.range.start);
                let part = self.new_sparse_part(span);
                self.tree.insert_at(first, part, InsertOrder::Before);
            }
            self.range.start = target.start;
        }

        if target.end > self.range.end {
            let grow = (target.end - self.range.end) as usize;
            let last = match self.tree.last() {
                Some(last) => last,
                None => bail!("non-empty range {} with no parts", self.range),
            };
            if self.tree.leaf(last).is_sparse() {
                self.tree.leaf_mut(last).enlarge(0, grow)?;
                self.tree.bubble_update(last);
            } else {
                let span = ByteRange::new(self.range.end, target.end);
                let part = self.new_sparse_part(span);
                self.tree.insert_at(last, part, InsertOrder::After);
            }
            self.range.end = target.end;
        }
        Ok(())
    }

    /// Resolves `range` into dense parts: covers it, cuts sparse parts at
    /// the part grid, materializes each cut chunk and re-coalesces parts
    /// that view one block.
    pub fn prepare(&mut self, range: ByteRange) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        self.ensure_covered(range)?;
        let mut pos = range.start;
        while pos < range.end {
            let leaf = self.leaf_for(pos)?;
            let part = self.tree.leaf(leaf);
            if !part.is_sparse() {
                pos = part.end();
                continue;
            }
            let (leaf, chunk_end) = self.materialize_chunk(leaf, pos)?;
            self.coalesce_around(leaf);
            pos = chunk_end;
        }
        Ok(())
    }

    /// Part containing `pos`; the partition invariant makes this exact.
    fn leaf_for(&self, pos: i64) -> Result<LeafId> {
        let leaf = match self.tree.locate(pos) {
            Some(leaf) => leaf,
            None => bail!("offset {pos} outside buffer range {}", self.range),
        };
        ensure!(
            self.tree.leaf(leaf).range().contains(pos),
            "offset {pos} outside buffer range {}",
            self.range
        );
        Ok(leaf)
    }

    /// Cuts the sparse part at `leaf` to the part-size grid around `pos`
    /// and materializes the chunk containing `pos`. Returns the chunk's
    /// leaf and end offset.
    fn materialize_chunk(&mut self, leaf: LeafId, pos: i64) -> Result<(LeafId, i64)> {
        let part_range = self.tree.leaf(leaf).range();
        let grid_start = align_down(pos, self.part_size);
        let grid = ByteRange::new(grid_start, grid_start + self.part_size as i64);
        let chunk = grid.intersect(part_range);
        debug_assert!(chunk.contains(pos));

        let mut leaf = leaf;
        if part_range.start < chunk.start {
            let tail = self.tree.leaf_mut(leaf).split_off(chunk.start)?;
            leaf = self.tree.insert_at(leaf, tail, InsertOrder::After);
        }
        if self.tree.leaf(leaf).end() > chunk.end {
            let tail = self.tree.leaf_mut(leaf).split_off(chunk.end)?;
            self.tree.insert_at(leaf, tail, InsertOrder::After);
        }

        let part = self.tree.leaf(leaf);
        let src_range = part.source_range();
        let had_source = part.has_source();
        let source = part.source();
        match source {
            None if had_source => {
                bail!("source of part {} discarded before materialization", chunk)
            }
            None => {
                let block = MemoryBlock::new(&self.pool, chunk.len())?;
                self.tree.leaf_mut(leaf).attach_block(block, 0)?;
            }
            Some(source) => {
                let cache = source.borrow().cache_buffer().cloned();
                match cache {
                    Some(inner) => {
                        let views = inner.borrow_mut().dense_views(src_range)?;
                        leaf = self.adopt_views(leaf, views)?;
                    }
                    None => {
                        let block = MemoryBlock::new(&self.pool, chunk.len())?;
                        block.fill_via(0, chunk.len(), |bytes| {
                            source.borrow_mut().fill(bytes, src_range)
                        })?;
                        self.tree.leaf_mut(leaf).attach_block(block, 0)?;
                    }
                }
            }
        }
        self.tree.bubble_update(leaf);
        Ok((leaf, chunk.end))
    }

    /// Replaces the sparse part at `leaf` with dense parts viewing the
    /// given block slices, zero-copy. Returns the last piece's leaf.
    fn adopt_views(
        &mut self,
        leaf: LeafId,
        views: SmallVec<[(MemoryBlock, usize, usize); 4]>,
    ) -> Result<LeafId> {
        let total: usize = views.iter().map(|(_, _, len)| len).sum();
        ensure!(
            total == self.tree.leaf(leaf).len(),
            "cache buffer supplied {total} bytes for part {}",
            self.tree.leaf(leaf).range()
        );

        let mut start = self.tree.leaf(leaf).start();
        let mut leaf = leaf;
        for (i, (block, block_offset, len)) in views.into_iter().enumerate() {
            let piece = BufferPart::dense(start, len, block, block_offset);
            if i == 0 {
                // Same start, so the leaf's key is untouched.
                *self.tree.leaf_mut(leaf) = piece;
            } else {
                leaf = self.tree.insert_at(leaf, piece, InsertOrder::After);
            }
            self.tree.bubble_update(leaf);
            start += len as i64;
        }
        Ok(leaf)
    }

    /// Dense views of `range`, preparing it first. Used by buffers acting
    /// as a cache behind another buffer's source.
    fn dense_views(
        &mut self,
        range: ByteRange,
    ) -> Result<SmallVec<[(MemoryBlock, usize, usize); 4]>> {
        self.prepare(range)?;
        let mut views = SmallVec::new();
        let mut pos = range.start;
        while pos < range.end {
            let leaf = self.leaf_for(pos)?;
            let part = self.tree.leaf(leaf);
            let block = match part.block() {
                Some(block) => block.clone(),
                None => bail!("part {} still sparse after preparation", part.range()),
            };
            let in_part = (pos - part.start()) as usize;
            let take = (part.len() - in_part).min((range.end - pos) as usize);
            views.push((block, part.block_offset() + in_part, take));
            pos += take as i64;
        }
        Ok(views)
    }

    /// Merges `leaf` with its neighbors where they view one backing.
    fn coalesce_around(&mut self, leaf: LeafId) {
        let mut leaf = leaf;
        if let Some(prev) = self.tree.prev_leaf(leaf) {
            if self.tree.leaf(prev).mergeable_with(self.tree.leaf(leaf)) {
                let part = self.tree.remove_leaf(leaf);
                let absorbed = self.tree.leaf_mut(prev).try_absorb(&part);
                debug_assert!(absorbed);
                self.tree.bubble_update(prev);
                leaf = prev;
            }
        }
        if let Some(next) = self.tree.next_leaf(leaf) {
            if self.tree.leaf(leaf).mergeable_with(self.tree.leaf(next)) {
                let part = self.tree.remove_leaf(next);
                let absorbed = self.tree.leaf_mut(leaf).try_absorb(&part);
                debug_assert!(absorbed);
                self.tree.bubble_update(leaf);
            }
        }
    }

    // ---- raw byte access ------------------------------------------------

    /// Copies `range` into `dst`, materializing as needed.
    pub(crate) fn copy_range_into(&mut self, range: ByteRange, dst: &mut [u8]) -> Result<()> {
        ensure!(
            dst.len() == range.len(),
            "destination of {} bytes for range {range}",
            dst.len()
        );
        if range.is_empty() {
            return Ok(());
        }
        self.prepare(range)?;
        let mut pos = range.start;
        let mut done = 0;
        while done < dst.len() {
            let leaf = self.leaf_for(pos)?;
            let part = self.tree.leaf(leaf);
            let in_part = (pos - part.start()) as usize;
            let take = (part.len() - in_part).min(dst.len() - done);
            part.read(in_part, &mut dst[done..done + take])?;
            done += take;
            pos += take as i64;
        }
        Ok(())
    }

    fn copy_range_from(&mut self, range: ByteRange, src: &[u8]) -> Result<()> {
        debug_assert_eq!(src.len(), range.len());
        if range.is_empty() {
            return Ok(());
        }
        self.prepare(range)?;
        let mut pos = range.start;
        let mut done = 0;
        while done < src.len() {
            let leaf = self.leaf_for(pos)?;
            let part = self.tree.leaf(leaf);
            let in_part = (pos - part.start()) as usize;
            let take = (part.len() - in_part).min(src.len() - done);
            part.write(in_part, &src[done..done + take])?;
            done += take;
            pos += take as i64;
        }
        Ok(())
    }

    // ---- cursor operations ----------------------------------------------

    /// Opens a cursor at the start of the range.
    pub fn cursor(&self) -> Cursor {
        Cursor::open(Rc::clone(&self.cursors), self.range.start)
    }

    /// Opens a cursor at `offset`, growing an elastic buffer's range to
    /// reach it.
    pub fn cursor_at(&mut self, offset: i64) -> Result<Cursor> {
        let mut cur = self.cursor();
        self.locate(&mut cur, offset)?;
        Ok(cur)
    }

    /// Moves a cursor to an absolute offset. Elastic buffers silently grow
    /// their range (to part boundaries); fixed buffers fail outside
    /// `[start, end]`. Bit progress is discarded.
    pub fn locate(&mut self, cur: &mut Cursor, offset: i64) -> Result<()> {
        self.check_cursor(cur)?;
        if self.range_fixed {
            ensure!(
                self.range.contains(offset) || offset == self.range.end,
                "offset {offset} outside fixed range {}",
                self.range
            );
        } else if !self.range.contains(offset) {
            self.ensure_covered(ByteRange::with_len(offset, 1))?;
        }
        cur.seek(offset);
        cur.set_hint(None);
        Ok(())
    }

    /// Steps the cursor by `delta` bytes. Returns `false` without moving
    /// when a fixed buffer's edge blocks the move.
    pub fn step(&mut self, cur: &mut Cursor, delta: i64) -> Result<bool> {
        self.check_cursor(cur)?;
        let target = cur.position() + delta;
        if self.range_fixed {
            if !(self.range.contains(target) || target == self.range.end) {
                return Ok(false);
            }
        } else if !self.range.contains(target) {
            self.ensure_covered(ByteRange::with_len(target, 1))?;
        }
        cur.seek(target);
        Ok(true)
    }

    /// True at the end of the range: nothing left to read, writes grow an
    /// elastic buffer.
    pub fn at_end(&self, cur: &Cursor) -> bool {
        cur.position() >= self.range.end
    }

    fn check_cursor(&self, cur: &Cursor) -> Result<()> {
        ensure!(
            cur.belongs_to(&self.cursors),
            "cursor belongs to a different buffer"
        );
        Ok(())
    }

    fn check_aligned(cur: &Cursor) -> Result<()> {
        ensure!(
            cur.bit() == 0,
            "cursor at bit {} is not byte aligned",
            cur.bit()
        );
        Ok(())
    }

    /// Reads `dst.len()` bytes at the cursor without advancing.
    pub fn peek_bytes(&mut self, cur: &Cursor, dst: &mut [u8]) -> Result<()> {
        self.check_cursor(cur)?;
        Self::check_aligned(cur)?;
        self.copy_range_into(ByteRange::with_len(cur.position(), dst.len()), dst)
    }

    /// Reads `dst.len()` bytes at the cursor and advances past them.
    pub fn read_bytes(&mut self, cur: &mut Cursor, dst: &mut [u8]) -> Result<()> {
        self.peek_bytes(cur, dst)?;
        cur.advance(dst.len() as i64);
        Ok(())
    }

    /// Writes `src` at the cursor and advances past it. Elastic buffers
    /// grow to fit; fixed buffers fail past their range.
    pub fn write_bytes(&mut self, cur: &mut Cursor, src: &[u8]) -> Result<()> {
        self.check_cursor(cur)?;
        Self::check_aligned(cur)?;
        self.copy_range_from(ByteRange::with_len(cur.position(), src.len()), src)?;
        cur.advance(src.len() as i64);
        Ok(())
    }

    /// Writes the buffer's newline encoding and advances past it.
    pub fn write_newline(&mut self, cur: &mut Cursor) -> Result<()> {
        let newline = self.newline.bytes();
        self.write_bytes(cur, newline)
    }

    /// One byte at the cursor position, hint-accelerated, no advance.
    fn peek_byte(&mut self, cur: &mut Cursor) -> Result<u8> {
        let pos = cur.position();
        if let Some(hint) = cur.hint() {
            if let Some(part) = self.tree.leaf_checked(hint) {
                if !part.is_sparse() && part.range().contains(pos) {
                    let mut byte = [0u8];
                    part.read((pos - part.start()) as usize, &mut byte)?;
                    return Ok(byte[0]);
                }
            }
        }
        self.prepare(ByteRange::with_len(pos, 1))?;
        let leaf = self.leaf_for(pos)?;
        cur.set_hint(Some(leaf));
        let part = self.tree.leaf(leaf);
        let mut byte = [0u8];
        part.read((pos - part.start()) as usize, &mut byte)?;
        Ok(byte[0])
    }

    /// Reads one bit, least significant first within each byte. Advances
    /// the bit index 0..7, then rolls to the next byte.
    pub fn read_bit(&mut self, cur: &mut Cursor) -> Result<bool> {
        self.check_cursor(cur)?;
        let byte = self.peek_byte(cur)?;
        let bit = (byte >> cur.bit()) & 1 == 1;
        let bit_index = cur.bit_mut();
        *bit_index += 1;
        if *bit_index == 8 {
            *bit_index = 0;
            cur.advance(1);
        }
        Ok(bit)
    }

    /// Realigns the cursor to the next byte boundary, discarding partial
    /// bit progress. No-op on an aligned cursor.
    pub fn pad_bits(&mut self, cur: &mut Cursor) -> Result<()> {
        self.check_cursor(cur)?;
        if cur.bit() != 0 {
            *cur.bit_mut() = 0;
            cur.advance(1);
        }
        Ok(())
    }

    /// Reads up to the next newline (LF, CR or CRLF), consuming the
    /// terminator and bumping the cursor's line number. The final
    /// unterminated line is returned as-is; `None` at the end of the range.
    pub fn read_line(&mut self, cur: &mut Cursor) -> Result<Option<Vec<u8>>> {
        self.check_cursor(cur)?;
        Self::check_aligned(cur)?;
        if self.at_end(cur) {
            return Ok(None);
        }
        let mut line = Vec::new();
        while !self.at_end(cur) {
            let byte = self.peek_byte(cur)?;
            if byte == b'\n' {
                cur.advance(1);
                cur.bump_line();
                break;
            }
            if byte == b'\r' {
                cur.advance(1);
                if !self.at_end(cur) && self.peek_byte(cur)? == b'\n' {
                    cur.advance(1);
                }
                cur.bump_line();
                break;
            }
            line.push(byte);
            cur.advance(1);
        }
        Ok(Some(line))
    }

    // ---- typed access ---------------------------------------------------

    typed_io!(i8 => read_i8, get_i8, write_i8);
    typed_io!(u8 => read_u8, get_u8, write_u8);
    typed_io!(i16 => read_i16, get_i16, write_i16);
    typed_io!(u16 => read_u16, get_u16, write_u16);
    typed_io!(i32 => read_i32, get_i32, write_i32);
    typed_io!(u32 => read_u32, get_u32, write_u32);
    typed_io!(i64 => read_i64, get_i64, write_i64);
    typed_io!(u64 => read_u64, get_u64, write_u64);
    typed_io!(f32 => read_f32, get_f32, write_f32);
    typed_io!(f64 => read_f64, get_f64, write_f64);
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("range", &self.range)
            .field("fixed", &self.range_fixed)
            .field("part_size", &self.part_size)
            .field("parts", &self.part_count())
            .field("dense_bytes", &self.dense_bytes())
            .finish()
    }
}

/// Builder for [`Buffer`].
pub struct BufferBuilder {
    part_size: usize,
    endianness: Endianness,
    newline: NewlineEncoding,
    fixed: Option<ByteRange>,
    source: Option<BufferSource>,
    source_origin: i64,
    pool: Option<BlockPool>,
}

impl Default for BufferBuilder {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            endianness: Endianness::default(),
            newline: NewlineEncoding::default(),
            fixed: None,
            source: None,
            source_origin: 0,
            pool: None,
        }
    }
}

impl BufferBuilder {
    /// Part granularity; must be non-zero. Small values are only useful
    /// for exercising boundary behavior.
    pub fn part_size(mut self, part_size: usize) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn newline_encoding(mut self, newline: NewlineEncoding) -> Self {
        self.newline = newline;
        self
    }

    /// Fixes the buffer to exactly `range`; it can never grow past it.
    pub fn fixed_range(mut self, range: ByteRange) -> Self {
        self.fixed = Some(range);
        self
    }

    /// Backing source for sparse parts.
    pub fn source(mut self, source: BufferSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Buffer offset at which the source's offset 0 lies (default 0).
    pub fn source_origin(mut self, origin: i64) -> Self {
        self.source_origin = origin;
        self
    }

    /// Block pool to allocate from; sharing one pool across buffers shares
    /// its recycled storage.
    pub fn pool(mut self, pool: BlockPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn build(self) -> Result<Buffer> {
        ensure!(self.part_size > 0, "part size must be non-zero");
        let mut buffer = Buffer {
            tree: Tree::new(PartCfg),
            range: self.fixed.unwrap_or_default(),
            range_fixed: self.fixed.is_some(),
            part_size: self.part_size,
            endianness: self.endianness,
            newline: self.newline,
            source: self.source.map(|s| Rc::new(RefCell::new(s))),
            source_origin: self.source_origin,
            pool: self.pool.unwrap_or_default(),
            cursors: Rc::new(Cell::new(0)),
        };
        if buffer.range_fixed {
            buffer.seed_fixed_range();
        }
        Ok(buffer)
    }
}
