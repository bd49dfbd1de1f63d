//! Cursors: positions into a buffer's logical range.

use std::cell::Cell;
use std::rc::Rc;

use crate::tree::LeafId;

/// A cursor over one buffer: absolute byte position, bit index for sub-byte
/// reads, a line counter, and a part hint.
///
/// Cursors do not borrow the buffer; every operation goes through the owning
/// [`crate::Buffer`], which checks that cursor and buffer belong together.
/// The buffer counts open cursors and refuses to clear while any is alive;
/// dropping the cursor releases its slot.
pub struct Cursor {
    pos: i64,
    bit: u8,
    line: usize,
    hint: Option<LeafId>,
    registry: Rc<Cell<usize>>,
}

impl Cursor {
    pub(crate) fn open(registry: Rc<Cell<usize>>, pos: i64) -> Self {
        registry.set(registry.get() + 1);
        Self {
            pos,
            bit: 0,
            line: 1,
            hint: None,
            registry,
        }
    }

    /// Absolute byte position in the buffer's logical range.
    pub fn position(&self) -> i64 {
        self.pos
    }

    /// Bit index within the current byte, 0..=7. Non-zero only between a
    /// bit read and the next byte boundary.
    pub fn bit(&self) -> u8 {
        self.bit
    }

    /// 1-based line number, advanced by line reads.
    pub fn line_number(&self) -> usize {
        self.line
    }

    pub(crate) fn belongs_to(&self, registry: &Rc<Cell<usize>>) -> bool {
        Rc::ptr_eq(&self.registry, registry)
    }

    /// Moves to an absolute position, discarding bit progress and hint
    /// validity is re-checked on next access.
    pub(crate) fn seek(&mut self, pos: i64) {
        self.pos = pos;
        self.bit = 0;
    }

    pub(crate) fn advance(&mut self, bytes: i64) {
        self.pos += bytes;
    }

    pub(crate) fn bit_mut(&mut self) -> &mut u8 {
        &mut self.bit
    }

    pub(crate) fn bump_line(&mut self) {
        self.line += 1;
    }

    pub(crate) fn hint(&self) -> Option<LeafId> {
        self.hint
    }

    pub(crate) fn set_hint(&mut self, hint: Option<LeafId>) {
        self.hint = hint;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        let open = self.registry.get();
        debug_assert!(open > 0, "cursor registry underflow");
        self.registry.set(open.saturating_sub(1));
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("pos", &self.pos)
            .field("bit", &self.bit)
            .field("line", &self.line)
            .finish()
    }
}
