//! # Buffer Sources
//!
//! A [`BufferSource`] provides the bytes behind a buffer's sparse parts.
//! Materialization asks the source to fill exactly the range being paged in;
//! everything outside what the source ever filled reads as zero.
//!
//! ## Provider forms
//!
//! - **Empty** — no provider registered. Filling is a no-op and materialized
//!   parts stay zeroed. This is the backing of plain writable buffers.
//! - **Callback** — a boxed `FnMut(&mut [u8], ByteRange)` that must fill the
//!   whole destination and must not touch anything outside it. Any state the
//!   provider needs lives in the closure's captures; its `Drop` runs exactly
//!   once when the source is destroyed.
//! - **Buffer** — another buffer acts as a permanent cache. Filling copies
//!   out of it, and [`crate::Buffer::prepare`] goes further: parts paged from
//!   a buffer-backed source share the underlying buffer's blocks zero-copy.
//!
//! ## Limit
//!
//! A source may be limited to a byte range at most once. Every subsequent
//! fill must stay inside the limit; a fill outside it, or a second
//! `set_limit`, is an error. The mmap-backed [`FileSource`] limits itself to
//! the file's size on creation.

mod file;

use std::cell::RefCell;
use std::rc::Rc;

use eyre::{ensure, Result};

use crate::buffer::Buffer;
use crate::ByteRange;

pub use file::FileSource;

/// Fill callback: populate `dst` with the bytes of `range`.
/// `dst.len()` always equals `range.len()`.
pub type FillFn = Box<dyn FnMut(&mut [u8], ByteRange) -> Result<()>>;

/// A provider of bytes for sparse parts.
pub struct BufferSource {
    kind: SourceKind,
    limit: Option<ByteRange>,
}

enum SourceKind {
    Empty,
    Fill(FillFn),
    Cache(Rc<RefCell<Buffer>>),
}

impl BufferSource {
    /// Source without a provider; fills are no-ops over zeroed storage.
    pub fn empty() -> Self {
        Self {
            kind: SourceKind::Empty,
            limit: None,
        }
    }

    /// Source backed by a fill callback.
    pub fn with_fill(f: impl FnMut(&mut [u8], ByteRange) -> Result<()> + 'static) -> Self {
        Self {
            kind: SourceKind::Fill(Box::new(f)),
            limit: None,
        }
    }

    /// Source backed by another buffer acting as a permanent cache.
    pub fn with_buffer(cache: Rc<RefCell<Buffer>>) -> Self {
        Self {
            kind: SourceKind::Cache(cache),
            limit: None,
        }
    }

    /// Restricts the source to `range`. May be called at most once.
    pub fn set_limit(&mut self, range: ByteRange) -> Result<()> {
        ensure!(
            self.limit.is_none(),
            "source limit already set to {}",
            self.limit.unwrap_or_default()
        );
        self.limit = Some(range);
        Ok(())
    }

    pub fn limit(&self) -> Option<ByteRange> {
        self.limit
    }

    /// True when the source has a provider to pull bytes from.
    pub fn has_provider(&self) -> bool {
        !matches!(self.kind, SourceKind::Empty)
    }

    /// Fills `dst` with the bytes of `range`. Without a provider this is a
    /// no-op; `dst` keeps whatever it held (materialization hands in zeroed
    /// block storage).
    pub fn fill(&mut self, dst: &mut [u8], range: ByteRange) -> Result<()> {
        ensure!(
            dst.len() == range.len(),
            "fill destination of {} bytes does not match range {}",
            dst.len(),
            range
        );
        if let Some(limit) = self.limit {
            ensure!(
                limit.contains_range(range),
                "fill range {range} escapes source limit {limit}"
            );
        }
        match &mut self.kind {
            SourceKind::Empty => Ok(()),
            SourceKind::Fill(f) => f(dst, range),
            SourceKind::Cache(cache) => cache.borrow_mut().copy_range_into(range, dst),
        }
    }

    /// The cache buffer behind a buffer-backed source, if any. Preparation
    /// uses this to share the cache's blocks instead of copying.
    pub(crate) fn cache_buffer(&self) -> Option<&Rc<RefCell<Buffer>>> {
        match &self.kind {
            SourceKind::Cache(cache) => Some(cache),
            _ => None,
        }
    }
}

impl std::fmt::Debug for BufferSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            SourceKind::Empty => "empty",
            SourceKind::Fill(_) => "fill",
            SourceKind::Cache(_) => "cache",
        };
        f.debug_struct("BufferSource")
            .field("kind", &kind)
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_leaves_destination_untouched() {
        let mut source = BufferSource::empty();
        let mut dst = [0xEEu8; 4];
        source.fill(&mut dst, ByteRange::new(0, 4)).unwrap();
        assert_eq!(dst, [0xEE; 4]);
        assert!(!source.has_provider());
    }

    #[test]
    fn fill_callback_sees_requested_range() {
        let mut source = BufferSource::with_fill(|dst, range| {
            for (i, b) in dst.iter_mut().enumerate() {
                *b = (range.start + i as i64) as u8;
            }
            Ok(())
        });

        let mut dst = [0u8; 3];
        source.fill(&mut dst, ByteRange::new(10, 13)).unwrap();
        assert_eq!(dst, [10, 11, 12]);
    }

    #[test]
    fn mismatched_destination_is_an_error() {
        let mut source = BufferSource::empty();
        let mut dst = [0u8; 2];
        assert!(source.fill(&mut dst, ByteRange::new(0, 4)).is_err());
    }

    #[test]
    fn limit_is_one_shot() {
        let mut source = BufferSource::empty();
        source.set_limit(ByteRange::new(0, 100)).unwrap();
        assert!(source.set_limit(ByteRange::new(0, 50)).is_err());
        assert_eq!(source.limit(), Some(ByteRange::new(0, 100)));
    }

    #[test]
    fn fill_outside_limit_is_an_error() {
        let mut source = BufferSource::with_fill(|dst, _| {
            dst.fill(1);
            Ok(())
        });
        source.set_limit(ByteRange::new(0, 8)).unwrap();

        let mut dst = [0u8; 4];
        assert!(source.fill(&mut dst, ByteRange::new(6, 10)).is_err());
        assert!(source.fill(&mut dst, ByteRange::new(4, 8)).is_ok());
    }

    #[test]
    fn closure_state_drops_with_source() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Probe(Rc<Cell<bool>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let probe = Probe(Rc::clone(&dropped));
        let source = BufferSource::with_fill(move |_, _| {
            let _keep_alive = &probe;
            Ok(())
        });

        assert!(!dropped.get());
        drop(source);
        assert!(dropped.get());
    }
}
