//! # Buffer Layer
//!
//! The top of the engine: a [`Buffer`] is a logical byte range — possibly
//! starting at a negative offset, possibly unbounded in growth — tiled by
//! [`BufferPart`]s kept in the balanced part tree.
//!
//! ## Lazy paging
//!
//! Coverage and content are separate steps. Extending a buffer's range only
//! records sparse parts (constant time, no bytes move); the first access to
//! an offset cuts the covering sparse part at the part-size grid and
//! materializes exactly one aligned chunk — one pooled block, at most one
//! source fill:
//!
//! ```text
//! range grow:   [............ sparse ............]
//! access @ 5:   [dense][........ sparse .........]
//!                ^ one part-sized, grid-aligned chunk
//! ```
//!
//! Because chunks land on a fixed grid regardless of access order, buffers
//! paging the same cache buffer share physical blocks, and the part layout
//! for a random access pattern is predictable.
//!
//! ## Cursors
//!
//! All byte, bit, typed and textual I/O goes through a [`Cursor`]: an
//! absolute position, a bit index for sub-byte reads, a line counter, and a
//! part hint that short-circuits tree descent for sequential access. Any
//! number of cursors may be open; the buffer counts them and refuses
//! `clear()` while one is alive. Bit-granular access is read-only by
//! design — writes must be byte-aligned.
//!
//! ## Endianness
//!
//! Every multi-byte value is converted between host order and the buffer's
//! configured [`Endianness`] inside the typed accessors; raw byte I/O is
//! never converted.

mod buffer;
mod cursor;
mod parse;
mod part;
pub(crate) mod range;

pub use buffer::{Buffer, BufferBuilder, PartAggregate};
pub use cursor::Cursor;
pub use part::BufferPart;
pub use range::ByteRange;

/// Byte order applied by the typed accessors.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    /// The host's own byte order.
    pub const fn native() -> Self {
        #[cfg(target_endian = "little")]
        {
            Endianness::Little
        }
        #[cfg(target_endian = "big")]
        {
            Endianness::Big
        }
    }
}

/// Newline convention for [`Buffer::write_newline`] and line reading.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum NewlineEncoding {
    /// `\n`
    #[default]
    Unix,
    /// `\r`
    Mac9,
    /// `\r\n`
    Windows,
}

impl NewlineEncoding {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            NewlineEncoding::Unix => b"\n",
            NewlineEncoding::Mac9 => b"\r",
            NewlineEncoding::Windows => b"\r\n",
        }
    }
}
