//! # pagebuf - Lazily-Paged Byte Buffer Engine
//!
//! A [`Buffer`] models a logical range of bytes, addressed by signed 64-bit
//! offsets (the range may begin below zero), without holding storage for any
//! byte that was never touched. Storage arrives in fixed-size, grid-aligned
//! chunks the moment an offset is first read or written, pulled from a
//! recycling [`BlockPool`] and filled at most once from an optional
//! [`BufferSource`].
//!
//! ## Quick Start
//!
//! ```
//! use pagebuf::Buffer;
//!
//! # fn main() -> eyre::Result<()> {
//! let mut buffer = Buffer::new();
//! let mut cur = buffer.cursor_at(-8)?;
//! buffer.write_u32(&mut cur, 0xC0FFEE)?;
//!
//! buffer.locate(&mut cur, -8)?;
//! assert_eq!(buffer.read_u32(&mut cur)?, 0xC0FFEE);
//! assert!(buffer.range().contains(-8));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │     Public API (Buffer, Cursor)     │
//! ├─────────────────────────────────────┤
//! │  Typed I/O │ Bit Reads │ Text/Parse │
//! ├─────────────────────────────────────┤
//! │   Part Tree (balanced, aggregated)  │
//! ├─────────────────────────────────────┤
//! │   BufferPart (sparse ──▶ dense)     │
//! ├──────────────────┬──────────────────┤
//! │   MemoryBlock    │   BufferSource   │
//! │   + BlockPool    │   (fn/file/buf)  │
//! └──────────────────┴──────────────────┘
//! ```
//!
//! ## Threading Model
//!
//! Handles are single-threaded: blocks and sources are shared via `Rc`, so
//! none of the buffer-layer types are `Send` or `Sync`. The [`BlockPool`]
//! *is* thread-safe; share one pool and build per-thread buffers over it.
//!
//! ## Module Overview
//!
//! - [`buffer`]: The buffer itself, parts, cursors, ranges, parsing
//! - [`memory`]: Reference-counted blocks and the recycling pool
//! - [`source`]: Byte providers — fill closures, files, cache buffers
//! - [`tree`]: Generic balanced tree of ordered leaves with aggregates
//! - [`config`]: Engine-wide constants

#[macro_use]
mod macros;

pub mod buffer;
pub mod config;
pub mod memory;
pub mod source;
pub mod tree;

pub use buffer::{
    Buffer, BufferBuilder, BufferPart, ByteRange, Cursor, Endianness, NewlineEncoding,
    PartAggregate,
};
pub use memory::{BlockPool, MemoryBlock};
pub use source::{BufferSource, FileSource};
