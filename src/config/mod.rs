//! # Configuration Constants
//!
//! This module centralizes pagebuf's tunable constants. Constants that depend
//! on each other are co-located and their relationships documented so that a
//! change in one place cannot silently invalidate another.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_PART_SIZE (4096 bytes)
//!       │
//!       ├─> Part boundaries: every sparse part is split at multiples of the
//!       │   buffer's part size before materialization. Two buffers reading
//!       │   the same source only share physical blocks when they use the
//!       │   same part size, because block boundaries must coincide.
//!       │
//!       └─> BlockPool size classes: materialized blocks are almost always
//!           exactly one part long, so the pool converges on a single hot
//!           size class per buffer family.
//!
//! DEFAULT_POOL_RETAIN (32 blocks per size class)
//!       │
//!       └─> Upper bound on recycled storage kept per size class. Beyond
//!           this, released blocks are freed instead of pooled, bounding the
//!           pool's footprint at part_size * retain per class.
//! ```
//!
//! ## Part Size
//!
//! The default part size is 4 KB, matching the common OS memory page: parts
//! cut on page boundaries let unrelated buffers over one source land on the
//! same physical blocks. Buffers may override it (down to 1 byte) through
//! [`crate::BufferBuilder::part_size`], which tests use to exercise boundary
//! behavior with tiny parts.

/// Default granularity at which sparse parts are cut and materialized.
pub const DEFAULT_PART_SIZE: usize = 4096;

/// Maximum recycled blocks the pool retains per size class.
pub const DEFAULT_POOL_RETAIN: usize = 32;

/// Descent stacks cover trees up to this depth without heap allocation.
/// An AVL tree of this depth holds well over 100k parts.
pub const TREE_PATH_DEPTH: usize = 24;

const _: () = assert!(DEFAULT_PART_SIZE > 0);
const _: () = assert!(DEFAULT_PART_SIZE.is_power_of_two());
