//! # Memory Blocks and Pooled Allocation
//!
//! This module provides the physical storage behind materialized buffer
//! parts: reference-counted [`MemoryBlock`]s and the [`BlockPool`] they are
//! carved from.
//!
//! ## Why a pool
//!
//! Materialization allocates one block per part-sized chunk, and buffers with
//! churny access patterns materialize and release the same sizes over and
//! over. The pool recycles released storage by size class so steady-state
//! paging performs no heap allocation.
//!
//! ## Ownership model
//!
//! Blocks are shared with plain (non-atomic) `Rc` reference counting: a block
//! may back several parts at once — two buffers paging the same source, or
//! two halves of a split part. The engine is single-threaded by contract, so
//! `MemoryBlock` is deliberately `!Send + !Sync`. The pool itself only hands
//! out plain byte boxes and is shareable across threads.
//!
//! ## Lifecycle
//!
//! ```text
//! pool.acquire ──> MemoryBlock (rc = 1) ──clone──> rc = n
//!                        │                            │
//!                        └──── last release ──────────┘
//!                                   │
//!                     destructor (if any) runs once,
//!                     pooled storage returns to its size class
//! ```

mod block;
mod pool;

pub use block::{BlockDestructor, MemoryBlock};
pub use pool::BlockPool;
