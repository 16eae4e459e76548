//! # segfit-core
//!
//! A segregated-fit heap allocator built on boundary-tagged blocks.
//!
//! The managed heap is a single growable byte arena. Every block carries a
//! one-word header and footer encoding `(size, allocated)`; free blocks
//! additionally embed prev/next links for a doubly linked free list. Free
//! blocks are indexed by 100 coarse size classes, each kept sorted by size
//! so a first-fit scan within a class doubles as an approximate best fit.
//!
//! All internal references are byte offsets into the arena, never raw
//! pointers, so the whole structure is relocatable and testable without
//! `unsafe` code.

#![deny(unsafe_code)]

pub mod allocator;
pub mod arena;
pub mod check;
pub mod index;
pub mod tag;

pub use allocator::{Heap, HeapStats, OpOutcome, OpRecord};
pub use arena::{HeapError, HeapSource, VecSource};
pub use index::SegIndex;
