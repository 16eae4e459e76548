//! Growable byte arena backing the managed heap.
//!
//! The allocator consumes raw heap growth through the [`HeapSource`] trait:
//! a single `grow` call that extends the managed range by N bytes and
//! returns the base offset of the new region. Growth is monotonic; the
//! arena never shrinks and freed blocks are never handed back.

use thiserror::Error;

/// Errors surfaced by the heap and its growth source.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The growth source refused to extend the managed range.
    #[error("heap source refused growth of {requested} bytes")]
    OutOfMemory {
        /// Number of bytes the allocator asked for.
        requested: usize,
    },
    /// A heap was constructed over a source that had already grown.
    #[error("heap source already holds {len} bytes; a fresh source is required")]
    SourceNotFresh {
        /// Length the source reported at construction.
        len: usize,
    },
}

/// Raw-heap-growth primitive plus access to the managed bytes.
///
/// Implementations must append `bytes` zeroed bytes contiguously to the
/// managed range and return the offset where the new region begins (the
/// previous length). Failure must leave the range untouched.
pub trait HeapSource {
    /// Extends the managed range by `bytes` bytes.
    fn grow(&mut self, bytes: usize) -> Result<usize, HeapError>;

    /// The managed bytes.
    fn bytes(&self) -> &[u8];

    /// The managed bytes, mutable.
    fn bytes_mut(&mut self) -> &mut [u8];

    /// Current length of the managed range.
    fn len(&self) -> usize {
        self.bytes().len()
    }

    /// Whether nothing has been grown yet.
    fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

/// Default in-process heap source: an owned `Vec<u8>` with an optional
/// hard byte limit for simulating out-of-memory in tests and replays.
#[derive(Debug, Default)]
pub struct VecSource {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl VecSource {
    /// Creates an unbounded source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source that fails any growth past `limit` total bytes.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }
}

impl HeapSource for VecSource {
    fn grow(&mut self, bytes: usize) -> Result<usize, HeapError> {
        let base = self.bytes.len();
        let new_len = base
            .checked_add(bytes)
            .ok_or(HeapError::OutOfMemory { requested: bytes })?;
        if self.limit.is_some_and(|limit| new_len > limit) {
            return Err(HeapError::OutOfMemory { requested: bytes });
        }
        self.bytes.resize(new_len, 0);
        Ok(base)
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
