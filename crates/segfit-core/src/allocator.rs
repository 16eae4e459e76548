//! Core heap state: allocate, release, resize.
//!
//! [`Heap`] owns the byte arena, the segregated free-list index, stats
//! counters, and a drainable log of per-operation lifecycle records. All
//! public operations take `&mut self`; the heap is single-threaded by
//! construction.
//!
//! Heap layout, low offsets first: one alignment-padding word, a
//! zero-payload allocated prologue block, the managed blocks, and a
//! zero-size allocated epilogue header as the last word. The prologue and
//! epilogue bound coalescing so neighbor lookups never leave the arena.

use crate::arena::{HeapError, HeapSource, VecSource};
use crate::index::{self, SegIndex};
use crate::tag;

/// Growth increment for the heap when no free block fits.
pub const CHUNK: usize = 4096;

/// Payload offset of the first managed block.
pub(crate) const FIRST_BP: usize = 4 * tag::WSIZE;

/// Rounds a requested payload size up to a legal block size: 8-byte
/// aligned, plus header/footer overhead, at least the minimum block.
///
/// Returns `None` when the rounded size does not fit in `usize`; such a
/// request can never be satisfied.
#[must_use]
pub fn adjusted_size(request: usize) -> Option<usize> {
    let aligned = request.checked_add(tag::ALIGNMENT - 1)? & !(tag::ALIGNMENT - 1);
    let asize = aligned.checked_add(tag::DSIZE)?;
    Some(asize.max(tag::MIN_BLOCK))
}

/// Outcome label for a lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// The operation completed and mutated the heap.
    Success,
    /// Growth was refused; existing state is untouched.
    OutOfMemory,
    /// The call was a no-op by contract (zero-size allocate).
    Noop,
}

/// Structured per-operation lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpRecord {
    /// Monotonic operation id.
    pub seq: u64,
    /// Operation symbol (`allocate`, `release`, `resize`).
    pub op: &'static str,
    /// Payload offset involved in the operation, if any.
    pub offset: Option<usize>,
    /// Caller-requested size, if any.
    pub request: Option<usize>,
    /// Adjusted or recorded block size, if any.
    pub block_size: Option<usize>,
    /// How the operation ended.
    pub outcome: OpOutcome,
}

/// Counters describing heap activity since construction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Successful allocate calls.
    pub allocations: u64,
    /// Allocate calls that failed on growth.
    pub failed_allocations: u64,
    /// Release calls.
    pub releases: u64,
    /// Successful resize calls that moved a block.
    pub resizes: u64,
    /// Placements that split off a remainder block.
    pub splits: u64,
    /// Placements that consumed the whole free block.
    pub whole_block_placements: u64,
    /// Frees merged with the successor only.
    pub merged_with_successor: u64,
    /// Frees merged with the predecessor only.
    pub merged_with_predecessor: u64,
    /// Frees merged with both neighbors.
    pub merged_with_both: u64,
    /// Times the growth primitive was invoked successfully.
    pub growth_events: u64,
    /// Total bytes obtained from the growth primitive.
    pub growth_bytes: u64,
}

/// A segregated-fit heap over a growable byte arena.
///
/// Addresses handed out by [`Heap::allocate`] are byte offsets into the
/// arena; read and write payloads through [`Heap::payload`] and
/// [`Heap::payload_mut`].
#[derive(Debug)]
pub struct Heap<S: HeapSource = VecSource> {
    pub(crate) source: S,
    pub(crate) index: SegIndex,
    stats: HeapStats,
    records: Vec<OpRecord>,
    next_seq: u64,
}

impl<S: HeapSource> Heap<S> {
    /// Initializes an empty heap over a fresh source: lays down the
    /// padding word, prologue, and epilogue, then grows by one [`CHUNK`].
    ///
    /// # Errors
    ///
    /// [`HeapError::SourceNotFresh`] if the source has already grown (its
    /// offsets would not line up with the sentinel layout), or
    /// [`HeapError::OutOfMemory`] if it refuses either the sentinel region
    /// or the initial chunk.
    pub fn new(mut source: S) -> Result<Self, HeapError> {
        if !source.is_empty() {
            return Err(HeapError::SourceNotFresh { len: source.len() });
        }
        let base = source.grow(4 * tag::WSIZE)?;
        debug_assert_eq!(base, 0, "grow on an empty source must start at offset 0");
        {
            let heap = source.bytes_mut();
            tag::store(heap, 0, 0); // alignment padding, never a payload
            tag::store(heap, tag::WSIZE, tag::pack(tag::DSIZE, true)); // prologue header
            tag::store(heap, 2 * tag::WSIZE, tag::pack(tag::DSIZE, true)); // prologue footer
            tag::store(heap, 3 * tag::WSIZE, tag::pack(0, true)); // epilogue header
        }
        let mut heap = Self {
            source,
            index: SegIndex::new(),
            stats: HeapStats::default(),
            records: Vec::new(),
            next_seq: 1,
        };
        heap.extend(CHUNK)?;
        Ok(heap)
    }

    /// Allocates at least `size` usable bytes.
    ///
    /// Returns the payload offset, 8-byte aligned, or `None` when `size`
    /// is zero or the heap cannot grow. A failed call leaves every
    /// existing block and the free-list index untouched.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        if size == 0 {
            self.record("allocate", None, Some(0), None, OpOutcome::Noop);
            return None;
        }

        let Some(asize) = adjusted_size(size) else {
            // Rounding overflowed; no heap of any length could hold it.
            self.stats.failed_allocations += 1;
            self.record("allocate", None, Some(size), None, OpOutcome::OutOfMemory);
            return None;
        };
        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => match self.extend(asize.max(CHUNK)) {
                Ok(bp) => bp,
                Err(_) => {
                    self.stats.failed_allocations += 1;
                    self.record("allocate", None, Some(size), Some(asize), OpOutcome::OutOfMemory);
                    return None;
                }
            },
        };

        self.place(bp, asize);
        self.stats.allocations += 1;
        self.record("allocate", Some(bp), Some(size), Some(asize), OpOutcome::Success);
        Some(bp)
    }

    /// Frees the block at `bp` and eagerly coalesces it with any free
    /// neighbors before reinserting it into the index.
    ///
    /// `bp` must be a live offset previously returned by [`Heap::allocate`]
    /// or [`Heap::resize`]; double-free or a foreign offset corrupts the
    /// heap structure (no validation layer exists on this path).
    pub fn release(&mut self, bp: usize) {
        let size = tag::block_size(self.source.bytes(), bp);
        {
            let heap = self.source.bytes_mut();
            tag::store(heap, tag::header_of(bp), tag::pack(size, false));
            tag::store(heap, bp + size - tag::DSIZE, tag::pack(size, false));
        }
        self.coalesce(bp);
        self.stats.releases += 1;
        self.record("release", Some(bp), None, Some(size), OpOutcome::Success);
    }

    /// Resizes a block by allocate-copy-free.
    ///
    /// `None` address behaves as [`Heap::allocate`]; zero `size` behaves as
    /// [`Heap::release`] and returns `None`. When the inner allocation
    /// fails the original block and its contents are left untouched.
    pub fn resize(&mut self, ptr: Option<usize>, size: usize) -> Option<usize> {
        let Some(bp) = ptr else {
            return self.allocate(size);
        };
        if size == 0 {
            self.release(bp);
            return None;
        }

        let old_payload = tag::block_size(self.source.bytes(), bp) - tag::DSIZE;
        let Some(new_bp) = self.allocate(size) else {
            self.record("resize", Some(bp), Some(size), None, OpOutcome::OutOfMemory);
            return None;
        };

        let keep = old_payload.min(size);
        self.source.bytes_mut().copy_within(bp..bp + keep, new_bp);
        self.release(bp);
        self.stats.resizes += 1;
        self.record("resize", Some(new_bp), Some(size), None, OpOutcome::Success);
        Some(new_bp)
    }

    /// Usable payload bytes of the allocated block at `bp`.
    #[must_use]
    pub fn usable_size(&self, bp: usize) -> usize {
        tag::block_size(self.source.bytes(), bp) - tag::DSIZE
    }

    /// Read access to `len` payload bytes at `bp`.
    #[must_use]
    pub fn payload(&self, bp: usize, len: usize) -> &[u8] {
        &self.source.bytes()[bp..bp + len]
    }

    /// Write access to `len` payload bytes at `bp`.
    pub fn payload_mut(&mut self, bp: usize, len: usize) -> &mut [u8] {
        &mut self.source.bytes_mut()[bp..bp + len]
    }

    /// Total bytes obtained from the growth source so far.
    #[must_use]
    pub fn heap_len(&self) -> usize {
        self.source.len()
    }

    /// Snapshot of the activity counters.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    /// View of the lifecycle records accumulated so far.
    #[must_use]
    pub fn records(&self) -> &[OpRecord] {
        &self.records
    }

    /// Drains the lifecycle records.
    pub fn drain_records(&mut self) -> Vec<OpRecord> {
        std::mem::take(&mut self.records)
    }

    /// Scans size classes upward from the larger of the request's class
    /// and the cursor; within a class the ascending sort makes the first
    /// fit the tightest one.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let heap = self.source.bytes();
        let start = index::class_of(asize).max(self.index.min_class());
        for class in start..index::NUM_CLASSES {
            let mut cursor = self.index.head(class);
            while let Some(bp) = cursor {
                if tag::block_size(heap, bp) >= asize {
                    return Some(bp);
                }
                cursor = tag::next_free(heap, bp);
            }
        }
        None
    }

    /// Carves `asize` bytes out of the free block at `bp`, splitting off
    /// the remainder when it can stand alone as a block.
    fn place(&mut self, bp: usize, asize: usize) {
        let csize = tag::block_size(self.source.bytes(), bp);
        self.index.remove(self.source.bytes_mut(), bp);

        if csize - asize >= tag::MIN_BLOCK {
            let rest = bp + asize;
            {
                let heap = self.source.bytes_mut();
                tag::store(heap, tag::header_of(bp), tag::pack(asize, true));
                tag::store(heap, bp + asize - tag::DSIZE, tag::pack(asize, true));
                tag::store(heap, tag::header_of(rest), tag::pack(csize - asize, false));
                tag::store(heap, rest + (csize - asize) - tag::DSIZE, tag::pack(csize - asize, false));
            }
            self.index.insert(self.source.bytes_mut(), rest);
            self.stats.splits += 1;
        } else {
            // Remainder too small to stand alone; accept the internal
            // fragmentation and hand out the whole block.
            let heap = self.source.bytes_mut();
            tag::store(heap, tag::header_of(bp), tag::pack(csize, true));
            tag::store(heap, bp + csize - tag::DSIZE, tag::pack(csize, true));
            self.stats.whole_block_placements += 1;
        }
    }

    /// Merges the free block at `bp` with free address-order neighbors and
    /// inserts the result into the index. Returns the merged payload
    /// offset.
    fn coalesce(&mut self, bp: usize) -> usize {
        let size = tag::block_size(self.source.bytes(), bp);
        let prev_allocated = tag::is_allocated(tag::load(self.source.bytes(), bp - tag::DSIZE));
        let next_bp = bp + size;
        let next_allocated = tag::block_allocated(self.source.bytes(), next_bp);

        let merged_bp = match (prev_allocated, next_allocated) {
            (true, true) => bp,
            (true, false) => {
                self.index.remove(self.source.bytes_mut(), next_bp);
                let merged = size + tag::block_size(self.source.bytes(), next_bp);
                let heap = self.source.bytes_mut();
                tag::store(heap, tag::header_of(bp), tag::pack(merged, false));
                tag::store(heap, bp + merged - tag::DSIZE, tag::pack(merged, false));
                self.stats.merged_with_successor += 1;
                bp
            }
            (false, true) => {
                let prev_bp = tag::predecessor(self.source.bytes(), bp);
                self.index.remove(self.source.bytes_mut(), prev_bp);
                let merged = size + tag::block_size(self.source.bytes(), prev_bp);
                let heap = self.source.bytes_mut();
                tag::store(heap, tag::header_of(prev_bp), tag::pack(merged, false));
                tag::store(heap, prev_bp + merged - tag::DSIZE, tag::pack(merged, false));
                self.stats.merged_with_predecessor += 1;
                prev_bp
            }
            (false, false) => {
                let prev_bp = tag::predecessor(self.source.bytes(), bp);
                self.index.remove(self.source.bytes_mut(), prev_bp);
                self.index.remove(self.source.bytes_mut(), next_bp);
                let merged = size
                    + tag::block_size(self.source.bytes(), prev_bp)
                    + tag::block_size(self.source.bytes(), next_bp);
                let heap = self.source.bytes_mut();
                tag::store(heap, tag::header_of(prev_bp), tag::pack(merged, false));
                tag::store(heap, prev_bp + merged - tag::DSIZE, tag::pack(merged, false));
                self.stats.merged_with_both += 1;
                prev_bp
            }
        };

        self.index.insert(self.source.bytes_mut(), merged_bp);
        merged_bp
    }

    /// Grows the heap by at least `bytes` (rounded to an even word count),
    /// forms the new region into one free block under a fresh epilogue,
    /// and coalesces it with a preceding free block.
    fn extend(&mut self, bytes: usize) -> Result<usize, HeapError> {
        let size = bytes
            .checked_add(tag::DSIZE - 1)
            .ok_or(HeapError::OutOfMemory { requested: bytes })?
            & !(tag::DSIZE - 1);
        let base = self.source.grow(size)?;
        self.stats.growth_events += 1;
        self.stats.growth_bytes += size as u64;
        {
            let heap = self.source.bytes_mut();
            // The old epilogue word becomes the new block's header.
            tag::store(heap, tag::header_of(base), tag::pack(size, false));
            tag::store(heap, base + size - tag::DSIZE, tag::pack(size, false));
            tag::store(heap, tag::header_of(base + size), tag::pack(0, true)); // new epilogue
        }
        Ok(self.coalesce(base))
    }

    fn record(
        &mut self,
        op: &'static str,
        offset: Option<usize>,
        request: Option<usize>,
        block_size: Option<usize>,
        outcome: OpOutcome,
    ) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.records.push(OpRecord {
            seq,
            op,
            offset,
            request,
            block_size,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check;

    fn fresh_heap() -> Heap {
        Heap::new(VecSource::new()).unwrap()
    }

    #[test]
    fn test_new_layout() {
        let heap = fresh_heap();
        // Sentinels plus one chunk-sized free block.
        assert_eq!(heap.heap_len(), 4 * tag::WSIZE + CHUNK);
        let bytes = heap.source.bytes();
        assert_eq!(tag::block_size(bytes, FIRST_BP), CHUNK);
        assert!(!tag::block_allocated(bytes, FIRST_BP));
        assert_eq!(heap.stats().growth_events, 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_new_rejects_grown_source() {
        let mut source = VecSource::new();
        source.grow(64).unwrap();
        assert!(matches!(
            Heap::new(source),
            Err(HeapError::SourceNotFresh { len: 64 })
        ));
    }

    #[test]
    fn test_adjusted_size() {
        assert_eq!(adjusted_size(1), Some(tag::MIN_BLOCK));
        assert_eq!(adjusted_size(16), Some(tag::MIN_BLOCK));
        assert_eq!(adjusted_size(17), Some(40));
        assert_eq!(adjusted_size(100), Some(120));
        assert_eq!(adjusted_size(4096), Some(4112));
        // Rounding must refuse rather than wrap near the top of usize.
        assert_eq!(adjusted_size(usize::MAX), None);
        assert_eq!(adjusted_size(usize::MAX - tag::DSIZE), None);
    }

    #[test]
    fn test_allocate_zero_is_noop() {
        let mut heap = fresh_heap();
        let before = heap.heap_len();
        assert_eq!(heap.allocate(0), None);
        assert_eq!(heap.heap_len(), before);
        assert_eq!(heap.stats().allocations, 0);
    }

    #[test]
    fn test_allocate_is_aligned_and_sufficient() {
        let mut heap = fresh_heap();
        for size in [1, 7, 8, 100, 513] {
            let bp = heap.allocate(size).unwrap();
            assert_eq!(bp % tag::ALIGNMENT, 0);
            assert!(heap.usable_size(bp) >= size);
        }
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_allocate_splits_large_block() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(100).unwrap();
        assert_eq!(bp, FIRST_BP);
        assert_eq!(heap.usable_size(bp), adjusted_size(100).unwrap() - tag::DSIZE);
        assert_eq!(heap.stats().splits, 1);
        // The remainder went back into the index.
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_release_then_allocate_reuses_address() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(64).unwrap();
        heap.release(bp);
        assert_eq!(heap.allocate(64), Some(bp));
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_payload_roundtrip() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(40).unwrap();
        heap.payload_mut(bp, 40).copy_from_slice(&[0xAB; 40]);
        assert_eq!(heap.payload(bp, 40), &[0xAB; 40]);
    }

    #[test]
    fn test_growth_when_no_fit() {
        let mut heap = fresh_heap();
        let grown_before = heap.stats().growth_events;
        // The initial chunk's free block cannot satisfy 4096 + overhead.
        let bp = heap.allocate(4096).unwrap();
        assert!(heap.usable_size(bp) >= 4096);
        assert_eq!(heap.stats().growth_events, grown_before + 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_allocate_oom_leaves_state_untouched() {
        let mut heap = Heap::new(VecSource::with_limit(4 * tag::WSIZE + CHUNK)).unwrap();
        let bp = heap.allocate(100).unwrap();
        heap.payload_mut(bp, 100).fill(0x5C);

        let len_before = heap.heap_len();
        assert_eq!(heap.allocate(1 << 20), None);
        assert_eq!(heap.heap_len(), len_before);
        assert_eq!(heap.payload(bp, 100), &[0x5C; 100]);
        assert_eq!(heap.stats().failed_allocations, 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_huge_allocate_returns_none() {
        let mut heap = fresh_heap();
        let len_before = heap.heap_len();
        // Both the wrapping-rounding path and the growth-rounding path
        // must surface as a clean failure.
        assert_eq!(heap.allocate(usize::MAX), None);
        assert_eq!(heap.allocate(usize::MAX - 23), None);
        assert_eq!(heap.resize(None, usize::MAX), None);
        assert_eq!(heap.heap_len(), len_before);
        assert_eq!(heap.stats().failed_allocations, 3);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_release_merges_with_successor() {
        let mut heap = fresh_heap();
        let a = heap.allocate(48).unwrap();
        let b = heap.allocate(48).unwrap();
        let _guard = heap.allocate(48).unwrap();

        heap.release(b);
        heap.release(a);
        // a absorbed b's block.
        let bytes = heap.source.bytes();
        assert_eq!(tag::block_size(bytes, a), 2 * adjusted_size(48).unwrap());
        assert_eq!(heap.stats().merged_with_successor, 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_release_merges_with_predecessor() {
        let mut heap = fresh_heap();
        let a = heap.allocate(48).unwrap();
        let b = heap.allocate(48).unwrap();
        let _guard = heap.allocate(48).unwrap();

        heap.release(a);
        heap.release(b);
        let bytes = heap.source.bytes();
        assert_eq!(tag::block_size(bytes, a), 2 * adjusted_size(48).unwrap());
        assert_eq!(heap.stats().merged_with_predecessor, 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_release_merges_with_both_neighbors() {
        let mut heap = fresh_heap();
        let a = heap.allocate(48).unwrap();
        let b = heap.allocate(48).unwrap();
        let c = heap.allocate(48).unwrap();
        let _guard = heap.allocate(48).unwrap();

        heap.release(a);
        heap.release(c);
        heap.release(b);
        let bytes = heap.source.bytes();
        assert_eq!(tag::block_size(bytes, a), 3 * adjusted_size(48).unwrap());
        assert_eq!(heap.stats().merged_with_both, 1);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_resize_none_behaves_as_allocate() {
        let mut heap = fresh_heap();
        let bp = heap.resize(None, 64).unwrap();
        assert!(heap.usable_size(bp) >= 64);
    }

    #[test]
    fn test_resize_zero_behaves_as_release() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(64).unwrap();
        assert_eq!(heap.resize(Some(bp), 0), None);
        // The block is free again and reusable.
        assert_eq!(heap.allocate(64), Some(bp));
    }

    #[test]
    fn test_resize_preserves_prefix() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(128).unwrap();
        let pattern: Vec<u8> = (0..128u8).map(|i| i.wrapping_mul(3)).collect();
        heap.payload_mut(bp, 128).copy_from_slice(&pattern);

        let grown = heap.resize(Some(bp), 512).unwrap();
        assert_eq!(heap.payload(grown, 128), &pattern[..]);

        let shrunk = heap.resize(Some(grown), 40).unwrap();
        assert_eq!(heap.payload(shrunk, 40), &pattern[..40]);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_resize_failure_is_non_destructive() {
        let mut heap = Heap::new(VecSource::with_limit(4 * tag::WSIZE + CHUNK)).unwrap();
        let bp = heap.allocate(100).unwrap();
        heap.payload_mut(bp, 100).fill(0x7E);

        assert_eq!(heap.resize(Some(bp), 1 << 20), None);
        assert_eq!(heap.payload(bp, 100), &[0x7E; 100]);
        // The block is still live; releasing it must still work.
        heap.release(bp);
        assert!(check::verify(&heap).is_empty());
    }

    #[test]
    fn test_records_carry_outcomes() {
        let mut heap = fresh_heap();
        let bp = heap.allocate(64).unwrap();
        heap.allocate(0);
        heap.release(bp);

        let records = heap.drain_records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.seq > 0));
        assert_eq!(records[0].op, "allocate");
        assert_eq!(records[0].outcome, OpOutcome::Success);
        assert_eq!(records[1].outcome, OpOutcome::Noop);
        assert_eq!(records[2].op, "release");
        assert!(heap.records().is_empty());
    }
}
