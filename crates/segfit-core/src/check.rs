//! Heap consistency checker.
//!
//! Walks every block from prologue to epilogue and every free list in the
//! index, reporting each violated structural invariant as a message.
//! An empty report means the heap is consistent. Intended for tests and
//! the trace harness; the allocation paths never call it.

use std::collections::BTreeSet;

use crate::allocator::{FIRST_BP, Heap};
use crate::arena::HeapSource;
use crate::index::{self, NUM_CLASSES};
use crate::tag;

/// Verifies every structural invariant and returns the violations found.
#[must_use]
pub fn verify<S: HeapSource>(heap: &Heap<S>) -> Vec<String> {
    let mut violations = Vec::new();
    let bytes = heap.source.bytes();

    if tag::load(bytes, tag::WSIZE) != tag::pack(tag::DSIZE, true)
        || tag::load(bytes, 2 * tag::WSIZE) != tag::pack(tag::DSIZE, true)
    {
        violations.push("prologue tags damaged".to_string());
    }

    // Address-ordered walk: header/footer agreement, alignment, minimum
    // size, and the no-adjacent-free invariant.
    let mut free_in_heap = BTreeSet::new();
    let mut bp = FIRST_BP;
    let mut prev_was_free = false;
    loop {
        // The epilogue's payload offset is the heap length; its header is
        // the final word.
        if bp > bytes.len() {
            violations.push(format!("block walk ran past heap end at offset {bp}"));
            break;
        }
        let header = tag::load(bytes, tag::header_of(bp));
        let size = tag::size_of(header);
        if size == 0 {
            if !tag::is_allocated(header) {
                violations.push("epilogue not marked allocated".to_string());
            }
            if tag::header_of(bp) != bytes.len() - tag::WSIZE {
                violations.push(format!(
                    "epilogue at offset {} but heap ends at {}",
                    tag::header_of(bp),
                    bytes.len()
                ));
            }
            break;
        }

        if bp % tag::ALIGNMENT != 0 {
            violations.push(format!("block at {bp} is not 8-byte aligned"));
        }
        if size < tag::MIN_BLOCK || size % tag::ALIGNMENT != 0 {
            violations.push(format!("block at {bp} has illegal size {size}"));
        }
        if bp + size > bytes.len() {
            violations.push(format!("block at {bp} overruns the heap"));
            break;
        }
        let footer = tag::load(bytes, bp + size - tag::DSIZE);
        if footer != header {
            violations.push(format!(
                "block at {bp}: header {header:#x} disagrees with footer {footer:#x}"
            ));
        }

        let is_free = !tag::is_allocated(header);
        if is_free {
            if prev_was_free {
                violations.push(format!("adjacent free blocks ending at {bp}"));
            }
            free_in_heap.insert(bp);
        }
        prev_was_free = is_free;
        bp += size;
    }

    // Index walk: membership, class assignment, ascending order, link
    // symmetry, and cursor soundness.
    let mut listed = BTreeSet::new();
    for class in 0..NUM_CLASSES {
        if class < heap.index.min_class() && heap.index.head(class).is_some() {
            violations.push(format!(
                "cursor {} skips non-empty class {class}",
                heap.index.min_class()
            ));
        }

        let mut last_size = 0;
        let mut prev: Option<usize> = None;
        let mut cursor = heap.index.head(class);
        while let Some(cur) = cursor {
            if !listed.insert(cur) {
                violations.push(format!("block at {cur} linked more than once"));
                break; // also stops list cycles
            }
            if tag::block_allocated(bytes, cur) {
                violations.push(format!("allocated block at {cur} is on free list {class}"));
            }
            let size = tag::block_size(bytes, cur);
            if index::class_of(size) != class {
                violations.push(format!(
                    "block at {cur} (size {size}) filed under class {class}"
                ));
            }
            if size < last_size {
                violations.push(format!("class {class} not ascending at block {cur}"));
            }
            last_size = size;
            if tag::prev_free(bytes, cur) != prev {
                violations.push(format!("broken prev link at block {cur}"));
            }
            prev = Some(cur);
            cursor = tag::next_free(bytes, cur);
        }
    }

    for &bp in free_in_heap.difference(&listed) {
        violations.push(format!("free block at {bp} is on no free list"));
    }
    for &bp in listed.difference(&free_in_heap) {
        violations.push(format!("listed block at {bp} is not a free heap block"));
    }

    violations
}
