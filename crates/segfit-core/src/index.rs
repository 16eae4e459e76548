//! Segregated free-list index.
//!
//! An array of 100 list heads keyed by size class; a block of size `s`
//! belongs to class `min(s / 64, 99)`, so all sizes >= 6336 collapse into
//! the last class. Within a class, blocks are kept ascending by size so a
//! first-fit scan returns the tightest candidate first.
//!
//! List heads live in this struct; the prev/next links of each list are
//! intrusive, stored in the free blocks' payload words (see [`crate::tag`]).
//!
//! The `min_class` cursor caches the lowest non-empty class so fit
//! searches can skip provably empty low classes. Inserting into a class
//! below the cursor lowers it immediately, which keeps the cursor a sound
//! lower bound at all times.

use crate::tag;

/// Number of size classes.
pub const NUM_CLASSES: usize = 100;

/// Width of one size class in bytes.
pub const CLASS_WIDTH: usize = 64;

/// Size class for a block of `size` bytes.
#[must_use]
pub fn class_of(size: usize) -> usize {
    (size / CLASS_WIDTH).min(NUM_CLASSES - 1)
}

/// The segregated free-list index.
#[derive(Debug)]
pub struct SegIndex {
    heads: [Option<usize>; NUM_CLASSES],
    /// Lowest class that may be non-empty; `NUM_CLASSES` when all are empty.
    min_class: usize,
}

impl SegIndex {
    /// Creates an index with every class empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heads: [None; NUM_CLASSES],
            min_class: NUM_CLASSES,
        }
    }

    /// Head of the list for `class`.
    #[must_use]
    pub fn head(&self, class: usize) -> Option<usize> {
        self.heads[class]
    }

    /// Lowest class that may hold a free block.
    #[must_use]
    pub fn min_class(&self) -> usize {
        self.min_class
    }

    /// Links the free block at `bp` into its class list, keeping the list
    /// ascending by size.
    pub fn insert(&mut self, heap: &mut [u8], bp: usize) {
        let size = tag::block_size(heap, bp);
        let class = class_of(size);
        if class < self.min_class {
            self.min_class = class;
        }

        let Some(head) = self.heads[class] else {
            self.heads[class] = Some(bp);
            tag::set_prev_free(heap, bp, None);
            tag::set_next_free(heap, bp, None);
            return;
        };

        // Walk past strictly smaller blocks to find the insertion point.
        let mut prev: Option<usize> = None;
        let mut cursor = Some(head);
        while let Some(cur) = cursor {
            if tag::block_size(heap, cur) >= size {
                break;
            }
            prev = Some(cur);
            cursor = tag::next_free(heap, cur);
        }

        match prev {
            None => {
                tag::set_prev_free(heap, bp, None);
                tag::set_next_free(heap, bp, Some(head));
                tag::set_prev_free(heap, head, Some(bp));
                self.heads[class] = Some(bp);
            }
            Some(before) => {
                tag::set_next_free(heap, before, Some(bp));
                tag::set_prev_free(heap, bp, Some(before));
                tag::set_next_free(heap, bp, cursor);
                if let Some(after) = cursor {
                    tag::set_prev_free(heap, after, Some(bp));
                }
            }
        }
    }

    /// Splices the free block at `bp` out of its class list using its
    /// stored links.
    pub fn remove(&mut self, heap: &mut [u8], bp: usize) {
        let class = class_of(tag::block_size(heap, bp));
        let prev = tag::prev_free(heap, bp);
        let next = tag::next_free(heap, bp);

        match (prev, next) {
            // Sole element: clear the head and advance the cursor.
            (None, None) => {
                self.heads[class] = None;
                self.advance_cursor(class);
            }
            // Head of the list with a successor.
            (None, Some(after)) => {
                self.heads[class] = Some(after);
                tag::set_prev_free(heap, after, None);
            }
            // Tail of the list with a predecessor.
            (Some(before), None) => {
                tag::set_next_free(heap, before, None);
            }
            // Interior: relink neighbors directly.
            (Some(before), Some(after)) => {
                tag::set_next_free(heap, before, Some(after));
                tag::set_prev_free(heap, after, Some(before));
            }
        }
    }

    /// After `emptied` became empty, rescans forward for the next
    /// non-empty class.
    fn advance_cursor(&mut self, emptied: usize) {
        if emptied != self.min_class {
            return;
        }
        self.min_class = (emptied..NUM_CLASSES)
            .find(|&class| self.heads[class].is_some())
            .unwrap_or(NUM_CLASSES);
    }
}

impl Default for SegIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lays out a free block of `size` bytes with its payload at `bp`.
    fn make_free(heap: &mut [u8], bp: usize, size: usize) {
        tag::store(heap, tag::header_of(bp), tag::pack(size, false));
        tag::store(heap, bp + size - tag::DSIZE, tag::pack(size, false));
    }

    fn collect(index: &SegIndex, heap: &[u8], class: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut cursor = index.head(class);
        while let Some(bp) = cursor {
            out.push(bp);
            cursor = tag::next_free(heap, bp);
        }
        out
    }

    #[test]
    fn test_class_of() {
        assert_eq!(class_of(32), 0);
        assert_eq!(class_of(63), 0);
        assert_eq!(class_of(64), 1);
        assert_eq!(class_of(6335), 98);
        assert_eq!(class_of(6336), 99);
        assert_eq!(class_of(1 << 30), 99);
    }

    #[test]
    fn test_insert_sole_element() {
        let mut heap = vec![0u8; 256];
        let mut index = SegIndex::new();
        make_free(&mut heap, 8, 64);
        index.insert(&mut heap, 8);

        assert_eq!(index.head(1), Some(8));
        assert_eq!(index.min_class(), 1);
        assert_eq!(tag::prev_free(&heap, 8), None);
        assert_eq!(tag::next_free(&heap, 8), None);
    }

    #[test]
    fn test_insert_keeps_ascending_order() {
        let mut heap = vec![0u8; 4096];
        let mut index = SegIndex::new();
        // Three blocks in class 1 (sizes 64..128), inserted out of order.
        make_free(&mut heap, 8, 112);
        make_free(&mut heap, 128, 64);
        make_free(&mut heap, 256, 88);
        index.insert(&mut heap, 8);
        index.insert(&mut heap, 128);
        index.insert(&mut heap, 256);

        assert_eq!(collect(&index, &heap, 1), vec![128, 256, 8]);
    }

    #[test]
    fn test_insert_lowers_cursor() {
        let mut heap = vec![0u8; 4096];
        let mut index = SegIndex::new();
        make_free(&mut heap, 8, 640);
        index.insert(&mut heap, 8);
        assert_eq!(index.min_class(), 10);

        make_free(&mut heap, 1024, 32);
        index.insert(&mut heap, 1024);
        assert_eq!(index.min_class(), 0);
    }

    #[test]
    fn test_remove_four_cases() {
        let mut heap = vec![0u8; 4096];
        let mut index = SegIndex::new();
        make_free(&mut heap, 8, 64);
        make_free(&mut heap, 128, 72);
        make_free(&mut heap, 256, 80);
        make_free(&mut heap, 512, 88);
        for bp in [8, 128, 256, 512] {
            index.insert(&mut heap, bp);
        }
        assert_eq!(collect(&index, &heap, 1), vec![8, 128, 256, 512]);

        // Interior.
        index.remove(&mut heap, 256);
        assert_eq!(collect(&index, &heap, 1), vec![8, 128, 512]);

        // Tail with predecessor.
        index.remove(&mut heap, 512);
        assert_eq!(collect(&index, &heap, 1), vec![8, 128]);

        // Head with successor.
        index.remove(&mut heap, 8);
        assert_eq!(collect(&index, &heap, 1), vec![128]);

        // Sole element.
        index.remove(&mut heap, 128);
        assert_eq!(collect(&index, &heap, 1), vec![]);
        assert_eq!(index.min_class(), NUM_CLASSES);
    }

    #[test]
    fn test_cursor_advances_to_next_nonempty() {
        let mut heap = vec![0u8; 8192];
        let mut index = SegIndex::new();
        make_free(&mut heap, 8, 64); // class 1
        make_free(&mut heap, 1024, 320); // class 5
        index.insert(&mut heap, 8);
        index.insert(&mut heap, 1024);
        assert_eq!(index.min_class(), 1);

        index.remove(&mut heap, 8);
        assert_eq!(index.min_class(), 5);
    }
}
