//! Boundary-tag codec and block navigation.
//!
//! A block is addressed by its payload offset `bp`. One word before the
//! payload sits the header; the footer occupies the last word of the
//! block. Both encode `(size, allocated)` in a single word: size is always
//! a multiple of 8, so bit 0 is free for the allocated flag.
//!
//! Free blocks store prev/next free-list links in their first two payload
//! words. Links are full-width words holding an arena offset; the encoded
//! word 0 means "no neighbor" (offset 0 is the permanent alignment-padding
//! word and never a payload).
//!
//! This layer trusts its inputs: every offset handed in must be a block
//! address previously produced by the allocator.

/// Word and header/footer size in bytes.
pub const WSIZE: usize = 8;

/// Double word size; also the per-block header+footer overhead.
pub const DSIZE: usize = 16;

/// Payload alignment guarantee.
pub const ALIGNMENT: usize = 8;

/// Minimum block size: header, footer, and two full-width free links.
pub const MIN_BLOCK: usize = 32;

const ALLOC_BIT: u64 = 0x1;
const SIZE_MASK: u64 = !0x7;

/// Reads one word at `offset`.
#[must_use]
pub fn load(heap: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; WSIZE];
    word.copy_from_slice(&heap[offset..offset + WSIZE]);
    u64::from_le_bytes(word)
}

/// Writes one word at `offset`.
pub fn store(heap: &mut [u8], offset: usize, word: u64) {
    heap[offset..offset + WSIZE].copy_from_slice(&word.to_le_bytes());
}

/// Packs a size and allocated flag into one tag word.
#[must_use]
pub fn pack(size: usize, allocated: bool) -> u64 {
    debug_assert_eq!(size % ALIGNMENT, 0, "block sizes are 8-byte multiples");
    size as u64 | u64::from(allocated)
}

/// Size field of a tag word.
#[must_use]
pub fn size_of(word: u64) -> usize {
    (word & SIZE_MASK) as usize
}

/// Allocated flag of a tag word.
#[must_use]
pub fn is_allocated(word: u64) -> bool {
    word & ALLOC_BIT != 0
}

/// Header offset of the block with payload at `bp`.
#[must_use]
pub fn header_of(bp: usize) -> usize {
    bp - WSIZE
}

/// Size of the block with payload at `bp`.
#[must_use]
pub fn block_size(heap: &[u8], bp: usize) -> usize {
    size_of(load(heap, header_of(bp)))
}

/// Allocated flag of the block with payload at `bp`.
#[must_use]
pub fn block_allocated(heap: &[u8], bp: usize) -> bool {
    is_allocated(load(heap, header_of(bp)))
}

/// Footer offset of the block with payload at `bp`.
#[must_use]
pub fn footer_of(heap: &[u8], bp: usize) -> usize {
    bp + block_size(heap, bp) - DSIZE
}

/// Payload offset of the next block in address order.
#[must_use]
pub fn successor(heap: &[u8], bp: usize) -> usize {
    bp + block_size(heap, bp)
}

/// Payload offset of the previous block in address order, read through
/// the predecessor's footer.
#[must_use]
pub fn predecessor(heap: &[u8], bp: usize) -> usize {
    bp - size_of(load(heap, bp - DSIZE))
}

fn decode_link(word: u64) -> Option<usize> {
    if word == 0 { None } else { Some(word as usize) }
}

fn encode_link(link: Option<usize>) -> u64 {
    match link {
        Some(offset) => offset as u64,
        None => 0,
    }
}

/// Previous free-list neighbor of the free block at `bp`.
#[must_use]
pub fn prev_free(heap: &[u8], bp: usize) -> Option<usize> {
    decode_link(load(heap, bp))
}

/// Next free-list neighbor of the free block at `bp`.
#[must_use]
pub fn next_free(heap: &[u8], bp: usize) -> Option<usize> {
    decode_link(load(heap, bp + WSIZE))
}

/// Sets the previous free-list neighbor of the free block at `bp`.
pub fn set_prev_free(heap: &mut [u8], bp: usize, link: Option<usize>) {
    store(heap, bp, encode_link(link));
}

/// Sets the next free-list neighbor of the free block at `bp`.
pub fn set_next_free(heap: &mut [u8], bp: usize, link: Option<usize>) {
    store(heap, bp + WSIZE, encode_link(link));
}
