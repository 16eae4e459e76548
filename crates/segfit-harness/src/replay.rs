//! Trace replay with property verification.
//!
//! Replays a parsed trace against a fresh heap. Every allocation is
//! checked for alignment and sufficiency and its payload filled with an
//! id-derived pattern; the pattern is re-verified on free and resize, so
//! any overlap between live blocks surfaces as payload damage. The heap
//! consistency checker can additionally run every N operations.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use segfit_core::{Heap, HeapError, VecSource, check};

use crate::trace::TraceOp;

/// Replay failure: either a broken trace or a violated allocator property.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("heap init failed: {0}")]
    Init(#[from] HeapError),
    #[error("op {step}: id {id} is not live")]
    UnknownId { step: usize, id: usize },
    #[error("op {step}: id {id} is already live")]
    DuplicateId { step: usize, id: usize },
    #[error("op {step}: heap exhausted on request of {size} bytes")]
    OutOfMemory { step: usize, size: usize },
    #[error("op {step}: offset {offset} is not 8-byte aligned")]
    Misaligned { step: usize, offset: usize },
    #[error("op {step}: block holds {got} usable bytes, requested {want}")]
    Undersized { step: usize, got: usize, want: usize },
    #[error("op {step}: payload of id {id} damaged")]
    PayloadDamaged { step: usize, id: usize },
    #[error("op {step}: heap inconsistent ({count} violations, first: {first})")]
    Inconsistent {
        step: usize,
        count: usize,
        first: String,
    },
}

/// Replay configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaySettings {
    /// Cap on total heap growth in bytes; `None` is unbounded.
    pub heap_limit: Option<usize>,
    /// Run the consistency checker every N operations.
    pub check_every: Option<usize>,
}

/// Summary of a successful replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub ops_replayed: usize,
    pub allocations: u64,
    pub releases: u64,
    pub resizes: u64,
    pub splits: u64,
    pub whole_block_placements: u64,
    pub coalesce_events: u64,
    pub growth_events: u64,
    pub growth_bytes: u64,
    pub peak_live_bytes: usize,
    pub final_heap_bytes: usize,
    /// `peak_live_bytes * 1000 / final_heap_bytes`.
    pub utilization_permille: u16,
}

struct LiveBlock {
    offset: usize,
    size: usize,
    fill: u8,
}

fn fill_for(id: usize) -> u8 {
    (id.wrapping_mul(151) % 255) as u8 + 1
}

/// Replays `ops` against a fresh heap and verifies allocator properties.
pub fn replay(ops: &[TraceOp], settings: &ReplaySettings) -> Result<ReplayReport, ReplayError> {
    let source = match settings.heap_limit {
        Some(limit) => VecSource::with_limit(limit),
        None => VecSource::new(),
    };
    let mut heap = Heap::new(source)?;
    let mut live: HashMap<usize, LiveBlock> = HashMap::new();
    let mut live_bytes = 0usize;
    let mut peak_live_bytes = 0usize;

    for (step, &op) in ops.iter().enumerate() {
        match op {
            TraceOp::Alloc { id, size } => {
                if live.contains_key(&id) {
                    return Err(ReplayError::DuplicateId { step, id });
                }
                if size == 0 {
                    // A zero-size allocate is a contractual no-op, not an
                    // exhaustion; nothing becomes live under this id.
                    heap.allocate(0);
                    continue;
                }
                let offset = heap
                    .allocate(size)
                    .ok_or(ReplayError::OutOfMemory { step, size })?;
                verify_block(&heap, step, offset, size)?;
                let fill = fill_for(id);
                heap.payload_mut(offset, size).fill(fill);
                live.insert(id, LiveBlock { offset, size, fill });
                live_bytes += size;
                peak_live_bytes = peak_live_bytes.max(live_bytes);
            }
            TraceOp::Resize { id, size } => {
                let block = live.get(&id).ok_or(ReplayError::UnknownId { step, id })?;
                let old_offset = block.offset;
                let old_size = block.size;
                let old_fill = block.fill;
                if size == 0 {
                    // Resize to zero releases the block and returns no
                    // offset; the id stops being live.
                    if heap
                        .payload(old_offset, old_size)
                        .iter()
                        .any(|&b| b != old_fill)
                    {
                        return Err(ReplayError::PayloadDamaged { step, id });
                    }
                    heap.resize(Some(old_offset), 0);
                    live.remove(&id);
                    live_bytes -= old_size;
                } else {
                    let offset = heap
                        .resize(Some(old_offset), size)
                        .ok_or(ReplayError::OutOfMemory { step, size })?;
                    verify_block(&heap, step, offset, size)?;
                    let keep = old_size.min(size);
                    if heap.payload(offset, keep).iter().any(|&b| b != old_fill) {
                        return Err(ReplayError::PayloadDamaged { step, id });
                    }
                    let fill = fill_for(id);
                    heap.payload_mut(offset, size).fill(fill);
                    live.insert(id, LiveBlock { offset, size, fill });
                    live_bytes = live_bytes - old_size + size;
                    peak_live_bytes = peak_live_bytes.max(live_bytes);
                }
            }
            TraceOp::Free { id } => {
                let block = live.remove(&id).ok_or(ReplayError::UnknownId { step, id })?;
                if heap
                    .payload(block.offset, block.size)
                    .iter()
                    .any(|&b| b != block.fill)
                {
                    return Err(ReplayError::PayloadDamaged { step, id });
                }
                heap.release(block.offset);
                live_bytes -= block.size;
            }
        }

        if settings
            .check_every
            .is_some_and(|every| every > 0 && step % every == 0)
        {
            let violations = check::verify(&heap);
            if let Some(first) = violations.first() {
                return Err(ReplayError::Inconsistent {
                    step,
                    count: violations.len(),
                    first: first.clone(),
                });
            }
        }
    }

    let stats = heap.stats();
    let final_heap_bytes = heap.heap_len();
    let utilization_permille = if final_heap_bytes == 0 {
        0
    } else {
        ((peak_live_bytes.saturating_mul(1000)) / final_heap_bytes) as u16
    };

    Ok(ReplayReport {
        ops_replayed: ops.len(),
        allocations: stats.allocations,
        releases: stats.releases,
        resizes: stats.resizes,
        splits: stats.splits,
        whole_block_placements: stats.whole_block_placements,
        coalesce_events: stats.merged_with_successor
            + stats.merged_with_predecessor
            + stats.merged_with_both,
        growth_events: stats.growth_events,
        growth_bytes: stats.growth_bytes,
        peak_live_bytes,
        final_heap_bytes,
        utilization_permille,
    })
}

fn verify_block<S: segfit_core::HeapSource>(
    heap: &Heap<S>,
    step: usize,
    offset: usize,
    want: usize,
) -> Result<(), ReplayError> {
    if offset % 8 != 0 {
        return Err(ReplayError::Misaligned { step, offset });
    }
    let got = heap.usable_size(offset);
    if got < want {
        return Err(ReplayError::Undersized { step, got, want });
    }
    Ok(())
}
