//! Pre/postcondition predicates (spec.md §2 component 9, §8 "Testable
//! properties"). These are not part of the collection algorithm itself;
//! they are assertions the mutator facade and hierarchical collector call
//! in debug builds, and oracles the test suite calls directly, mirroring
//! how `invariant.c` in the original is a leaf module with no callers
//! outside of `ASSERT`-gated call sites.

use crate::address::Address;
use crate::chunk::ChunkSlab;
use crate::heap::{HierarchicalHeap, Worker};
use crate::object::{self, Tag};

/// §3 "Heap" invariant / §8 property 7: `frontier <= limit`, `limit ==
/// limit_plus_slop - HEAP_LIMIT_SLOP`, and the frontier still sits in the
/// first block of its chunk (so the mutator can keep bump-allocating
/// without an allocator call on every object).
pub fn invariant_for_mutator_frontier(worker: &Worker) -> bool {
    let (Some(frontier), Some(limit), Some(limit_plus_slop)) =
        (worker.frontier.frontier, worker.frontier.limit, worker.frontier.limit_plus_slop)
    else {
        // No chunk published yet (e.g. the HH was fully reclaimed) is a
        // valid resting state between `collect_local` and the facade's
        // own re-publish step.
        return true;
    };

    if frontier > limit || limit > limit_plus_slop {
        return false;
    }

    match worker.hh.last_allocated_chunk {
        Some(handle) => worker.chunks.get(handle).in_first_block(frontier),
        None => true,
    }
}

/// §4.1 / §8 property 2: `0 <= bot - top <= CAP` always holds for a
/// Chase-Lev deque. Exposed here (rather than only inlined in `deque.rs`)
/// so property-style tests can call it as an oracle after arbitrary
/// sequences of operations.
pub fn deque_capacity_invariant(len: u64) -> bool {
    len <= crate::constants::CAP
}

/// §8 property 6: a stack's `reserved` field may only shrink (or stay
/// put) across a collection, and `used` must never change; collection
/// reclaims slack, it never discards live frames.
pub fn stack_shrink_is_monotonic(
    reserved_before: usize,
    used_before: usize,
    reserved_after: usize,
    used_after: usize,
) -> bool {
    reserved_after <= reserved_before && used_after == used_before
}

/// §3 "Hierarchy" invariant / §8 property 5: after a collection, no
/// object at level `a` holds a pointer to an object at a strictly deeper
/// level `b > a`. Walks every live object in every populated level of
/// `hh`, which makes it O(live set). Intended as a test oracle and a
/// `debug_assertions`-gated postcondition of `collect_local`, not a hot
/// path.
pub fn no_cross_level_forwarding(hh: &HierarchicalHeap, chunks: &ChunkSlab) -> bool {
    for (level_idx, slot) in hh.levels.iter().enumerate() {
        let Some(list) = slot else { continue };
        let level = level_idx as u32;
        for &handle in &list.chunks {
            let chunk = chunks.get(handle);
            let mut scan = chunk.start();
            let frontier = chunk.frontier();
            while scan < frontier {
                let header = unsafe { object::read_header(scan) };
                if !matches!(header.tag, Tag::Stack) {
                    for i in 0..header.num_ptrs {
                        let slot_addr = unsafe { object::ptr_slot(scan, header, i) };
                        let raw = unsafe { slot_addr.load_usize() };
                        if raw != 0 {
                            if let Some(referent_handle) = chunks.chunk_of(Address(raw)) {
                                if chunks.get(referent_handle).level() > level {
                                    return false;
                                }
                            }
                        }
                    }
                }
                scan = scan.add(unsafe { object::total_size(scan, header) });
            }
        }
    }
    true
}
