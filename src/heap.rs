//! Entity types tying the rest of the crate together (spec.md §3
//! "Entities"): `HierarchicalHeap`, `Thread`, and the per-worker bundle
//! that owns both plus a deque and chunk arena.

use crate::address::{Address, ObjPtr};
use crate::chunk::{ChunkHandle, ChunkList, ChunkSlab};
use crate::constants::HM_MAX_NUM_LEVELS;
use crate::deque::ChaseLevDeque;
use crate::stats::CumulativeStatistics;

/// Per-worker array of chunk lists indexed by task-nesting depth. Slots
/// are populated on demand; `levels[0]` is adjacent to the root heap.
pub struct HierarchicalHeap {
    pub levels: Vec<Option<ChunkList>>,
    pub last_allocated_chunk: Option<ChunkHandle>,
    pub collection_threshold: usize,
    pub bytes_allocated_since_last_collection: usize,
}

impl HierarchicalHeap {
    pub fn new(collection_threshold: usize) -> Self {
        let mut levels = Vec::with_capacity(HM_MAX_NUM_LEVELS);
        levels.resize_with(HM_MAX_NUM_LEVELS, || None);
        Self {
            levels,
            last_allocated_chunk: None,
            collection_threshold,
            bytes_allocated_since_last_collection: 0,
        }
    }

    pub fn level_mut(&mut self, level: u32) -> &mut Option<ChunkList> {
        &mut self.levels[level as usize]
    }

    pub fn level(&self, level: u32) -> Option<&ChunkList> {
        self.levels[level as usize].as_ref()
    }

    pub fn ensure_level(&mut self, level: u32) -> &mut ChunkList {
        self.levels[level as usize].get_or_insert_with(|| ChunkList::new(level))
    }

    /// `HM_HH_desiredCollectionScope`: how deep a collection should reach,
    /// given how much has been allocated since the last one. A fuller
    /// policy would weigh per-level sizes; this crate ties it to the
    /// single cumulative counter tracked on the HH (§6 Policy).
    pub fn desired_collection_scope(&self, current_depth: u32, min_local_level: u32) -> u32 {
        if self.bytes_allocated_since_last_collection >= self.collection_threshold {
            min_local_level.max(1)
        } else {
            current_depth + 1
        }
    }
}

/// Per-worker mutator-visible state (spec.md §3 "Thread").
pub struct Thread {
    pub current_depth: u32,
    pub exn_stack: usize,
    pub current_stack: ObjPtr,
    pub bytes_needed: usize,
    pub bytes_survived_last_collection: usize,
}

impl Thread {
    pub fn new() -> Self {
        Self {
            current_depth: 0,
            exn_stack: 0,
            current_stack: ObjPtr::BOGUS,
            bytes_needed: 0,
            bytes_survived_last_collection: 0,
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutator-visible frontier/limit bookkeeping published out of the HH's
/// last chunk while the mutator is running (§3 "Heap" invariant).
#[derive(Clone, Copy, Default, Debug)]
pub struct MutatorFrontier {
    pub frontier: Option<Address>,
    pub limit: Option<Address>,
    pub limit_plus_slop: Option<Address>,
}

/// Everything one worker owns: a deque for load balancing, a chunk arena,
/// a hierarchical heap, a thread record, and cumulative statistics.
pub struct Worker {
    pub deque: ChaseLevDeque<ObjPtr>,
    pub chunks: ChunkSlab,
    pub hh: HierarchicalHeap,
    pub thread: Thread,
    pub frontier: MutatorFrontier,
    pub stats: CumulativeStatistics,
}

impl Worker {
    pub fn new(collection_threshold: usize) -> Self {
        Self {
            deque: ChaseLevDeque::new(),
            chunks: ChunkSlab::new(),
            hh: HierarchicalHeap::new(collection_threshold),
            thread: Thread::new(),
            frontier: MutatorFrontier::default(),
            stats: CumulativeStatistics::default(),
        }
    }
}
