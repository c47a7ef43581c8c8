//! Chunk arena: OS-backed storage for hierarchical-heap levels (spec.md
//! §3 "Heap"/"Chunk list"). Each `Chunk` is one `memmap2::MmapMut`
//! allocation; a `ChunkList` is the ordered sequence of chunks belonging
//! to one (hh, level) pair.
//!
//! The original indexes chunks by masking an address down to its
//! containing block (`HM_getChunkOf`). We keep the same query surface,
//! "which chunk owns this address", but answer it with a directory
//! (`BTreeMap` keyed by chunk start) instead of pointer-arithmetic
//! masking, and index chunks by a stable handle instead of an intrusive
//! linked list, so that removal never invalidates a neighbor's link.

use crate::address::Address;
use crate::constants::{HEAP_LIMIT_SLOP, HM_BLOCK_SIZE};
use memmap2::MmapMut;
use std::collections::BTreeMap;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ChunkHandle(pub u32);

/// One contiguous mmap'd region. `frontier` is where the mutator (or a
/// collector doing a copy) will write next; `limit` is one past the last
/// byte usable before a new chunk must be allocated.
pub struct Chunk {
    mmap: MmapMut,
    start: Address,
    frontier: Address,
    limit: Address,
    /// True once more than one object has been placed in this chunk.
    /// A chunk holding exactly one (large) object can be relinked between
    /// chunk lists instead of copied (§4.3 step 8 "single-object chunk").
    might_contain_multiple_objects: bool,
    /// Level of the `ChunkList` currently holding this chunk. Kept in
    /// sync by `ChunkList::append`/`unlink` so the forwarding engine can
    /// answer "what level is this address at" without walking every list.
    level: u32,
    /// True while this chunk sits in a to-space `ChunkList` for the
    /// collection in progress. A single-object chunk relinked into
    /// to-space installs no forwarding pointer, so this is how
    /// `forward_hh_objptr` recognizes a second reference to the same
    /// object and avoids relinking it twice.
    in_to_space: bool,
}

impl Chunk {
    fn new(size: usize) -> Self {
        let mmap = MmapMut::map_anon(size).expect("mmap allocation for chunk failed");
        let start = Address::from_ptr(mmap.as_ptr() as *mut u8);
        Self {
            mmap,
            start,
            frontier: start,
            limit: start.add(size),
            might_contain_multiple_objects: false,
            level: 0,
            in_to_space: false,
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn set_level(&mut self, level: u32) {
        self.level = level;
    }

    pub fn in_to_space(&self) -> bool {
        self.in_to_space
    }

    pub fn set_in_to_space(&mut self, in_to_space: bool) {
        self.in_to_space = in_to_space;
    }

    pub fn start(&self) -> Address {
        self.start
    }
    pub fn frontier(&self) -> Address {
        self.frontier
    }
    pub fn limit(&self) -> Address {
        self.limit
    }
    pub fn size(&self) -> usize {
        self.mmap.len()
    }
    pub fn is_single_object(&self) -> bool {
        !self.might_contain_multiple_objects
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.limit
    }

    /// True while `addr` sits in the first `HM_BLOCK_SIZE` bytes, the
    /// region the mutator is allowed to have its frontier resting in
    /// between safepoints (§3 "Heap" invariant).
    pub fn in_first_block(&self, addr: Address) -> bool {
        addr.offset_from(self.start) < HM_BLOCK_SIZE as isize
    }

    /// Bump the frontier by `bytes`, marking the chunk multi-object if it
    /// already held something. Caller guarantees `bytes <= limit - frontier`.
    pub fn bump(&mut self, bytes: usize) -> Address {
        let result = self.frontier;
        if result != self.start {
            self.might_contain_multiple_objects = true;
        }
        self.frontier = self.frontier.add(bytes);
        result
    }

    pub fn remaining(&self) -> usize {
        (self.limit.offset_from(self.frontier)).max(0) as usize
    }
}

/// Backing store for every chunk a worker owns, addressable by stable
/// handle. Chunks are never moved once allocated (the `MmapMut` owns
/// fixed memory), so handles stay valid across pushes/removals.
#[derive(Default)]
pub struct ChunkSlab {
    chunks: Vec<Option<Chunk>>,
    free: Vec<u32>,
    /// Maps a chunk's start address to its handle, so `chunk_of` can find
    /// the owning chunk for an arbitrary interior address via a single
    /// range lookup instead of scanning every chunk list.
    directory: BTreeMap<usize, ChunkHandle>,
}

impl ChunkSlab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, min_size: usize) -> ChunkHandle {
        let size = min_size.max(HM_BLOCK_SIZE) + HEAP_LIMIT_SLOP;
        let chunk = Chunk::new(size);
        let start = chunk.start();

        let handle = if let Some(idx) = self.free.pop() {
            self.chunks[idx as usize] = Some(chunk);
            ChunkHandle(idx)
        } else {
            self.chunks.push(Some(chunk));
            ChunkHandle((self.chunks.len() - 1) as u32)
        };

        self.directory.insert(start.0, handle);
        handle
    }

    pub fn get(&self, handle: ChunkHandle) -> &Chunk {
        self.chunks[handle.0 as usize]
            .as_ref()
            .expect("dangling ChunkHandle")
    }

    pub fn get_mut(&mut self, handle: ChunkHandle) -> &mut Chunk {
        self.chunks[handle.0 as usize]
            .as_mut()
            .expect("dangling ChunkHandle")
    }

    /// Free a chunk's storage. Callers must have already unlinked it from
    /// every `ChunkList` that referenced it.
    pub fn free(&mut self, handle: ChunkHandle) {
        let start = self.get(handle).start();
        self.directory.remove(&start.0);
        self.chunks[handle.0 as usize] = None;
        self.free.push(handle.0);
    }

    /// `HM_getChunkOf`: find the chunk containing `addr`, if any.
    pub fn chunk_of(&self, addr: Address) -> Option<ChunkHandle> {
        let (_, &handle) = self.directory.range(..=addr.0).next_back()?;
        if self.get(handle).contains(addr) {
            Some(handle)
        } else {
            None
        }
    }
}

/// The down-pointer recorded when an object in a shallower level's chunk
/// list gets a pointer written into a deeper level (§3 "Remembered set").
#[derive(Clone, Copy, Debug)]
pub struct DownPointer {
    pub from: Address,
    pub to: Address,
    pub to_level: u32,
}

/// All chunks belonging to one (hh, level) pair, plus that level's
/// remembered set of down-pointers into deeper levels.
pub struct ChunkList {
    pub level: u32,
    /// Handles in allocation order; the last entry is where new
    /// allocations land (`lastAllocatedChunk` in the original).
    pub chunks: Vec<ChunkHandle>,
    pub size: usize,
    pub is_in_to_space: bool,
    /// `COPY_OBJECT_HH_VALUE` while `is_in_to_space`; the real owning
    /// worker id once merged back (§3 "To-space" invariant).
    pub containing_hh: u64,
    pub remembered_set: Vec<DownPointer>,
}

impl ChunkList {
    pub fn new(level: u32) -> Self {
        Self {
            level,
            chunks: Vec::new(),
            size: 0,
            is_in_to_space: false,
            containing_hh: 0,
            remembered_set: Vec::new(),
        }
    }

    /// `new_chunk_list(COPY_OBJECT_HH_VALUE, level)`: a list created as a
    /// to-space target during collection.
    pub fn new_to_space(level: u32) -> Self {
        let mut list = Self::new(level);
        list.is_in_to_space = true;
        list.containing_hh = crate::constants::COPY_OBJECT_HH_VALUE;
        list
    }

    pub fn last_chunk(&self) -> Option<ChunkHandle> {
        self.chunks.last().copied()
    }

    pub fn append(&mut self, slab: &mut ChunkSlab, handle: ChunkHandle, size: usize) {
        let chunk = slab.get_mut(handle);
        chunk.set_level(self.level);
        chunk.set_in_to_space(self.is_in_to_space);
        self.chunks.push(handle);
        self.size += size;
    }

    /// Remove `handle` from this list (used when relinking a
    /// single-object chunk into another list, §4.3 step 8).
    pub fn unlink(&mut self, handle: ChunkHandle, size: usize) {
        if let Some(pos) = self.chunks.iter().position(|&h| h == handle) {
            self.chunks.remove(pos);
            self.size -= size;
        }
    }

    pub fn record_down_pointer(&mut self, ptr: DownPointer) {
        self.remembered_set.push(ptr);
    }

    pub fn take_remembered_set(&mut self) -> Vec<DownPointer> {
        std::mem::take(&mut self.remembered_set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_find() {
        let mut slab = ChunkSlab::new();
        let h = slab.allocate(64);
        let start = slab.get(h).start();
        assert_eq!(slab.chunk_of(start), Some(h));
        assert_eq!(slab.chunk_of(start.add(8)), Some(h));
    }

    #[test]
    fn address_outside_any_chunk_is_none() {
        let mut slab = ChunkSlab::new();
        let h = slab.allocate(64);
        let far = slab.get(h).limit().add(4096);
        assert_eq!(slab.chunk_of(far), None);
    }

    #[test]
    fn free_removes_from_directory() {
        let mut slab = ChunkSlab::new();
        let h = slab.allocate(64);
        let start = slab.get(h).start();
        slab.free(h);
        assert_eq!(slab.chunk_of(start), None);
    }

    #[test]
    fn chunk_list_append_and_unlink_track_size() {
        let mut slab = ChunkSlab::new();
        let h1 = slab.allocate(64);
        let h2 = slab.allocate(64);
        let mut list = ChunkList::new(0);
        list.append(&mut slab, h1, 100);
        list.append(&mut slab, h2, 200);
        assert_eq!(list.size, 300);
        list.unlink(h1, 100);
        assert_eq!(list.size, 200);
        assert_eq!(list.chunks, vec![h2]);
    }

    #[test]
    fn bump_marks_multi_object_after_first() {
        let mut slab = ChunkSlab::new();
        let h = slab.allocate(64);
        let chunk = slab.get_mut(h);
        assert!(chunk.is_single_object());
        chunk.bump(16);
        assert!(chunk.is_single_object());
        chunk.bump(16);
        assert!(!chunk.is_single_object());
    }
}
