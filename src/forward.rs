//! The forwarding engine (spec.md §4.3, §4.4): `forward_hh_objptr` copies
//! or relocates an object into a target chunk list and installs a
//! forwarding pointer, chasing through the Cheney scan cursor.

use crate::address::{Address, ObjPtr};
use crate::chunk::{ChunkList, ChunkSlab};
use crate::constants::{HM_HH_INVALID_LEVEL, HM_MAX_NUM_LEVELS};
use crate::error::Fatal;
use crate::object::{self, Header, Tag};
use crate::stats::ForwardCounters;

/// Per-GC-invocation forwarding state (spec.md §3 "ForwardArgs").
pub struct ForwardArgs {
    pub min_level: u32,
    pub max_level: u32,
    /// `HM_HH_INVALID_LEVEL` while doing a ranged collection; a concrete
    /// level when this is a directed promotion instead.
    pub to_level: u32,
    pub to_space: Vec<Option<ChunkList>>,
    pub counters: ForwardCounters,
}

impl ForwardArgs {
    pub fn new(min_level: u32, max_level: u32) -> Self {
        let mut to_space = Vec::with_capacity(HM_MAX_NUM_LEVELS);
        to_space.resize_with(HM_MAX_NUM_LEVELS, || None);
        Self {
            min_level,
            max_level,
            to_level: HM_HH_INVALID_LEVEL,
            to_space,
            counters: ForwardCounters::default(),
        }
    }

    fn target_level(&self, object_level: u32) -> u32 {
        if self.to_level == HM_HH_INVALID_LEVEL {
            object_level
        } else {
            self.to_level
        }
    }
}

/// What level an address currently lives at, as seen by the chunk
/// directory. `None` means the address is outside the worker's chunk
/// arena entirely (e.g. the root heap), which is out of scope for HH
/// forwarding.
fn level_of(chunks: &ChunkSlab, addr: Address) -> Option<u32> {
    chunks.chunk_of(addr).map(|h| chunks.get(h).level())
}

/// Follow a chain of forwarding pointers to the final, non-forwarded
/// address.
unsafe fn chase_forwarding_chain(mut addr: Address) -> Address {
    loop {
        let header = object::read_header(addr);
        if header.forwarded {
            addr = object::read_forward_pointer(addr);
        } else {
            return addr;
        }
    }
}

/// Size parameters for copying one object (spec.md §4.4).
pub(crate) struct CopyParameters {
    pub meta_size: usize,
    pub object_size: usize,
    pub copy_size: usize,
}

/// `compute_object_copy_parameters`: tag-dispatched size computation.
/// `is_current` marks whether `addr` is the thread's currently-running
/// stack, which must not be shrunk below its live portion.
pub(crate) unsafe fn compute_object_copy_parameters(addr: Address, header: Header, is_current: bool) -> CopyParameters {
    let meta_size = object::meta_size(header.tag);
    match header.tag {
        Tag::Normal => {
            // Must match `object::total_size`'s NORMAL formula exactly, or
            // the scan cursor that walks a chunk by `total_size` after
            // collection desyncs from what was actually bumped here.
            let object_size = object::object_size(header);
            CopyParameters { meta_size, object_size, copy_size: object_size }
        }
        Tag::Sequence => {
            let len = object::read_seq_length(addr);
            let body = len * (header.bytes_non_ptr as usize + header.num_ptrs as usize * crate::constants::PTR_SIZE);
            let object_size = meta_size + object::align_up(body, crate::constants::PTR_SIZE);
            CopyParameters { meta_size, object_size, copy_size: object_size }
        }
        Tag::Stack => {
            let (reserved, used) = object::read_stack_extra(addr);
            let reserved_new = shrink_reserved(reserved, used, is_current);
            if reserved_new < reserved {
                object::write_stack_extra(addr, reserved_new, used);
            }
            let object_size = meta_size + object::align_up(reserved_new, crate::constants::PTR_SIZE);
            let copy_size = meta_size + used;
            CopyParameters { meta_size, object_size, copy_size }
        }
        Tag::Weak => {
            crate::fatal!(Fatal::UnsupportedObject { tag: "WEAK_TAG" });
        }
    }
}

/// Shrink an oversized stack's reservation down toward what's actually
/// used, never below it, and never touching a currently-running stack's
/// live frames more aggressively than halving per collection.
fn shrink_reserved(reserved: usize, used: usize, is_current: bool) -> usize {
    if is_current {
        return reserved;
    }
    let shrunk = (reserved / 2).max(used);
    shrunk.min(reserved)
}

/// `copy_object`: place a copy of `copy_size` bytes starting at `src`
/// (object header address) into the last chunk of `target`, allocating a
/// fresh chunk if there isn't room. Returns the new object's address
/// (i.e. past the metadata header).
unsafe fn copy_object(
    chunks: &mut ChunkSlab,
    target: &mut ChunkList,
    src_header_addr: Address,
    meta_size: usize,
    object_size: usize,
    copy_size: usize,
) -> Address {
    let need_new_chunk = match target.last_chunk() {
        None => true,
        Some(h) => {
            let chunk = chunks.get(h);
            chunk.remaining() < object_size || !chunk.in_first_block(chunk.frontier().add(object_size))
        }
    };

    if need_new_chunk {
        let handle = chunks.allocate(object_size.max(crate::constants::HM_BLOCK_SIZE));
        target.append(chunks, handle, chunks.get(handle).size());
    }

    let handle = target.last_chunk().expect("chunk list just ensured non-empty");
    let chunk = chunks.get_mut(handle);
    let dest_header_addr = chunk.bump(object_size);

    std::ptr::copy_nonoverlapping(
        src_header_addr.to_ptr(),
        dest_header_addr.to_ptr(),
        copy_size,
    );

    // A fresh chunk may be needed immediately if we just crossed the
    // first-block boundary, so the *next* copy doesn't have to allocate
    // mid-object (§4.4).
    if !chunk.in_first_block(chunk.frontier()) {
        let handle = chunks.allocate(crate::constants::HEAP_LIMIT_SLOP);
        let size = chunks.get(handle).size();
        target.append(chunks, handle, size);
    }

    dest_header_addr.add(meta_size)
}

/// Forward the ObjPtr slot at `opp` (spec.md §4.3). Rewrites `*opp` in
/// place.
pub unsafe fn forward_hh_objptr(
    opp: Address,
    args: &mut ForwardArgs,
    chunks: &mut ChunkSlab,
    levels: &mut [Option<ChunkList>],
    is_current_stack: impl Fn(Address) -> bool,
) {
    let raw = opp.load_usize();
    if raw == 0 {
        return; // not a pointer
    }
    let op = Address(raw);

    let level = match level_of(chunks, op) {
        Some(l) => l,
        None => return, // points into the root heap: out of scope
    };

    if level > args.max_level {
        crate::fatal!(Fatal::Entanglement { level, max_level: args.max_level });
    }

    let header = object::read_header(op);
    let src_chunk_handle = chunks
        .chunk_of(op)
        .expect("object level resolved above implies a containing chunk");
    // A single-object chunk relinked into to-space keeps its address and
    // installs no forwarding pointer, so a second reference to it would
    // otherwise fall through and get relinked again (§4.3 step 3).
    let already_to_space = header.forwarded || chunks.get(src_chunk_handle).in_to_space();
    if level < args.min_level || already_to_space {
        let resolved = chase_forwarding_chain(op);
        opp.store_usize(resolved.0);
        return;
    }

    let is_current = is_current_stack(op);
    let params = compute_object_copy_parameters(op, header, is_current);
    let target_level = args.target_level(level);

    if args.to_space[target_level as usize].is_none() {
        args.to_space[target_level as usize] = Some(ChunkList::new_to_space(target_level));
    }

    let is_single_object = chunks.get(src_chunk_handle).is_single_object();

    if is_single_object {
        // Relink the whole chunk in O(1): the object never moves.
        let src_chunk_size = chunks.get(src_chunk_handle).size();
        if let Some(src_list) = levels[level as usize].as_mut() {
            src_list.unlink(src_chunk_handle, src_chunk_size);
        }
        let target = args.to_space[target_level as usize].as_mut().unwrap();
        target.append(chunks, src_chunk_handle, src_chunk_size);
        let fresh = chunks.allocate(crate::constants::HEAP_LIMIT_SLOP);
        let fresh_size = chunks.get(fresh).size();
        target.append(chunks, fresh, fresh_size);

        args.counters.bytes_moved += params.copy_size;
        args.counters.objects_moved += 1;
        if matches!(header.tag, Tag::Stack) {
            args.counters.stacks_copied += 1;
        }
        // No forwarding pointer: the address is unchanged.
        return;
    }

    let src_header_addr = op.sub(params.meta_size);
    let target = args.to_space[target_level as usize].as_mut().unwrap();
    let new_addr = copy_object(
        chunks,
        target,
        src_header_addr,
        params.meta_size,
        params.object_size,
        params.copy_size,
    );

    object::write_forward_pointer(op, new_addr);
    opp.store_usize(new_addr.0);

    args.counters.bytes_copied += params.copy_size;
    args.counters.objects_copied += 1;
    if matches!(header.tag, Tag::Stack) {
        args.counters.stacks_copied += 1;
    }
}

/// Iterate the pointer slots of a NORMAL/SEQUENCE/STACK object at `addr`
/// and call `forward_hh_objptr` on each, skipping thread/stack headers
/// when `skip_stack_and_thread` is set (§4.5 step 7).
pub unsafe fn forward_objptrs_in_object(
    addr: Address,
    args: &mut ForwardArgs,
    chunks: &mut ChunkSlab,
    levels: &mut [Option<ChunkList>],
    is_current_stack: &impl Fn(Address) -> bool,
) {
    let header = object::read_header(addr);
    for i in 0..header.num_ptrs {
        let slot = object::ptr_slot(addr, header, i);
        forward_hh_objptr(slot, args, chunks, levels, is_current_stack);
    }
}

/// Raw ObjPtr variant used by root-enumeration call sites that already
/// hold an `ObjPtr` rather than a slot address (the deque, globals).
pub unsafe fn forward_objptr_value(
    value: ObjPtr,
    args: &mut ForwardArgs,
    chunks: &mut ChunkSlab,
    levels: &mut [Option<ChunkList>],
    is_current_stack: &impl Fn(Address) -> bool,
) -> ObjPtr {
    match value.address() {
        None => value,
        Some(addr) => {
            // Stage the value through a stack slot so forward_hh_objptr's
            // slot-rewrite contract (`*opp`) applies uniformly.
            let mut slot = addr.0;
            let slot_addr = Address(&mut slot as *mut usize as usize);
            forward_hh_objptr(slot_addr, args, chunks, levels, is_current_stack);
            ObjPtr::of(Address(slot))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{write_header, Header, Tag};

    unsafe fn alloc_normal(chunks: &mut ChunkSlab, list: &mut ChunkList, num_ptrs: u32) -> Address {
        let handle = chunks.allocate(4096);
        list.append(chunks, handle, chunks.get(handle).size());
        let chunk = chunks.get_mut(handle);
        let header_addr = chunk.bump(object::meta_size(Tag::Normal) + num_ptrs as usize * 8);
        let obj_addr = header_addr.add(object::meta_size(Tag::Normal));
        write_header(
            obj_addr,
            Header { tag: Tag::Normal, forwarded: false, num_ptrs, bytes_non_ptr: 0 },
        );
        obj_addr
    }

    fn empty_levels() -> Vec<Option<ChunkList>> {
        let mut levels = Vec::with_capacity(HM_MAX_NUM_LEVELS);
        levels.resize_with(HM_MAX_NUM_LEVELS, || None);
        levels
    }

    #[test]
    fn forward_copies_normal_object_and_installs_forwarding_pointer() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut levels = empty_levels();
            levels[2] = Some(ChunkList::new(2));
            let obj = alloc_normal(&mut chunks, levels[2].as_mut().unwrap(), 0);

            let mut args = ForwardArgs::new(1, 2);
            let mut slot = obj.0;
            let slot_addr = Address(&mut slot as *mut usize as usize);
            forward_hh_objptr(slot_addr, &mut args, &mut chunks, &mut levels, &|_| false);

            assert_ne!(slot, obj.0, "object should have moved to a new address");
            assert_eq!(args.counters.objects_copied, 1);
            let header = object::read_header(obj);
            assert!(header.forwarded);
        }
    }

    #[test]
    fn forward_below_min_level_is_left_alone() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut levels = empty_levels();
            levels[0] = Some(ChunkList::new(0));
            let obj = alloc_normal(&mut chunks, levels[0].as_mut().unwrap(), 0);

            let mut args = ForwardArgs::new(1, 5);
            let mut slot = obj.0;
            let slot_addr = Address(&mut slot as *mut usize as usize);
            forward_hh_objptr(slot_addr, &mut args, &mut chunks, &mut levels, &|_| false);

            assert_eq!(slot, obj.0, "object below min_level must not move");
            assert_eq!(args.counters.objects_copied, 0);
        }
    }

    #[test]
    fn forward_single_object_chunk_relinked_once_across_two_references() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut levels = empty_levels();
            levels[2] = Some(ChunkList::new(2));
            // A lone object in its own chunk: the single-object relink
            // fast path, not the copy path.
            let obj = alloc_normal(&mut chunks, levels[2].as_mut().unwrap(), 0);

            let mut args = ForwardArgs::new(1, 2);
            let mut slot_a = obj.0;
            let mut slot_b = obj.0;
            let slot_a_addr = Address(&mut slot_a as *mut usize as usize);
            let slot_b_addr = Address(&mut slot_b as *mut usize as usize);

            forward_hh_objptr(slot_a_addr, &mut args, &mut chunks, &mut levels, &|_| false);
            forward_hh_objptr(slot_b_addr, &mut args, &mut chunks, &mut levels, &|_| false);

            assert_eq!(slot_a, obj.0, "relinked object keeps its address");
            assert_eq!(slot_b, obj.0);
            assert_eq!(args.counters.objects_moved, 1, "second reference must not re-relink");
            assert_eq!(args.counters.objects_copied, 0);

            let to_space_chunks = &args.to_space[2].as_ref().unwrap().chunks;
            let handle = chunks.chunk_of(obj).unwrap();
            assert_eq!(
                to_space_chunks.iter().filter(|&&h| h == handle).count(),
                1,
                "the chunk handle must appear in to-space exactly once"
            );
        }
    }

    #[test]
    fn null_slot_is_a_no_op() {
        unsafe {
            let mut chunks = ChunkSlab::new();
            let mut levels = empty_levels();
            let mut args = ForwardArgs::new(1, 5);
            let mut slot: usize = 0;
            let slot_addr = Address(&mut slot as *mut usize as usize);
            forward_hh_objptr(slot_addr, &mut args, &mut chunks, &mut levels, &|_| false);
            assert_eq!(slot, 0);
        }
    }
}
