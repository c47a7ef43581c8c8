//! Classical Cheney two-space collector for the shared root heap
//! (spec.md §4.6). Simpler than the hierarchical collector: one
//! contiguous to-space, no levels, no entanglement checks. Its
//! forwarding, weak-fixup, and heap-swap discipline is what §4.3 reuses.

use crate::address::Address;
use crate::forward::compute_object_copy_parameters;
use crate::object::{self, Tag};
use crate::weak::WeakChain;
use memmap2::MmapMut;

/// One contiguous semispace. Bump-allocated from `start`, never
/// block-chunked the way hierarchical-heap levels are; the root heap is
/// one flat region.
pub struct Semispace {
    mmap: MmapMut,
    start: Address,
    size: usize,
}

impl Semispace {
    pub fn new(size: usize) -> Self {
        let mmap = MmapMut::map_anon(size).expect("mmap allocation for semispace failed");
        let start = Address::from_ptr(mmap.as_ptr() as *mut u8);
        Self { mmap, start, size }
    }

    pub fn start(&self) -> Address {
        self.start
    }
    pub fn limit(&self) -> Address {
        self.start.add(self.size)
    }
    pub fn size(&self) -> usize {
        self.size
    }
}

/// Root heap: two semispaces traded at every major collection, plus how
/// much of the active one is already-promoted "old generation" data that
/// a minor collection leaves untouched.
pub struct Heap {
    pub active: Semispace,
    pub secondary: Semispace,
    pub old_gen_size: usize,
    pub weaks: WeakChain,
}

impl Heap {
    pub fn new(size: usize) -> Self {
        Self {
            active: Semispace::new(size),
            secondary: Semispace::new(size),
            old_gen_size: 0,
            weaks: WeakChain::new(),
        }
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct CheneyStats {
    pub bytes_copied: usize,
    pub objects_copied: u64,
}

/// `forward_objptr`: unconditional copy-or-chase into `[to_start,
/// to_limit)`, bumping `*back`. No level bookkeeping; used by both the
/// major and minor Cheney paths.
pub unsafe fn forward_objptr(opp: Address, to_start: Address, to_limit: Address, back: &mut Address, stats: &mut CheneyStats) {
    let raw = opp.load_usize();
    if raw == 0 {
        return;
    }
    let addr = Address(raw);
    let header = object::read_header(addr);

    if header.forwarded {
        opp.store_usize(object::read_forward_pointer(addr).0);
        return;
    }

    let params = compute_object_copy_parameters(addr, header, false);
    let dest_header_addr = *back;
    let new_back = dest_header_addr.add(params.object_size);
    if new_back > to_limit {
        crate::fatal!(crate::error::Fatal::OutOfSpace { context: "cheney to-space exhausted" });
    }

    let src_header_addr = addr.sub(params.meta_size);
    std::ptr::copy_nonoverlapping(src_header_addr.to_ptr(), dest_header_addr.to_ptr(), params.copy_size);
    let new_addr = dest_header_addr.add(params.meta_size);

    object::write_forward_pointer(addr, new_addr);
    opp.store_usize(new_addr.0);
    *back = new_back;

    stats.bytes_copied += params.copy_size;
    stats.objects_copied += 1;
    let _ = to_start;
}

/// Like `forward_objptr`, but a no-op for anything outside `[nursery_start,
/// nursery_limit)`. Used by minor collections to skip already-promoted
/// old-generation objects.
pub unsafe fn forward_objptr_if_in_nursery(
    opp: Address,
    nursery_start: Address,
    nursery_limit: Address,
    to_start: Address,
    to_limit: Address,
    back: &mut Address,
    stats: &mut CheneyStats,
) {
    let raw = opp.load_usize();
    if raw == 0 {
        return;
    }
    let addr = Address(raw);
    if addr < nursery_start || addr >= nursery_limit {
        return;
    }
    forward_objptr(opp, to_start, to_limit, back, stats)
}

/// Scan `[scan_start, back)` as a Cheney queue: forward every pointer
/// slot of every object found, which may push `back` further out as new
/// objects are discovered.
unsafe fn cheney_scan(mut scan: Address, back: &mut Address, to_start: Address, to_limit: Address, stats: &mut CheneyStats) {
    while scan < *back {
        let header = object::read_header(scan);
        for i in 0..header.num_ptrs {
            let slot = object::ptr_slot(scan, header, i);
            forward_objptr(slot, to_start, to_limit, back, stats);
        }
        scan = scan.add(object::total_size(scan, header));
    }
}

/// Major collection (§4.6): the whole active space is condemned. Roots
/// come from `foreach_global`, supplied by the caller as raw slot
/// addresses.
pub unsafe fn major_collect(heap: &mut Heap, roots: &[Address]) -> CheneyStats {
    assert!(
        heap.secondary.size() >= heap.old_gen_size,
        "secondary semispace must be at least as large as the live old generation"
    );

    let to_start = heap.secondary.start();
    let to_limit = heap.secondary.limit();
    let mut back = to_start;
    let mut stats = CheneyStats::default();

    for &root in roots {
        forward_objptr(root, to_start, to_limit, &mut back, &mut stats);
    }
    cheney_scan(to_start, &mut back, to_start, to_limit, &mut stats);

    heap.weaks.fixup();

    std::mem::swap(&mut heap.active, &mut heap.secondary);
    heap.old_gen_size = back.offset_from(to_start) as usize;

    stats
}

/// Minor (generational) collection (§4.6): only the nursery, the bytes
/// allocated past `old_gen_size`, is condemned. `can_minor` mirrors the
/// original's generational on/off switch; when off, the nursery is
/// simply promoted in place by growing `old_gen_size`.
pub unsafe fn minor_collect(
    heap: &mut Heap,
    frontier: Address,
    can_minor: bool,
    roots: &[Address],
) -> CheneyStats {
    let nursery_start = heap.active.start().add(heap.old_gen_size);
    let bytes_allocated = frontier.offset_from(nursery_start).max(0) as usize;

    if bytes_allocated == 0 {
        return CheneyStats::default();
    }

    if !can_minor {
        heap.old_gen_size += bytes_allocated;
        return CheneyStats::default();
    }

    let to_start = heap.active.start().add(heap.old_gen_size);
    let to_limit = to_start.add(bytes_allocated);
    let nursery_limit = frontier;
    let mut back = to_start;
    let mut stats = CheneyStats::default();

    for &root in roots {
        forward_objptr_if_in_nursery(root, nursery_start, nursery_limit, to_start, to_limit, &mut back, &mut stats);
    }
    cheney_scan(to_start, &mut back, to_start, to_limit, &mut stats);

    heap.weaks.fixup();
    heap.old_gen_size += stats.bytes_copied;

    stats
}
