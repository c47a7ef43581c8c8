//! Hierarchical local collection (spec.md §4.5): a depth-ranged,
//! Cheney-style copy within one worker's own level stack. Ported from
//! `examples/original_source/runtime/gc/hierarchical-heap-collection.c`'s
//! `HM_HHC_collectLocal`.

use crate::address::{Address, ObjPtr};
use crate::chunk::{ChunkList, DownPointer};
use crate::config::{CollectionLevel, Config};
use crate::forward::{self, ForwardArgs};
use crate::heap::Worker;
use crate::local_scope;
use crate::object::{self, Tag};
use crate::stats::{CollectionReport, LevelDelta};

/// Simplified `HM_deferredPromote`: drain the remembered sets of every
/// level below `min_level` (those levels survive this collection
/// unconditionally, but may hold down-pointers into the levels that are
/// about to be condemned) and hand the combined set back for replay as
/// extra roots.
fn deferred_promote(worker: &mut Worker, min_level: u32) -> Vec<DownPointer> {
    let mut combined = Vec::new();
    for level in 0..min_level {
        if let Some(list) = worker.hh.levels[level as usize].as_mut() {
            combined.extend(list.take_remembered_set());
        }
    }
    combined
}

fn level_size(worker: &Worker, level: u32) -> usize {
    worker.hh.level(level).map(|l| l.size).unwrap_or(0)
}

/// Run a local collection reaching down to at least `desired_scope`.
/// `force` skips the usual "only past the sequential prologue" guard
/// used by callers at depth ≤ 1.
pub fn collect_local(worker: &mut Worker, config: &Config, desired_scope: u32, force: bool) -> CollectionReport {
    if !force && worker.thread.current_depth <= 1 {
        return CollectionReport::default();
    }

    // --- 1. Depth claim ---
    let original_bot = local_scope::poll_current_local_scope(&worker.deque);
    let mut min_level = original_bot as u32;
    while min_level > desired_scope
        && min_level > config.min_local_level
        && local_scope::try_claim_local_scope(&worker.deque)
    {
        min_level -= 1;
    }

    if min_level == 0 || min_level > worker.thread.current_depth {
        local_scope::release_local_scope(&worker.deque, original_bot);
        if config.verbose {
            eprintln!("[hhgc] collect_local: skipped (min_level={})", min_level);
        }
        return CollectionReport::default();
    }

    // --- 2. Snapshot mutator state --- (stack `used`/`exnStack` are
    // already kept current on `Thread` by the mutator facade; nothing
    // further to capture here.)

    // --- 3. Configure args ---
    let max_level = worker.thread.current_depth;
    if config.hh_collection_level == CollectionLevel::SuperLocal {
        min_level = max_level;
    }
    let mut args = ForwardArgs::new(min_level, max_level);

    let level_sizes_before: Vec<(u32, usize)> =
        (min_level..=max_level).map(|l| (l, level_size(worker, l))).collect();

    // --- 4. Deferred promotion ---
    let global_down_ptrs = deferred_promote(worker, min_level);

    // --- 5. to_space already zeroed by ForwardArgs::new ---

    let current_stack_addr = worker.thread.current_stack.address();
    let is_current_stack = move |addr: Address| current_stack_addr == Some(addr);

    // --- 6. Root enumeration ---
    if config.verbose {
        eprintln!("[hhgc] collect_local: root enumeration, levels [{}, {}]", min_level, max_level);
    }

    if let Some(stack_addr) = worker.thread.current_stack.address() {
        unsafe {
            forward::forward_objptrs_in_object(stack_addr, &mut args, &mut worker.chunks, &mut worker.hh.levels, &is_current_stack);
        }
    }

    unsafe {
        worker.thread.current_stack = forward::forward_objptr_value(
            worker.thread.current_stack,
            &mut args,
            &mut worker.chunks,
            &mut worker.hh.levels,
            &is_current_stack,
        );
    }

    unsafe {
        let live = worker.deque.snapshot_live_slots();
        let forwarded: Vec<ObjPtr> = live
            .into_iter()
            .map(|value| {
                forward::forward_objptr_value(value, &mut args, &mut worker.chunks, &mut worker.hh.levels, &is_current_stack)
            })
            .collect();
        worker.deque.write_live_slots(&forwarded);
    }

    for down in global_down_ptrs {
        unsafe {
            forward::forward_hh_objptr(down.from, &mut args, &mut worker.chunks, &mut worker.hh.levels, &is_current_stack);
            let raw = down.from.load_usize();
            if raw != 0 {
                let new_addr = Address(raw);
                if let Some(handle) = worker.chunks.chunk_of(new_addr) {
                    let new_level = worker.chunks.get(handle).level();
                    if let Some(target) = args.to_space[new_level as usize].as_mut() {
                        target.record_down_pointer(DownPointer {
                            from: down.from,
                            to: new_addr,
                            to_level: new_level,
                        });
                    }
                }
            }
        }
    }

    // --- 7. Cheney scan, deepest level first ---
    for depth in (min_level..=max_level).rev() {
        scan_to_space_level(&mut args, &mut worker.chunks, &mut worker.hh.levels, depth, &is_current_stack);
    }

    // --- 8. Memory safety scrub (debug only) ---
    #[cfg(debug_assertions)]
    scrub_from_space(worker, min_level, max_level);

    // --- 9. Free old chunks ---
    for level in min_level..=max_level {
        if let Some(mut list) = worker.hh.levels[level as usize].take() {
            for handle in list.chunks.drain(..) {
                worker.chunks.free(handle);
            }
            let _ = list.take_remembered_set();
        }
    }

    // --- 10. Merge to-space back ---
    for level in 0..=max_level {
        if let Some(mut to_list) = args.to_space[level as usize].take() {
            to_list.is_in_to_space = false;
            to_list.containing_hh = 0;
            match worker.hh.levels[level as usize].as_mut() {
                None => {
                    for &handle in &to_list.chunks {
                        worker.chunks.get_mut(handle).set_in_to_space(false);
                    }
                    worker.hh.levels[level as usize] = Some(to_list);
                }
                Some(existing) => {
                    for handle in to_list.chunks.drain(..) {
                        let size = worker.chunks.get(handle).size();
                        existing.append(&mut worker.chunks, handle, size);
                    }
                    existing.remembered_set.extend(to_list.remembered_set.drain(..));
                }
            }
        }
    }

    // --- 11. Repair allocation pointer ---
    worker.hh.last_allocated_chunk = None;
    for level in (0..=max_level).rev() {
        if let Some(list) = worker.hh.level(level) {
            if let Some(handle) = list.last_chunk() {
                worker.hh.last_allocated_chunk = Some(handle);
                break;
            }
        }
    }
    if let Some(handle) = worker.hh.last_allocated_chunk {
        if worker.chunks.get(handle).is_single_object() {
            let level = worker.chunks.get(handle).level();
            let fresh = worker.chunks.allocate(crate::constants::HEAP_LIMIT_SLOP);
            let fresh_size = worker.chunks.get(fresh).size();
            let list = worker.hh.ensure_level(level);
            list.append(&mut worker.chunks, fresh, fresh_size);
            worker.hh.last_allocated_chunk = Some(fresh);
        }
    }

    // --- 12. Stats ---
    let bytes_survived = args.counters.bytes_moved + args.counters.bytes_copied;
    worker.thread.bytes_survived_last_collection = bytes_survived;
    worker.hh.bytes_allocated_since_last_collection = 0;

    let level_deltas = level_sizes_before
        .into_iter()
        .map(|(level, before)| LevelDelta { level, before, after: level_size(worker, level) })
        .collect();

    // --- 13. Cleanup ---
    local_scope::release_local_scope(&worker.deque, original_bot);

    let report = CollectionReport {
        counters: args.counters,
        bytes_survived,
        min_level,
        max_level,
        level_deltas,
    };
    worker.stats.record_local_collection(&report);
    report
}

/// Step 7: scan every to-space object at `depth`, forwarding its pointer
/// slots, skipping objects already handled as roots (stacks).
fn scan_to_space_level(
    args: &mut ForwardArgs,
    chunks: &mut crate::chunk::ChunkSlab,
    levels: &mut [Option<ChunkList>],
    depth: u32,
    is_current_stack: &impl Fn(Address) -> bool,
) {
    let Some(list) = args.to_space[depth as usize].as_ref() else { return };
    let handles = list.chunks.clone();
    // Walk a snapshot of this level's chunk list; scanning may append
    // fresh chunks to other levels, never to this one mid-scan.
    for handle in handles {
        let (mut scan, frontier) = {
            let chunk = chunks.get(handle);
            (chunk.start(), chunk.frontier())
        };
        while scan < frontier {
            let header = unsafe { object::read_header(scan) };
            if !matches!(header.tag, Tag::Stack) {
                for i in 0..header.num_ptrs {
                    let slot = unsafe { object::ptr_slot(scan, header, i) };
                    unsafe { forward::forward_hh_objptr(slot, args, chunks, levels, is_current_stack) };
                }
            }
            scan = scan.add(unsafe { object::total_size(scan, header) });
        }
    }
}

#[cfg(debug_assertions)]
fn scrub_from_space(worker: &mut Worker, min_level: u32, max_level: u32) {
    for level in min_level..=max_level {
        if let Some(list) = worker.hh.level(level) {
            for &handle in &list.chunks {
                let chunk = worker.chunks.get(handle);
                let start = chunk.start();
                let frontier = chunk.frontier();
                let len = frontier.offset_from(start).max(0) as usize;
                unsafe {
                    std::ptr::write_bytes(start.to_ptr(), 0xBF, len);
                }
            }
        }
    }
}
