//! Mutator/allocator facade (spec.md §4.8). Ported from
//! `examples/original_source/runtime/gc/local-heap.c`
//! (`HM_ensureHierarchicalHeapAssurances`) and `init-world.c`.

use crate::address::{Address, ObjPtr};
use crate::config::Config;
use crate::constants::HEAP_LIMIT_SLOP;
use crate::heap::{MutatorFrontier, Worker};
use crate::hh_collect;
use crate::invariant;
use crate::stats::CollectionReport;

/// Publish frontier/limit/limit_plus_slop out of the HH's last chunk so
/// the mutator can resume bump-allocating directly.
pub fn enter_local_heap(worker: &mut Worker) {
    if worker.hh.last_allocated_chunk.is_none() {
        let handle = worker.chunks.allocate(crate::constants::HM_BLOCK_SIZE);
        let size = worker.chunks.get(handle).size();
        let level = worker.thread.current_depth;
        let list = worker.hh.ensure_level(level);
        list.append(&mut worker.chunks, handle, size);
        worker.hh.last_allocated_chunk = Some(handle);
    }
    publish_frontier(worker);
}

/// Write the mutator's current frontier back into the HH's last chunk
/// before the worker is stopped (e.g. entering a collection).
pub fn exit_local_heap(worker: &mut Worker) {
    if let (Some(handle), Some(frontier)) = (worker.hh.last_allocated_chunk, worker.frontier.frontier) {
        let chunk = worker.chunks.get_mut(handle);
        let bytes = frontier.offset_from(chunk.frontier());
        if bytes > 0 {
            chunk.bump(bytes as usize);
        }
    }
}

fn publish_frontier(worker: &mut Worker) {
    match worker.hh.last_allocated_chunk {
        None => worker.frontier = MutatorFrontier::default(),
        Some(handle) => {
            let chunk = worker.chunks.get(handle);
            let limit_plus_slop = chunk.limit();
            worker.frontier = MutatorFrontier {
                frontier: Some(chunk.frontier()),
                limit: Some(limit_plus_slop.sub(HEAP_LIMIT_SLOP.min(chunk.size()))),
                limit_plus_slop: Some(limit_plus_slop),
            };
        }
    }
}

/// Extend the current HH by at least `bytes_requested`, landing on a
/// fresh chunk, and republish.
fn extend_heap(worker: &mut Worker, bytes_requested: usize) {
    let level = worker.thread.current_depth;
    let handle = worker.chunks.allocate(bytes_requested);
    let size = worker.chunks.get(handle).size();
    let list = worker.hh.ensure_level(level);
    list.append(&mut worker.chunks, handle, size);
    worker.hh.last_allocated_chunk = Some(handle);
    publish_frontier(worker);
}

/// Grow the current stack object by copying it into a larger chunk. A
/// faithful port would invoke the object model's
/// `size_of_stack_grow_reserved`; this crate doesn't model in-place
/// stack growth beyond republishing the frontier, since stack contents
/// are opaque bytes the mutator itself writes.
fn grow_stack_current(worker: &mut Worker, bytes_needed: usize) {
    extend_heap(worker, bytes_needed.max(crate::constants::HM_BLOCK_SIZE));
}

/// The sole entry point from the mutator asking for progress (§4.8).
/// `ensure_current_level` checks that the frontier still belongs to
/// `thread.current_depth`'s level, which is always true in this crate's
/// single-allocating-level model, but kept as a parameter to preserve
/// the call's shape.
pub fn ensure_assurances(
    worker: &mut Worker,
    config: &Config,
    force_gc: bool,
    bytes_requested: usize,
    ensure_current_level: bool,
) -> Option<CollectionReport> {
    let growing_stack = stack_growth_needed(worker);

    exit_local_heap(worker);

    let desired_scope = worker
        .hh
        .desired_collection_scope(worker.thread.current_depth, config.min_local_level);

    let mut report = None;
    if force_gc || desired_scope <= worker.thread.current_depth {
        report = Some(hh_collect::collect_local(worker, config, desired_scope, force_gc));
        worker.hh.bytes_allocated_since_last_collection = 0;
        publish_frontier(worker);
    }

    if growing_stack {
        if worker.hh.last_allocated_chunk.is_none() {
            extend_heap(worker, crate::constants::HM_BLOCK_SIZE);
        }
        grow_stack_current(worker, worker.thread.bytes_needed);
        publish_frontier(worker);
    }

    let frontier_short = match (worker.frontier.frontier, worker.frontier.limit_plus_slop) {
        (Some(f), Some(l)) => (l.offset_from(f) as usize) < bytes_requested,
        _ => true,
    };
    let crossed_block_boundary = match (worker.hh.last_allocated_chunk, worker.frontier.frontier) {
        (Some(handle), Some(f)) => !worker.chunks.get(handle).in_first_block(f),
        _ => true,
    };

    if frontier_short || !ensure_current_level || crossed_block_boundary {
        extend_heap(worker, bytes_requested);
    }

    debug_assert!(invariant::invariant_for_mutator_frontier(worker));

    enter_local_heap(worker);
    report
}

/// Stub for the real stack-overflow predicate: the original checks the
/// machine stack pointer against the stack object's reserved size. This
/// crate has no machine-stack probe to call, so callers report it
/// explicitly via `Thread.bytes_needed`.
fn stack_growth_needed(worker: &Worker) -> bool {
    worker.thread.bytes_needed > 0
}

/// `init_world`: set up the depth-0 heap and compute the initial
/// collection threshold (`init-world.c::initWorld`).
pub fn init_world(config: &Config) -> Worker {
    let mut worker = Worker::new(config.heap_growth_factor as usize * crate::constants::HM_BLOCK_SIZE);
    enter_local_heap(&mut worker);
    worker
}

/// `duplicate_world`: spin up a sibling worker sharing the same
/// collection policy but with its own private heap and deque, used when
/// the scheduler forks additional worker threads after startup
/// (`init-world.c::duplicateWorld`).
pub fn duplicate_world(template: &Worker) -> Worker {
    let mut worker = Worker::new(template.hh.collection_threshold);
    enter_local_heap(&mut worker);
    worker
}

/// `init_vectors`: materialize a sequence of immutable vector
/// initializers into the heap, respecting block boundaries the way
/// `copy_object` does (§4.4), per `init-world.c::initVectors`.
pub fn init_vectors(worker: &mut Worker, vectors: &[&[u8]]) -> Vec<ObjPtr> {
    let mut out = Vec::with_capacity(vectors.len());
    for bytes in vectors {
        // Bump by the same aligned size `object::total_size` expects when
        // a later collection's chunk scan steps over this object.
        let body = crate::object::align_up(bytes.len(), crate::constants::PTR_SIZE);
        let object_bytes = crate::constants::META_SIZE_SEQ + body;
        if needs_new_chunk(worker, object_bytes) {
            extend_heap(worker, object_bytes);
        }
        let handle = worker
            .hh
            .last_allocated_chunk
            .expect("extend_heap always installs a last_allocated_chunk");
        let chunk = worker.chunks.get_mut(handle);
        let header_addr = chunk.bump(object_bytes);
        let obj_addr = header_addr.add(crate::constants::META_SIZE_SEQ);
        unsafe {
            crate::object::write_header(
                obj_addr,
                crate::object::Header {
                    tag: crate::object::Tag::Sequence,
                    forwarded: false,
                    num_ptrs: 0,
                    bytes_non_ptr: 1,
                },
            );
            crate::object::write_seq_length(obj_addr, bytes.len());
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), obj_addr.add(8).to_ptr(), bytes.len());
        }
        out.push(ObjPtr::of(obj_addr));
    }
    publish_frontier(worker);
    out
}

fn needs_new_chunk(worker: &Worker, bytes: usize) -> bool {
    match worker.hh.last_allocated_chunk {
        None => true,
        Some(handle) => worker.chunks.get(handle).remaining() < bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectionLevel;

    #[test]
    fn init_world_publishes_a_usable_frontier() {
        let config = Config::new(CollectionLevel::Local, 0);
        let worker = init_world(&config);
        assert!(worker.frontier.frontier.is_some());
        assert!(worker.frontier.limit.is_some());
    }

    #[test]
    fn ensure_assurances_extends_when_frontier_too_short() {
        let config = Config::new(CollectionLevel::Local, 0);
        let mut worker = init_world(&config);
        let before = worker.frontier.frontier;
        ensure_assurances(&mut worker, &config, false, 1 << 20, true);
        assert_ne!(worker.frontier.frontier, before, "a far larger request should force a new chunk");
    }

    #[test]
    fn init_vectors_materializes_each_byte_slice() {
        let config = Config::new(CollectionLevel::Local, 0);
        let mut worker = init_world(&config);
        let refs = init_vectors(&mut worker, &[b"hello", b"world!"]);
        assert_eq!(refs.len(), 2);
        for r in refs {
            assert!(r.is_objptr());
        }
    }
}
