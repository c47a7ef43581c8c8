use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hhgc::address::{Address, ObjPtr};
use hhgc::config::{CollectionLevel, Config};
use hhgc::deque::ChaseLevDeque;
use hhgc::hh_collect::collect_local;
use hhgc::mutator::init_world;
use hhgc::object::{self, Header, Tag};

fn bench_deque_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("chase_lev_deque");
    group.sample_size(50);

    group.bench_function(BenchmarkId::new("push_then_pop_bottom", "single-thread"), |b| {
        b.iter_batched_ref(
            ChaseLevDeque::<ObjPtr>::new,
            |deque| {
                for i in 0..32u64 {
                    deque.push_bottom(ObjPtr::of(Address(i as usize)));
                }
                for _ in 0..32u64 {
                    deque.try_pop_bottom(ObjPtr::BOGUS);
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.bench_function(BenchmarkId::new("push_then_steal_top", "single-thread"), |b| {
        b.iter_batched_ref(
            ChaseLevDeque::<ObjPtr>::new,
            |deque| {
                for i in 0..32u64 {
                    deque.push_bottom(ObjPtr::of(Address(i as usize)));
                }
                for _ in 0..32u64 {
                    deque.try_pop_top(ObjPtr::BOGUS);
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Build a worker with `levels` depths, each holding `per_level` small
/// linked records, the deepest level's records reachable from the
/// current stack and everything else reachable transitively — a
/// reasonably realistic shape for exercising `collect_local`'s scan.
fn build_worker_with_chain(levels: u32, per_level: u32) -> hhgc::heap::Worker {
    let config = Config::new(CollectionLevel::Local, 0);
    let mut worker = init_world(&config);
    worker.thread.current_depth = levels;
    worker.deque.set_depth(1);
    for i in 0..levels as u64 {
        worker.deque.push_bottom(ObjPtr::of(Address(0xbeef_0000 + i as usize)));
    }

    let mut previous: Option<Address> = None;
    for level in (1..=levels).rev() {
        let list = worker.hh.ensure_level(level);
        let handle = worker.chunks.allocate(4096);
        let size = worker.chunks.get(handle).size();
        list.append(&mut worker.chunks, handle, size);

        let mut head = None;
        for _ in 0..per_level {
            let chunk = worker.chunks.get_mut(handle);
            let header = chunk.bump(object::meta_size(Tag::Normal) + 8);
            let obj = header.add(object::meta_size(Tag::Normal));
            unsafe {
                object::write_header(
                    obj,
                    Header { tag: Tag::Normal, forwarded: false, num_ptrs: 1, bytes_non_ptr: 0 },
                );
                let next = previous.map(|a| a.0).unwrap_or(0);
                object::ptr_slot(obj, object::read_header(obj), 0).store_usize(next);
            }
            previous = Some(obj);
            if head.is_none() {
                head = Some(obj);
            }
        }
        previous = head.or(previous);
    }

    worker.thread.current_stack = previous.map(ObjPtr::of).unwrap_or(ObjPtr::BOGUS);
    worker
}

fn bench_collect_local(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect_local");
    group.sample_size(20);
    let config = Config::new(CollectionLevel::Local, 0);

    for levels in [2u32, 4, 8] {
        group.bench_function(BenchmarkId::new("levels", levels), |b| {
            b.iter_batched_ref(
                || build_worker_with_chain(levels, 16),
                |worker| {
                    collect_local(worker, &config, 1, true);
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_deque_push_pop, bench_collect_local);
criterion_main!(benches);
