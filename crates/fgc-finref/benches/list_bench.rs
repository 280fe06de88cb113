//! Finalization list benchmarks
//!
//! Publish, pass and root-clearing costs on the in-memory arena.
//! Run with: `cargo bench --package fgc-finref`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use fgc_finref::cycle::{CollectionCycleAdapter, DiscoveryKind, StartMode};
use fgc_finref::list::{link_run, SpecialObjectList};
use fgc_finref::object::{LinkKind, ObjectArena, ObjectRef, RegionId};
use fgc_finref::{FinalizeConfig, FinalizeContext};
use std::sync::{Arc, Barrier};
use std::thread;

fn objects(arena: &ObjectArena, count: usize) -> Vec<ObjectRef> {
    (0..count).map(|_| arena.allocate(RegionId(0))).collect()
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    let arena = ObjectArena::new(1);

    for run_length in [1usize, 64, 1024] {
        let run = objects(&arena, run_length);
        group.throughput(Throughput::Elements(run_length as u64));
        group.bench_function(format!("run_{}", run_length), |b| {
            b.iter_batched(
                || {
                    let list = SpecialObjectList::new(LinkKind::Finalize);
                    let (head, tail) = link_run(&arena, LinkKind::Finalize, &run).unwrap();
                    (list, head, tail)
                },
                |(list, head, tail)| {
                    list.publish_range(&arena, head, tail, run_length);
                    black_box(list)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_contended_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_publish");
    let threads = 4;
    let per_thread = 256;
    group.throughput(Throughput::Elements((threads * per_thread) as u64));

    group.bench_function("4_threads_single_objects", |b| {
        let arena = Arc::new(ObjectArena::new(1));
        let batches: Vec<Vec<ObjectRef>> =
            (0..threads).map(|_| objects(&arena, per_thread)).collect();
        b.iter(|| {
            let list = Arc::new(SpecialObjectList::new(LinkKind::Finalize));
            let barrier = Arc::new(Barrier::new(threads));
            thread::scope(|scope| {
                for batch in &batches {
                    let list = list.clone();
                    let arena = arena.clone();
                    let barrier = barrier.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        for &object in batch {
                            list.publish(arena.as_ref(), object);
                        }
                    });
                }
            });
            black_box(list.object_count())
        })
    });

    group.finish();
}

fn bench_clear_roots(c: &mut Criterion) {
    let mut group = c.benchmark_group("clear_roots");

    for count in [100usize, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("all_survive_{}", count), |b| {
            let arena = Arc::new(ObjectArena::new(1));
            let ctx = FinalizeContext::new(arena.clone(), arena.clone(), FinalizeConfig::default())
                .unwrap();
            let adapter = CollectionCycleAdapter::new(ctx.clone());
            let tracked = objects(&arena, count);
            let mut buffers = ctx.thread_buffers();
            for &object in &tracked {
                adapter.discover(&mut buffers, object, DiscoveryKind::Unfinalized);
            }
            buffers.flush(&ctx);

            // No region is evacuated, so every object survives every pass
            b.iter(|| {
                adapter.cycle_start(StartMode::Snapshot);
                arena.begin_collection(&[]);
                black_box(adapter.clear_roots(&mut buffers));
                arena.end_collection();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_contended_publish, bench_clear_roots);
criterion_main!(benches);
