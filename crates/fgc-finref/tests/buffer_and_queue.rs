//! Buffer and Job Queue Tests
//!
//! These tests verify the two staging points between discovery and
//! dispatch:
//! - Thread-local buffers never publish a run spanning two regions
//! - The job queue hands out work in priority order, re-evaluated per call
//!
//! ============================================================================
//! EACH TEST FINDS A SPECIFIC ORDERING OR ROUTING BUG
//! ============================================================================

mod common;

use common::{assert_same_members, FinFixture};
use fgc_finref::buffer::{MutatorContext, ThreadLocalBuffer};
use fgc_finref::object::{LinkKind, ObjectRef, ReferenceType, RegionId};
use fgc_finref::queue::FinalizeJob;
use std::sync::{Arc, Barrier};
use std::thread;

/// ============================================================================
/// REGION-CHANGE FLUSH
/// ============================================================================

/// Two objects from different regions: one implicit flush between them
///
/// **Bug this finds:** A run mixing regions published into one region's list
/// **Invariant verified:** Exactly one displaced run; both objects reachable
/// in their own region's list after an explicit flush
#[test]
fn test_region_change_flushes_once() {
    // Arrange
    let fixture = FinFixture::partitioned(2);
    let ctx = fixture.ctx.as_ref();
    let first = fixture.arena.allocate(RegionId(0));
    let second = fixture.arena.allocate(RegionId(1));
    let mut buffer = ThreadLocalBuffer::new(LinkKind::Finalize, usize::MAX);

    // Act
    let displaced_first = buffer.add(ctx.model(), Some(RegionId(0)), first);
    let displaced_second = buffer.add(ctx.model(), Some(RegionId(1)), second);

    // Assert - exactly one implicit flush, carrying only the first object
    assert!(displaced_first.is_none());
    let run = displaced_second.expect("region change must displace the staged run");
    assert_eq!((run.head, run.tail, run.count), (first, first, 1));
    assert_eq!(run.region, Some(RegionId(0)));
    assert_eq!(buffer.runs(), 1);

    ctx.lists()
        .region(RegionId(0))
        .unfinalized
        .publish_range(ctx.model(), run.head, run.tail, run.count);
    let run = buffer.take().expect("second object still staged");
    ctx.lists()
        .region(RegionId(1))
        .unfinalized
        .publish_range(ctx.model(), run.head, run.tail, run.count);

    let region0: Vec<_> = ctx
        .lists()
        .region(RegionId(0))
        .unfinalized
        .walk_current(ctx.model())
        .collect();
    let region1: Vec<_> = ctx
        .lists()
        .region(RegionId(1))
        .unfinalized
        .walk_current(ctx.model())
        .collect();
    assert_eq!(region0, vec![first]);
    assert_eq!(region1, vec![second]);
}

/// The same property through a mutator's buffers
///
/// **Bug this finds:** Region routing lost on the registry path
#[test]
fn test_mutator_buffers_route_by_region() {
    let fixture = FinFixture::partitioned(3);
    let mutator = MutatorContext::attach(fixture.ctx.clone());
    let mut expected: Vec<Vec<ObjectRef>> = vec![Vec::new(); 3];

    for i in 0..30 {
        let region = RegionId(i % 3);
        let object = fixture.arena.allocate(region);
        mutator.finalizable_object_created(object);
        expected[region.0].push(object);
    }
    mutator.flush();

    for (region, objects) in expected.iter().enumerate() {
        let walked: Vec<_> = fixture
            .ctx
            .lists()
            .region(RegionId(region))
            .unfinalized
            .walk_current(fixture.ctx.model())
            .collect();
        assert_same_members(&walked, objects, "region routing");
    }
}

/// Detaching a thread publishes what it staged
///
/// **Bug this finds:** Objects stranded in a dead thread's buffer
#[test]
fn test_detach_flushes_staged_objects() {
    let fixture = FinFixture::new();
    let threads = 4;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let ctx = fixture.ctx.clone();
            let arena = fixture.arena.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mutator = MutatorContext::attach(ctx);
                barrier.wait();
                let objects: Vec<_> = (0..50).map(|_| arena.allocate(RegionId(0))).collect();
                for &object in &objects {
                    mutator.finalizable_object_created(object);
                }
                objects
            })
        })
        .collect();

    let expected: Vec<_> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("mutator panicked"))
        .collect();

    let lists = fixture.ctx.lists().region(RegionId(0));
    let walked: Vec<_> = lists.unfinalized.walk_current(fixture.ctx.model()).collect();
    assert_same_members(&walked, &expected, "detach flush");
    assert!(fixture.ctx.registry().is_empty());
}

/// ============================================================================
/// JOB PRIORITY
/// ============================================================================

/// One system-finalizable job and one reference job: reference first
///
/// **Bug this finds:** Finalizers starving reference delivery
#[test]
fn test_reference_job_before_system_finalizable() {
    let fixture = FinFixture::new();
    let system = fixture.arena.allocate_system(RegionId(0));
    let reference =
        fixture
            .arena
            .allocate_reference(RegionId(0), ReferenceType::Weak, None, true);

    let mut queue = fixture.ctx.queue().lock();
    queue.add_system_finalizable(system, system, 1);
    queue.add_references(reference, reference, 1);

    assert_eq!(queue.consume_job(), Some(FinalizeJob::Reference(reference)));
    assert_eq!(queue.consume_job(), Some(FinalizeJob::Object(system)));
    assert_eq!(queue.consume_job(), None);
}

/// Full order, with an arrival in the middle of the drain
///
/// **Invariant verified:** reference > class loader > default > system, and
/// the order is re-evaluated on every call
#[test]
fn test_priority_reevaluated_per_consume() {
    let fixture = FinFixture::new();
    let arena = fixture.arena.as_ref();
    let system = arena.allocate_system(RegionId(0));
    let default = arena.allocate(RegionId(0));
    let loader = arena.allocate(RegionId(0));
    let early = arena.allocate_reference(RegionId(0), ReferenceType::Soft, None, true);
    let late = arena.allocate_reference(RegionId(0), ReferenceType::Phantom, None, true);

    let queue = fixture.ctx.queue();
    {
        let mut guard = queue.lock();
        guard.add_system_finalizable(system, system, 1);
        guard.add_default_finalizable(default, default, 1);
        guard.add_class_loader(loader);
        guard.add_references(early, early, 1);
        assert_eq!(guard.job_count(), 4);
    }
    assert_eq!(queue.pending_advisory(), 4);

    let mut order = Vec::new();
    order.push(queue.lock().consume_job());
    order.push(queue.lock().consume_job());
    queue.lock().add_references(late, late, 1);
    while let Some(job) = queue.lock().consume_job() {
        order.push(Some(job));
    }

    assert_eq!(
        order,
        vec![
            Some(FinalizeJob::Reference(early)),
            Some(FinalizeJob::ClassLoader(loader)),
            Some(FinalizeJob::Reference(late)),
            Some(FinalizeJob::Object(default)),
            Some(FinalizeJob::Object(system)),
        ]
    );
    assert_eq!(queue.job_count(), 0);
    assert_eq!(queue.pending_advisory(), 0);
}
