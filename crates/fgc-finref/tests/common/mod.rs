//! Test Utilities for the finalization test suite
//!
//! Fixtures drive the subsystem against an [`ObjectArena`] the way a
//! copying collector would: snapshot the lists, mark or evacuate, clear
//! roots, finish the collection.
//!
//! ============================================================================
//! Assertions are strict: a lost, duplicated or misordered object is a bug.
//! ============================================================================

#![allow(dead_code)]

use fgc_finref::cycle::{CollectionCycleAdapter, DiscoveryKind, StartMode};
use fgc_finref::dispatch::JobDispatcher;
use fgc_finref::object::{ObjectArena, ObjectModel, ObjectRef, RegionId};
use fgc_finref::queue::FinalizeJob;
use fgc_finref::stats::CycleStats;
use fgc_finref::{FinalizeConfig, FinalizeContext};
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on any wait in the suite
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// ============================================================================
/// CYCLE FIXTURE
/// ============================================================================

/// Arena, shared context and cycle adapter for one heap
pub struct FinFixture {
    pub arena: Arc<ObjectArena>,
    pub ctx: Arc<FinalizeContext>,
    pub adapter: CollectionCycleAdapter,
    regions: usize,
}

impl FinFixture {
    /// Single set of lists over a one-region heap
    pub fn new() -> Self {
        Self::with_config(1, FinalizeConfig::default())
    }

    /// One set of lists per region
    ///
    /// **Bug this finds:** Runs published to the wrong region's lists
    pub fn partitioned(regions: usize) -> Self {
        let config = FinalizeConfig {
            region_partitioned: true,
            region_count: regions,
            ..Default::default()
        };
        Self::with_config(regions, config)
    }

    pub fn with_config(regions: usize, config: FinalizeConfig) -> Self {
        let arena = Arc::new(ObjectArena::new(regions));
        let ctx = FinalizeContext::new(arena.clone(), arena.clone(), config)
            .unwrap_or_else(|e| panic!("fixture config rejected: {}", e));
        let adapter = CollectionCycleAdapter::new(ctx.clone());
        Self {
            arena,
            ctx,
            adapter,
            regions,
        }
    }

    pub fn objects(&self, region: RegionId, count: usize) -> Vec<ObjectRef> {
        (0..count).map(|_| self.arena.allocate(region)).collect()
    }

    pub fn all_regions(&self) -> Vec<RegionId> {
        (0..self.regions).map(RegionId).collect()
    }

    /// One complete collection evacuating every region
    ///
    /// Only `live` (and whatever root clearing preserves) survives.
    ///
    /// **Bug this finds:** Root clearing losing or duplicating objects
    pub fn collect(&self, live: &[ObjectRef]) -> CycleStats {
        self.collect_moving(live, &[]).0
    }

    /// A collection that also copies `moved` (live) into region 0
    ///
    /// # Returns
    /// Cycle counts and the post-move addresses of `moved`, in order.
    pub fn collect_moving(
        &self,
        live: &[ObjectRef],
        moved: &[ObjectRef],
    ) -> (CycleStats, Vec<ObjectRef>) {
        collect_through(
            &self.adapter,
            &self.ctx,
            &self.arena,
            &self.all_regions(),
            live,
            moved,
            &[],
        )
    }

    /// A collection whose marking discovers `references`
    ///
    /// **Bug this finds:** References lost or linked twice across cycles
    pub fn collect_discovering(&self, live: &[ObjectRef], references: &[ObjectRef]) -> CycleStats {
        collect_through(
            &self.adapter,
            &self.ctx,
            &self.arena,
            &self.all_regions(),
            live,
            &[],
            references,
        )
        .0
    }
}

/// Drive one collection through any adapter
pub fn collect_through(
    adapter: &CollectionCycleAdapter,
    ctx: &FinalizeContext,
    arena: &ObjectArena,
    evacuate: &[RegionId],
    live: &[ObjectRef],
    moved: &[ObjectRef],
    references: &[ObjectRef],
) -> (CycleStats, Vec<ObjectRef>) {
    adapter.cycle_start(StartMode::Snapshot);
    arena.begin_collection(evacuate);
    for &object in live {
        arena.mark(object);
    }
    let copies = moved
        .iter()
        .map(|&object| arena.evacuate(object, RegionId(0)))
        .collect();
    let mut buffers = ctx.thread_buffers();
    for &reference in references {
        adapter.discover(&mut buffers, reference, DiscoveryKind::Reference);
    }
    buffers.flush(ctx);
    let stats = adapter.clear_roots(&mut buffers);
    arena.end_collection();
    (stats, copies)
}

/// ============================================================================
/// DISPATCHERS
/// ============================================================================

/// Records every job in dispatch order
#[derive(Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<FinalizeJob>>,
    arrived: Condvar,
}

impl RecordingDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn jobs(&self) -> Vec<FinalizeJob> {
        self.jobs.lock().clone()
    }

    fn record(&self, job: FinalizeJob) {
        self.jobs.lock().push(job);
        self.arrived.notify_all();
    }

    /// Wait until at least `count` jobs were dispatched
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut jobs = self.jobs.lock();
        while jobs.len() < count {
            if self.arrived.wait_until(&mut jobs, deadline).timed_out() {
                break;
            }
        }
        jobs.len() >= count
    }
}

impl JobDispatcher for RecordingDispatcher {
    fn run_finalizer(&self, object: ObjectRef) {
        self.record(FinalizeJob::Object(object));
    }

    fn enqueue_reference(&self, reference: ObjectRef) {
        self.record(FinalizeJob::Reference(reference));
    }

    fn unload_class_loader(&self, loader: ObjectRef) {
        self.record(FinalizeJob::ClassLoader(loader));
    }
}

/// Hangs in the finalizer (or reference delivery) of one object until
/// released
///
/// Every other job is recorded and returns at once.
pub struct BlockingDispatcher {
    blocked: ObjectRef,
    open: Mutex<bool>,
    opened: Condvar,
    entered: AtomicUsize,
    pub recorder: Arc<RecordingDispatcher>,
}

impl BlockingDispatcher {
    pub fn new(blocked: ObjectRef) -> Arc<Self> {
        Arc::new(Self {
            blocked,
            open: Mutex::new(false),
            opened: Condvar::new(),
            entered: AtomicUsize::new(0),
            recorder: RecordingDispatcher::new(),
        })
    }

    /// Times a worker entered the blocking finalizer
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn release(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    fn hold(&self, object: ObjectRef) {
        if object == self.blocked {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
        }
    }
}

impl JobDispatcher for BlockingDispatcher {
    fn run_finalizer(&self, object: ObjectRef) {
        self.hold(object);
        self.recorder.run_finalizer(object);
    }

    fn enqueue_reference(&self, reference: ObjectRef) {
        self.hold(reference);
        self.recorder.enqueue_reference(reference);
    }

    fn unload_class_loader(&self, loader: ObjectRef) {
        self.recorder.unload_class_loader(loader);
    }
}

/// ============================================================================
/// STRICT ASSERTION HELPERS
/// ============================================================================

/// Poll `condition` until it holds or [`TEST_TIMEOUT`] passes
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Assert a chain holds exactly `expected`, each once
///
/// **Bug this finds:** Lost runs, double publication
/// **Tolerance:** ZERO
#[track_caller]
pub fn assert_same_members(walked: &[ObjectRef], expected: &[ObjectRef], context: &str) {
    let unique: HashSet<_> = walked.iter().copied().collect();
    assert_eq!(
        unique.len(),
        walked.len(),
        "{}: {} duplicate objects in the chain",
        context,
        walked.len() - unique.len()
    );
    let expected: HashSet<_> = expected.iter().copied().collect();
    assert_eq!(unique, expected, "{}: chain membership differs", context);
}

/// Whether a job targets a system-loader object
pub fn is_system_job(model: &dyn ObjectModel, job: FinalizeJob) -> bool {
    matches!(job, FinalizeJob::Object(object) if model.is_system_loader_object(object))
}
