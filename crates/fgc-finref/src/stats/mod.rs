//! Stats Module - Finalization Counters
//!
//! Counters accumulated by root clearing and by the worker:
//! - Jobs dispatched per kind
//! - Worker starts, abandonments and start failures
//! - Collection cycles and back-outs
//! - Worker pass duration distribution

pub mod histogram;
pub mod timer;

pub use histogram::DurationHistogram;
pub use timer::PassTimer;

use crate::queue::FinalizeJob;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-cycle root-clearing counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Unfinalized objects examined
    pub unfinalized_candidates: u64,
    /// Unfinalized objects found dead and made finalizable
    pub finalizable_enqueued: u64,
    /// Unfinalized objects that survived
    pub unfinalized_survived: u64,

    /// Reference objects examined
    pub reference_candidates: u64,
    /// References whose referent was found dead
    pub references_cleared: u64,
    /// Cleared references handed to the worker for enqueueing
    pub references_enqueued: u64,

    pub weak_cleared: u64,
    pub soft_cleared: u64,
    pub phantom_cleared: u64,

    /// Ownable synchronizers that survived
    pub ownable_survived: u64,
    /// Ownable synchronizers dropped as dead
    pub ownable_dropped: u64,

    pub continuations_survived: u64,
    pub continuations_released: u64,
}

/// FinalizationStats - counters shared by every component
pub struct FinalizationStats {
    cycles: AtomicU64,
    back_outs: AtomicU64,
    forced_transitions: AtomicU64,
    forced_objects: AtomicU64,

    finalizable_enqueued: AtomicU64,
    references_cleared: AtomicU64,
    references_enqueued: AtomicU64,

    objects_finalized: AtomicU64,
    references_delivered: AtomicU64,
    class_loaders_unloaded: AtomicU64,

    workers_started: AtomicU64,
    workers_abandoned: AtomicU64,
    worker_start_failures: AtomicU64,
    worker_passes: AtomicU64,

    pass_durations: DurationHistogram,
}

impl FinalizationStats {
    pub fn new() -> Self {
        Self {
            cycles: AtomicU64::new(0),
            back_outs: AtomicU64::new(0),
            forced_transitions: AtomicU64::new(0),
            forced_objects: AtomicU64::new(0),
            finalizable_enqueued: AtomicU64::new(0),
            references_cleared: AtomicU64::new(0),
            references_enqueued: AtomicU64::new(0),
            objects_finalized: AtomicU64::new(0),
            references_delivered: AtomicU64::new(0),
            class_loaders_unloaded: AtomicU64::new(0),
            workers_started: AtomicU64::new(0),
            workers_abandoned: AtomicU64::new(0),
            worker_start_failures: AtomicU64::new(0),
            worker_passes: AtomicU64::new(0),
            pass_durations: DurationHistogram::new(),
        }
    }

    /// Fold one cycle's root-clearing counts in
    pub fn record_cycle(&self, cycle: &CycleStats) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.finalizable_enqueued
            .fetch_add(cycle.finalizable_enqueued, Ordering::Relaxed);
        self.references_cleared
            .fetch_add(cycle.references_cleared, Ordering::Relaxed);
        self.references_enqueued
            .fetch_add(cycle.references_enqueued, Ordering::Relaxed);
    }

    pub fn record_back_out(&self) {
        self.back_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forced(&self, objects: u64) {
        self.forced_transitions.fetch_add(1, Ordering::Relaxed);
        self.forced_objects.fetch_add(objects, Ordering::Relaxed);
    }

    /// Count a job the worker handed to the dispatcher
    pub fn record_job(&self, job: FinalizeJob) {
        let counter = match job {
            FinalizeJob::Object(_) => &self.objects_finalized,
            FinalizeJob::Reference(_) => &self.references_delivered,
            FinalizeJob::ClassLoader(_) => &self.class_loaders_unloaded,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_abandoned(&self) {
        self.workers_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_start_failure(&self) {
        self.worker_start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass(&self, timer: &PassTimer) {
        self.worker_passes.fetch_add(1, Ordering::Relaxed);
        self.pass_durations.record(timer.elapsed_us());
    }

    pub fn pass_durations(&self) -> &DurationHistogram {
        &self.pass_durations
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            cycles: load(&self.cycles),
            back_outs: load(&self.back_outs),
            forced_transitions: load(&self.forced_transitions),
            forced_objects: load(&self.forced_objects),
            finalizable_enqueued: load(&self.finalizable_enqueued),
            references_cleared: load(&self.references_cleared),
            references_enqueued: load(&self.references_enqueued),
            objects_finalized: load(&self.objects_finalized),
            references_delivered: load(&self.references_delivered),
            class_loaders_unloaded: load(&self.class_loaders_unloaded),
            workers_started: load(&self.workers_started),
            workers_abandoned: load(&self.workers_abandoned),
            worker_start_failures: load(&self.worker_start_failures),
            worker_passes: load(&self.worker_passes),
            pass_p50_us: self.pass_durations.percentile(0.50),
            pass_p99_us: self.pass_durations.percentile(0.99),
            pass_max_us: self.pass_durations.max(),
        }
    }
}

impl Default for FinalizationStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable counter snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub back_outs: u64,
    pub forced_transitions: u64,
    pub forced_objects: u64,
    pub finalizable_enqueued: u64,
    pub references_cleared: u64,
    pub references_enqueued: u64,
    pub objects_finalized: u64,
    pub references_delivered: u64,
    pub class_loaders_unloaded: u64,
    pub workers_started: u64,
    pub workers_abandoned: u64,
    pub worker_start_failures: u64,
    pub worker_passes: u64,
    pub pass_p50_us: u64,
    pub pass_p99_us: u64,
    pub pass_max_us: u64,
}

impl StatsSnapshot {
    /// Jobs handed to the dispatcher, all kinds
    pub fn jobs_dispatched(&self) -> u64 {
        self.objects_finalized + self.references_delivered + self.class_loaders_unloaded
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
