//! Worker State - supervision records shared between threads
//!
//! Two independently owned resource sets:
//! - [`WorkerShared`]: one per worker thread. Held through an `Arc` by the
//!   supervisor's slot and by the worker itself. On abandonment the
//!   supervisor drops its clone and detaches the thread; the orphan drops
//!   the last clone when it finally exits.
//! - [`Supervision`]: one per orchestrator. Flags and wait conditions used
//!   by the runtime API, the supervisor thread and every worker.

use crate::context::FinalizeContext;
use crate::dispatch::JobDispatcher;
use crate::object::ObjectRef;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Worker lifecycle
///
/// ```text
/// None ─▶ Starting ─▶ Running ◀─▶ Finished
///            │           │           │
///            ▼           ▼           ▼
///          Dead    AbandonRequested ─▶ Abandoned
///                        Dying ─▶ Dead
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// No worker exists
    None,
    /// Spawned, handshake pending
    Starting,
    /// Draining the job queue
    Running,
    /// Queue observed empty, waiting for the next wake
    Finished,
    /// Disowned by the supervisor; exits at its next checkpoint
    AbandonRequested,
    /// Exited after being disowned
    Abandoned,
    /// Told to exit during shutdown
    Dying,
    /// Exited
    Dead,
}

impl WorkerState {
    /// Whether the worker still accepts wake-ups
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            WorkerState::Starting | WorkerState::Running | WorkerState::Finished
        )
    }

    pub fn is_abandoned(self) -> bool {
        matches!(self, WorkerState::AbandonRequested | WorkerState::Abandoned)
    }
}

/// What a worker pass drains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerMode {
    /// Priority-ordered drain of the job queue
    Normal,
    /// Like `Normal`, but an empty queue first forces every unfinalized
    /// object finalizable
    Forced,
    /// Class loader jobs only
    ClassLoaderUnload,
}

impl WorkerMode {
    pub fn name(self) -> &'static str {
        match self {
            WorkerMode::Normal => "normal",
            WorkerMode::Forced => "forced",
            WorkerMode::ClassLoaderUnload => "class_loader_unload",
        }
    }
}

/// Fields guarded by the worker's handshake monitor
#[derive(Debug)]
pub(crate) struct WorkerControl {
    pub state: WorkerState,
    pub mode: WorkerMode,
    /// Set by the worker when a pass ends
    pub finished: bool,
    /// The last pass found nothing to do
    pub no_work_done: bool,
    /// Set by the supervisor to start a pass
    pub wake_up: bool,
    /// Dispatcher attach error, reported through the handshake
    pub attach_error: Option<String>,
}

/// Per-worker supervision record
#[derive(Debug)]
pub(crate) struct WorkerShared {
    pub id: u64,
    pub control: Mutex<WorkerControl>,
    pub monitor: Condvar,
}

impl WorkerShared {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            control: Mutex::new(WorkerControl {
                state: WorkerState::Starting,
                mode: WorkerMode::Normal,
                finished: false,
                no_work_done: false,
                wake_up: false,
                attach_error: None,
            }),
            monitor: Condvar::new(),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.control.lock().state
    }
}

/// Supervisor flags, guarded by the master monitor
#[derive(Debug, Default)]
pub(crate) struct SupervisorFlags {
    pub active: bool,
    pub shutdown: bool,
    pub shutdown_complete: bool,
    /// The collector queued work
    pub wake_up: bool,
    pub run_finalization: bool,
    pub run_finalization_count: usize,
    pub force_class_loader_unload: bool,
    pub force_class_loader_unload_count: usize,
    pub run_finalizers_on_exit: bool,
}

impl SupervisorFlags {
    /// Any request that ends an interval wait early
    pub fn work_requested(&self) -> bool {
        self.wake_up || self.run_finalization || self.force_class_loader_unload || self.shutdown
    }
}

/// A forced unload waiting for its loader
#[derive(Debug)]
pub(crate) struct PendingUnload {
    pub loader: ObjectRef,
    pub done: bool,
}

/// State shared by the orchestrator API, the supervisor and the workers
pub(crate) struct Supervision {
    pub ctx: Arc<FinalizeContext>,
    pub dispatcher: Arc<dyn JobDispatcher>,

    pub flags: Mutex<SupervisorFlags>,
    pub master: Condvar,

    /// Completed run-now rounds
    pub run_finalization_rounds: Mutex<u64>,
    pub run_finalization_done: Condvar,

    pub reference_processing: Mutex<bool>,
    pub reference_progress: Condvar,

    pub pending_unloads: Mutex<Vec<PendingUnload>>,
    pub unload_done: Condvar,

    /// Worker the supervisor currently owns
    pub current_worker: Mutex<Option<Arc<WorkerShared>>>,

    next_worker_id: AtomicU64,
}

impl Supervision {
    pub fn new(ctx: Arc<FinalizeContext>, dispatcher: Arc<dyn JobDispatcher>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            dispatcher,
            flags: Mutex::new(SupervisorFlags::default()),
            master: Condvar::new(),
            run_finalization_rounds: Mutex::new(0),
            run_finalization_done: Condvar::new(),
            reference_processing: Mutex::new(false),
            reference_progress: Condvar::new(),
            pending_unloads: Mutex::new(Vec::new()),
            unload_done: Condvar::new(),
            current_worker: Mutex::new(None),
            next_worker_id: AtomicU64::new(1),
        })
    }

    pub fn next_worker_id(&self) -> u64 {
        self.next_worker_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wake every run-now waiter
    pub fn complete_run_finalization(&self) {
        let mut rounds = self.run_finalization_rounds.lock();
        *rounds += 1;
        self.run_finalization_done.notify_all();
    }

    /// Record that a reference job completed
    pub fn note_reference_progress(&self) {
        let mut active = self.reference_processing.lock();
        if *active {
            if self.ctx.queue().reference_count_advisory() == 0 {
                *active = false;
            }
            self.reference_progress.notify_all();
        }
    }

    /// Raise the reference-processing flag if references are pending
    pub fn begin_reference_processing(&self) {
        if self.ctx.queue().reference_count_advisory() != 0 {
            *self.reference_processing.lock() = true;
        }
    }

    /// Record that a class loader was unloaded
    pub fn class_loader_unloaded(&self, loader: ObjectRef) {
        let mut pending = self.pending_unloads.lock();
        let mut notified = false;
        for unload in pending.iter_mut().filter(|unload| unload.loader == loader) {
            unload.done = true;
            notified = true;
        }
        if notified {
            self.unload_done.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alive_states() {
        assert!(WorkerState::Running.is_alive());
        assert!(WorkerState::Finished.is_alive());
        assert!(!WorkerState::AbandonRequested.is_alive());
        assert!(!WorkerState::Dying.is_alive());
        assert!(WorkerState::Abandoned.is_abandoned());
    }

    #[test]
    fn test_work_requested() {
        let mut flags = SupervisorFlags::default();
        assert!(!flags.work_requested());
        flags.run_finalization = true;
        assert!(flags.work_requested());
    }
}
