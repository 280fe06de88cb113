//! Finalization Worker Orchestration
//!
//! A supervisor thread owns at most one worker thread at a time. The worker
//! runs user code through the [`JobDispatcher`] and may block in it forever;
//! the supervisor never waits on it longer than `cycle_limit`. A worker that
//! overruns is abandoned and a fresh one takes over on the next cycle.
//!
//! ```text
//!  collector ──notify_cycle_end──▶ supervisor ──wake──▶ worker ──▶ dispatcher
//!  run_finalization ─────────────▶     │       ◀─finished─┘
//!                                      └── cycle_limit exceeded: disown
//! ```

pub mod state;

pub(crate) mod slave;
pub(crate) mod supervisor;

pub use slave::on_worker_thread;
pub use state::{WorkerMode, WorkerState};

use crate::context::FinalizeContext;
use crate::dispatch::JobDispatcher;
use crate::error::Result;
use crate::logging::{log_event, FinalizeEvent};
use crate::object::ObjectRef;
use parking_lot::Mutex;
use state::{PendingUnload, Supervision};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// How a run-now request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFinalizationOutcome {
    /// A worker pass drained the queue after the request
    Completed,
    /// The wait bound passed first; the request stays best-effort
    TimedOut,
    /// The supervisor is not running or is shutting down
    NotRunning,
}

/// How a forced class loader unload ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    Unloaded,
    TimedOut,
    NotRunning,
}

/// FinalizationWorkerOrchestrator - supervisor handle and request API
pub struct FinalizationWorkerOrchestrator {
    sup: Arc<Supervision>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl FinalizationWorkerOrchestrator {
    /// Start the supervisor thread
    ///
    /// The worker itself starts lazily on the first cycle.
    ///
    /// # Errors
    /// `ThreadSpawn` if the supervisor thread cannot be created.
    pub fn start(ctx: Arc<FinalizeContext>, dispatcher: Arc<dyn JobDispatcher>) -> Result<Self> {
        let sup = Supervision::new(ctx, dispatcher);
        let handle = supervisor::spawn_supervisor(sup.clone())?;
        Ok(Self {
            sup,
            supervisor: Mutex::new(Some(handle)),
        })
    }

    /// The collector queued work
    pub fn notify_cycle_end(&self) {
        let mut flags = self.sup.flags.lock();
        flags.wake_up = true;
        self.sup.master.notify_all();
    }

    /// Ask for a worker pass and wait for it, bounded by
    /// `run_finalization_timeout`
    pub fn run_finalization(&self) -> RunFinalizationOutcome {
        let timeout = self.sup.ctx.config().run_finalization_timeout;

        let target = {
            let mut flags = self.sup.flags.lock();
            if !flags.active || flags.shutdown {
                return RunFinalizationOutcome::NotRunning;
            }
            flags.run_finalization = true;
            flags.run_finalization_count += 1;
            let target = *self.sup.run_finalization_rounds.lock() + 1;
            self.sup.master.notify_all();
            target
        };

        let deadline = Instant::now() + timeout;
        let completed = {
            let mut rounds = self.sup.run_finalization_rounds.lock();
            while *rounds < target {
                if self
                    .sup
                    .run_finalization_done
                    .wait_until(&mut rounds, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            *rounds >= target
        };

        {
            let mut flags = self.sup.flags.lock();
            flags.run_finalization_count = flags.run_finalization_count.saturating_sub(1);
            if flags.run_finalization_count == 0 {
                flags.run_finalization = false;
            }
            self.sup.master.notify_all();
        }

        if completed {
            RunFinalizationOutcome::Completed
        } else {
            log::warn!("run finalization timed out after {:?}", timeout);
            log_event(FinalizeEvent::RunFinalizationTimedOut {
                timeout_ms: timeout.as_millis() as u64,
            });
            RunFinalizationOutcome::TimedOut
        }
    }

    /// Stop the supervisor, draining the finalizable population first when
    /// `drain` is set
    ///
    /// Called from a worker thread the request is recorded and the call
    /// returns at once; waiting there would wait on itself.
    pub fn shutdown(&self, drain: bool) -> Result<()> {
        {
            let mut flags = self.sup.flags.lock();
            if drain {
                flags.run_finalizers_on_exit = true;
            }
            flags.shutdown = true;
            self.sup.master.notify_all();

            if on_worker_thread() {
                return Ok(());
            }
            while flags.active {
                self.sup.master.wait(&mut flags);
            }
        }

        if let Some(handle) = self.supervisor.lock().take() {
            if handle.join().is_err() {
                log::error!("finalizer supervisor panicked");
            }
        }
        Ok(())
    }

    /// Run every remaining finalizer, then stop
    ///
    /// Safe to call from a finalizer: the calling worker is asked to
    /// abandon so that a fresh worker does the drain.
    pub fn complete_finalizers_on_exit(&self) {
        let mut flags = self.sup.flags.lock();
        if !flags.active {
            return;
        }
        flags.run_finalizers_on_exit = true;
        flags.shutdown = true;
        self.sup.master.notify_all();

        if let Some(worker) = self.sup.current_worker.lock().clone() {
            let mut control = worker.control.lock();
            if !control.finished {
                control.finished = true;
                control.state = WorkerState::AbandonRequested;
                worker.monitor.notify_all();
            }
        }

        while !flags.shutdown_complete {
            self.sup.master.wait(&mut flags);
        }
    }

    pub fn set_run_finalizers_on_exit(&self, enabled: bool) {
        self.sup.flags.lock().run_finalizers_on_exit = enabled;
    }

    /// Queue `loader` for unload and wait for a worker to unload it,
    /// bounded by `forced_unload_timeout`
    pub fn force_class_loader_unload(&self, loader: ObjectRef) -> UnloadOutcome {
        {
            let flags = self.sup.flags.lock();
            if !flags.active || flags.shutdown {
                return UnloadOutcome::NotRunning;
            }
        }

        let timeout = self.sup.ctx.config().forced_unload_timeout;
        self.sup.pending_unloads.lock().push(PendingUnload {
            loader,
            done: false,
        });
        self.sup.ctx.queue().lock().add_class_loader(loader);

        {
            let mut flags = self.sup.flags.lock();
            flags.force_class_loader_unload = true;
            flags.force_class_loader_unload_count += 1;
            self.sup.master.notify_all();
        }

        let deadline = Instant::now() + timeout;
        let unloaded = {
            let mut pending = self.sup.pending_unloads.lock();
            let is_done = |pending: &Vec<PendingUnload>| {
                pending
                    .iter()
                    .any(|unload| unload.loader == loader && unload.done)
            };
            while !is_done(&pending) {
                if self
                    .sup
                    .unload_done
                    .wait_until(&mut pending, deadline)
                    .timed_out()
                {
                    break;
                }
            }
            let unloaded = is_done(&pending);
            if let Some(index) = pending.iter().position(|unload| unload.loader == loader) {
                pending.remove(index);
            }
            unloaded
        };

        {
            let mut flags = self.sup.flags.lock();
            flags.force_class_loader_unload_count =
                flags.force_class_loader_unload_count.saturating_sub(1);
            if flags.force_class_loader_unload_count == 0 {
                flags.force_class_loader_unload = false;
            }
            self.sup.master.notify_all();
        }

        if unloaded {
            UnloadOutcome::Unloaded
        } else {
            log::warn!("forced unload of class loader {} timed out", loader);
            UnloadOutcome::TimedOut
        }
    }

    /// Advisory: a worker is processing reference jobs
    pub fn is_reference_processing_active(&self) -> bool {
        *self.sup.reference_processing.lock()
    }

    /// Wait for one unit of reference-processing progress
    ///
    /// Returns `true` if reference processing was active on entry.
    pub fn wait_for_reference_processing(&self) -> bool {
        let mut active = self.sup.reference_processing.lock();
        if !*active {
            return false;
        }
        self.sup.reference_progress.wait(&mut active);
        true
    }

    pub fn is_active(&self) -> bool {
        self.sup.flags.lock().active
    }

    /// State of the worker the supervisor currently owns
    pub fn worker_state(&self) -> WorkerState {
        self.sup
            .current_worker
            .lock()
            .as_ref()
            .map_or(WorkerState::None, |worker| worker.state())
    }

    /// Authoritative job count
    pub fn pending_jobs(&self) -> usize {
        self.sup.ctx.queue().job_count()
    }
}

impl Drop for FinalizationWorkerOrchestrator {
    fn drop(&mut self) {
        if self.supervisor.lock().is_some() {
            let _ = self.shutdown(false);
        }
    }
}

impl std::fmt::Debug for FinalizationWorkerOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizationWorkerOrchestrator")
            .field("active", &self.is_active())
            .field("worker_state", &self.worker_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FinalizeConfig, WaitPolicy};
    use crate::dispatch::FnDispatcher;
    use crate::object::arena::ObjectArena;
    use crate::object::RegionId;
    use crate::queue::FinalizeJob;
    use std::time::Duration;

    fn context(config: FinalizeConfig) -> (Arc<ObjectArena>, Arc<FinalizeContext>) {
        let arena = Arc::new(ObjectArena::new(1));
        let ctx = FinalizeContext::new(arena.clone(), arena.clone(), config).unwrap();
        (arena, ctx)
    }

    fn fast_config() -> FinalizeConfig {
        FinalizeConfig {
            cycle_interval: WaitPolicy::Interval(Duration::from_millis(10)),
            cycle_limit: Duration::from_millis(500),
            run_finalization_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[test]
    fn test_start_and_shutdown() {
        let (_arena, ctx) = context(fast_config());
        let orchestrator =
            FinalizationWorkerOrchestrator::start(ctx, Arc::new(FnDispatcher::new(|_| {})))
                .unwrap();
        assert!(orchestrator.is_active());
        assert_eq!(orchestrator.worker_state(), WorkerState::None);

        orchestrator.shutdown(false).unwrap();
        assert!(!orchestrator.is_active());
        assert_eq!(
            orchestrator.run_finalization(),
            RunFinalizationOutcome::NotRunning
        );
    }

    #[test]
    fn test_run_finalization_drains_queue() {
        let (arena, ctx) = context(fast_config());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let orchestrator = FinalizationWorkerOrchestrator::start(
            ctx.clone(),
            Arc::new(FnDispatcher::new(move |job| sink.lock().push(job))),
        )
        .unwrap();

        let object = arena.allocate(RegionId(0));
        ctx.queue().lock().add_default_finalizable(object, object, 1);

        assert_eq!(
            orchestrator.run_finalization(),
            RunFinalizationOutcome::Completed
        );
        assert_eq!(*seen.lock(), vec![FinalizeJob::Object(object)]);
        assert_eq!(orchestrator.pending_jobs(), 0);
    }

    #[test]
    fn test_forced_unload() {
        let (arena, ctx) = context(fast_config());
        let orchestrator = FinalizationWorkerOrchestrator::start(
            ctx.clone(),
            Arc::new(FnDispatcher::new(|_| {})),
        )
        .unwrap();

        let loader = arena.allocate(RegionId(0));
        assert_eq!(
            orchestrator.force_class_loader_unload(loader),
            UnloadOutcome::Unloaded
        );
        assert_eq!(ctx.stats().snapshot().class_loaders_unloaded, 1);
    }

    #[test]
    fn test_no_reference_processing_when_idle() {
        let (_arena, ctx) = context(fast_config());
        let orchestrator =
            FinalizationWorkerOrchestrator::start(ctx, Arc::new(FnDispatcher::new(|_| {})))
                .unwrap();
        assert!(!orchestrator.is_reference_processing_active());
        assert!(!orchestrator.wait_for_reference_processing());
    }
}
