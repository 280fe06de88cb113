//! Runtime Module - Finalization Runtime Integration
//!
//! Wires the subsystem together for an embedding VM:
//! - Shared context (lists, job queue, buffer registry, counters)
//! - Collection cycle adapter, driven by the collector
//! - Worker orchestrator, driven by the runtime API
//! - Mutator attach/detach

use crate::buffer::MutatorContext;
use crate::config::FinalizeConfig;
use crate::context::FinalizeContext;
use crate::cycle::CollectionCycleAdapter;
use crate::dispatch::JobDispatcher;
use crate::error::{FinalizeError, Result};
use crate::logging::{configure_logger, FinalizeLoggerConfig};
use crate::object::{CollectorInterface, ObjectModel, ObjectRef};
use crate::stats::StatsSnapshot;
use crate::worker::{
    FinalizationWorkerOrchestrator, RunFinalizationOutcome, UnloadOutcome, WorkerState,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Runtime state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Created, no supervisor yet
    Initialized,
    /// Supervisor running
    Running,
    /// Shutdown requested, supervisor still draining
    Stopping,
    /// Supervisor exited
    Stopped,
}

/// FinalizationRuntime - finalization subsystem orchestrator
///
/// # Examples
///
/// ```rust
/// use fgc_finref::dispatch::FnDispatcher;
/// use fgc_finref::object::ObjectArena;
/// use fgc_finref::{FinalizationRuntime, FinalizeConfig};
/// use std::sync::Arc;
///
/// let arena = Arc::new(ObjectArena::new(1));
/// let runtime = FinalizationRuntime::new(arena.clone(), arena, FinalizeConfig::default())?;
/// runtime.start(Arc::new(FnDispatcher::new(|_job| {})))?;
///
/// let mutator = runtime.attach_mutator();
/// drop(mutator);
///
/// runtime.shutdown(false)?;
/// # Ok::<(), fgc_finref::FinalizeError>(())
/// ```
pub struct FinalizationRuntime {
    ctx: Arc<FinalizeContext>,
    cycle: CollectionCycleAdapter,
    orchestrator: Mutex<Option<Arc<FinalizationWorkerOrchestrator>>>,
    state: Mutex<RuntimeState>,
}

impl FinalizationRuntime {
    /// Create the runtime for one heap
    ///
    /// # Errors
    /// `Configuration` if `config` does not validate.
    pub fn new(
        model: Arc<dyn ObjectModel>,
        collector: Arc<dyn CollectorInterface>,
        config: FinalizeConfig,
    ) -> Result<Self> {
        if config.verbose {
            configure_logger(FinalizeLoggerConfig::verbose());
        }
        let ctx = FinalizeContext::new(model, collector, config)?;

        Ok(Self {
            cycle: CollectionCycleAdapter::new(ctx.clone()),
            ctx,
            orchestrator: Mutex::new(None),
            state: Mutex::new(RuntimeState::Initialized),
        })
    }

    /// Start the supervisor thread
    ///
    /// # Errors
    /// `InvalidState` if already started, `ThreadSpawn` if the supervisor
    /// thread cannot be created.
    pub fn start(&self, dispatcher: Arc<dyn JobDispatcher>) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RuntimeState::Initialized {
            return Err(FinalizeError::InvalidState {
                expected: "Initialized".to_string(),
                actual: format!("{:?}", *state),
            });
        }

        let orchestrator = FinalizationWorkerOrchestrator::start(self.ctx.clone(), dispatcher)?;
        *self.orchestrator.lock() = Some(Arc::new(orchestrator));
        *state = RuntimeState::Running;
        log::info!("finalization runtime started");
        Ok(())
    }

    fn running(&self) -> Option<Arc<FinalizationWorkerOrchestrator>> {
        if *self.state.lock() != RuntimeState::Running {
            return None;
        }
        self.orchestrator.lock().clone()
    }

    /// Register the calling thread; dropping the handle detaches it
    pub fn attach_mutator(&self) -> MutatorContext {
        MutatorContext::attach(self.ctx.clone())
    }

    /// Collector-facing hooks
    pub fn cycle_adapter(&self) -> &CollectionCycleAdapter {
        &self.cycle
    }

    /// End of a collection: wake the supervisor if the cycle queued work
    ///
    /// # Returns
    /// Whether the supervisor was woken.
    pub fn notify_cycle_end(&self) -> bool {
        let required = self.cycle.take_finalization_required();
        match self.running() {
            Some(orchestrator) if required || self.pending_finalization_work() => {
                orchestrator.notify_cycle_end();
                true
            },
            _ => false,
        }
    }

    /// Run pending finalizers now, waiting a bounded time
    pub fn run_finalization(&self) -> RunFinalizationOutcome {
        match self.running() {
            Some(orchestrator) => orchestrator.run_finalization(),
            None => RunFinalizationOutcome::NotRunning,
        }
    }

    /// Stop the supervisor
    ///
    /// With `drain`, every remaining finalizer runs first. Repeated calls
    /// are no-ops.
    pub fn shutdown(&self, drain: bool) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                RuntimeState::Stopped => return Ok(()),
                RuntimeState::Initialized => {
                    *state = RuntimeState::Stopped;
                    return Ok(());
                },
                RuntimeState::Running | RuntimeState::Stopping => *state = RuntimeState::Stopping,
            }
        }

        let orchestrator = self.orchestrator.lock().clone();
        if let Some(orchestrator) = orchestrator {
            orchestrator.shutdown(drain)?;
            if orchestrator.is_active() {
                return Ok(());
            }
        }

        *self.state.lock() = RuntimeState::Stopped;
        log::info!("finalization runtime stopped");
        Ok(())
    }

    /// Run every remaining finalizer, then stop; callable from a finalizer
    pub fn complete_finalizers_on_exit(&self) {
        let Some(orchestrator) = self.running() else {
            return;
        };
        *self.state.lock() = RuntimeState::Stopping;
        orchestrator.complete_finalizers_on_exit();
        if !orchestrator.is_active() {
            *self.state.lock() = RuntimeState::Stopped;
        }
    }

    pub fn set_run_finalizers_on_exit(&self, enabled: bool) {
        if let Some(orchestrator) = self.orchestrator.lock().as_ref() {
            orchestrator.set_run_finalizers_on_exit(enabled);
        }
    }

    /// Unload `loader` on a worker, waiting a bounded time
    pub fn force_class_loader_unload(&self, loader: ObjectRef) -> UnloadOutcome {
        match self.running() {
            Some(orchestrator) => orchestrator.force_class_loader_unload(loader),
            None => UnloadOutcome::NotRunning,
        }
    }

    /// Advisory: reference jobs are being delivered
    pub fn is_reference_processing_active(&self) -> bool {
        self.running()
            .is_some_and(|orchestrator| orchestrator.is_reference_processing_active())
    }

    /// Block until one reference job completes, if any are being processed
    pub fn wait_for_reference_processing(&self) -> bool {
        self.running()
            .is_some_and(|orchestrator| orchestrator.wait_for_reference_processing())
    }

    /// Advisory: the job queue is non-empty
    pub fn pending_finalization_work(&self) -> bool {
        self.ctx.queue().pending_advisory() > 0
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.orchestrator
            .lock()
            .as_ref()
            .map_or(WorkerState::None, |orchestrator| orchestrator.worker_state())
    }

    pub fn context(&self) -> &Arc<FinalizeContext> {
        &self.ctx
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats().snapshot()
    }
}

impl std::fmt::Debug for FinalizationRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizationRuntime")
            .field("state", &self.state())
            .field("cycle", &self.cycle)
            .finish()
    }
}
