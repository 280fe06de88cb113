//! Finalizer Worker Thread
//!
//! The worker drains the job queue one job at a time, calling into the
//! dispatcher with no lock held. Between jobs it checks whether it has been
//! disowned; a disowned worker finishes the job in hand, then exits and
//! drops its own supervision record.

use super::state::{Supervision, WorkerMode, WorkerShared, WorkerState};
use crate::error::{FinalizeError, Result};
use crate::logging::{log_event, FinalizeEvent};
use crate::object::ReferenceState;
use crate::queue::FinalizeJob;
use crate::stats::PassTimer;
use parking_lot::MutexGuard;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub(crate) const WORKER_THREAD_NAME: &str = "Finalizer thread";

thread_local! {
    static IS_FINALIZER_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the calling thread is a finalizer worker
pub fn on_worker_thread() -> bool {
    IS_FINALIZER_WORKER.with(Cell::get)
}

/// The supervisor's handle on a live worker
pub(crate) struct WorkerSlot {
    pub shared: Arc<WorkerShared>,
    pub handle: JoinHandle<()>,
}

/// Spawn a worker and wait for its handshake
///
/// # Errors
/// `ThreadSpawn` if the OS refuses the thread, `AttachFailed` if the
/// dispatcher refuses the worker. Both are transient.
pub(crate) fn spawn_worker(sup: &Arc<Supervision>) -> Result<WorkerSlot> {
    let shared = WorkerShared::new(sup.next_worker_id());
    let worker = Worker {
        shared: shared.clone(),
        sup: sup.clone(),
    };

    log::debug!(
        "spawning finalizer worker {} (priority {})",
        shared.id,
        sup.ctx.config().worker_priority
    );
    let handle = thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || worker.run())
        .map_err(|source| FinalizeError::ThreadSpawn {
            name: WORKER_THREAD_NAME.to_string(),
            source,
        })?;

    let mut control = shared.control.lock();
    while control.state == WorkerState::Starting {
        shared.monitor.wait(&mut control);
    }
    if let Some(reason) = control.attach_error.take() {
        drop(control);
        let _ = handle.join();
        return Err(FinalizeError::AttachFailed(reason));
    }
    drop(control);

    Ok(WorkerSlot { shared, handle })
}

struct Worker {
    shared: Arc<WorkerShared>,
    sup: Arc<Supervision>,
}

impl Worker {
    fn run(self) {
        if let Err(err) = self.sup.dispatcher.attach() {
            let mut control = self.shared.control.lock();
            control.attach_error = Some(err.to_string());
            control.state = WorkerState::Dead;
            self.shared.monitor.notify_all();
            return;
        }

        IS_FINALIZER_WORKER.with(|flag| flag.set(true));

        let mut control = self.shared.control.lock();
        control.state = WorkerState::Running;
        self.shared.monitor.notify_all();

        loop {
            while !control.wake_up && control.state.is_alive() {
                self.shared.monitor.wait(&mut control);
            }
            control.wake_up = false;
            if !control.state.is_alive() {
                break;
            }

            control.state = WorkerState::Running;
            let mode = control.mode;
            let processed = MutexGuard::unlocked(&mut control, || self.run_pass(mode));

            control.no_work_done = processed == 0;
            control.finished = true;
            if control.state == WorkerState::Running {
                control.state = WorkerState::Finished;
            }
            self.shared.monitor.notify_all();
        }

        control.state = match control.state {
            WorkerState::AbandonRequested | WorkerState::Abandoned => WorkerState::Abandoned,
            _ => WorkerState::Dead,
        };
        control.finished = true;
        let state = control.state;
        self.shared.monitor.notify_all();
        drop(control);

        self.sup.dispatcher.detach();
        if state == WorkerState::Abandoned {
            log::debug!("abandoned finalizer worker {} exiting", self.shared.id);
        }
    }

    /// Drain jobs until the queue is empty or the worker is disowned
    fn run_pass(&self, mode: WorkerMode) -> usize {
        let ctx = &self.sup.ctx;
        let timer = PassTimer::new();

        if mode != WorkerMode::ClassLoaderUnload {
            self.sup.begin_reference_processing();
        }

        let mut processed = 0;
        while let Some(job) = self.next_job(mode) {
            self.process(job);
            processed += 1;
            self.sup.note_reference_progress();

            if self.should_stop() {
                break;
            }
        }

        ctx.stats().record_pass(&timer);
        log_event(FinalizeEvent::WorkerFinished {
            worker: self.shared.id,
            jobs: processed,
            duration_ms: timer.elapsed_ms(),
        });
        processed
    }

    fn next_job(&self, mode: WorkerMode) -> Option<FinalizeJob> {
        let queue = self.sup.ctx.queue();
        if mode == WorkerMode::ClassLoaderUnload {
            return queue.lock().pop_class_loader_for_forced_unload();
        }

        let job = queue.lock().consume_job();
        if job.is_some() || mode != WorkerMode::Forced {
            return job;
        }

        crate::cycle::force_unfinalized_to_finalizable(&self.sup.ctx);
        queue.lock().consume_job()
    }

    /// Checkpoint: disowned or told to die
    fn should_stop(&self) -> bool {
        let state = self.shared.control.lock().state;
        state.is_abandoned() || state == WorkerState::Dying
    }

    fn process(&self, job: FinalizeJob) {
        let dispatcher = self.sup.dispatcher.as_ref();
        let outcome = catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(job)));
        if outcome.is_err() {
            log::error!(
                "finalizer worker {}: {} job for {} panicked",
                self.shared.id,
                job.kind_name(),
                job.object()
            );
        }

        match job {
            FinalizeJob::Reference(reference) => {
                self.sup
                    .ctx
                    .model()
                    .set_reference_state(reference, ReferenceState::Enqueued);
            },
            FinalizeJob::ClassLoader(loader) => self.sup.class_loader_unloaded(loader),
            FinalizeJob::Object(_) => {},
        }
        self.sup.ctx.stats().record_job(job);
    }
}
