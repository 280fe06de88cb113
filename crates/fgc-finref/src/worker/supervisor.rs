//! Finalizer Supervisor Thread
//!
//! Owns at most one worker at a time. Each cycle wakes the worker, then
//! waits up to `cycle_limit` for it to report finished. A worker that does
//! not is disowned: its slot is dropped, its thread detached, and the next
//! cycle starts a fresh worker.
//!
//! Wait policy between cycles:
//! - run-now or forced unload pending: no wait
//! - forced unload with nothing left to unload: wait for its callers
//! - queue non-empty after a cycle: no wait
//! - after a collector wake-up: `cycle_interval`
//! - last pass did no work: wait for a request

use super::slave::{spawn_worker, WorkerSlot};
use super::state::{Supervision, SupervisorFlags, WorkerMode, WorkerState};
use crate::config::WaitPolicy;
use crate::error::{FinalizeError, Result};
use crate::logging::{log_event, FinalizeEvent};
use parking_lot::MutexGuard;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) const SUPERVISOR_THREAD_NAME: &str = "Finalizer master";

/// How one worker cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// The worker reported finished within the time budget
    Finished { no_work_done: bool },
    /// The worker ran past the time budget and was disowned
    Abandoned,
    /// The worker asked to be disowned (finalizers-on-exit from user code)
    AbandonRequested,
}

/// Spawn the supervisor and wait until it is active
pub(crate) fn spawn_supervisor(sup: Arc<Supervision>) -> Result<JoinHandle<()>> {
    log::debug!(
        "spawning finalizer supervisor (priority {})",
        sup.ctx.config().supervisor_priority
    );

    let supervisor = Supervisor {
        sup: sup.clone(),
        slot: None,
    };
    let handle = thread::Builder::new()
        .name(SUPERVISOR_THREAD_NAME.to_string())
        .spawn(move || supervisor.run())
        .map_err(|source| FinalizeError::ThreadSpawn {
            name: SUPERVISOR_THREAD_NAME.to_string(),
            source,
        })?;

    let mut flags = sup.flags.lock();
    while !flags.active && !flags.shutdown_complete {
        sup.master.wait(&mut flags);
    }
    Ok(handle)
}

/// Upper bound on one wait for forced-unload callers to collect their result
const UNLOAD_RECHECK: Duration = Duration::from_millis(10);

/// Block until a forced-unload caller comes or goes, or another request
/// arrives
///
/// Every loader queued so far is unloaded; the flag stays raised until the
/// last caller has seen its result. Callers notify `master` on both edges.
fn await_unload_waiters(sup: &Supervision, flags: &mut MutexGuard<'_, SupervisorFlags>) {
    let waiters = flags.force_class_loader_unload_count;
    let deadline = Instant::now() + UNLOAD_RECHECK;
    while flags.force_class_loader_unload
        && flags.force_class_loader_unload_count == waiters
        && !flags.shutdown
        && !flags.wake_up
        && !flags.run_finalization
    {
        if sup.master.wait_until(flags, deadline).timed_out() {
            break;
        }
    }
}

struct Supervisor {
    sup: Arc<Supervision>,
    slot: Option<WorkerSlot>,
}

impl Supervisor {
    fn run(mut self) {
        let sup = self.sup.clone();
        let config = sup.ctx.config().clone();

        let mut wait = WaitPolicy::Indefinite;
        let mut no_cycle_wait = false;

        let mut flags = sup.flags.lock();
        flags.active = true;
        sup.master.notify_all();

        loop {
            if wait != WaitPolicy::Immediate && !no_cycle_wait && !flags.work_requested() {
                match wait {
                    WaitPolicy::Yield => MutexGuard::unlocked(&mut flags, thread::yield_now),
                    WaitPolicy::Indefinite => {
                        while !flags.work_requested() {
                            sup.master.wait(&mut flags);
                        }
                    },
                    WaitPolicy::Interval(interval) => {
                        let deadline = Instant::now() + interval;
                        while !flags.work_requested() {
                            if sup.master.wait_until(&mut flags, deadline).timed_out() {
                                break;
                            }
                        }
                    },
                    WaitPolicy::Immediate => {},
                }
            }

            if flags.shutdown {
                break;
            }

            if flags.wake_up {
                flags.wake_up = false;
                wait = config.cycle_interval;
            }

            no_cycle_wait = sup.ctx.queue().job_count() != 0;

            if flags.run_finalization || flags.force_class_loader_unload {
                wait = WaitPolicy::Immediate;
            }

            let forced_unload = flags.force_class_loader_unload;
            let run_finalization = flags.run_finalization;
            let mode = if forced_unload {
                WorkerMode::ClassLoaderUnload
            } else {
                WorkerMode::Normal
            };

            let outcome = MutexGuard::unlocked(&mut flags, || self.run_cycle(mode));
            match outcome {
                Err(err) => {
                    log::warn!("finalizer cycle given up: {}", err);
                    wait = WaitPolicy::Indefinite;
                    no_cycle_wait = false;
                },
                Ok(CycleOutcome::Finished { no_work_done: true }) => {
                    if forced_unload {
                        await_unload_waiters(&sup, &mut flags);
                        wait = WaitPolicy::Indefinite;
                    } else {
                        wait = WaitPolicy::Indefinite;
                        if run_finalization {
                            flags.run_finalization = false;
                            sup.complete_run_finalization();
                        }
                    }
                },
                Ok(_) => {},
            }
        }

        let drain = flags.run_finalizers_on_exit;
        MutexGuard::unlocked(&mut flags, || {
            if drain {
                self.drain();
            }
            self.retire_worker();
        });

        flags.shutdown_complete = true;
        flags.active = false;
        sup.master.notify_all();
        if flags.run_finalization {
            flags.run_finalization = false;
            sup.complete_run_finalization();
        }
        drop(flags);

        log_event(FinalizeEvent::ShutdownComplete { drained: drain });
    }

    /// Wake the worker for one pass, starting one first if needed
    fn run_cycle(&mut self, mode: WorkerMode) -> Result<CycleOutcome> {
        let shared = match &self.slot {
            Some(slot) => slot.shared.clone(),
            None => self.start_worker(mode)?,
        };

        let limit = self.sup.ctx.config().cycle_limit;
        let mut control = shared.control.lock();
        control.wake_up = true;
        control.mode = mode;
        control.finished = false;
        shared.monitor.notify_all();

        let deadline = Instant::now() + limit;
        while !control.finished {
            if shared.monitor.wait_until(&mut control, deadline).timed_out() {
                break;
            }
        }

        if control.state.is_abandoned() {
            drop(control);
            self.disown();
            return Ok(CycleOutcome::AbandonRequested);
        }

        if control.finished {
            let no_work_done = std::mem::take(&mut control.no_work_done);
            return Ok(CycleOutcome::Finished { no_work_done });
        }

        control.state = WorkerState::AbandonRequested;
        shared.monitor.notify_all();
        drop(control);

        self.disown();
        self.sup.ctx.stats().record_worker_abandoned();
        log::warn!(
            "finalizer worker {} did not finish within {:?}, abandoning it",
            shared.id,
            limit
        );
        log_event(FinalizeEvent::WorkerAbandoned {
            worker: shared.id,
            limit_ms: limit.as_millis() as u64,
        });
        Ok(CycleOutcome::Abandoned)
    }

    fn start_worker(&mut self, mode: WorkerMode) -> Result<Arc<super::state::WorkerShared>> {
        match spawn_worker(&self.sup) {
            Ok(slot) => {
                let shared = slot.shared.clone();
                self.sup.ctx.stats().record_worker_started();
                log_event(FinalizeEvent::WorkerStarted {
                    worker: shared.id,
                    mode: mode.name().to_string(),
                });
                *self.sup.current_worker.lock() = Some(shared.clone());
                self.slot = Some(slot);
                Ok(shared)
            },
            Err(err) => {
                self.sup.ctx.stats().record_worker_start_failure();
                log::warn!("finalizer worker start failed: {}", err);
                log_event(FinalizeEvent::WorkerStartFailed {
                    reason: err.to_string(),
                });
                Err(err)
            },
        }
    }

    /// Drop the supervisor's side of the current worker
    ///
    /// The thread is detached, not joined; it may still be inside user code.
    fn disown(&mut self) {
        if let Some(slot) = self.slot.take() {
            let mut current = self.sup.current_worker.lock();
            if current
                .as_ref()
                .is_some_and(|worker| Arc::ptr_eq(worker, &slot.shared))
            {
                *current = None;
            }
            drop(slot.handle);
        }
    }

    /// Forced passes until one finishes with nothing to do
    fn drain(&mut self) {
        loop {
            match self.run_cycle(WorkerMode::Forced) {
                Ok(CycleOutcome::AbandonRequested) => continue,
                Ok(CycleOutcome::Finished { no_work_done: false }) => continue,
                Ok(CycleOutcome::Finished { no_work_done: true }) => break,
                Ok(CycleOutcome::Abandoned) => {
                    log::warn!("finalizer worker hung during shutdown drain");
                    break;
                },
                Err(err) => {
                    log::warn!("shutdown drain stopped: {}", err);
                    break;
                },
            }
        }
    }

    /// Tell an idle worker to exit and reap it
    fn retire_worker(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };

        let mut control = slot.shared.control.lock();
        if control.state.is_alive() {
            control.state = WorkerState::Dying;
        }
        slot.shared.monitor.notify_all();
        while control.state == WorkerState::Dying {
            slot.shared.monitor.wait(&mut control);
        }
        drop(control);

        *self.sup.current_worker.lock() = None;
        if slot.handle.join().is_err() {
            log::error!("finalizer worker {} panicked on exit", slot.shared.id);
        }
    }
}
