//! Job Dispatch - the seam to user-level cleanup code
//!
//! The worker hands each job to a [`JobDispatcher`]. Dispatch calls run
//! user code and may block for any length of time, forever included; the
//! worker never holds a lock across them.

use crate::error::{FinalizeError, Result};
use crate::object::ObjectRef;
use crate::queue::FinalizeJob;

/// Runs finalizers, enqueues references and unloads class loaders
pub trait JobDispatcher: Send + Sync + 'static {
    /// Worker handshake, called once on the worker thread before any job
    ///
    /// An error is a transient start failure: the worker exits and the
    /// supervisor retries on its next cycle.
    fn attach(&self) -> Result<()> {
        Ok(())
    }

    /// Run an object's finalizer
    fn run_finalizer(&self, object: ObjectRef);

    /// Deliver a cleared reference to its notification queue
    fn enqueue_reference(&self, reference: ObjectRef);

    /// Unload a dead class loader
    fn unload_class_loader(&self, loader: ObjectRef);

    /// Called once on the worker thread as it exits
    fn detach(&self) {}

    /// Route a job to the matching call
    fn dispatch(&self, job: FinalizeJob) {
        match job {
            FinalizeJob::Object(object) => self.run_finalizer(object),
            FinalizeJob::Reference(reference) => self.enqueue_reference(reference),
            FinalizeJob::ClassLoader(loader) => self.unload_class_loader(loader),
        }
    }
}

type AttachFn = Box<dyn Fn() -> std::result::Result<(), String> + Send + Sync>;

/// FnDispatcher - closure-backed dispatcher
///
/// ```rust
/// use fgc_finref::dispatch::{FnDispatcher, JobDispatcher};
/// use fgc_finref::object::ObjectRef;
/// use fgc_finref::queue::FinalizeJob;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let dispatcher = FnDispatcher::new(move |_job: FinalizeJob| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
/// dispatcher.run_finalizer(ObjectRef::new(16).unwrap());
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct FnDispatcher<F>
where
    F: Fn(FinalizeJob) + Send + Sync + 'static,
{
    handler: F,
    attach: Option<AttachFn>,
}

impl<F> FnDispatcher<F>
where
    F: Fn(FinalizeJob) + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            attach: None,
        }
    }

    /// Use `attach` as the worker handshake
    pub fn with_attach<A>(mut self, attach: A) -> Self
    where
        A: Fn() -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.attach = Some(Box::new(attach));
        self
    }
}

impl<F> JobDispatcher for FnDispatcher<F>
where
    F: Fn(FinalizeJob) + Send + Sync + 'static,
{
    fn attach(&self) -> Result<()> {
        match &self.attach {
            Some(attach) => attach().map_err(FinalizeError::AttachFailed),
            None => Ok(()),
        }
    }

    fn run_finalizer(&self, object: ObjectRef) {
        (self.handler)(FinalizeJob::Object(object));
    }

    fn enqueue_reference(&self, reference: ObjectRef) {
        (self.handler)(FinalizeJob::Reference(reference));
    }

    fn unload_class_loader(&self, loader: ObjectRef) {
        (self.handler)(FinalizeJob::ClassLoader(loader));
    }
}
