//! Finalization Job Queue - the rendezvous between the collector and the worker
//!
//! Four intrusive lists feed one priority-ordered job stream:
//!
//! | list                 | link kind     | job                        |
//! |----------------------|---------------|----------------------------|
//! | reference            | `Reference`   | `FinalizeJob::Reference`   |
//! | class loader         | `ClassLoader` | `FinalizeJob::ClassLoader` |
//! | default finalizable  | `Finalize`    | `FinalizeJob::Object`      |
//! | system finalizable   | `Finalize`    | `FinalizeJob::Object`      |
//!
//! [`JobQueueGuard::consume_job`] drains them in that order, re-evaluated on
//! every call. System-loader objects go last so they never starve
//! application objects.
//!
//! All access goes through [`FinalizationJobQueue::lock`]. Counts read
//! through the guard are authoritative; the `*_advisory` counters are read
//! without the lock and only decide whether waking a worker is worth it.

use crate::list::SpecialObjectList;
use crate::object::{LinkKind, ObjectModel, ObjectRef};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One unit of work for the finalizer worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FinalizeJob {
    /// Run the object's finalizer
    Object(ObjectRef),
    /// Deliver a cleared reference to its notification queue
    Reference(ObjectRef),
    /// Unload a dead class loader
    ClassLoader(ObjectRef),
}

impl FinalizeJob {
    /// Object the job operates on
    pub fn object(self) -> ObjectRef {
        match self {
            FinalizeJob::Object(object)
            | FinalizeJob::Reference(object)
            | FinalizeJob::ClassLoader(object) => object,
        }
    }

    pub fn kind_name(self) -> &'static str {
        match self {
            FinalizeJob::Object(_) => "object",
            FinalizeJob::Reference(_) => "reference",
            FinalizeJob::ClassLoader(_) => "class_loader",
        }
    }
}

struct JobLists {
    system_finalizable: SpecialObjectList,
    default_finalizable: SpecialObjectList,
    references: SpecialObjectList,
    class_loaders: SpecialObjectList,
}

#[derive(Default)]
struct AdvisoryCounts {
    system_finalizable: AtomicUsize,
    default_finalizable: AtomicUsize,
    references: AtomicUsize,
    class_loaders: AtomicUsize,
}

/// FinalizationJobQueue - mutex-guarded job lists
pub struct FinalizationJobQueue {
    model: Arc<dyn ObjectModel>,
    lists: Mutex<JobLists>,
    advisory: AdvisoryCounts,
}

impl FinalizationJobQueue {
    pub fn new(model: Arc<dyn ObjectModel>) -> Self {
        Self {
            model,
            lists: Mutex::new(JobLists {
                system_finalizable: SpecialObjectList::new(LinkKind::Finalize),
                default_finalizable: SpecialObjectList::new(LinkKind::Finalize),
                references: SpecialObjectList::new(LinkKind::Reference),
                class_loaders: SpecialObjectList::new(LinkKind::ClassLoader),
            }),
            advisory: AdvisoryCounts::default(),
        }
    }

    /// Acquire the queue mutex
    ///
    /// Every section run under the guard is O(1) except the `reset_*`
    /// callers' own walks, which happen after the guard is released.
    pub fn lock(&self) -> JobQueueGuard<'_> {
        JobQueueGuard {
            queue: self,
            lists: self.lists.lock(),
        }
    }

    /// Total pending jobs (locks)
    pub fn job_count(&self) -> usize {
        self.lock().job_count()
    }

    /// Total pending jobs, read without the lock
    pub fn pending_advisory(&self) -> usize {
        self.reference_count_advisory()
            + self.class_loader_count_advisory()
            + self.finalizable_count_advisory()
    }

    pub fn reference_count_advisory(&self) -> usize {
        self.advisory.references.load(Ordering::Relaxed)
    }

    pub fn class_loader_count_advisory(&self) -> usize {
        self.advisory.class_loaders.load(Ordering::Relaxed)
    }

    pub fn finalizable_count_advisory(&self) -> usize {
        self.advisory.system_finalizable.load(Ordering::Relaxed)
            + self.advisory.default_finalizable.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FinalizationJobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizationJobQueue")
            .field("references", &self.reference_count_advisory())
            .field("class_loaders", &self.class_loader_count_advisory())
            .field("finalizable", &self.finalizable_count_advisory())
            .finish()
    }
}

/// Exclusive access to the job lists
pub struct JobQueueGuard<'a> {
    queue: &'a FinalizationJobQueue,
    lists: MutexGuard<'a, JobLists>,
}

impl JobQueueGuard<'_> {
    fn model(&self) -> &dyn ObjectModel {
        self.queue.model.as_ref()
    }

    fn sync(list: &SpecialObjectList, advisory: &AtomicUsize) {
        advisory.store(list.object_count(), Ordering::Relaxed);
    }

    /// Prepend a run of finalizable objects defined by the system loader
    pub fn add_system_finalizable(&mut self, head: ObjectRef, tail: ObjectRef, count: usize) {
        let model = self.queue.model.as_ref();
        let list = &self.lists.system_finalizable;
        list.publish_range(model, head, tail, count);
        Self::sync(list, &self.queue.advisory.system_finalizable);
    }

    /// Prepend a run of finalizable objects from any other loader
    pub fn add_default_finalizable(&mut self, head: ObjectRef, tail: ObjectRef, count: usize) {
        let model = self.queue.model.as_ref();
        let list = &self.lists.default_finalizable;
        list.publish_range(model, head, tail, count);
        Self::sync(list, &self.queue.advisory.default_finalizable);
    }

    /// Prepend a run of cleared references awaiting enqueue
    pub fn add_references(&mut self, head: ObjectRef, tail: ObjectRef, count: usize) {
        let model = self.queue.model.as_ref();
        let list = &self.lists.references;
        list.publish_range(model, head, tail, count);
        Self::sync(list, &self.queue.advisory.references);
    }

    /// Queue a dead class loader for unloading
    pub fn add_class_loader(&mut self, loader: ObjectRef) {
        let model = self.queue.model.as_ref();
        let list = &self.lists.class_loaders;
        list.publish(model, loader);
        Self::sync(list, &self.queue.advisory.class_loaders);
    }

    pub fn pop_system_finalizable(&mut self) -> Option<ObjectRef> {
        let object = self.lists.system_finalizable.pop_current(self.model());
        Self::sync(
            &self.lists.system_finalizable,
            &self.queue.advisory.system_finalizable,
        );
        object
    }

    pub fn pop_default_finalizable(&mut self) -> Option<ObjectRef> {
        let object = self.lists.default_finalizable.pop_current(self.model());
        Self::sync(
            &self.lists.default_finalizable,
            &self.queue.advisory.default_finalizable,
        );
        object
    }

    pub fn pop_reference(&mut self) -> Option<ObjectRef> {
        let reference = self.lists.references.pop_current(self.model());
        Self::sync(&self.lists.references, &self.queue.advisory.references);
        reference
    }

    pub fn pop_class_loader(&mut self) -> Option<ObjectRef> {
        let loader = self.lists.class_loaders.pop_current(self.model());
        Self::sync(&self.lists.class_loaders, &self.queue.advisory.class_loaders);
        loader
    }

    /// Next job in priority order
    ///
    /// Reference, then class loader, then default finalizable, then system
    /// finalizable.
    pub fn consume_job(&mut self) -> Option<FinalizeJob> {
        if let Some(reference) = self.pop_reference() {
            return Some(FinalizeJob::Reference(reference));
        }
        if let Some(loader) = self.pop_class_loader() {
            return Some(FinalizeJob::ClassLoader(loader));
        }
        if let Some(object) = self.pop_default_finalizable() {
            return Some(FinalizeJob::Object(object));
        }
        self.pop_system_finalizable().map(FinalizeJob::Object)
    }

    /// Class loader jobs only, for a forced unload pass
    pub fn pop_class_loader_for_forced_unload(&mut self) -> Option<FinalizeJob> {
        self.pop_class_loader().map(FinalizeJob::ClassLoader)
    }

    /// Authoritative pending job count
    pub fn job_count(&self) -> usize {
        self.lists.system_finalizable.object_count()
            + self.lists.default_finalizable.object_count()
            + self.lists.references.object_count()
            + self.lists.class_loaders.object_count()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.system_finalizable.is_empty_current()
            && self.lists.default_finalizable.is_empty_current()
            && self.lists.references.is_empty_current()
            && self.lists.class_loaders.is_empty_current()
    }

    pub fn reference_count(&self) -> usize {
        self.lists.references.object_count()
    }

    /// Detach the whole system-finalizable chain
    pub fn reset_system_finalizable(&mut self) -> Option<ObjectRef> {
        let (head, _) = self.lists.system_finalizable.take_current();
        Self::sync(
            &self.lists.system_finalizable,
            &self.queue.advisory.system_finalizable,
        );
        head
    }

    /// Detach the whole default-finalizable chain
    pub fn reset_default_finalizable(&mut self) -> Option<ObjectRef> {
        let (head, _) = self.lists.default_finalizable.take_current();
        Self::sync(
            &self.lists.default_finalizable,
            &self.queue.advisory.default_finalizable,
        );
        head
    }

    /// Detach the whole reference chain
    pub fn reset_references(&mut self) -> Option<ObjectRef> {
        let (head, _) = self.lists.references.take_current();
        Self::sync(&self.lists.references, &self.queue.advisory.references);
        head
    }
}
