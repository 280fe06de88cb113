//! Buffer Variants - one buffer type per publish target
//!
//! - [`RegionListBuffer`]: unfinalized, ownable synchronizer and
//!   continuation lists of the object's region
//! - [`ReferenceObjectBuffer`]: split by reference type, one sub-buffer each
//! - [`FinalizableObjectBuffer`]: split by defining loader, targets the job
//!   queue's system and default lists
//! - [`FinalizableReferenceBuffer`]: cleared references awaiting enqueue

use super::{Run, ThreadLocalBuffer};
use crate::context::FinalizeContext;
use crate::list::{RegionLists, SpecialObjectList};
use crate::object::{LinkKind, ObjectRef, ReferenceType, RegionId};

/// Which per-region list a [`RegionListBuffer`] publishes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionListTarget {
    Unfinalized,
    OwnableSynchronizer,
    Continuation,
}

impl RegionListTarget {
    fn link_kind(self) -> LinkKind {
        match self {
            RegionListTarget::Unfinalized => LinkKind::Finalize,
            RegionListTarget::OwnableSynchronizer => LinkKind::OwnableSynchronizer,
            RegionListTarget::Continuation => LinkKind::Continuation,
        }
    }

    /// Target list inside a region's lists
    pub fn select(self, lists: &RegionLists) -> &SpecialObjectList {
        match self {
            RegionListTarget::Unfinalized => &lists.unfinalized,
            RegionListTarget::OwnableSynchronizer => &lists.ownable_synchronizers,
            RegionListTarget::Continuation => &lists.continuations,
        }
    }
}

fn region_of(ctx: &FinalizeContext, object: ObjectRef) -> RegionId {
    ctx.collector().region_of(object)
}

fn publish_to_region(ctx: &FinalizeContext, target: RegionListTarget, run: Run) {
    let region = run.region.unwrap_or_default();
    target
        .select(ctx.lists().region(region))
        .publish_range(ctx.model(), run.head, run.tail, run.count);
}

/// RegionListBuffer - stages objects for a per-region list
#[derive(Debug)]
pub struct RegionListBuffer {
    target: RegionListTarget,
    buffer: ThreadLocalBuffer,
}

impl RegionListBuffer {
    pub fn new(target: RegionListTarget, max_count: usize) -> Self {
        Self {
            target,
            buffer: ThreadLocalBuffer::new(target.link_kind(), max_count),
        }
    }

    pub fn target(&self) -> RegionListTarget {
        self.target
    }

    /// Stage an object; publishes the previous run if the region changed
    pub fn add(&mut self, ctx: &FinalizeContext, object: ObjectRef) {
        let region = region_of(ctx, object);
        if let Some(run) = self.buffer.add(ctx.model(), Some(region), object) {
            publish_to_region(ctx, self.target, run);
        }
    }

    pub fn flush(&mut self, ctx: &FinalizeContext) {
        if let Some(run) = self.buffer.take() {
            publish_to_region(ctx, self.target, run);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Runs published so far
    pub fn runs(&self) -> u64 {
        self.buffer.runs()
    }
}

/// ReferenceObjectBuffer - one sub-buffer per reference type
#[derive(Debug)]
pub struct ReferenceObjectBuffer {
    weak: ThreadLocalBuffer,
    soft: ThreadLocalBuffer,
    phantom: ThreadLocalBuffer,
}

impl ReferenceObjectBuffer {
    pub fn new(max_count: usize) -> Self {
        Self {
            weak: ThreadLocalBuffer::new(LinkKind::Reference, max_count),
            soft: ThreadLocalBuffer::new(LinkKind::Reference, max_count),
            phantom: ThreadLocalBuffer::new(LinkKind::Reference, max_count),
        }
    }

    fn buffer_mut(&mut self, reference_type: ReferenceType) -> &mut ThreadLocalBuffer {
        match reference_type {
            ReferenceType::Weak => &mut self.weak,
            ReferenceType::Soft => &mut self.soft,
            ReferenceType::Phantom => &mut self.phantom,
        }
    }

    fn publish(ctx: &FinalizeContext, reference_type: ReferenceType, run: Run) {
        let region = run.region.unwrap_or_default();
        ctx.lists().region(region).references.publish_range(
            ctx.model(),
            reference_type,
            run.head,
            run.tail,
            run.count,
        );
    }

    /// Stage a reference object under its type
    pub fn add(&mut self, ctx: &FinalizeContext, reference: ObjectRef) {
        let reference_type = ctx.model().reference_type(reference);
        let region = region_of(ctx, reference);
        if let Some(run) = self
            .buffer_mut(reference_type)
            .add(ctx.model(), Some(region), reference)
        {
            Self::publish(ctx, reference_type, run);
        }
    }

    /// Flush all three sub-buffers
    pub fn flush(&mut self, ctx: &FinalizeContext) {
        for reference_type in ReferenceType::PROCESSING_ORDER {
            if let Some(run) = self.buffer_mut(reference_type).take() {
                Self::publish(ctx, reference_type, run);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.weak.is_empty() && self.soft.is_empty() && self.phantom.is_empty()
    }
}

/// FinalizableObjectBuffer - system-loader objects kept apart from the rest
///
/// The job queue drains system-loader objects last, so the two populations
/// are published to different lists.
#[derive(Debug)]
pub struct FinalizableObjectBuffer {
    system: ThreadLocalBuffer,
    default: ThreadLocalBuffer,
}

impl FinalizableObjectBuffer {
    pub fn new(max_count: usize) -> Self {
        Self {
            system: ThreadLocalBuffer::new(LinkKind::Finalize, max_count),
            default: ThreadLocalBuffer::new(LinkKind::Finalize, max_count),
        }
    }

    pub fn add(&mut self, ctx: &FinalizeContext, object: ObjectRef) {
        if ctx.model().is_system_loader_object(object) {
            if let Some(run) = self.system.add(ctx.model(), None, object) {
                ctx.queue()
                    .lock()
                    .add_system_finalizable(run.head, run.tail, run.count);
            }
        } else if let Some(run) = self.default.add(ctx.model(), None, object) {
            ctx.queue()
                .lock()
                .add_default_finalizable(run.head, run.tail, run.count);
        }
    }

    /// Flush both sub-buffers
    pub fn flush(&mut self, ctx: &FinalizeContext) {
        let system = self.system.take();
        let default = self.default.take();
        if system.is_none() && default.is_none() {
            return;
        }

        let mut queue = ctx.queue().lock();
        if let Some(run) = system {
            queue.add_system_finalizable(run.head, run.tail, run.count);
        }
        if let Some(run) = default {
            queue.add_default_finalizable(run.head, run.tail, run.count);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.default.is_empty()
    }
}

/// FinalizableReferenceBuffer - cleared references bound for the job queue
#[derive(Debug)]
pub struct FinalizableReferenceBuffer {
    buffer: ThreadLocalBuffer,
}

impl FinalizableReferenceBuffer {
    pub fn new(max_count: usize) -> Self {
        Self {
            buffer: ThreadLocalBuffer::new(LinkKind::Reference, max_count),
        }
    }

    pub fn add(&mut self, ctx: &FinalizeContext, reference: ObjectRef) {
        if let Some(run) = self.buffer.add(ctx.model(), None, reference) {
            ctx.queue()
                .lock()
                .add_references(run.head, run.tail, run.count);
        }
    }

    pub fn flush(&mut self, ctx: &FinalizeContext) {
        if let Some(run) = self.buffer.take() {
            ctx.queue()
                .lock()
                .add_references(run.head, run.tail, run.count);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
