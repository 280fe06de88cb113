//! Thread-Local Buffers - batched publishing of discovered objects
//!
//! Mutators and collector threads stage newly discovered objects in a
//! private buffer and publish a whole pre-linked run with one CAS. A run
//! never mixes regions, so one flush always lands in one region's list.
//!
//! ```text
//! add(a) add(b) add(c)        flush()
//!   c ─▶ b ─▶ a      ──────▶  list.current: c ─▶ b ─▶ a ─▶ (old head)
//! head         tail
//! ```

pub mod registry;
pub mod variants;

pub use registry::{BufferRegistry, MutatorContext};
pub use variants::{
    FinalizableObjectBuffer, FinalizableReferenceBuffer, ReferenceObjectBuffer,
    RegionListBuffer, RegionListTarget,
};

use crate::context::FinalizeContext;
use crate::object::{LinkKind, ObjectModel, ObjectRef, RegionId};

/// A pre-linked run handed off by a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub head: ObjectRef,
    pub tail: ObjectRef,
    pub count: usize,
    /// Region every object of the run lives in, when the target cares
    pub region: Option<RegionId>,
}

/// ThreadLocalBuffer - one staged run
#[derive(Debug)]
pub struct ThreadLocalBuffer {
    kind: LinkKind,
    head: Option<ObjectRef>,
    tail: Option<ObjectRef>,
    count: usize,
    max_count: usize,
    region: Option<RegionId>,
    runs: u64,
}

impl ThreadLocalBuffer {
    /// Create an empty buffer linking through `kind` slots
    pub fn new(kind: LinkKind, max_count: usize) -> Self {
        Self {
            kind,
            head: None,
            tail: None,
            count: 0,
            max_count: max_count.max(1),
            region: None,
            runs: 0,
        }
    }

    /// Stage an object
    ///
    /// # Returns
    /// The previously staged run when the object could not join it (region
    /// changed or the buffer is full). The caller publishes it.
    pub fn add(
        &mut self,
        model: &dyn ObjectModel,
        region: Option<RegionId>,
        object: ObjectRef,
    ) -> Option<Run> {
        debug_assert!(self.head != Some(object), "object already at buffer head");
        debug_assert!(self.tail != Some(object), "object already at buffer tail");

        let displaced = if self.head.is_some()
            && (self.region != region || self.count >= self.max_count)
        {
            self.take()
        } else {
            None
        };

        match self.head {
            None => {
                model.set_link(object, self.kind, None);
                self.head = Some(object);
                self.tail = Some(object);
                self.count = 1;
                self.region = region;
            }
            Some(head) => {
                model.set_link(object, self.kind, Some(head));
                self.head = Some(object);
                self.count += 1;
            }
        }

        displaced
    }

    /// Hand off the staged run and reset
    pub fn take(&mut self) -> Option<Run> {
        let head = self.head.take()?;
        let tail = self.tail.take()?;
        let run = Run {
            head,
            tail,
            count: std::mem::take(&mut self.count),
            region: self.region.take(),
        };
        self.runs += 1;
        Some(run)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Runs handed off so far, implicit and explicit
    pub fn runs(&self) -> u64 {
        self.runs
    }
}

/// The region-targeted buffers of one thread
#[derive(Debug)]
pub struct ThreadBuffers {
    pub unfinalized: RegionListBuffer,
    pub ownable_synchronizers: RegionListBuffer,
    pub continuations: RegionListBuffer,
    pub references: ReferenceObjectBuffer,
}

impl ThreadBuffers {
    pub fn new(max_count: usize) -> Self {
        Self {
            unfinalized: RegionListBuffer::new(RegionListTarget::Unfinalized, max_count),
            ownable_synchronizers: RegionListBuffer::new(
                RegionListTarget::OwnableSynchronizer,
                max_count,
            ),
            continuations: RegionListBuffer::new(RegionListTarget::Continuation, max_count),
            references: ReferenceObjectBuffer::new(max_count),
        }
    }

    /// Publish every staged run
    pub fn flush(&mut self, ctx: &FinalizeContext) {
        self.unfinalized.flush(ctx);
        self.ownable_synchronizers.flush(ctx);
        self.continuations.flush(ctx);
        self.references.flush(ctx);
    }

    pub fn is_empty(&self) -> bool {
        self.unfinalized.is_empty()
            && self.ownable_synchronizers.is_empty()
            && self.continuations.is_empty()
            && self.references.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectArena;

    #[test]
    fn test_region_change_displaces_exactly_one_run() {
        let arena = ObjectArena::new(2);
        let mut buffer = ThreadLocalBuffer::new(LinkKind::Finalize, usize::MAX);
        let a = arena.allocate(RegionId(0));
        let b = arena.allocate(RegionId(1));

        assert_eq!(buffer.add(&arena, Some(RegionId(0)), a), None);
        let displaced = buffer.add(&arena, Some(RegionId(1)), b);
        assert_eq!(
            displaced,
            Some(Run {
                head: a,
                tail: a,
                count: 1,
                region: Some(RegionId(0)),
            })
        );
        assert_eq!(buffer.region(), Some(RegionId(1)));
        assert_eq!(buffer.count(), 1);
    }

    #[test]
    fn test_full_buffer_displaces_run() {
        let arena = ObjectArena::new(1);
        let mut buffer = ThreadLocalBuffer::new(LinkKind::Finalize, 2);
        let objects: Vec<_> = (0..3).map(|_| arena.allocate(RegionId(0))).collect();

        assert!(buffer.add(&arena, None, objects[0]).is_none());
        assert!(buffer.add(&arena, None, objects[1]).is_none());
        let run = buffer.add(&arena, None, objects[2]).unwrap();
        assert_eq!((run.head, run.tail, run.count), (objects[1], objects[0], 2));
        assert_eq!(arena.link(objects[1], LinkKind::Finalize), Some(objects[0]));
    }

    #[test]
    fn test_take_resets() {
        let arena = ObjectArena::new(1);
        let mut buffer = ThreadLocalBuffer::new(LinkKind::Reference, 8);
        let object = arena.allocate(RegionId(0));
        buffer.add(&arena, None, object);

        assert!(buffer.take().is_some());
        assert!(buffer.is_empty());
        assert!(buffer.take().is_none());
        assert_eq!(buffer.runs(), 1);
    }
}
