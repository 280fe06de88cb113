//! Object Module - Handles and external object/collector interfaces
//!
//! The finalization subsystem never dereferences objects itself. Every
//! intrusive link, reference field and forwarding record is reached through
//! two capabilities supplied by the embedding collector:
//!
//! - [`ObjectModel`]: the object access barrier (link slots, reference
//!   fields, classification predicates)
//! - [`CollectorInterface`]: forwarding resolution, liveness, region lookup
//!   and exclusive (stop-the-world) access
//!
//! [`arena::ObjectArena`] implements both over an in-memory heap.

pub mod arena;
pub mod reference;

pub use arena::ObjectArena;
pub use reference::{ReferenceState, ReferenceType};

use std::num::NonZeroUsize;

/// Handle to a GC-managed object
///
/// Wraps a non-zero address or arena index, so an empty list head can be
/// encoded as `0` inside an atomic word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(NonZeroUsize);

impl ObjectRef {
    /// Create a handle from a raw value; `None` for zero
    #[inline]
    pub fn new(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(ObjectRef)
    }

    /// Raw address or index
    #[inline]
    pub fn raw(self) -> usize {
        self.0.get()
    }

    #[inline]
    pub(crate) fn encode(object: Option<ObjectRef>) -> usize {
        object.map_or(0, ObjectRef::raw)
    }

    #[inline]
    pub(crate) fn decode(raw: usize) -> Option<ObjectRef> {
        ObjectRef::new(raw)
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.raw())
    }
}

/// Intrusive link slot selector
///
/// An object sits on at most one list per link kind. Unfinalized and
/// finalizable objects share the finalize link: leaving one population means
/// joining the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Finalize,
    Reference,
    OwnableSynchronizer,
    Continuation,
    ClassLoader,
}

impl LinkKind {
    /// Number of link slots per object
    pub const COUNT: usize = 5;

    /// Slot index for this kind
    #[inline]
    pub fn index(self) -> usize {
        match self {
            LinkKind::Finalize => 0,
            LinkKind::Reference => 1,
            LinkKind::OwnableSynchronizer => 2,
            LinkKind::Continuation => 3,
            LinkKind::ClassLoader => 4,
        }
    }
}

/// Heap region identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RegionId(pub usize);

/// Result of consulting the collector's forwarding record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Forwarding {
    /// Object was not moved this cycle
    NotForwarded,
    /// Object was copied; the payload is its new address
    Forwarded(ObjectRef),
    /// Copy failed and the object was forwarded to itself
    SelfForwarded,
}

/// Object access barrier
///
/// Get/set of every intrusive link field and of the reference-object fields
/// the subsystem manipulates.
pub trait ObjectModel: Send + Sync {
    /// Read an intrusive link
    fn link(&self, object: ObjectRef, kind: LinkKind) -> Option<ObjectRef>;

    /// Write an intrusive link
    fn set_link(&self, object: ObjectRef, kind: LinkKind, next: Option<ObjectRef>);

    /// Weak, soft or phantom
    fn reference_type(&self, reference: ObjectRef) -> ReferenceType;

    fn reference_state(&self, reference: ObjectRef) -> ReferenceState;

    fn set_reference_state(&self, reference: ObjectRef, state: ReferenceState);

    fn referent(&self, reference: ObjectRef) -> Option<ObjectRef>;

    fn set_referent(&self, reference: ObjectRef, referent: Option<ObjectRef>);

    /// Whether the reference was registered against a notification queue
    fn has_notification_queue(&self, reference: ObjectRef) -> bool;

    fn soft_age(&self, reference: ObjectRef) -> u32;

    fn set_soft_age(&self, reference: ObjectRef, age: u32);

    /// Whether the object's class was defined by the system class loader
    fn is_system_loader_object(&self, object: ObjectRef) -> bool;

    /// Hook: the object was forced onto the finalizable population
    fn forced_to_finalizable(&self, _object: ObjectRef) {}

    /// Hook: a dead continuation's native resources may be released
    fn release_continuation(&self, _continuation: ObjectRef) {}
}

/// Collector and allocator primitives
pub trait CollectorInterface: Send + Sync {
    /// Pre-move address to post-move address, if any
    fn forwarding(&self, object: ObjectRef) -> Forwarding;

    /// Un-mark a self-forwarded object, restoring its header
    fn restore_self_forwarded(&self, object: ObjectRef);

    /// Whether the object lies in space being evacuated this cycle
    fn in_evacuation_space(&self, object: ObjectRef) -> bool;

    /// Region containing the object
    fn region_of(&self, object: ObjectRef) -> RegionId;

    /// Whether the object survived the cycle on its own
    fn is_live(&self, object: ObjectRef) -> bool;

    /// Keep a dead object alive for its finalizer; returns its post-move
    /// address
    fn preserve(&self, object: ObjectRef) -> ObjectRef;

    /// Stop the world
    fn acquire_exclusive(&self);

    fn release_exclusive(&self);
}

/// Resolve one hop through the forwarding record
#[inline]
pub fn resolve(collector: &dyn CollectorInterface, object: ObjectRef) -> ObjectRef {
    match collector.forwarding(object) {
        Forwarding::Forwarded(moved) => moved,
        Forwarding::NotForwarded | Forwarding::SelfForwarded => object,
    }
}

/// Exclusive access held for the lifetime of the guard
pub struct ExclusiveAccess<'a> {
    collector: &'a dyn CollectorInterface,
}

impl<'a> ExclusiveAccess<'a> {
    pub fn acquire(collector: &'a dyn CollectorInterface) -> Self {
        collector.acquire_exclusive();
        Self { collector }
    }
}

impl Drop for ExclusiveAccess<'_> {
    fn drop(&mut self) {
        self.collector.release_exclusive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_encoding() {
        assert_eq!(ObjectRef::new(0), None);
        let object = ObjectRef::new(0x40).unwrap();
        assert_eq!(ObjectRef::encode(Some(object)), 0x40);
        assert_eq!(ObjectRef::encode(None), 0);
        assert_eq!(ObjectRef::decode(0x40), Some(object));
        assert_eq!(object.to_string(), "0x40");
    }

    #[test]
    fn test_link_kind_indices_unique() {
        let kinds = [
            LinkKind::Finalize,
            LinkKind::Reference,
            LinkKind::OwnableSynchronizer,
            LinkKind::Continuation,
            LinkKind::ClassLoader,
        ];
        let mut seen = [false; LinkKind::COUNT];
        for kind in kinds {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
    }
}
