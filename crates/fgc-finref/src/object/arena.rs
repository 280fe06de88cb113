//! Object Arena - In-memory object model and collector primitives
//!
//! A small heap of fixed slots that implements both [`ObjectModel`] and
//! [`CollectorInterface`]. Handles are stable slot indices (plus one, so no
//! handle is zero). Relocation is modelled the way a copying collector does
//! it: `evacuate` copies the object into a fresh slot, installs a forwarding
//! record on the original and leaves the original's link slots stale, exactly
//! like a forwarding header overwriting them.
//!
//! Used by the test suites and benchmarks; embedders can use it to simulate
//! collection cycles against the finalization subsystem.

use super::{
    CollectorInterface, Forwarding, LinkKind, ObjectModel, ObjectRef, ReferenceState,
    ReferenceType, RegionId,
};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy)]
struct ReferenceFields {
    reference_type: ReferenceType,
    state: ReferenceState,
    referent: Option<ObjectRef>,
    has_queue: bool,
    soft_age: u32,
}

const NOT_A_REFERENCE: ReferenceFields = ReferenceFields {
    reference_type: ReferenceType::Weak,
    state: ReferenceState::Cleared,
    referent: None,
    has_queue: false,
    soft_age: 0,
};

#[derive(Debug, Clone)]
struct ObjectData {
    links: [Option<ObjectRef>; LinkKind::COUNT],
    region: RegionId,
    reference: Option<ReferenceFields>,
    system_loader: bool,
    forwarding: Forwarding,
    marked: bool,
    freed: bool,
    forced_finalizable: bool,
    continuation_released: bool,
}

impl ObjectData {
    fn new(region: RegionId) -> Self {
        Self {
            links: [None; LinkKind::COUNT],
            region,
            reference: None,
            system_loader: false,
            forwarding: Forwarding::NotForwarded,
            marked: false,
            freed: false,
            forced_finalizable: false,
            continuation_released: false,
        }
    }
}

/// ObjectArena - in-memory heap for driving the subsystem
pub struct ObjectArena {
    objects: RwLock<Vec<ObjectData>>,

    /// Per-region evacuation flags for the running collection
    evacuating: RwLock<Vec<bool>>,

    /// Exclusive access gate
    exclusive: Mutex<bool>,
    exclusive_released: Condvar,
    exclusive_acquisitions: AtomicUsize,
}

impl ObjectArena {
    /// Create an arena with `region_count` regions
    pub fn new(region_count: usize) -> Self {
        Self {
            objects: RwLock::new(Vec::new()),
            evacuating: RwLock::new(vec![false; region_count.max(1)]),
            exclusive: Mutex::new(false),
            exclusive_released: Condvar::new(),
            exclusive_acquisitions: AtomicUsize::new(0),
        }
    }

    fn index(object: ObjectRef) -> usize {
        object.raw() - 1
    }

    fn push(&self, data: ObjectData) -> ObjectRef {
        let mut objects = self.objects.write();
        objects.push(data);
        ObjectRef::new(objects.len()).unwrap_or_else(|| unreachable!("arena index is never zero"))
    }

    fn with<R>(&self, object: ObjectRef, f: impl FnOnce(&ObjectData) -> R) -> R {
        let objects = self.objects.read();
        f(&objects[Self::index(object)])
    }

    fn with_mut<R>(&self, object: ObjectRef, f: impl FnOnce(&mut ObjectData) -> R) -> R {
        let mut objects = self.objects.write();
        f(&mut objects[Self::index(object)])
    }

    /// Plain objects read as an already-cleared reference, so root clearing
    /// drops them from a reference list without touching them
    fn reference_fields(&self, reference: ObjectRef) -> ReferenceFields {
        self.with(reference, |data| data.reference).unwrap_or_else(|| {
            log::warn!("{} is not a reference object", reference);
            NOT_A_REFERENCE
        })
    }

    fn update_reference(&self, reference: ObjectRef, f: impl FnOnce(&mut ReferenceFields)) {
        self.with_mut(reference, |data| match data.reference.as_mut() {
            Some(fields) => f(fields),
            None => log::warn!("{} is not a reference object, write ignored", reference),
        })
    }

    /// Allocate a plain object
    pub fn allocate(&self, region: RegionId) -> ObjectRef {
        self.push(ObjectData::new(region))
    }

    /// Allocate an object whose class came from the system class loader
    pub fn allocate_system(&self, region: RegionId) -> ObjectRef {
        let mut data = ObjectData::new(region);
        data.system_loader = true;
        self.push(data)
    }

    /// Allocate a reference object
    pub fn allocate_reference(
        &self,
        region: RegionId,
        reference_type: ReferenceType,
        referent: Option<ObjectRef>,
        has_queue: bool,
    ) -> ObjectRef {
        let mut data = ObjectData::new(region);
        data.reference = Some(ReferenceFields {
            reference_type,
            state: ReferenceState::Initial,
            referent,
            has_queue,
            soft_age: 0,
        });
        self.push(data)
    }

    /// Number of slots ever allocated
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a collection evacuating the given regions
    pub fn begin_collection(&self, evacuate: &[RegionId]) {
        {
            let mut evacuating = self.evacuating.write();
            evacuating.iter_mut().for_each(|flag| *flag = false);
            for region in evacuate {
                if let Some(flag) = evacuating.get_mut(region.0) {
                    *flag = true;
                }
            }
        }
        let mut objects = self.objects.write();
        for data in objects.iter_mut() {
            data.marked = false;
            data.forwarding = Forwarding::NotForwarded;
        }
    }

    /// Mark an object live in place
    pub fn mark(&self, object: ObjectRef) {
        self.with_mut(object, |data| data.marked = true);
    }

    /// Copy an object into `to`, leaving a forwarding record behind
    ///
    /// The original's link slots are overwritten, so any traversal that
    /// reads them after the move sees a truncated chain.
    pub fn evacuate(&self, object: ObjectRef, to: RegionId) -> ObjectRef {
        let mut objects = self.objects.write();
        let index = Self::index(object);
        if let Forwarding::Forwarded(moved) = objects[index].forwarding {
            return moved;
        }

        let mut copy = objects[index].clone();
        copy.region = to;
        copy.forwarding = Forwarding::NotForwarded;
        copy.marked = true;
        objects.push(copy);
        let moved = ObjectRef::new(objects.len())
            .unwrap_or_else(|| unreachable!("arena index is never zero"));

        let original = &mut objects[index];
        original.forwarding = Forwarding::Forwarded(moved);
        original.links = [None; LinkKind::COUNT];
        moved
    }

    /// Record a failed copy: the object is forwarded to itself
    pub fn self_forward(&self, object: ObjectRef) {
        self.with_mut(object, |data| data.forwarding = Forwarding::SelfForwarded);
    }

    /// Finish the collection: forwarded originals and unmarked objects in
    /// evacuated regions are freed
    pub fn end_collection(&self) {
        let evacuating = self.evacuating.read().clone();
        let mut objects = self.objects.write();
        for data in objects.iter_mut() {
            let in_evacuation = evacuating.get(data.region.0).copied().unwrap_or(false);
            match data.forwarding {
                Forwarding::Forwarded(_) => data.freed = true,
                Forwarding::SelfForwarded => {}
                Forwarding::NotForwarded if in_evacuation && !data.marked => data.freed = true,
                Forwarding::NotForwarded => {}
            }
            data.marked = false;
            data.forwarding = Forwarding::NotForwarded;
        }
        drop(objects);
        self.evacuating
            .write()
            .iter_mut()
            .for_each(|flag| *flag = false);
    }

    /// Whether the slot was reclaimed by a previous collection
    pub fn is_freed(&self, object: ObjectRef) -> bool {
        self.with(object, |data| data.freed)
    }

    /// Whether the object was forced onto the finalizable population
    pub fn was_forced(&self, object: ObjectRef) -> bool {
        self.with(object, |data| data.forced_finalizable)
    }

    pub fn is_continuation_released(&self, object: ObjectRef) -> bool {
        self.with(object, |data| data.continuation_released)
    }

    pub fn is_marked(&self, object: ObjectRef) -> bool {
        self.with(object, |data| data.marked)
    }

    /// How many times exclusive access was granted
    pub fn exclusive_acquisitions(&self) -> usize {
        self.exclusive_acquisitions.load(Ordering::Relaxed)
    }
}

impl ObjectModel for ObjectArena {
    fn link(&self, object: ObjectRef, kind: LinkKind) -> Option<ObjectRef> {
        self.with(object, |data| data.links[kind.index()])
    }

    fn set_link(&self, object: ObjectRef, kind: LinkKind, next: Option<ObjectRef>) {
        self.with_mut(object, |data| data.links[kind.index()] = next);
    }

    fn reference_type(&self, reference: ObjectRef) -> ReferenceType {
        self.reference_fields(reference).reference_type
    }

    fn reference_state(&self, reference: ObjectRef) -> ReferenceState {
        self.reference_fields(reference).state
    }

    fn set_reference_state(&self, reference: ObjectRef, state: ReferenceState) {
        self.update_reference(reference, |fields| fields.state = state);
    }

    fn referent(&self, reference: ObjectRef) -> Option<ObjectRef> {
        self.reference_fields(reference).referent
    }

    fn set_referent(&self, reference: ObjectRef, referent: Option<ObjectRef>) {
        self.update_reference(reference, |fields| fields.referent = referent);
    }

    fn has_notification_queue(&self, reference: ObjectRef) -> bool {
        self.reference_fields(reference).has_queue
    }

    fn soft_age(&self, reference: ObjectRef) -> u32 {
        self.reference_fields(reference).soft_age
    }

    fn set_soft_age(&self, reference: ObjectRef, age: u32) {
        self.update_reference(reference, |fields| fields.soft_age = age);
    }

    fn is_system_loader_object(&self, object: ObjectRef) -> bool {
        self.with(object, |data| data.system_loader)
    }

    fn forced_to_finalizable(&self, object: ObjectRef) {
        self.with_mut(object, |data| data.forced_finalizable = true);
    }

    fn release_continuation(&self, continuation: ObjectRef) {
        self.with_mut(continuation, |data| data.continuation_released = true);
    }
}

impl CollectorInterface for ObjectArena {
    fn forwarding(&self, object: ObjectRef) -> Forwarding {
        self.with(object, |data| data.forwarding)
    }

    fn restore_self_forwarded(&self, object: ObjectRef) {
        self.with_mut(object, |data| {
            if data.forwarding == Forwarding::SelfForwarded {
                data.forwarding = Forwarding::NotForwarded;
            }
        });
    }

    fn in_evacuation_space(&self, object: ObjectRef) -> bool {
        let region = self.with(object, |data| data.region);
        self.evacuating
            .read()
            .get(region.0)
            .copied()
            .unwrap_or(false)
    }

    fn region_of(&self, object: ObjectRef) -> RegionId {
        self.with(object, |data| data.region)
    }

    fn is_live(&self, object: ObjectRef) -> bool {
        let (forwarding, marked) = self.with(object, |data| (data.forwarding, data.marked));
        match forwarding {
            Forwarding::Forwarded(_) | Forwarding::SelfForwarded => true,
            Forwarding::NotForwarded => marked || !self.in_evacuation_space(object),
        }
    }

    fn preserve(&self, object: ObjectRef) -> ObjectRef {
        match self.forwarding(object) {
            Forwarding::Forwarded(moved) => moved,
            Forwarding::SelfForwarded => object,
            Forwarding::NotForwarded if self.is_marked(object) => object,
            Forwarding::NotForwarded => {
                if self.in_evacuation_space(object) {
                    let region = self.region_of(object);
                    self.evacuate(object, region)
                } else {
                    self.mark(object);
                    object
                }
            }
        }
    }

    fn acquire_exclusive(&self) {
        let mut held = self.exclusive.lock();
        while *held {
            self.exclusive_released.wait(&mut held);
        }
        *held = true;
        self.exclusive_acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    fn release_exclusive(&self) {
        let mut held = self.exclusive.lock();
        *held = false;
        self.exclusive_released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evacuate_installs_forwarding_and_stales_links() {
        let arena = ObjectArena::new(2);
        let a = arena.allocate(RegionId(0));
        let b = arena.allocate(RegionId(0));
        arena.set_link(a, LinkKind::Finalize, Some(b));

        arena.begin_collection(&[RegionId(0)]);
        let moved = arena.evacuate(a, RegionId(1));

        assert_ne!(moved, a);
        assert_eq!(arena.forwarding(a), Forwarding::Forwarded(moved));
        assert_eq!(arena.link(moved, LinkKind::Finalize), Some(b));
        assert_eq!(arena.link(a, LinkKind::Finalize), None);
        assert_eq!(arena.region_of(moved), RegionId(1));
        assert!(arena.is_live(a));
        assert!(!arena.is_live(b));
    }

    #[test]
    fn test_preserve_outside_evacuation_marks_in_place() {
        let arena = ObjectArena::new(2);
        let a = arena.allocate(RegionId(1));
        arena.begin_collection(&[RegionId(0)]);
        assert_eq!(arena.preserve(a), a);
        assert!(arena.is_marked(a));
    }

    #[test]
    fn test_end_collection_frees_dead() {
        let arena = ObjectArena::new(1);
        let live = arena.allocate(RegionId(0));
        let dead = arena.allocate(RegionId(0));
        arena.begin_collection(&[RegionId(0)]);
        arena.mark(live);
        arena.end_collection();
        assert!(!arena.is_freed(live));
        assert!(arena.is_freed(dead));
    }

    #[test]
    fn test_self_forward_restore() {
        let arena = ObjectArena::new(1);
        let a = arena.allocate(RegionId(0));
        arena.begin_collection(&[RegionId(0)]);
        arena.self_forward(a);
        assert_eq!(arena.forwarding(a), Forwarding::SelfForwarded);
        arena.restore_self_forwarded(a);
        assert_eq!(arena.forwarding(a), Forwarding::NotForwarded);
    }

    #[test]
    fn test_reference_fields() {
        let arena = ObjectArena::new(1);
        let referent = arena.allocate(RegionId(0));
        let r = arena.allocate_reference(RegionId(0), ReferenceType::Soft, Some(referent), true);
        assert_eq!(arena.reference_type(r), ReferenceType::Soft);
        assert_eq!(arena.reference_state(r), ReferenceState::Initial);
        assert!(arena.has_notification_queue(r));
        arena.set_soft_age(r, 3);
        assert_eq!(arena.soft_age(r), 3);
        arena.set_referent(r, None);
        assert_eq!(arena.referent(r), None);
    }

    #[test]
    fn test_plain_object_reads_as_cleared_reference() {
        let arena = ObjectArena::new(1);
        let plain = arena.allocate(RegionId(0));
        let other = arena.allocate(RegionId(0));

        assert_eq!(arena.reference_state(plain), ReferenceState::Cleared);
        assert_eq!(arena.referent(plain), None);
        assert!(!arena.has_notification_queue(plain));

        arena.set_referent(plain, Some(other));
        arena.set_reference_state(plain, ReferenceState::Initial);
        assert_eq!(arena.referent(plain), None);
        assert_eq!(arena.reference_state(plain), ReferenceState::Cleared);
    }
}
