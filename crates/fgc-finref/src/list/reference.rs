//! Reference Object List - weak, soft and phantom sub-lists
//!
//! Reference objects are discovered per type and processed per type during
//! root clearing, so each region keeps three independent chains threaded
//! through the same `Reference` link slot. A reference object is on at most
//! one of them.

use super::SpecialObjectList;
use crate::object::{LinkKind, ObjectModel, ObjectRef, ReferenceType};

/// ReferenceObjectList - one `SpecialObjectList` per reference type
#[derive(Debug)]
pub struct ReferenceObjectList {
    weak: SpecialObjectList,
    soft: SpecialObjectList,
    phantom: SpecialObjectList,
}

impl ReferenceObjectList {
    pub fn new() -> Self {
        Self {
            weak: SpecialObjectList::new(LinkKind::Reference),
            soft: SpecialObjectList::new(LinkKind::Reference),
            phantom: SpecialObjectList::new(LinkKind::Reference),
        }
    }

    /// Sub-list for a reference type
    pub fn list(&self, reference_type: ReferenceType) -> &SpecialObjectList {
        match reference_type {
            ReferenceType::Weak => &self.weak,
            ReferenceType::Soft => &self.soft,
            ReferenceType::Phantom => &self.phantom,
        }
    }

    /// Publish a pre-linked run of references of one type
    pub fn publish_range(
        &self,
        model: &dyn ObjectModel,
        reference_type: ReferenceType,
        head: ObjectRef,
        tail: ObjectRef,
        count: usize,
    ) {
        self.list(reference_type)
            .publish_range(model, head, tail, count);
    }

    /// Freeze every sub-list for root clearing
    pub fn begin_processing_pass(&self) {
        self.lists().for_each(SpecialObjectList::begin_processing_pass);
    }

    /// Drop leftovers of the previous cycle's frozen chains
    pub fn reset_prior(&self) {
        self.lists().for_each(SpecialObjectList::reset_prior);
    }

    /// Drop everything discovered so far
    pub fn clear(&self) {
        self.lists().for_each(SpecialObjectList::clear);
    }

    pub fn is_empty_prior(&self) -> bool {
        self.lists().all(SpecialObjectList::is_empty_prior)
    }

    pub fn is_empty_current(&self) -> bool {
        self.lists().all(SpecialObjectList::is_empty_current)
    }

    /// Advisory count across all types
    pub fn object_count(&self) -> usize {
        self.lists().map(SpecialObjectList::object_count).sum()
    }

    fn lists(&self) -> impl Iterator<Item = &SpecialObjectList> {
        [&self.weak, &self.soft, &self.phantom].into_iter()
    }
}

impl Default for ReferenceObjectList {
    fn default() -> Self {
        Self::new()
    }
}
