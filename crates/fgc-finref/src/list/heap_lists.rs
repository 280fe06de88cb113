//! Heap Lists - per-region sets of special object lists
//!
//! With region partitioning every heap region owns its own set of lists, so
//! a flush always publishes into the region the objects live in. Without it
//! a single set serves the whole heap.

use super::{ReferenceObjectList, SpecialObjectList};
use crate::config::FinalizeConfig;
use crate::object::{CollectorInterface, LinkKind, ObjectRef, RegionId};

/// All special object lists of one region
#[derive(Debug)]
pub struct RegionLists {
    pub unfinalized: SpecialObjectList,
    pub references: ReferenceObjectList,
    pub ownable_synchronizers: SpecialObjectList,
    pub continuations: SpecialObjectList,
}

impl RegionLists {
    pub fn new() -> Self {
        Self {
            unfinalized: SpecialObjectList::new(LinkKind::Finalize),
            references: ReferenceObjectList::new(),
            ownable_synchronizers: SpecialObjectList::new(LinkKind::OwnableSynchronizer),
            continuations: SpecialObjectList::new(LinkKind::Continuation),
        }
    }

    /// Lists that take a backup at the start of a copy that may abort
    pub fn backed_up(&self) -> [&SpecialObjectList; 3] {
        [
            &self.unfinalized,
            &self.ownable_synchronizers,
            &self.continuations,
        ]
    }

    /// Advisory count of every tracked object in the region
    pub fn object_count(&self) -> usize {
        self.unfinalized.object_count()
            + self.references.object_count()
            + self.ownable_synchronizers.object_count()
            + self.continuations.object_count()
    }
}

impl Default for RegionLists {
    fn default() -> Self {
        Self::new()
    }
}

/// HeapLists - the special object lists of the whole heap
#[derive(Debug)]
pub struct HeapLists {
    regions: Vec<RegionLists>,
    partitioned: bool,
}

impl HeapLists {
    /// Create the lists for a heap laid out as `config` describes
    pub fn new(config: &FinalizeConfig) -> Self {
        if config.region_partitioned {
            Self::partitioned(config.region_count)
        } else {
            Self::single()
        }
    }

    /// One set of lists for the whole heap
    pub fn single() -> Self {
        Self {
            regions: vec![RegionLists::new()],
            partitioned: false,
        }
    }

    /// One set of lists per region
    pub fn partitioned(region_count: usize) -> Self {
        Self {
            regions: (0..region_count.max(1)).map(|_| RegionLists::new()).collect(),
            partitioned: true,
        }
    }

    pub fn is_partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Lists of a region
    pub fn region(&self, region: RegionId) -> &RegionLists {
        if !self.partitioned {
            return &self.regions[0];
        }
        crate::consistency_check!(
            region.0 < self.regions.len(),
            "region {} outside the {} partitioned regions",
            region.0,
            self.regions.len()
        );
        &self.regions[region.0]
    }

    /// Lists of the region containing `object`
    pub fn lists_for(&self, collector: &dyn CollectorInterface, object: ObjectRef) -> &RegionLists {
        self.region(collector.region_of(object))
    }

    /// Every region with its id
    pub fn iter(&self) -> impl Iterator<Item = (RegionId, &RegionLists)> {
        self.regions
            .iter()
            .enumerate()
            .map(|(index, lists)| (RegionId(index), lists))
    }

    /// Advisory count of every tracked object in the heap
    pub fn object_count(&self) -> usize {
        self.regions.iter().map(RegionLists::object_count).sum()
    }
}
