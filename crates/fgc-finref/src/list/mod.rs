//! Special Object Lists - Lock-free publish lists with a current/prior snapshot
//!
//! Every tracked kind (unfinalized objects, reference objects, ownable
//! synchronizers, continuations) is kept on an intrusive singly linked list.
//! The `next` pointer lives inside the tracked object and is reached through
//! [`ObjectModel::link`].
//!
//! Per processing pass:
//! ```text
//!   EMPTY ──publish──▶ ACCUMULATING ──begin_processing_pass──▶ SNAPSHOT
//!                           ▲                                     │
//!                           └──────────── processed ◀─────────────┘
//!
//!   ACCUMULATING ──backup──▶ BACKUP ──restore──▶ ACCUMULATING   (aborted copy)
//! ```
//!
//! Publishers only ever CAS the `current` head. The `prior` head is written
//! while publishers are quiesced (snapshot, backup, restore) and read-only
//! for the rest of the pass.
//!
//! A backup leaves `current` in place: `prior` then names a suffix of the
//! `current` chain, and later publishes prepend in front of it.

pub mod heap_lists;
pub mod reference;

pub use heap_lists::{HeapLists, RegionLists};
pub use reference::ReferenceObjectList;

use crate::object::{LinkKind, ObjectModel, ObjectRef};
use crossbeam::utils::Backoff;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Upper bound on chain walks; reaching it means the chain is cyclic
pub(crate) const MAX_CHAIN_STEPS: usize = 1 << 28;

/// SpecialObjectList - intrusive multi-publisher list
pub struct SpecialObjectList {
    kind: LinkKind,

    /// Accumulating chain, CAS-published
    current: AtomicUsize,

    /// Frozen chain for the running pass
    prior: AtomicUsize,

    /// `prior` is a backup sharing its chain with `current`
    backed_up: AtomicBool,

    /// Advisory object counts
    current_count: AtomicUsize,
    prior_count: AtomicUsize,
}

impl SpecialObjectList {
    /// Create an empty list threaded through `kind` link slots
    pub fn new(kind: LinkKind) -> Self {
        Self {
            kind,
            current: AtomicUsize::new(0),
            prior: AtomicUsize::new(0),
            backed_up: AtomicBool::new(false),
            current_count: AtomicUsize::new(0),
            prior_count: AtomicUsize::new(0),
        }
    }

    /// Link slot used by this list
    pub fn kind(&self) -> LinkKind {
        self.kind
    }

    /// Prepend a pre-linked run onto `current`
    ///
    /// # Arguments
    /// * `head` - First object of the run
    /// * `tail` - Last object of the run; its link is overwritten
    /// * `count` - Number of objects in the run
    ///
    /// The run must be acyclic and already chained from `head` to `tail`.
    /// Concurrent publishers may interleave in any order; no run is lost.
    pub fn publish_range(
        &self,
        model: &dyn ObjectModel,
        head: ObjectRef,
        tail: ObjectRef,
        count: usize,
    ) {
        let backoff = Backoff::new();
        let mut old_head = self.current.load(Ordering::Acquire);

        loop {
            debug_assert_ne!(head.raw(), old_head, "publishing the current head again");
            debug_assert_ne!(tail.raw(), old_head, "run tail is the current head");

            model.set_link(tail, self.kind, ObjectRef::decode(old_head));
            match self.current.compare_exchange_weak(
                old_head,
                head.raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => {
                    old_head = actual;
                    backoff.spin();
                }
            }
        }

        self.current_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Publish a single object
    pub fn publish(&self, model: &dyn ObjectModel, object: ObjectRef) {
        self.publish_range(model, object, object, 1);
    }

    /// Move `current` to `prior` and reopen `current` empty
    ///
    /// Publishers must be quiesced; the swap is not atomic with respect to
    /// a concurrent `publish_range`.
    pub fn begin_processing_pass(&self) {
        self.snapshot();
    }

    /// Record the `current` head in `prior` ahead of a copy that may abort
    ///
    /// `current` keeps its chain and stays open for publishes; the chain is
    /// frozen for processing only by a later
    /// [`begin_processing_pass`](Self::begin_processing_pass).
    pub fn backup(&self) {
        let current = self.current.load(Ordering::Acquire);
        self.prior.store(current, Ordering::Release);
        let count = self.current_count.load(Ordering::Relaxed);
        self.prior_count.store(count, Ordering::Relaxed);
        self.backed_up.store(true, Ordering::Release);
    }

    /// Whether `prior` holds a backup rather than a frozen pass
    pub fn is_backed_up(&self) -> bool {
        self.backed_up.load(Ordering::Acquire)
    }

    /// Roll `current` back to the snapshot taken by [`backup`](Self::backup)
    ///
    /// Runs published after the backup are dropped: they are the re-buffered
    /// survivors of the aborted attempt, and every one of them is reachable
    /// again from the restored snapshot.
    pub fn restore(&self) {
        let prior = self.prior.swap(0, Ordering::AcqRel);
        self.current.store(prior, Ordering::Release);
        let count = self.prior_count.swap(0, Ordering::Relaxed);
        self.current_count.store(count, Ordering::Relaxed);
        self.backed_up.store(false, Ordering::Release);
    }

    fn snapshot(&self) {
        self.backed_up.store(false, Ordering::Release);
        let current = self.current.swap(0, Ordering::AcqRel);
        self.prior.store(current, Ordering::Release);
        let count = self.current_count.swap(0, Ordering::Relaxed);
        self.prior_count.store(count, Ordering::Relaxed);
    }

    /// Forget the prior chain
    pub fn reset_prior(&self) {
        self.backed_up.store(false, Ordering::Release);
        self.prior.store(0, Ordering::Release);
        self.prior_count.store(0, Ordering::Relaxed);
    }

    /// Forget both chains
    pub fn clear(&self) {
        self.reset_prior();
        self.current.store(0, Ordering::Release);
        self.current_count.store(0, Ordering::Relaxed);
    }

    pub fn is_empty_prior(&self) -> bool {
        self.prior.load(Ordering::Acquire) == 0
    }

    pub fn is_empty_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == 0
    }

    pub fn prior_head(&self) -> Option<ObjectRef> {
        ObjectRef::decode(self.prior.load(Ordering::Acquire))
    }

    pub fn current_head(&self) -> Option<ObjectRef> {
        ObjectRef::decode(self.current.load(Ordering::Acquire))
    }

    /// Objects published since the last snapshot (advisory)
    pub fn object_count(&self) -> usize {
        self.current_count.load(Ordering::Relaxed)
    }

    /// Objects in the frozen chain (advisory)
    pub fn prior_count(&self) -> usize {
        self.prior_count.load(Ordering::Relaxed)
    }

    /// Pop the head of `current`
    ///
    /// Single consumer only. Concurrent publishers are tolerated: a failed
    /// CAS means a run was prepended and the pop retries on the new head.
    pub fn pop_current(&self, model: &dyn ObjectModel) -> Option<ObjectRef> {
        let backoff = Backoff::new();
        loop {
            let raw = self.current.load(Ordering::Acquire);
            let head = ObjectRef::decode(raw)?;
            let next = ObjectRef::encode(model.link(head, self.kind));

            if self
                .current
                .compare_exchange_weak(raw, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                model.set_link(head, self.kind, None);
                let _ = self.current_count.fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |count| Some(count.saturating_sub(1)),
                );
                return Some(head);
            }
            backoff.spin();
        }
    }

    /// Detach the whole `current` chain
    ///
    /// # Returns
    /// The detached head and its advisory count.
    pub fn take_current(&self) -> (Option<ObjectRef>, usize) {
        let head = self.current.swap(0, Ordering::AcqRel);
        let count = self.current_count.swap(0, Ordering::Relaxed);
        (ObjectRef::decode(head), count)
    }

    /// Walk the frozen chain without resolving forwarding
    pub fn walk_prior<'a>(&self, model: &'a dyn ObjectModel) -> ChainIter<'a> {
        ChainIter::new(model, self.kind, self.prior_head())
    }

    /// Walk the accumulating chain without resolving forwarding
    pub fn walk_current<'a>(&self, model: &'a dyn ObjectModel) -> ChainIter<'a> {
        ChainIter::new(model, self.kind, self.current_head())
    }

    /// Check both chains for cycles and duplicates
    ///
    /// A backup must be a suffix of `current` and is not walked twice.
    /// Panics through `consistency_check!` on failure; an intrusive list in
    /// that shape means the heap is corrupt.
    pub fn verify(&self, model: &dyn ObjectModel) -> usize {
        let mut seen = HashSet::new();
        let heads = if self.is_backed_up() {
            vec![self.current_head()]
        } else {
            vec![self.prior_head(), self.current_head()]
        };
        for head in heads {
            let mut cursor = head;
            while let Some(object) = cursor {
                crate::consistency_check!(
                    seen.insert(object),
                    "object {} appears twice on the {:?} list",
                    object,
                    self.kind
                );
                cursor = model.link(object, self.kind);
            }
        }
        if let (true, Some(backup)) = (self.is_backed_up(), self.prior_head()) {
            crate::consistency_check!(
                seen.contains(&backup),
                "backup head {} is not on the {:?} list",
                backup,
                self.kind
            );
        }
        seen.len()
    }
}

impl std::fmt::Debug for SpecialObjectList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpecialObjectList")
            .field("kind", &self.kind)
            .field("current", &self.current_head())
            .field("prior", &self.prior_head())
            .field("current_count", &self.object_count())
            .field("prior_count", &self.prior_count())
            .finish()
    }
}

/// Iterator over a raw intrusive chain
pub struct ChainIter<'a> {
    model: &'a dyn ObjectModel,
    kind: LinkKind,
    cursor: Option<ObjectRef>,
    steps: usize,
}

impl<'a> ChainIter<'a> {
    pub fn new(model: &'a dyn ObjectModel, kind: LinkKind, head: Option<ObjectRef>) -> Self {
        Self {
            model,
            kind,
            cursor: head,
            steps: 0,
        }
    }
}

impl Iterator for ChainIter<'_> {
    type Item = ObjectRef;

    fn next(&mut self) -> Option<ObjectRef> {
        let object = self.cursor?;
        self.steps += 1;
        crate::consistency_check!(
            self.steps < MAX_CHAIN_STEPS,
            "{:?} chain does not terminate",
            self.kind
        );
        self.cursor = self.model.link(object, self.kind);
        Some(object)
    }
}

/// Chain `objects` together through `kind` links and return head and tail
///
/// Used by tests and benchmarks to build pre-linked runs.
pub fn link_run(
    model: &dyn ObjectModel,
    kind: LinkKind,
    objects: &[ObjectRef],
) -> Option<(ObjectRef, ObjectRef)> {
    let (&head, &tail) = (objects.first()?, objects.last()?);
    for pair in objects.windows(2) {
        model.set_link(pair[0], kind, Some(pair[1]));
    }
    model.set_link(tail, kind, None);
    Some((head, tail))
}
