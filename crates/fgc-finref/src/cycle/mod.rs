//! Collection Cycle Adapter - the collector's entry points
//!
//! Per collection:
//! ```text
//! cycle_start(Snapshot | Backup)
//!     │  discover(...) from every collector thread
//!     ▼
//! clear_roots(...) ──▶ finalization_required() ──▶ notify the supervisor
//!     or
//! back_out()       (copy aborted; Backup mode only)
//! ```
//!
//! Every chain walk resolves each hop through the forwarding record and
//! reads the next link from the moved copy. A forwarded original's links
//! are stale.

mod backout;
mod forced;
mod roots;

pub use backout::BackOutReport;
pub use forced::force_unfinalized_to_finalizable;

use crate::buffer::{Run, ThreadBuffers};
use crate::context::FinalizeContext;
use crate::list::MAX_CHAIN_STEPS;
use crate::object::{resolve, CollectorInterface, Forwarding, LinkKind, ObjectModel, ObjectRef};
use crate::stats::CycleStats;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// How the lists are frozen at cycle start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    /// Plain snapshot; the cycle always completes
    Snapshot,
    /// Snapshot kept for rollback; the copy may abort
    Backup,
}

/// What a collector thread discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    Unfinalized,
    Reference,
    OwnableSynchronizer,
    Continuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CyclePhase {
    Idle,
    Collecting(StartMode),
}

/// CollectionCycleAdapter - hooks a collection cycle into the lists
pub struct CollectionCycleAdapter {
    ctx: Arc<FinalizeContext>,
    cycle: AtomicU64,
    phase: Mutex<CyclePhase>,
    finalization_required: AtomicBool,
    last_stats: Mutex<CycleStats>,
}

impl CollectionCycleAdapter {
    pub fn new(ctx: Arc<FinalizeContext>) -> Self {
        Self {
            ctx,
            cycle: AtomicU64::new(0),
            phase: Mutex::new(CyclePhase::Idle),
            finalization_required: AtomicBool::new(false),
            last_stats: Mutex::new(CycleStats::default()),
        }
    }

    pub fn context(&self) -> &Arc<FinalizeContext> {
        &self.ctx
    }

    /// Freeze the lists for a new cycle
    ///
    /// Unfinalized, ownable synchronizer and continuation lists move their
    /// accumulated chain to `prior` (Snapshot) or record it for rollback
    /// (Backup). Reference lists are emptied: marking discovers each live
    /// reference once per cycle, and an object can sit on one chain only.
    pub fn cycle_start(&self, mode: StartMode) -> u64 {
        let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
        for (_, lists) in self.ctx.lists().iter() {
            for list in lists.backed_up() {
                match mode {
                    StartMode::Snapshot => list.begin_processing_pass(),
                    StartMode::Backup => list.backup(),
                }
            }
            lists.references.clear();
        }
        *self.phase.lock() = CyclePhase::Collecting(mode);
        log::trace!("finalization cycle {} started ({:?})", cycle, mode);
        cycle
    }

    /// Stage a discovered object in the caller's buffers
    pub fn discover(&self, buffers: &mut ThreadBuffers, object: ObjectRef, kind: DiscoveryKind) {
        let ctx = self.ctx.as_ref();
        match kind {
            DiscoveryKind::Unfinalized => buffers.unfinalized.add(ctx, object),
            DiscoveryKind::Reference => buffers.references.add(ctx, object),
            DiscoveryKind::OwnableSynchronizer => buffers.ownable_synchronizers.add(ctx, object),
            DiscoveryKind::Continuation => buffers.continuations.add(ctx, object),
        }
    }

    /// Cycles started so far
    pub fn cycle(&self) -> u64 {
        self.cycle.load(Ordering::Relaxed)
    }

    /// Whether the last completed cycle queued work for the worker
    pub fn finalization_required(&self) -> bool {
        self.finalization_required.load(Ordering::Acquire)
    }

    /// Read and reset the finalization-required flag
    pub fn take_finalization_required(&self) -> bool {
        self.finalization_required.swap(false, Ordering::AcqRel)
    }

    /// Root-clearing counts of the last completed cycle
    pub fn last_cycle_stats(&self) -> CycleStats {
        *self.last_stats.lock()
    }

    pub fn is_collecting(&self) -> bool {
        *self.phase.lock() != CyclePhase::Idle
    }
}

impl std::fmt::Debug for CollectionCycleAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionCycleAdapter")
            .field("cycle", &self.cycle())
            .field("phase", &*self.phase.lock())
            .field("finalization_required", &self.finalization_required())
            .finish()
    }
}

/// Iterator over a chain that may contain forwarded objects
///
/// Yields post-move addresses. The next link is read before the object is
/// yielded, so the caller may relink it.
pub(crate) struct ResolvedChain<'a> {
    collector: &'a dyn CollectorInterface,
    model: &'a dyn ObjectModel,
    kind: LinkKind,
    cursor: Option<ObjectRef>,
    steps: usize,
}

impl<'a> ResolvedChain<'a> {
    pub fn new(ctx: &'a FinalizeContext, kind: LinkKind, head: Option<ObjectRef>) -> Self {
        Self {
            collector: ctx.collector(),
            model: ctx.model(),
            kind,
            cursor: head,
            steps: 0,
        }
    }
}

impl Iterator for ResolvedChain<'_> {
    type Item = ObjectRef;

    fn next(&mut self) -> Option<ObjectRef> {
        let object = resolve(self.collector, self.cursor?);
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

/// How [`repair_chain`] treats each hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HopRepair {
    /// Pending jobs are roots: keep every hop alive, take its new address
    Preserve,
    /// Aborted copy: follow forwarding once, restore self-forwarded headers
    BackOut,
}

#[derive(Debug, Default)]
pub(crate) struct RepairedChain {
    pub run: Option<Run>,
    /// Hops whose address changed
    pub relinked: usize,
    pub self_forwarded: usize,
}

/// Rewrite a detached chain in place so every link names a post-move
/// address, preserving order
pub(crate) fn repair_chain(
    ctx: &FinalizeContext,
    kind: LinkKind,
    head: Option<ObjectRef>,
    repair: HopRepair,
) -> RepairedChain {
    let model = ctx.model();
    let collector = ctx.collector();
    let mut repaired = RepairedChain::default();
    let mut first = None;
    let mut last: Option<ObjectRef> = None;
    let mut count = 0;

    let mut cursor = head;
    while let Some(object) = cursor {
        let moved = match repair {
            HopRepair::Preserve => collector.preserve(object),
            HopRepair::BackOut => match collector.forwarding(object) {
                Forwarding::NotForwarded => object,
                Forwarding::Forwarded(moved) => moved,
                Forwarding::SelfForwarded => {
                    collector.restore_self_forwarded(object);
                    repaired.self_forwarded += 1;
                    object
                },
            },
        };
        if moved != object {
            repaired.relinked += 1;
        }

        count += 1;
        crate::consistency_check!(
            count < MAX_CHAIN_STEPS,
            "{:?} chain does not terminate",
            kind
        );
        cursor = model.link(moved, kind);

        match last {
            Some(previous) => model.set_link(previous, kind, Some(moved)),
            None => first = Some(moved),
        }
        last = Some(moved);
    }

    if let (Some(head), Some(tail)) = (first, last) {
        model.set_link(tail, kind, None);
        repaired.run = Some(Run {
            head,
            tail,
            count,
            region: None,
        });
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizeConfig;
    use crate::list::link_run;
    use crate::object::{ObjectArena, RegionId};

    fn context() -> (Arc<ObjectArena>, Arc<FinalizeContext>) {
        let arena = Arc::new(ObjectArena::new(2));
        let ctx = FinalizeContext::new(arena.clone(), arena.clone(), FinalizeConfig::default())
            .unwrap();
        (arena, ctx)
    }

    #[test]
    fn test_resolved_chain_follows_moved_copies() {
        let (arena, ctx) = context();
        let objects: Vec<_> = (0..3).map(|_| arena.allocate(RegionId(0))).collect();
        let (head, _) = link_run(arena.as_ref(), LinkKind::Finalize, &objects).unwrap();

        arena.begin_collection(&[RegionId(0)]);
        let moved = arena.evacuate(objects[1], RegionId(1));

        let walked: Vec<_> = ResolvedChain::new(&ctx, LinkKind::Finalize, Some(head)).collect();
        assert_eq!(walked, vec![objects[0], moved, objects[2]]);
    }

    #[test]
    fn test_repair_chain_backs_out_hops() {
        let (arena, ctx) = context();
        let objects: Vec<_> = (0..3).map(|_| arena.allocate(RegionId(0))).collect();
        let (head, _) = link_run(arena.as_ref(), LinkKind::Finalize, &objects).unwrap();

        arena.begin_collection(&[RegionId(0)]);
        let moved = arena.evacuate(objects[0], RegionId(1));
        arena.self_forward(objects[2]);

        let repaired = repair_chain(&ctx, LinkKind::Finalize, Some(head), HopRepair::BackOut);
        let run = repaired.run.unwrap();
        assert_eq!(run.head, moved);
        assert_eq!(run.tail, objects[2]);
        assert_eq!(run.count, 3);
        assert_eq!(repaired.relinked, 1);
        assert_eq!(repaired.self_forwarded, 1);
        assert_eq!(arena.forwarding(objects[2]), Forwarding::NotForwarded);
        assert_eq!(arena.link(moved, LinkKind::Finalize), Some(objects[1]));
    }

    #[test]
    fn test_cycle_start_counts_and_snapshots() {
        let (arena, ctx) = context();
        let adapter = CollectionCycleAdapter::new(ctx.clone());
        let object = arena.allocate(RegionId(0));
        ctx.lists()
            .region(RegionId(0))
            .unfinalized
            .publish(arena.as_ref(), object);

        assert_eq!(adapter.cycle_start(StartMode::Snapshot), 1);
        let list = &ctx.lists().region(RegionId(0)).unfinalized;
        assert_eq!(list.prior_head(), Some(object));
        assert!(list.is_empty_current());
        assert!(adapter.is_collecting());
    }

    #[test]
    fn test_reference_rediscovered_after_cycle_start() {
        let (arena, ctx) = context();
        let adapter = CollectionCycleAdapter::new(ctx.clone());
        let referent = arena.allocate(RegionId(0));
        let reference = arena.allocate_reference(
            RegionId(0),
            crate::object::ReferenceType::Weak,
            Some(referent),
            true,
        );
        let mut buffers = ctx.thread_buffers();
        adapter.discover(&mut buffers, reference, DiscoveryKind::Reference);
        buffers.flush(&ctx);

        // Marking finds the same reference again in the next cycle
        adapter.cycle_start(StartMode::Snapshot);
        adapter.discover(&mut buffers, reference, DiscoveryKind::Reference);
        buffers.flush(&ctx);

        let list = ctx
            .lists()
            .region(RegionId(0))
            .references
            .list(crate::object::ReferenceType::Weak);
        assert_eq!(list.verify(arena.as_ref()), 1);
        assert_eq!(list.current_head(), Some(reference));
        assert_eq!(arena.link(reference, LinkKind::Reference), None);
    }

    #[test]
    fn test_backup_start_keeps_current() {
        let (arena, ctx) = context();
        let adapter = CollectionCycleAdapter::new(ctx.clone());
        let object = arena.allocate(RegionId(0));
        let list = &ctx.lists().region(RegionId(0)).unfinalized;
        list.publish(arena.as_ref(), object);

        adapter.cycle_start(StartMode::Backup);
        assert_eq!(list.current_head(), Some(object));
        assert_eq!(list.prior_head(), Some(object));
        assert!(list.is_backed_up());
    }
}
