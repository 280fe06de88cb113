//! Back-out of an aborted copy
//!
//! The lists backed up at cycle start are rolled back and every hop is
//! repaired: a forwarded object is followed once and relinked, a
//! self-forwarded one has its header restored and keeps its address.
//! Reference lists lose the aborted cycle's discoveries.

use super::{repair_chain, CollectionCycleAdapter, CyclePhase, HopRepair, StartMode};
use crate::error::{FinalizeError, Result};
use crate::logging::{log_event, FinalizeEvent};

/// What a back-out repaired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackOutReport {
    /// Objects back on the restored lists
    pub restored: usize,
    /// Hops relinked to a forwarded copy
    pub relinked: usize,
    /// Self-forwarded hops whose header was restored
    pub self_forwarded: usize,
}

impl CollectionCycleAdapter {
    /// Roll the lists back to the state captured by
    /// `cycle_start(StartMode::Backup)`
    ///
    /// Replaces `clear_roots` for a cycle whose copy aborted. Objects the
    /// collector threads still hold in their own buffers must be discarded
    /// by the caller; they are already on the restored chains.
    ///
    /// # Errors
    /// `InvalidState` unless a backed-up cycle is in progress.
    pub fn back_out(&self) -> Result<BackOutReport> {
        {
            let mut phase = self.phase.lock();
            if *phase != CyclePhase::Collecting(StartMode::Backup) {
                return Err(FinalizeError::InvalidState {
                    expected: "backed-up collection".to_string(),
                    actual: format!("{:?}", *phase),
                });
            }
            *phase = CyclePhase::Idle;
        }

        let ctx = self.ctx.as_ref();
        let mut report = BackOutReport::default();

        for (_, lists) in ctx.lists().iter() {
            for list in lists.backed_up() {
                list.restore();
                let (head, _) = list.take_current();
                let repaired = repair_chain(ctx, list.kind(), head, HopRepair::BackOut);
                report.relinked += repaired.relinked;
                report.self_forwarded += repaired.self_forwarded;
                if let Some(run) = repaired.run {
                    list.publish_range(ctx.model(), run.head, run.tail, run.count);
                    report.restored += run.count;
                }
            }
            lists.references.clear();
        }

        let (_, moved, self_forwarded) = self.repair_pending_jobs(HopRepair::BackOut);
        report.relinked += moved;
        report.self_forwarded += self_forwarded;

        ctx.stats().record_back_out();
        log::warn!(
            "finalization cycle {} backed out: {} restored, {} relinked",
            self.cycle(),
            report.restored,
            report.relinked
        );
        log_event(FinalizeEvent::BackOut {
            cycle: self.cycle(),
            relinked: report.relinked,
            self_forwarded: report.self_forwarded,
        });
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizeConfig;
    use crate::context::FinalizeContext;
    use crate::cycle::DiscoveryKind;
    use crate::object::{
        CollectorInterface, Forwarding, LinkKind, ObjectArena, ObjectModel, ObjectRef, RegionId,
    };
    use std::collections::HashSet;
    use std::sync::Arc;

    fn setup() -> (Arc<ObjectArena>, Arc<FinalizeContext>, CollectionCycleAdapter) {
        let arena = Arc::new(ObjectArena::new(2));
        let ctx = FinalizeContext::new(arena.clone(), arena.clone(), FinalizeConfig::default())
            .unwrap();
        let adapter = CollectionCycleAdapter::new(ctx.clone());
        (arena, ctx, adapter)
    }

    #[test]
    fn test_back_out_requires_backup_mode() {
        let (_arena, _ctx, adapter) = setup();
        assert!(adapter.back_out().is_err());

        adapter.cycle_start(StartMode::Snapshot);
        let err = adapter.back_out().unwrap_err();
        assert!(err.is_bug());
    }

    #[test]
    fn test_back_out_repairs_moved_and_self_forwarded() {
        let (arena, ctx, adapter) = setup();
        let objects: Vec<ObjectRef> = (0..4).map(|_| arena.allocate(RegionId(0))).collect();
        let mut buffers = ctx.thread_buffers();
        for &object in &objects {
            adapter.discover(&mut buffers, object, DiscoveryKind::Unfinalized);
        }
        buffers.flush(&ctx);

        adapter.cycle_start(StartMode::Backup);
        arena.begin_collection(&[RegionId(0)]);
        let moved = arena.evacuate(objects[1], RegionId(1));
        arena.self_forward(objects[2]);

        let report = adapter.back_out().unwrap();
        assert_eq!(report.restored, 4);
        assert_eq!(report.relinked, 1);
        assert_eq!(report.self_forwarded, 1);
        assert_eq!(arena.forwarding(objects[2]), Forwarding::NotForwarded);

        let list = &ctx.lists().region(RegionId(0)).unfinalized;
        let members: HashSet<_> = list.walk_current(arena.as_ref()).collect();
        let expected: HashSet<_> = [objects[0], moved, objects[2], objects[3]].into();
        assert_eq!(members, expected);
        assert!(list.is_empty_prior());
        assert_eq!(list.verify(arena.as_ref()), 4);
        assert_eq!(ctx.stats().snapshot().back_outs, 1);
        assert!(!adapter.is_collecting());
    }

    #[test]
    fn test_back_out_drops_discoveries_after_backup() {
        let (arena, ctx, adapter) = setup();
        let before = arena.allocate(RegionId(0));
        let after = arena.allocate(RegionId(0));
        let reference = arena.allocate_reference(
            RegionId(0),
            crate::object::ReferenceType::Weak,
            Some(before),
            true,
        );
        let mut buffers = ctx.thread_buffers();
        adapter.discover(&mut buffers, before, DiscoveryKind::Unfinalized);
        buffers.flush(&ctx);

        adapter.cycle_start(StartMode::Backup);
        adapter.discover(&mut buffers, after, DiscoveryKind::Unfinalized);
        adapter.discover(&mut buffers, reference, DiscoveryKind::Reference);
        buffers.flush(&ctx);

        adapter.back_out().unwrap();
        let lists = ctx.lists().region(RegionId(0));
        let members: Vec<_> = lists.unfinalized.walk_current(arena.as_ref()).collect();
        assert_eq!(members, vec![before]);
        assert!(lists.references.is_empty_current());
        assert_eq!(arena.link(before, LinkKind::Finalize), None);
    }
}
