//! Root clearing
//!
//! Runs once per completed cycle, after marking and copying. Order matters:
//! soft and weak references are cleared before unfinalized objects are
//! preserved for their finalizers, and phantom references after, so a
//! phantom referent kept alive for finalization is not cleared yet.

use super::{
    repair_chain, CollectionCycleAdapter, CyclePhase, HopRepair, ResolvedChain, StartMode,
};
use crate::buffer::{FinalizableObjectBuffer, FinalizableReferenceBuffer, ThreadBuffers};
use crate::logging::{log_event, FinalizeEvent};
use crate::object::{resolve, LinkKind, ReferenceState, ReferenceType};
use crate::stats::CycleStats;
use std::sync::atomic::Ordering;

impl CollectionCycleAdapter {
    /// Process every frozen chain of the cycle
    ///
    /// Survivors are re-staged in `buffers` and published to the lists'
    /// `current` chains; dead finalizable objects and cleared references
    /// with a notification queue become jobs.
    pub fn clear_roots(&self, buffers: &mut ThreadBuffers) -> CycleStats {
        let ctx = self.ctx.as_ref();
        let mut stats = CycleStats::default();
        let mut cleared = FinalizableReferenceBuffer::new(ctx.config().buffer_max_count);
        let backed_up = *self.phase.lock() == CyclePhase::Collecting(StartMode::Backup);

        for (_, lists) in ctx.lists().iter() {
            lists.references.begin_processing_pass();
            if backed_up {
                // The copy completed: the backup becomes this pass's snapshot
                for list in lists.backed_up() {
                    list.begin_processing_pass();
                }
            }
        }

        self.clear_references(ReferenceType::Soft, &mut cleared, &mut stats);
        self.clear_references(ReferenceType::Weak, &mut cleared, &mut stats);
        self.clear_unfinalized(buffers, &mut stats);
        self.clear_references(ReferenceType::Phantom, &mut cleared, &mut stats);
        cleared.flush(ctx);

        self.clear_ownable_synchronizers(buffers, &mut stats);
        self.clear_continuations(buffers, &mut stats);
        buffers.flush(ctx);

        self.relocate_pending_jobs();

        let cycle = self.cycle();
        if stats.finalizable_enqueued + stats.references_enqueued > 0 {
            self.finalization_required.store(true, Ordering::Release);
        }
        ctx.stats().record_cycle(&stats);
        *self.last_stats.lock() = stats;
        *self.phase.lock() = CyclePhase::Idle;
        log_event(FinalizeEvent::CycleRootsCleared { cycle, stats });
        stats
    }

    fn clear_references(
        &self,
        reference_type: ReferenceType,
        cleared: &mut FinalizableReferenceBuffer,
        stats: &mut CycleStats,
    ) {
        let ctx = self.ctx.as_ref();
        let model = ctx.model();
        let collector = ctx.collector();
        let max_age = ctx.config().max_soft_reference_age;

        for (_, lists) in ctx.lists().iter() {
            let list = lists.references.list(reference_type);
            for reference in ResolvedChain::new(ctx, LinkKind::Reference, list.prior_head()) {
                stats.reference_candidates += 1;

                if !collector.is_live(reference)
                    || model.reference_state(reference) != ReferenceState::Initial
                {
                    continue;
                }
                let Some(referent) = model.referent(reference) else {
                    continue;
                };

                if collector.is_live(referent) {
                    let moved = resolve(collector, referent);
                    if moved != referent {
                        model.set_referent(reference, Some(moved));
                    }
                    if reference_type == ReferenceType::Soft {
                        let age = model.soft_age(reference);
                        if age < max_age {
                            model.set_soft_age(reference, age + 1);
                        }
                    }
                    continue;
                }

                model.set_reference_state(reference, ReferenceState::Cleared);
                model.set_referent(reference, None);
                stats.references_cleared += 1;
                match reference_type {
                    ReferenceType::Weak => stats.weak_cleared += 1,
                    ReferenceType::Soft => stats.soft_cleared += 1,
                    ReferenceType::Phantom => stats.phantom_cleared += 1,
                }

                if model.has_notification_queue(reference) {
                    cleared.add(ctx, reference);
                    stats.references_enqueued += 1;
                }
            }
            list.reset_prior();
        }
    }

    fn clear_unfinalized(&self, buffers: &mut ThreadBuffers, stats: &mut CycleStats) {
        let ctx = self.ctx.as_ref();
        let collector = ctx.collector();

        for (_, lists) in ctx.lists().iter() {
            let mut finalizable = FinalizableObjectBuffer::new(ctx.config().buffer_max_count);
            let list = &lists.unfinalized;
            for object in ResolvedChain::new(ctx, LinkKind::Finalize, list.prior_head()) {
                stats.unfinalized_candidates += 1;
                if collector.is_live(object) {
                    buffers.unfinalized.add(ctx, object);
                    stats.unfinalized_survived += 1;
                } else {
                    finalizable.add(ctx, collector.preserve(object));
                    stats.finalizable_enqueued += 1;
                }
            }
            finalizable.flush(ctx);
            list.reset_prior();
        }
    }

    fn clear_ownable_synchronizers(&self, buffers: &mut ThreadBuffers, stats: &mut CycleStats) {
        let ctx = self.ctx.as_ref();
        let collector = ctx.collector();

        for (_, lists) in ctx.lists().iter() {
            let list = &lists.ownable_synchronizers;
            for object in ResolvedChain::new(ctx, LinkKind::OwnableSynchronizer, list.prior_head()) {
                if collector.is_live(object) {
                    buffers.ownable_synchronizers.add(ctx, object);
                    stats.ownable_survived += 1;
                } else {
                    stats.ownable_dropped += 1;
                }
            }
            list.reset_prior();
        }
    }

    fn clear_continuations(&self, buffers: &mut ThreadBuffers, stats: &mut CycleStats) {
        let ctx = self.ctx.as_ref();
        let collector = ctx.collector();

        for (_, lists) in ctx.lists().iter() {
            let list = &lists.continuations;
            for object in ResolvedChain::new(ctx, LinkKind::Continuation, list.prior_head()) {
                if collector.is_live(object) {
                    buffers.continuations.add(ctx, object);
                    stats.continuations_survived += 1;
                } else {
                    ctx.model().release_continuation(object);
                    stats.continuations_released += 1;
                }
            }
            list.reset_prior();
        }
    }

    /// Keep queued jobs alive across a moving cycle
    ///
    /// The pending finalizable and reference chains are detached, every
    /// member preserved and relinked at its new address, and the chains
    /// republished in their original order.
    ///
    /// # Returns
    /// Number of jobs relinked.
    pub fn relocate_pending_jobs(&self) -> usize {
        self.repair_pending_jobs(HopRepair::Preserve).0
    }

    /// Returns (jobs relinked, hops moved, hops self-forwarded)
    pub(super) fn repair_pending_jobs(&self, repair: HopRepair) -> (usize, usize, usize) {
        let ctx = self.ctx.as_ref();
        let (system, default, references) = {
            let mut queue = ctx.queue().lock();
            (
                queue.reset_system_finalizable(),
                queue.reset_default_finalizable(),
                queue.reset_references(),
            )
        };

        let system = repair_chain(ctx, LinkKind::Finalize, system, repair);
        let default = repair_chain(ctx, LinkKind::Finalize, default, repair);
        let references = repair_chain(ctx, LinkKind::Reference, references, repair);

        let moved = system.relinked + default.relinked + references.relinked;
        let self_forwarded =
            system.self_forwarded + default.self_forwarded + references.self_forwarded;

        let mut jobs = 0;
        let mut queue = ctx.queue().lock();
        if let Some(run) = system.run {
            queue.add_system_finalizable(run.head, run.tail, run.count);
            jobs += run.count;
        }
        if let Some(run) = default.run {
            queue.add_default_finalizable(run.head, run.tail, run.count);
            jobs += run.count;
        }
        if let Some(run) = references.run {
            queue.add_references(run.head, run.tail, run.count);
            jobs += run.count;
        }
        (jobs, moved, self_forwarded)
    }
}
