//! Forced unfinalized-to-finalizable transition
//!
//! Used when every remaining finalizer must run (shutdown with
//! finalizers-on-exit). Runs under exclusive access: all thread buffers are
//! flushed first so that no registered object is missed.

use crate::buffer::FinalizableObjectBuffer;
use crate::context::FinalizeContext;
use crate::list::ChainIter;
use crate::logging::{log_event, FinalizeEvent};
use crate::object::{ExclusiveAccess, LinkKind};

/// Move every unfinalized object to the finalizable population
///
/// Each region's list is flushed to the job queue as its own batch.
///
/// # Returns
/// Number of objects moved.
pub fn force_unfinalized_to_finalizable(ctx: &FinalizeContext) -> usize {
    let _exclusive = ExclusiveAccess::acquire(ctx.collector());
    ctx.registry().flush_all(ctx);

    let model = ctx.model();
    let mut forced = 0;
    for (_, lists) in ctx.lists().iter() {
        let (head, _) = lists.unfinalized.take_current();
        if head.is_none() {
            continue;
        }

        let mut finalizable = FinalizableObjectBuffer::new(ctx.config().buffer_max_count);
        for object in ChainIter::new(model, LinkKind::Finalize, head) {
            model.forced_to_finalizable(object);
            finalizable.add(ctx, object);
            forced += 1;
        }
        finalizable.flush(ctx);
    }

    if forced > 0 {
        ctx.stats().record_forced(forced as u64);
        log_event(FinalizeEvent::ForcedFinalizable { objects: forced });
    }
    forced
}
