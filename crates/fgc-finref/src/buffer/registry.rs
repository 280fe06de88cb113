//! Buffer Registry - every live thread's buffers
//!
//! Exclusive-access operations (the forced unfinalized-to-finalizable
//! transition) must see every object a mutator has registered, including
//! the ones still staged in thread buffers. The registry tracks each
//! attached thread's [`ThreadBuffers`] so they can all be flushed at once.

use super::ThreadBuffers;
use crate::context::FinalizeContext;
use crate::object::ObjectRef;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type SharedBuffers = Arc<Mutex<ThreadBuffers>>;

/// BufferRegistry - attached threads' buffers by id
pub struct BufferRegistry {
    next_id: AtomicU64,
    threads: Mutex<IndexMap<u64, SharedBuffers>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            threads: Mutex::new(IndexMap::new()),
        }
    }

    /// Register fresh buffers and return their id
    pub fn register(&self, max_count: usize) -> (u64, SharedBuffers) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let buffers = Arc::new(Mutex::new(ThreadBuffers::new(max_count)));
        self.threads.lock().insert(id, buffers.clone());
        (id, buffers)
    }

    pub fn deregister(&self, id: u64) -> Option<SharedBuffers> {
        self.threads.lock().shift_remove(&id)
    }

    /// Flush every registered thread's buffers
    ///
    /// # Returns
    /// Number of threads that had staged objects.
    pub fn flush_all(&self, ctx: &FinalizeContext) -> usize {
        let threads: Vec<SharedBuffers> = self.threads.lock().values().cloned().collect();

        let mut flushed = 0;
        for buffers in threads {
            let mut buffers = buffers.lock();
            if !buffers.is_empty() {
                buffers.flush(ctx);
                flushed += 1;
            }
        }
        flushed
    }

    /// Number of attached threads
    pub fn len(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// MutatorContext - one attached thread's registration handle
///
/// Dropping the handle (thread detach) flushes and deregisters its buffers.
/// Reference objects are not registered here; the collector discovers them
/// while marking.
pub struct MutatorContext {
    ctx: Arc<FinalizeContext>,
    id: u64,
    buffers: SharedBuffers,
}

impl MutatorContext {
    /// Attach the calling thread
    pub fn attach(ctx: Arc<FinalizeContext>) -> Self {
        let (id, buffers) = ctx.registry().register(ctx.config().buffer_max_count);
        log::trace!("mutator {} attached", id);
        Self { ctx, id, buffers }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// A finalizable object was allocated
    pub fn finalizable_object_created(&self, object: ObjectRef) {
        self.buffers.lock().unfinalized.add(&self.ctx, object);
    }

    pub fn ownable_synchronizer_created(&self, object: ObjectRef) {
        self.buffers
            .lock()
            .ownable_synchronizers
            .add(&self.ctx, object);
    }

    pub fn continuation_created(&self, continuation: ObjectRef) {
        self.buffers.lock().continuations.add(&self.ctx, continuation);
    }

    /// Publish everything staged by this thread
    pub fn flush(&self) {
        self.buffers.lock().flush(&self.ctx);
    }
}

impl Drop for MutatorContext {
    fn drop(&mut self) {
        self.flush();
        self.ctx.registry().deregister(self.id);
        log::trace!("mutator {} detached", self.id);
    }
}

impl std::fmt::Debug for MutatorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutatorContext").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FinalizeConfig;
    use crate::object::{ObjectArena, RegionId};

    fn context() -> (Arc<ObjectArena>, Arc<FinalizeContext>) {
        let arena = Arc::new(ObjectArena::new(1));
        let ctx =
            FinalizeContext::new(arena.clone(), arena.clone(), FinalizeConfig::default()).unwrap();
        (arena, ctx)
    }

    #[test]
    fn test_flush_all_publishes_staged_objects() {
        let (arena, ctx) = context();
        let mutator = MutatorContext::attach(ctx.clone());
        let object = arena.allocate(RegionId(0));
        mutator.finalizable_object_created(object);

        assert!(ctx.lists().region(RegionId(0)).unfinalized.is_empty_current());
        assert_eq!(ctx.registry().flush_all(&ctx), 1);
        assert_eq!(
            ctx.lists().region(RegionId(0)).unfinalized.current_head(),
            Some(object)
        );
        assert_eq!(ctx.registry().flush_all(&ctx), 0);
    }

    #[test]
    fn test_detach_flushes_and_deregisters() {
        let (arena, ctx) = context();
        let object = arena.allocate(RegionId(0));
        {
            let mutator = MutatorContext::attach(ctx.clone());
            mutator.continuation_created(object);
            assert_eq!(ctx.registry().len(), 1);
        }
        assert!(ctx.registry().is_empty());
        assert_eq!(
            ctx.lists().region(RegionId(0)).continuations.current_head(),
            Some(object)
        );
    }
}
