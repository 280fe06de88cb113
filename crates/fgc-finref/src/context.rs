//! Finalization Context - state shared by every component
//!
//! One context exists per heap. It owns the special object lists, the job
//! queue, the thread buffer registry and the counters, and carries the two
//! capabilities supplied by the embedding collector.

use crate::buffer::{BufferRegistry, ThreadBuffers};
use crate::config::FinalizeConfig;
use crate::error::Result;
use crate::list::HeapLists;
use crate::object::{CollectorInterface, ObjectModel};
use crate::queue::FinalizationJobQueue;
use crate::stats::FinalizationStats;
use std::sync::Arc;

/// FinalizeContext - shared subsystem state
pub struct FinalizeContext {
    model: Arc<dyn ObjectModel>,
    collector: Arc<dyn CollectorInterface>,
    config: FinalizeConfig,
    lists: HeapLists,
    queue: FinalizationJobQueue,
    registry: BufferRegistry,
    stats: FinalizationStats,
}

impl FinalizeContext {
    /// Build the context for one heap
    ///
    /// # Errors
    /// `FinalizeError::Configuration` if `config` does not validate.
    pub fn new(
        model: Arc<dyn ObjectModel>,
        collector: Arc<dyn CollectorInterface>,
        config: FinalizeConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        Ok(Arc::new(Self {
            lists: HeapLists::new(&config),
            queue: FinalizationJobQueue::new(model.clone()),
            registry: BufferRegistry::new(),
            stats: FinalizationStats::new(),
            model,
            collector,
            config,
        }))
    }

    pub fn model(&self) -> &dyn ObjectModel {
        self.model.as_ref()
    }

    pub fn collector(&self) -> &dyn CollectorInterface {
        self.collector.as_ref()
    }

    pub fn config(&self) -> &FinalizeConfig {
        &self.config
    }

    pub fn lists(&self) -> &HeapLists {
        &self.lists
    }

    pub fn queue(&self) -> &FinalizationJobQueue {
        &self.queue
    }

    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &FinalizationStats {
        &self.stats
    }

    /// Fresh, unregistered buffers for a collector thread
    pub fn thread_buffers(&self) -> ThreadBuffers {
        ThreadBuffers::new(self.config.buffer_max_count)
    }
}

impl std::fmt::Debug for FinalizeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalizeContext")
            .field("config", &self.config)
            .field("lists", &self.lists)
            .field("queue", &self.queue)
            .finish()
    }
}
