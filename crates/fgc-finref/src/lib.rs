//! # fgc-finref - Finalization and Special Reference Bookkeeping
//!
//! Tracks the objects a moving collector has to treat specially after a
//! reachability change: finalizable objects, weak/soft/phantom reference
//! objects, ownable synchronizers and continuations. Keeps their intrusive
//! lists consistent across copying cycles and hands eligible work to a
//! supervised worker thread that may run arbitrary, possibly hanging, user
//! code.
//!
//! ## Overview
//!
//! - **Lock-free publish lists**: mutators and collector threads prepend
//!   pre-linked runs with a single CAS; each pass works on a frozen snapshot
//! - **Thread-local buffers**: discoveries are batched per thread, one run
//!   per region
//! - **Prioritized job queue**: references, then class loaders, then
//!   finalizable objects
//! - **Supervised worker**: a hung finalizer is abandoned, never killed, and
//!   a fresh worker takes over
//! - **Back-out**: an aborted copy rolls every list back to its snapshot
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐   publish    ┌─────────────────────────────┐
//! │ Mutator threads      │ ───────────▶ │ SpecialObjectLists          │
//! │  ThreadBuffers       │              │  (per region, current/prior)│
//! └──────────────────────┘              └──────────────┬──────────────┘
//!                                                      │ clear_roots
//! ┌──────────────────────┐  cycle hooks  ┌─────────────▼──────────────┐
//! │ Collector            │ ────────────▶ │ CollectionCycleAdapter     │
//! └──────────────────────┘               └─────────────┬──────────────┘
//!                                                      │ jobs
//! ┌──────────────────────┐               ┌─────────────▼──────────────┐
//! │ Supervisor thread    │ ──wake/wait─▶ │ FinalizationJobQueue       │
//! │  └─ Worker thread ───┼── consume ──▶ │  ref > loader > default >  │
//! │       └─ dispatcher  │               │  system                    │
//! └──────────────────────┘               └────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fgc_finref::cycle::{DiscoveryKind, StartMode};
//! use fgc_finref::dispatch::FnDispatcher;
//! use fgc_finref::object::{ObjectArena, RegionId};
//! use fgc_finref::{FinalizationRuntime, FinalizeConfig, RunFinalizationOutcome};
//! use std::sync::Arc;
//!
//! let arena = Arc::new(ObjectArena::new(1));
//! let runtime = FinalizationRuntime::new(arena.clone(), arena.clone(), FinalizeConfig::default())?;
//! runtime.start(Arc::new(FnDispatcher::new(|job| println!("finalizing {}", job.object()))))?;
//!
//! let mutator = runtime.attach_mutator();
//! let object = arena.allocate(RegionId(0));
//! mutator.finalizable_object_created(object);
//! mutator.flush();
//!
//! // A collection in which nothing survives
//! let adapter = runtime.cycle_adapter();
//! adapter.cycle_start(StartMode::Snapshot);
//! arena.begin_collection(&[RegionId(0)]);
//! let mut buffers = runtime.context().thread_buffers();
//! adapter.clear_roots(&mut buffers);
//! arena.end_collection();
//! runtime.notify_cycle_end();
//!
//! assert_eq!(runtime.run_finalization(), RunFinalizationOutcome::Completed);
//! runtime.shutdown(false)?;
//! # Ok::<(), fgc_finref::FinalizeError>(())
//! ```
//!
//! ## Thread Safety
//!
//! - List heads are the only lock-free mutable state
//! - Everything else sits behind exactly one `parking_lot` mutex
//! - No lock is held across a dispatcher call
//!
//! ## Modules
//!
//! - [`buffer`]: Thread-local buffers and the per-thread registry
//! - [`config`]: Configuration parameters and validation
//! - [`context`]: State shared by every component
//! - [`cycle`]: Collector hooks: snapshot, root clearing, back-out
//! - [`dispatch`]: The seam to user-level cleanup code
//! - [`error`]: Error types
//! - [`list`]: Lock-free special object lists
//! - [`logging`]: Structured finalization events
//! - [`object`]: Object handles and the collector/object-model traits
//! - [`queue`]: The finalization job queue
//! - [`runtime`]: Runtime integration
//! - [`stats`]: Counters and pass timings
//! - [`worker`]: Supervisor and worker threads

pub mod buffer;
pub mod config;
pub mod context;
pub mod cycle;
pub mod dispatch;
pub mod error;
pub mod list;
pub mod logging;
pub mod object;
pub mod queue;
pub mod runtime;
pub mod stats;
pub mod worker;

// Re-export main types for convenience
pub use config::{FinalizeConfig, WaitPolicy};
pub use context::FinalizeContext;
pub use cycle::CollectionCycleAdapter;
pub use dispatch::{FnDispatcher, JobDispatcher};
pub use error::{FinalizeError, Result};
pub use list::SpecialObjectList;
pub use object::{CollectorInterface, ObjectModel, ObjectRef};
pub use queue::{FinalizationJobQueue, FinalizeJob};
pub use runtime::{FinalizationRuntime, RuntimeState};
pub use worker::{FinalizationWorkerOrchestrator, RunFinalizationOutcome, UnloadOutcome};

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = FinalizeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }
}
