//! Finalization Logging and Tracing
//!
//! Structured events for the finalization subsystem, useful for:
//! - Spotting hung finalizers (abandonments)
//! - Debugging root clearing and back-out
//! - Production monitoring of run-now timeouts
//!
//! Log Levels:
//! - ERROR: worker start failures
//! - WARN: abandonments, run-now timeouts, back-outs
//! - INFO: worker lifecycle, shutdown
//! - DEBUG: per-cycle root clearing counts, forced transitions

use crate::stats::CycleStats;
use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Log level for finalization events
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Finalization event types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FinalizeEvent {
    /// A worker thread completed its handshake
    WorkerStarted { worker: u64, mode: String },

    /// A worker pass ran to an empty queue
    WorkerFinished {
        worker: u64,
        jobs: usize,
        duration_ms: f64,
    },

    /// The supervisor stopped waiting on a worker
    WorkerAbandoned { worker: u64, limit_ms: u64 },

    /// A worker could not be created or failed its handshake
    WorkerStartFailed { reason: String },

    /// A run-now caller gave up waiting
    RunFinalizationTimedOut { timeout_ms: u64 },

    /// Root clearing finished for one cycle
    CycleRootsCleared { cycle: u64, stats: CycleStats },

    /// An aborted copy was rolled back
    BackOut {
        cycle: u64,
        relinked: usize,
        self_forwarded: usize,
    },

    /// Unfinalized objects were forced finalizable
    ForcedFinalizable { objects: usize },

    /// The supervisor exited
    ShutdownComplete { drained: bool },
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct FinalizeLoggerConfig {
    /// Minimum log level
    pub level: LogLevel,

    /// Print events to stdout
    pub console: bool,

    /// JSON lines instead of human-readable text
    pub json: bool,

    /// Prefix console lines with a local timestamp
    pub timestamps: bool,

    /// Events kept in memory; the oldest are dropped first
    pub capacity: usize,
}

impl Default for FinalizeLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: false,
            json: false,
            timestamps: true,
            capacity: 4096,
        }
    }
}

impl FinalizeLoggerConfig {
    /// Console output at debug level
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            console: true,
            ..Default::default()
        }
    }
}

/// FinalizeLogger - centralized event log
pub struct FinalizeLogger {
    config: FinalizeLoggerConfig,
    events: Mutex<VecDeque<(DateTime<Local>, FinalizeEvent)>>,
    enabled: AtomicBool,
}

impl FinalizeLogger {
    pub fn new(config: FinalizeLoggerConfig) -> Self {
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Record an event
    pub fn log(&self, event: FinalizeEvent) {
        if !self.is_enabled() || Self::event_level(&event) > self.config.level {
            return;
        }

        let timestamp = Local::now();
        if self.config.console {
            self.output_console(&timestamp, &event);
        }

        let mut events = self.events.lock();
        if events.len() >= self.config.capacity.max(1) {
            events.pop_front();
        }
        events.push_back((timestamp, event));
    }

    /// Get log level for event
    pub fn event_level(event: &FinalizeEvent) -> LogLevel {
        match event {
            FinalizeEvent::WorkerStartFailed { .. } => LogLevel::Error,
            FinalizeEvent::WorkerAbandoned { .. }
            | FinalizeEvent::RunFinalizationTimedOut { .. }
            | FinalizeEvent::BackOut { .. } => LogLevel::Warn,
            FinalizeEvent::WorkerStarted { .. } | FinalizeEvent::ShutdownComplete { .. } => {
                LogLevel::Info
            },
            FinalizeEvent::CycleRootsCleared { .. } | FinalizeEvent::ForcedFinalizable { .. } => {
                LogLevel::Debug
            },
            FinalizeEvent::WorkerFinished { .. } => LogLevel::Trace,
        }
    }

    fn output_console(&self, timestamp: &DateTime<Local>, event: &FinalizeEvent) {
        let prefix = if self.config.timestamps {
            format!("[{}] ", timestamp.format("%Y-%m-%d %H:%M:%S%.3f"))
        } else {
            String::new()
        };

        if self.config.json {
            if let Ok(json) = serde_json::to_string(event) {
                println!("{}{}", prefix, json);
            }
        } else {
            println!("{}{}", prefix, Self::human(event));
        }
    }

    /// Human-readable rendering
    pub fn human(event: &FinalizeEvent) -> String {
        match event {
            FinalizeEvent::WorkerStarted { worker, mode } => {
                format!("[FIN] Worker {} started ({} mode)", worker, mode)
            },
            FinalizeEvent::WorkerFinished {
                worker,
                jobs,
                duration_ms,
            } => format!(
                "[FIN] Worker {} finished pass: {} jobs in {:.2}ms",
                worker, jobs, duration_ms
            ),
            FinalizeEvent::WorkerAbandoned { worker, limit_ms } => format!(
                "[FIN] Worker {} abandoned after {}ms without finishing",
                worker, limit_ms
            ),
            FinalizeEvent::WorkerStartFailed { reason } => {
                format!("[FIN] Worker start failed: {}", reason)
            },
            FinalizeEvent::RunFinalizationTimedOut { timeout_ms } => {
                format!("[FIN] Run finalization timed out after {}ms", timeout_ms)
            },
            FinalizeEvent::CycleRootsCleared { cycle, stats } => format!(
                "[FIN] Cycle {}: {} finalizable, {} references cleared ({} enqueued), {} survived",
                cycle,
                stats.finalizable_enqueued,
                stats.references_cleared,
                stats.references_enqueued,
                stats.unfinalized_survived
            ),
            FinalizeEvent::BackOut {
                cycle,
                relinked,
                self_forwarded,
            } => format!(
                "[FIN] Cycle {} backed out: {} links repaired, {} self-forwarded",
                cycle, relinked, self_forwarded
            ),
            FinalizeEvent::ForcedFinalizable { objects } => {
                format!("[FIN] Forced {} unfinalized objects finalizable", objects)
            },
            FinalizeEvent::ShutdownComplete { drained } => {
                format!("[FIN] Finalization shut down (drained: {})", drained)
            },
        }
    }

    /// Copy of every stored event
    pub fn get_events(&self) -> Vec<FinalizeEvent> {
        self.events
            .lock()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }
}

impl Default for FinalizeLogger {
    fn default() -> Self {
        Self::new(FinalizeLoggerConfig::default())
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_LOGGER: Mutex<FinalizeLogger> = Mutex::new(FinalizeLogger::default());
}

/// Log an event to the global logger
pub fn log_event(event: FinalizeEvent) {
    GLOBAL_LOGGER.lock().log(event);
}

/// Replace the global logger
pub fn configure_logger(config: FinalizeLoggerConfig) {
    *GLOBAL_LOGGER.lock() = FinalizeLogger::new(config);
}

/// Global logger event count
pub fn get_event_count() -> usize {
    GLOBAL_LOGGER.lock().event_count()
}

/// Global logger events
pub fn get_events() -> Vec<FinalizeEvent> {
    GLOBAL_LOGGER.lock().get_events()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_basic() {
        let logger = FinalizeLogger::default();
        logger.log(FinalizeEvent::WorkerStarted {
            worker: 1,
            mode: "normal".to_string(),
        });
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_level_filtering() {
        let logger = FinalizeLogger::default();
        logger.log(FinalizeEvent::ForcedFinalizable { objects: 3 });
        assert_eq!(logger.event_count(), 0);

        logger.log(FinalizeEvent::WorkerAbandoned {
            worker: 2,
            limit_ms: 2000,
        });
        assert_eq!(logger.event_count(), 1);
    }

    #[test]
    fn test_logger_disable() {
        let logger = FinalizeLogger::default();
        logger.disable();
        logger.log(FinalizeEvent::ShutdownComplete { drained: true });
        assert_eq!(logger.event_count(), 0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let logger = FinalizeLogger::new(FinalizeLoggerConfig {
            capacity: 2,
            ..Default::default()
        });
        for worker in 0..3 {
            logger.log(FinalizeEvent::WorkerAbandoned {
                worker,
                limit_ms: 1,
            });
        }
        let events = logger.get_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            FinalizeEvent::WorkerAbandoned {
                worker: 1,
                limit_ms: 1
            }
        );
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&FinalizeEvent::RunFinalizationTimedOut {
            timeout_ms: 1000,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"run_finalization_timed_out","timeout_ms":1000}"#);
    }

    #[test]
    fn test_global_logger() {
        log_event(FinalizeEvent::ShutdownComplete { drained: false });
        assert!(get_event_count() > 0);
    }
}
