//! Error Module - Finalization Error Types
//!
//! Defines the error types used by the finalization subsystem.
//!
//! # Error Categories
//!
//! ## Worker Lifecycle Errors (transient)
//! - `WorkerStartFailed` - Supervision state or worker could not be created
//! - `AttachFailed` - Worker failed its attach handshake
//! - `ThreadSpawn` - OS refused to create a thread
//!
//! ## Runtime Errors
//! - `Timeout` - A bounded wait expired
//! - `ShutdownInProgress` - Request arrived after shutdown began
//! - `InvalidState` - Runtime state machine violation
//!
//! ## Configuration Errors
//! - `Configuration` - Invalid configuration
//! - `Internal` - Invariant violation
//!
//! None of the worker lifecycle errors are ever fatal to the VM: the
//! supervisor gives up the current cycle and retries on the next wake.

use thiserror::Error;

/// Main error type for all finalization operations
///
/// # Examples
///
/// ```rust
/// use fgc_finref::error::FinalizeError;
///
/// fn handle_error(err: FinalizeError) {
///     if err.is_recoverable() {
///         eprintln!("transient: {}", err);
///     } else {
///         eprintln!("fatal: {}", err);
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Worker supervision state could not be created
    ///
    /// **When returned:** Resource exhaustion while preparing a worker
    ///
    /// **Recovery strategy:** Give up this cycle, retry on the next wake
    #[error("Finalizer worker start failed: {reason}")]
    WorkerStartFailed { reason: String },

    /// Worker failed its attach handshake
    ///
    /// **When returned:** The dispatcher refused to attach the worker thread
    ///
    /// **Recovery strategy:** Treated as transient, retried next cycle
    #[error("Finalizer worker attach failed: {0}")]
    AttachFailed(String),

    /// Thread creation failed
    ///
    /// **When returned:** `std::thread::Builder::spawn` returned an error
    ///
    /// **Recovery strategy:** Retry on next cycle
    #[error("Thread spawn failed for {name}: {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    ///
    /// **When returned:** Invalid finalization configuration detected
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(#[from] crate::config::ConfigError),

    /// Invalid state
    ///
    /// **When returned:** Runtime state machine violation
    ///
    /// **Example scenario:** `start()` called on a stopped runtime
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Operation timeout
    ///
    /// **When returned:** A bounded wait expired
    ///
    /// **Recovery strategy:** Best effort; callers usually ignore it
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Shutdown in progress
    ///
    /// **When returned:** A request arrived after orderly shutdown began
    #[error("Finalization shutdown in progress")]
    ShutdownInProgress,

    /// Internal error - indicates a bug
    ///
    /// **Action required:** Report with full diagnostic output
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FinalizeError {
    /// Check if this error is transient and the operation may be retried
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FinalizeError::WorkerStartFailed { .. }
                | FinalizeError::AttachFailed(_)
                | FinalizeError::ThreadSpawn { .. }
                | FinalizeError::Timeout(_)
        )
    }

    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(
            self,
            FinalizeError::InvalidState { .. } | FinalizeError::Internal(_)
        )
    }
}

/// Result type alias for finalization operations
pub type Result<T> = std::result::Result<T, FinalizeError>;

/// Abort on an internal-consistency failure.
///
/// List corruption implies memory corruption elsewhere; there is no safe
/// way to continue, so the diagnostic is logged and the process panics.
#[macro_export]
macro_rules! consistency_check {
    ($cond:expr, $context:expr) => {
        if !$cond {
            log::error!("consistency failure at {}: {}", stringify!($cond), $context);
            panic!("Consistency check failed at {}: {}", stringify!($cond), $context);
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            let message = format!($context, $($arg)*);
            log::error!("consistency failure at {}: {}", stringify!($cond), message);
            panic!("Consistency check failed at {}: {}", stringify!($cond), message);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_errors_are_recoverable() {
        let err = FinalizeError::WorkerStartFailed {
            reason: "no memory".to_string(),
        };
        assert!(err.is_recoverable());
        assert!(!err.is_bug());

        let err = FinalizeError::AttachFailed("refused".to_string());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_internal_is_bug() {
        let err = FinalizeError::Internal("bad".to_string());
        assert!(err.is_bug());
        assert!(!err.is_recoverable());
    }

    #[test]
    #[should_panic(expected = "Consistency check failed")]
    fn test_consistency_check_panics() {
        consistency_check!(1 + 1 == 3, "arithmetic is broken: {}", 42);
    }
}
