//! Configuration Module - Finalization Tuning Parameters
//!
//! Manages the numeric knobs of the finalization subsystem: worker
//! priorities, the supervisor's cycle interval, the time budget after which
//! a worker is abandoned, and the bounded waits exposed to the runtime.

use std::time::Duration;

/// How long the supervisor waits between finalization cycles when no
/// explicit request is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait until somebody asks for work
    Indefinite,
    /// Wait up to the given interval, then run a cycle
    Interval(Duration),
    /// Yield the processor once, then run a cycle
    Yield,
    /// Never wait
    Immediate,
}

impl WaitPolicy {
    /// Parse the `finInterval=` style value: `nodelay`, `0` (yield) or a
    /// millisecond count.
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("nodelay") {
            return Some(WaitPolicy::Immediate);
        }
        match value.parse::<u64>().ok()? {
            0 => Some(WaitPolicy::Yield),
            ms => Some(WaitPolicy::Interval(Duration::from_millis(ms))),
        }
    }
}

/// Main configuration for the finalization subsystem
///
/// # Examples
///
/// ```rust
/// use fgc_finref::FinalizeConfig;
/// use std::time::Duration;
///
/// let config = FinalizeConfig {
///     cycle_limit: Duration::from_millis(500),
///     region_partitioned: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct FinalizeConfig {
    /// Supervisor wait after a collector wake-up
    ///
    /// Default: 750ms interval
    pub cycle_interval: WaitPolicy,

    /// Time budget granted to a worker per cycle
    ///
    /// A worker that has not reported finished within this budget is
    /// abandoned and a fresh worker may be started.
    /// Default: 2000ms
    pub cycle_limit: Duration,

    /// Bound on `run_finalization()` waits
    ///
    /// Default: 1000ms
    pub run_finalization_timeout: Duration,

    /// Bound on forced class loader unload waits
    ///
    /// Default: 5000ms
    pub forced_unload_timeout: Duration,

    /// Supervisor thread priority (1-10)
    pub supervisor_priority: u8,

    /// Worker thread priority (1-10)
    pub worker_priority: u8,

    /// Maximum objects batched in one thread-local buffer run
    ///
    /// Default: unbounded (`usize::MAX`)
    pub buffer_max_count: usize,

    /// Keep one set of special object lists per heap region
    ///
    /// Default: false (a single set of lists)
    pub region_partitioned: bool,

    /// Number of regions when `region_partitioned` is set
    pub region_count: usize,

    /// Age at which surviving soft references stop aging
    ///
    /// Default: 32
    pub max_soft_reference_age: u32,

    /// Enable verbose logging of finalization events
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        FinalizeConfig {
            cycle_interval: WaitPolicy::Interval(Duration::from_millis(750)),
            cycle_limit: Duration::from_millis(2000),
            run_finalization_timeout: Duration::from_millis(1000),
            forced_unload_timeout: Duration::from_millis(5000),

            supervisor_priority: DEFAULT_SUPERVISOR_PRIORITY,
            worker_priority: DEFAULT_WORKER_PRIORITY,

            buffer_max_count: usize::MAX,
            region_partitioned: false,
            region_count: 1,

            max_soft_reference_age: 32,
            verbose: false,
        }
    }
}

impl FinalizeConfig {
    /// Validate configuration
    ///
    /// ```rust
    /// use fgc_finref::FinalizeConfig;
    ///
    /// let config = FinalizeConfig {
    ///     worker_priority: 0,
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, priority) in [
            ("supervisor_priority", self.supervisor_priority),
            ("worker_priority", self.worker_priority),
        ] {
            if !(PRIORITY_MIN..=PRIORITY_MAX).contains(&priority) {
                return Err(ConfigError::InvalidPriority(format!(
                    "{} must be between {} and {}, got {}",
                    name, PRIORITY_MIN, PRIORITY_MAX, priority
                )));
            }
        }

        if self.cycle_limit.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "cycle_limit must be > 0".to_string(),
            ));
        }

        if self.run_finalization_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "run_finalization_timeout must be > 0".to_string(),
            ));
        }

        if let WaitPolicy::Interval(interval) = self.cycle_interval {
            if interval.is_zero() {
                return Err(ConfigError::InvalidInterval(
                    "interval must be > 0, use WaitPolicy::Yield instead".to_string(),
                ));
            }
        }

        if self.buffer_max_count == 0 {
            return Err(ConfigError::InvalidBufferSize(
                "buffer_max_count must be > 0".to_string(),
            ));
        }

        if self.region_count == 0 {
            return Err(ConfigError::InvalidRegionCount(
                "region_count must be > 0".to_string(),
            ));
        }

        if !self.region_partitioned && self.region_count != 1 {
            return Err(ConfigError::InvalidRegionCount(
                "region_count must be 1 unless region_partitioned is set".to_string(),
            ));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - FGC_FIN_INTERVAL (`nodelay`, `0` or milliseconds)
    /// - FGC_FIN_CYCLE_LIMIT_MS
    /// - FGC_FIN_RUN_TIMEOUT_MS
    /// - FGC_FIN_WORKER_PRIORITY
    /// - FGC_FIN_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("FGC_FIN_INTERVAL") {
            if let Some(policy) = WaitPolicy::parse(&val) {
                config.cycle_interval = policy;
            }
        }

        if let Ok(val) = std::env::var("FGC_FIN_CYCLE_LIMIT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.cycle_limit = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("FGC_FIN_RUN_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.run_finalization_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("FGC_FIN_WORKER_PRIORITY") {
            if let Ok(priority) = val.parse::<u8>() {
                config.worker_priority = priority;
            }
        }

        if let Ok(val) = std::env::var("FGC_FIN_VERBOSE") {
            config.verbose = val == "1" || val.eq_ignore_ascii_case("true");
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid thread priority: {0}")]
    InvalidPriority(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid cycle interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    #[error("Invalid region count: {0}")]
    InvalidRegionCount(String),
}

// ============================================================================
// CONSTANTS
// ============================================================================

const PRIORITY_MIN: u8 = 1;
const PRIORITY_MAX: u8 = 10;
const DEFAULT_SUPERVISOR_PRIORITY: u8 = 5;
const DEFAULT_WORKER_PRIORITY: u8 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FinalizeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.run_finalization_timeout, Duration::from_millis(1000));
        assert!(!config.region_partitioned);
    }

    #[test]
    fn test_invalid_priority() {
        let config = FinalizeConfig {
            supervisor_priority: 11,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPriority(_))
        ));
    }

    #[test]
    fn test_region_count_requires_partitioning() {
        let config = FinalizeConfig {
            region_count: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FinalizeConfig {
            region_count: 4,
            region_partitioned: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wait_policy_parse() {
        assert_eq!(WaitPolicy::parse("nodelay"), Some(WaitPolicy::Immediate));
        assert_eq!(WaitPolicy::parse("0"), Some(WaitPolicy::Yield));
        assert_eq!(
            WaitPolicy::parse("250"),
            Some(WaitPolicy::Interval(Duration::from_millis(250)))
        );
        assert_eq!(WaitPolicy::parse("soon"), None);
    }
}
