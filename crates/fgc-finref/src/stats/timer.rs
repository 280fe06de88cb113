//! Pass Timer - Timing Utilities
//!
//! Times worker passes and root-clearing phases.

use std::time::{Duration, Instant};

/// PassTimer - wall-clock timer started on creation
#[derive(Debug, Clone, Copy)]
pub struct PassTimer {
    start: Instant,
}

impl PassTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_us(&self) -> u64 {
        self.elapsed().as_micros() as u64
    }

    /// Elapsed milliseconds with sub-millisecond precision
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for PassTimer {
    fn default() -> Self {
        Self::new()
    }
}
