//! Pass Duration Histogram
//!
//! Logarithmic buckets of worker pass durations in microseconds. A pass that
//! ran user code for seconds lands in a high bucket without skewing the
//! median of the usual sub-millisecond passes.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// DurationHistogram - bucketed pass durations
pub struct DurationHistogram {
    /// bucket exponent -> samples
    buckets: Mutex<BTreeMap<u32, u64>>,
    count: AtomicU64,
    sum_us: AtomicU64,
    max_us: AtomicU64,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            max_us: AtomicU64::new(0),
        }
    }

    /// Record one sample
    pub fn record(&self, micros: u64) {
        *self.buckets.lock().entry(Self::bucket(micros)).or_insert(0) += 1;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);
        self.max_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// Bucket `n` holds samples in `[2^(n-1), 2^n)`; bucket 0 holds zero
    fn bucket(micros: u64) -> u32 {
        64 - micros.leading_zeros()
    }

    /// Upper bound of the bucket holding the `p` quantile
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count.load(Ordering::Relaxed);
        if total == 0 {
            return 0;
        }

        let target = ((total as f64) * p).ceil() as u64;
        let buckets = self.buckets.lock();
        let mut cumulative = 0;
        for (&bucket, &count) in buckets.iter() {
            cumulative += count;
            if cumulative >= target {
                return Self::upper_bound(bucket);
            }
        }
        buckets
            .last_key_value()
            .map_or(0, |(&bucket, _)| Self::upper_bound(bucket))
    }

    fn upper_bound(bucket: u32) -> u64 {
        if bucket == 0 {
            0
        } else {
            1u64.checked_shl(bucket).map_or(u64::MAX, |bound| bound - 1)
        }
    }

    pub fn mean(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.sum_us.load(Ordering::Relaxed) / count
    }

    pub fn max(&self) -> u64 {
        self.max_us.load(Ordering::Relaxed)
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.buckets.lock().clear();
        self.count.store(0, Ordering::Relaxed);
        self.sum_us.store(0, Ordering::Relaxed);
        self.max_us.store(0, Ordering::Relaxed);
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}
