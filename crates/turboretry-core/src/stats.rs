//! Run-scoped retry statistics.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters aggregated across sequences.
///
/// Owned by the caller and borrowed by the executor. Every update is a single
/// atomic increment, so one instance can be shared by sequences running
/// concurrently on different tasks. Counters only grow until
/// [`reset`](Statistics::reset) is called at the start of a run.
#[derive(Debug, Default)]
pub struct Statistics {
    total_invocations: AtomicU64,
    eventual_successes: AtomicU64,
    retries_performed: AtomicU64,
    eventual_failures: AtomicU64,
    eventual_cancellations: AtomicU64,
}

impl Statistics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.total_invocations.store(0, Ordering::Relaxed);
        self.eventual_successes.store(0, Ordering::Relaxed);
        self.retries_performed.store(0, Ordering::Relaxed);
        self.eventual_failures.store(0, Ordering::Relaxed);
        self.eventual_cancellations.store(0, Ordering::Relaxed);
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_invocations: self.total_invocations.load(Ordering::Relaxed),
            eventual_successes: self.eventual_successes.load(Ordering::Relaxed),
            retries_performed: self.retries_performed.load(Ordering::Relaxed),
            eventual_failures: self.eventual_failures.load(Ordering::Relaxed),
            eventual_cancellations: self.eventual_cancellations.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_invocation(&self) {
        self.total_invocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_success(&self) {
        self.eventual_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries_performed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.eventual_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancellation(&self) {
        self.eventual_cancellations.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`Statistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    /// Sequences started.
    pub total_invocations: u64,
    /// Sequences that ended with a value.
    pub eventual_successes: u64,
    /// Backoff waits entered.
    pub retries_performed: u64,
    /// Sequences that ended with a terminal fault.
    pub eventual_failures: u64,
    /// Sequences ended by cancellation.
    pub eventual_cancellations: u64,
}

impl StatisticsSnapshot {
    /// Fraction of finished sequences that succeeded, or `None` before any finished.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.eventual_successes + self.eventual_failures;
        (finished > 0).then(|| self.eventual_successes as f64 / finished as f64)
    }
}
