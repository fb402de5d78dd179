//! Backoff delay computation and jitter sources.

use rand::Rng;
use std::time::Duration;

use super::policy::{BackoffKind, RetryPolicy};

/// Source of randomized variance for a backoff delay.
///
/// Given the jitter-free delay `d`, an implementation must return a value in
/// `[0, d]`. Substitute a deterministic source in tests.
pub trait JitterSource: Send + Sync {
    /// Apply jitter to `delay`.
    fn apply(&self, delay: Duration) -> Duration;
}

/// Equal jitter: `d/2 + uniform[0, d/2]`.
///
/// Keeps at least half of the computed delay while still spreading retries
/// from concurrent callers. This is the default source.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualJitter;

impl JitterSource for EqualJitter {
    fn apply(&self, delay: Duration) -> Duration {
        let half = delay / 2;
        half + half.mul_f64(rand::thread_rng().r#gen::<f64>())
    }
}

/// Full jitter: `uniform[0, d]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullJitter;

impl JitterSource for FullJitter {
    fn apply(&self, delay: Duration) -> Duration {
        delay.mul_f64(rand::thread_rng().r#gen::<f64>())
    }
}

/// Returns the delay unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn apply(&self, delay: Duration) -> Duration {
        delay
    }
}

/// Deterministic jitter: scales every delay by a fixed ratio in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter {
    ratio: f64,
}

impl FixedJitter {
    /// Create a source that returns `delay * ratio`. The ratio is clamped to `[0, 1]`.
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 1.0 } else { ratio.clamp(0.0, 1.0) };
        Self { ratio }
    }
}

impl JitterSource for FixedJitter {
    fn apply(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.ratio)
    }
}

/// Computes the wait before the next attempt.
///
/// The executor calls [`delay_for`](BackoffScheduler::delay_for) only after a
/// retryable fault on an attempt that is not the last one permitted, so
/// `attempt` is always in `1..policy.max_attempts()`.
pub trait BackoffScheduler: Send + Sync {
    /// Delay to wait after attempt `attempt` (1-based) failed.
    fn delay_for(&self, attempt: u32, policy: &RetryPolicy, jitter: &dyn JitterSource)
    -> Duration;
}

/// Scheduler implementing the policy's [`BackoffKind`].
///
/// # Formula
///
/// For attempt `n` (1-based) and base delay `b`:
/// ```text
/// Constant:    b
/// Linear:      b * n
/// Exponential: b * 2^(n-1)
/// capped     = min(delay, max_delay)      (when max_delay is set)
/// final      = jitter.apply(capped)       (when jitter is enabled)
/// ```
/// All arithmetic saturates instead of overflowing.
///
/// # Examples
///
/// ```rust
/// use turboretry_core::retry::{BackoffScheduler, NoJitter, RetryPolicy, StandardBackoff};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder().jitter(false).build().unwrap();
/// let delay = StandardBackoff.delay_for(3, &policy, &NoJitter);
/// assert_eq!(delay, Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBackoff;

impl StandardBackoff {
    /// Jitter-free delay for `attempt`, before the `max_delay` cap.
    pub fn base_delay(kind: BackoffKind, base: Duration, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match kind {
            BackoffKind::Constant => base,
            BackoffKind::Linear => base.saturating_mul(attempt),
            BackoffKind::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
        }
    }

    /// Jitter-free delay for `attempt`, after the `max_delay` cap.
    ///
    /// This is the upper bound of whatever [`delay_for`](BackoffScheduler::delay_for) returns.
    pub fn bound(attempt: u32, policy: &RetryPolicy) -> Duration {
        let delay = Self::base_delay(policy.backoff(), policy.base_delay(), attempt);
        match policy.max_delay() {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }
}

impl BackoffScheduler for StandardBackoff {
    fn delay_for(
        &self,
        attempt: u32,
        policy: &RetryPolicy,
        jitter: &dyn JitterSource,
    ) -> Duration {
        debug_assert!(attempt >= 1, "attempt numbers are 1-based");
        let bound = Self::bound(attempt, policy);
        if policy.jitter() {
            // Guard against sources that overshoot their contract.
            jitter.apply(bound).min(bound)
        } else {
            bound
        }
    }
}
