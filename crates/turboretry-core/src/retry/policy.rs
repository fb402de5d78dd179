//! Immutable retry configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PolicyError;

/// Shape of the delay growth between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Every wait is `base_delay`.
    Constant,
    /// The wait after attempt `n` is `base_delay * n`.
    Linear,
    /// The wait after attempt `n` is `base_delay * 2^(n-1)`.
    #[default]
    Exponential,
}

impl std::str::FromStr for BackoffKind {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            other => Err(PolicyError::UnknownBackoff(other.to_string())),
        }
    }
}

/// Retry policy for one sequence.
///
/// A policy is read-only once built and is borrowed by the executor for the
/// duration of each sequence. Construct it with [`RetryPolicy::builder`] or
/// deserialize it; both paths reject `max_attempts == 0`.
///
/// # Defaults
///
/// - `max_attempts`: 6
/// - `backoff`: [`BackoffKind::Exponential`]
/// - `base_delay`: 1s
/// - `jitter`: enabled
/// - `max_delay`: none (uncapped)
///
/// # Examples
///
/// ```rust
/// use turboretry_core::retry::{BackoffKind, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .backoff(BackoffKind::Linear)
///     .base_delay(Duration::from_millis(250))
///     .jitter(false)
///     .build()
///     .unwrap();
///
/// assert_eq!(policy.max_attempts(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffKind,
    base_delay: Duration,
    jitter: bool,
    max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Default attempt budget.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

    /// Default base delay.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

    /// Create a new builder for configuring a policy.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Builder seeded with this policy's values.
    pub fn to_builder(&self) -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_attempts: Some(self.max_attempts),
            backoff: Some(self.backoff),
            base_delay: Some(self.base_delay),
            jitter: Some(self.jitter),
            max_delay: self.max_delay,
        }
    }

    /// Maximum number of attempts in one sequence, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Growth shape of the delay.
    pub fn backoff(&self) -> BackoffKind {
        self.backoff
    }

    /// Absolute scale of the delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Whether randomized variance is applied to each delay.
    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Upper bound for the jitter-free delay, if any.
    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Number of backoff waits a sequence that never succeeds goes through.
    pub fn max_retries(&self) -> u32 {
        self.max_attempts - 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffKind::default(),
            base_delay: Self::DEFAULT_BASE_DELAY,
            jitter: true,
            max_delay: None,
        }
    }
}

/// Builder for [`RetryPolicy`].
///
/// Unset fields fall back to the [`RetryPolicy`] defaults.
#[derive(Debug, Default, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    backoff: Option<BackoffKind>,
    base_delay: Option<Duration>,
    jitter: Option<bool>,
    max_delay: Option<Duration>,
}

impl RetryPolicyBuilder {
    /// Set the attempt budget (must be at least 1).
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Set the growth shape.
    pub fn backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = Some(enabled);
        self
    }

    /// Cap the jitter-free delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Validate and build the policy.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::ZeroAttempts`] when `max_attempts` is 0.
    /// - [`PolicyError::InvalidDelay`] when a delay has a sub-millisecond part
    ///   or does not fit in `u64` milliseconds, since policies serialize
    ///   delays as whole milliseconds.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let max_attempts = self
            .max_attempts
            .unwrap_or(RetryPolicy::DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        let base_delay = self.base_delay.unwrap_or(RetryPolicy::DEFAULT_BASE_DELAY);
        whole_millis("base_delay", base_delay)?;
        if let Some(max_delay) = self.max_delay {
            whole_millis("max_delay", max_delay)?;
        }
        Ok(RetryPolicy {
            max_attempts,
            backoff: self.backoff.unwrap_or_default(),
            base_delay,
            jitter: self.jitter.unwrap_or(true),
            max_delay: self.max_delay,
        })
    }
}

fn whole_millis(field: &'static str, delay: Duration) -> Result<u64, PolicyError> {
    let invalid = PolicyError::InvalidDelay { field, delay };
    if delay.subsec_nanos() % 1_000_000 != 0 {
        return Err(invalid);
    }
    u64::try_from(delay.as_millis()).map_err(|_| invalid)
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Wire form of a policy: delays in milliseconds, every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct RawPolicy {
    max_attempts: Option<u32>,
    backoff: Option<BackoffKind>,
    base_delay_ms: Option<u64>,
    jitter: Option<bool>,
    max_delay_ms: Option<u64>,
}

impl TryFrom<RawPolicy> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        let mut builder = RetryPolicy::builder();
        if let Some(max_attempts) = raw.max_attempts {
            builder = builder.max_attempts(max_attempts);
        }
        if let Some(backoff) = raw.backoff {
            builder = builder.backoff(backoff);
        }
        if let Some(ms) = raw.base_delay_ms {
            builder = builder.base_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = raw.jitter {
            builder = builder.jitter(jitter);
        }
        if let Some(ms) = raw.max_delay_ms {
            builder = builder.max_delay(Duration::from_millis(ms));
        }
        builder.build()
    }
}

impl From<RetryPolicy> for RawPolicy {
    fn from(policy: RetryPolicy) -> Self {
        Self {
            max_attempts: Some(policy.max_attempts),
            backoff: Some(policy.backoff),
            base_delay_ms: Some(millis(policy.base_delay)),
            jitter: Some(policy.jitter),
            max_delay_ms: policy.max_delay.map(millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_builder_defaults() {
        let policy = assert_ok!(RetryPolicy::builder().build());

        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.backoff(), BackoffKind::Exponential);
        assert_eq!(policy.base_delay(), Duration::from_secs(1));
        assert!(policy.jitter());
        assert_eq!(policy.max_delay(), None);
        assert_eq!(policy.max_retries(), 5);
    }

    #[test]
    fn test_builder_rejects_zero_attempts() {
        let err = assert_err!(RetryPolicy::builder().max_attempts(0).build());
        assert!(matches!(err, PolicyError::ZeroAttempts));
    }

    #[test]
    fn test_builder_rejects_sub_millisecond_delays() {
        let err = assert_err!(
            RetryPolicy::builder()
                .base_delay(Duration::from_micros(1500))
                .build()
        );
        assert_eq!(
            err,
            PolicyError::InvalidDelay {
                field: "base_delay",
                delay: Duration::from_micros(1500),
            }
        );

        let err = assert_err!(
            RetryPolicy::builder()
                .max_delay(Duration::from_nanos(1))
                .build()
        );
        assert!(matches!(err, PolicyError::InvalidDelay { field: "max_delay", .. }));
    }

    #[test]
    fn test_builder_rejects_delays_beyond_u64_millis() {
        let err = assert_err!(RetryPolicy::builder().base_delay(Duration::MAX).build());
        assert!(matches!(err, PolicyError::InvalidDelay { field: "base_delay", .. }));
    }

    #[test]
    fn test_serde_keeps_delays_exact() {
        let policy = assert_ok!(
            RetryPolicy::builder()
                .base_delay(Duration::from_millis(1500))
                .max_delay(Duration::from_secs(30))
                .build()
        );
        let json = serde_json::to_string(&policy).unwrap();
        let back: RetryPolicy = serde_json::from_str(&json).unwrap();

        assert_eq!(back, policy);
    }

    #[test]
    fn test_single_attempt_policy_has_no_retries() {
        let policy = RetryPolicy::builder().max_attempts(1).build().unwrap();
        assert_eq!(policy.max_retries(), 0);
    }

    #[test]
    fn test_to_builder_round_trips() {
        let policy = RetryPolicy::builder()
            .max_attempts(2)
            .max_delay(Duration::from_secs(3))
            .build()
            .unwrap();
        let rebuilt = policy.to_builder().jitter(false).build().unwrap();

        assert_eq!(rebuilt.max_attempts(), 2);
        assert_eq!(rebuilt.max_delay(), Some(Duration::from_secs(3)));
        assert!(!rebuilt.jitter());
    }

    #[test]
    fn test_backoff_kind_from_str() {
        assert_eq!("Constant".parse::<BackoffKind>().unwrap(), BackoffKind::Constant);
        assert_eq!(" linear ".parse::<BackoffKind>().unwrap(), BackoffKind::Linear);
        assert_eq!(
            "EXPONENTIAL".parse::<BackoffKind>().unwrap(),
            BackoffKind::Exponential
        );
        assert!("fibonacci".parse::<BackoffKind>().is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
            max_attempts = 3
            backoff = "linear"
            base_delay_ms = 200
            jitter = false
            max_delay_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), BackoffKind::Linear);
        assert_eq!(policy.base_delay(), Duration::from_millis(200));
        assert!(!policy.jitter());
        assert_eq!(policy.max_delay(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 2}"#).unwrap();

        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.base_delay(), RetryPolicy::DEFAULT_BASE_DELAY);
        assert!(policy.jitter());
    }

    #[test]
    fn test_deserialize_rejects_zero_attempts() {
        let result: Result<RetryPolicy, _> = serde_json::from_str(r#"{"max_attempts": 0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_uses_millis() {
        let policy = RetryPolicy::builder()
            .base_delay(Duration::from_millis(1500))
            .build()
            .unwrap();
        let json = serde_json::to_value(&policy).unwrap();

        assert_eq!(json["base_delay_ms"], 1500);
        assert_eq!(json["backoff"], "exponential");
        assert!(json["max_delay_ms"].is_null());
    }
}
