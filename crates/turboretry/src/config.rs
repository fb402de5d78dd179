//! Configuration for the retry harness

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use turboretry_core::retry::{BackoffKind, RetryPolicy};

use crate::error::{HarnessError, Result};

/// Configuration for a harness run.
///
/// Holds the retry policy applied to every sequence plus the knobs of the
/// outer loop and of the HTTP probe. Durations are expressed in
/// milliseconds in files and in the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Retry policy applied to every sequence
    pub policy: RetryPolicy,

    /// URL probed by [`HttpProbe`](crate::probe::HttpProbe)
    pub target_url: String,

    /// Per-request timeout for the probe
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,

    /// Pause between two sequences
    #[serde(rename = "interval_ms", with = "duration_ms")]
    pub interval: Duration,

    /// Stop after this many sequences (`None` runs until cancelled)
    pub iterations: Option<u64>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
            target_url: "http://127.0.0.1:8080/health".to_string(),
            request_timeout: Duration::from_secs(10),
            interval: Duration::from_secs(1),
            iterations: None,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    ///
    /// This will look for:
    /// - `TURBORETRY_MAX_ATTEMPTS` for the attempt budget
    /// - `TURBORETRY_BACKOFF` (`constant`, `linear` or `exponential`)
    /// - `TURBORETRY_BASE_DELAY_MS` for the base delay
    /// - `TURBORETRY_MAX_DELAY_MS` for the delay cap
    /// - `TURBORETRY_JITTER` (`true`/`false`)
    /// - `TURBORETRY_TARGET_URL` for the probed URL
    /// - `TURBORETRY_TIMEOUT_MS` for the request timeout
    /// - `TURBORETRY_INTERVAL_MS` for the pause between sequences
    /// - `TURBORETRY_ITERATIONS` for the number of sequences
    ///
    /// Unset variables keep their defaults; values that do not parse are errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let mut policy = config.policy.to_builder();

        if let Some(max_attempts) = env_parse::<u32>("TURBORETRY_MAX_ATTEMPTS")? {
            policy = policy.max_attempts(max_attempts);
        }
        if let Some(backoff) = env_var("TURBORETRY_BACKOFF") {
            policy = policy.backoff(BackoffKind::from_str(&backoff)?);
        }
        if let Some(ms) = env_parse::<u64>("TURBORETRY_BASE_DELAY_MS")? {
            policy = policy.base_delay(Duration::from_millis(ms));
        }
        if let Some(ms) = env_parse::<u64>("TURBORETRY_MAX_DELAY_MS")? {
            policy = policy.max_delay(Duration::from_millis(ms));
        }
        if let Some(jitter) = env_parse::<bool>("TURBORETRY_JITTER")? {
            policy = policy.jitter(jitter);
        }
        config.policy = policy.build()?;

        if let Some(url) = env_var("TURBORETRY_TARGET_URL") {
            config.target_url = url;
        }
        if let Some(ms) = env_parse::<u64>("TURBORETRY_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("TURBORETRY_INTERVAL_MS")? {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(iterations) = env_parse::<u64>("TURBORETRY_ITERATIONS")? {
            config.iterations = Some(iterations);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML document.
    ///
    /// ```rust
    /// use turboretry::HarnessConfig;
    ///
    /// let config = HarnessConfig::from_toml_str(r#"
    ///     target_url = "http://localhost:9000/ping"
    ///     iterations = 5
    ///
    ///     [policy]
    ///     max_attempts = 3
    ///     base_delay_ms = 500
    /// "#).unwrap();
    ///
    /// assert_eq!(config.iterations, Some(5));
    /// assert_eq!(config.policy.max_attempts(), 3);
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|err| HarnessError::Config(format!("{name}={value}: {err}")))
        })
        .transpose()
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
