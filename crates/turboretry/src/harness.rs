//! Back-to-back sequence runner
//!
//! Drives the retry executor repeatedly against a fresh operation per
//! sequence and aggregates the outcome in one shared [`Statistics`].

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use turboretry_core::RetryError;
use turboretry_core::retry::{FaultClassifier, Operation, RetryAll, RetryExecutor, RetryPolicy};
use turboretry_core::stats::{Statistics, StatisticsSnapshot};

use crate::config::HarnessConfig;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Counters at the end of the run
    pub stats: StatisticsSnapshot,
    /// Sequences started
    pub sequences: u64,
    /// Wall-clock time of the run
    pub elapsed: Duration,
}

/// Runs retry sequences until cancelled or an iteration limit is reached.
///
/// Statistics are reset at the start of every run and can be read while the
/// run is in progress through [`Harness::stats`].
///
/// # Examples
///
/// ```rust
/// use turboretry::{Harness, HarnessConfig};
/// use turboretry_core::retry::RetryExecutor;
/// use tokio_util::sync::CancellationToken;
/// use std::time::Duration;
///
/// # async fn example() {
/// let config = HarnessConfig {
///     iterations: Some(3),
///     interval: Duration::ZERO,
///     ..Default::default()
/// };
/// let harness = Harness::new(RetryExecutor::default(), &config);
///
/// let report = harness
///     .run(|| |_cancel: CancellationToken| async { Ok::<_, std::io::Error>(()) }, &CancellationToken::new())
///     .await;
/// assert_eq!(report.stats.eventual_successes, 3);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Harness {
    executor: Arc<RetryExecutor>,
    policy: RetryPolicy,
    stats: Arc<Statistics>,
    interval: Duration,
    iterations: Option<u64>,
}

impl Harness {
    /// Create a harness from an executor and configuration.
    pub fn new(executor: RetryExecutor, config: &HarnessConfig) -> Self {
        Self {
            executor: Arc::new(executor),
            policy: config.policy.clone(),
            stats: Arc::new(Statistics::new()),
            interval: config.interval,
            iterations: config.iterations,
        }
    }

    /// Live statistics of the current or last run.
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Policy applied to every sequence.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run sequences back to back, retrying every error.
    pub async fn run<F, O>(&self, factory: F, cancel: &CancellationToken) -> RunReport
    where
        F: FnMut() -> O,
        O: Operation,
        O::Error: fmt::Display,
    {
        self.run_with(factory, &RetryAll, cancel).await
    }

    /// Run sequences back to back, classifying outcomes with `classifier`.
    ///
    /// `factory` builds the operation for each sequence. The loop stops when
    /// `cancel` fires, including during the pause between sequences, or once
    /// the configured number of iterations has completed.
    pub async fn run_with<F, O, C>(
        &self,
        mut factory: F,
        classifier: &C,
        cancel: &CancellationToken,
    ) -> RunReport
    where
        F: FnMut() -> O,
        O: Operation,
        O::Error: fmt::Display,
        C: FaultClassifier<O::Output, O::Error> + ?Sized,
    {
        self.stats.reset();
        let start = Instant::now();
        let mut sequences = 0u64;

        info!(
            max_attempts = self.policy.max_attempts(),
            backoff = ?self.policy.backoff(),
            iterations = self.iterations,
            "Starting retry harness"
        );

        loop {
            if cancel.is_cancelled() || self.limit_reached(sequences) {
                break;
            }

            sequences += 1;
            let result = self
                .executor
                .execute_with(&self.policy, &self.stats, cancel, classifier, factory())
                .await;
            log_sequence(sequences, &result);
            if matches!(result, Err(RetryError::Cancelled { .. })) || self.limit_reached(sequences)
            {
                break;
            }

            if !self.interval.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        }

        self.report(sequences, start)
    }

    /// Run `tasks` independent sequences concurrently against the shared statistics.
    pub async fn run_concurrent<F, O, C>(
        &self,
        tasks: usize,
        mut factory: F,
        classifier: Arc<C>,
        cancel: &CancellationToken,
    ) -> RunReport
    where
        F: FnMut() -> O,
        O: Operation + 'static,
        O::Output: 'static,
        O::Error: fmt::Display + 'static,
        C: FaultClassifier<O::Output, O::Error> + 'static,
    {
        self.stats.reset();
        let start = Instant::now();
        let mut set = JoinSet::new();

        for sequence in 1..=tasks as u64 {
            let executor = Arc::clone(&self.executor);
            let stats = Arc::clone(&self.stats);
            let classifier = Arc::clone(&classifier);
            let policy = self.policy.clone();
            let cancel = cancel.clone();
            let operation = factory();
            set.spawn(async move {
                let result = executor
                    .execute_with(&policy, &stats, &cancel, classifier.as_ref(), operation)
                    .await;
                log_sequence(sequence, &result);
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "Sequence task failed to complete");
            }
        }

        self.report(tasks as u64, start)
    }

    fn limit_reached(&self, sequences: u64) -> bool {
        self.iterations.is_some_and(|limit| sequences >= limit)
    }

    fn report(&self, sequences: u64, start: Instant) -> RunReport {
        let report = RunReport {
            stats: self.stats.snapshot(),
            sequences,
            elapsed: start.elapsed(),
        };
        info!(
            sequences = report.sequences,
            successes = report.stats.eventual_successes,
            failures = report.stats.eventual_failures,
            retries = report.stats.retries_performed,
            elapsed_ms = report.elapsed.as_millis(),
            "Retry harness finished"
        );
        report
    }
}

fn log_sequence<T, E: fmt::Display>(sequence: u64, result: &Result<T, RetryError<E>>) {
    match result {
        Ok(_) => debug!(sequence, "Sequence succeeded"),
        Err(err) if err.is_cancelled() => debug!(sequence, "Sequence cancelled"),
        Err(err) => debug!(sequence, attempts = err.attempts(), error = %err, "Sequence failed"),
    }
}
