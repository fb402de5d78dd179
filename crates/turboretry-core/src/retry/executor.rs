//! The retry loop.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

use super::backoff::{BackoffScheduler, EqualJitter, JitterSource, StandardBackoff};
use super::classifier::{Classification, Fault, FaultClassifier, RetryAll};
use super::operation::{Operation, Sleeper, TokioSleeper};
use super::policy::RetryPolicy;
use crate::error::{RetryError, TelemetryError};
use crate::stats::Statistics;
use crate::telemetry::{AttemptOutcome, AttemptRecord, TelemetrySink};

/// Fault carried out of an attempt once the borrowed value is gone.
enum LastFault<E> {
    Error(E),
    Rejected(String),
}

/// Drives one operation through attempts, backoff waits and a terminal outcome.
///
/// A sequence moves through
/// `Attempting -> {Succeeded | EvaluatingFault} -> {WaitingBackoff -> Attempting | Failed}`,
/// and may end in `Cancelled` from `Attempting` or `WaitingBackoff`:
///
/// 1. `total_invocations` is incremented once.
/// 2. If the token is already cancelled the sequence ends without invoking
///    the operation.
/// 3. The operation is invoked, racing the token. An accepted value ends the
///    sequence as a success.
/// 4. A fault is classified. A terminal fault, or any fault on the last
///    permitted attempt, ends the sequence as a failure carrying the last
///    error. Otherwise the delay is computed, the retry is reported, and
///    the executor waits for the full delay (or cancellation) before the next
///    attempt.
///
/// The executor holds no per-sequence state, so one instance can be shared
/// behind an `Arc` by any number of concurrent sequences.
///
/// # Examples
///
/// ```rust
/// use turboretry_core::prelude::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let executor = RetryExecutor::default();
/// let policy = RetryPolicy::builder()
///     .max_attempts(3)
///     .base_delay(Duration::from_millis(10))
///     .build()?;
/// let stats = Statistics::new();
/// let cancel = CancellationToken::new();
///
/// let value = executor
///     .execute(&policy, &stats, &cancel, |_cancel: CancellationToken| async {
///         Ok::<_, std::io::Error>(42)
///     })
///     .await?;
///
/// assert_eq!(value, 42);
/// assert_eq!(stats.snapshot().eventual_successes, 1);
/// # Ok(())
/// # }
/// ```
pub struct RetryExecutor {
    scheduler: Arc<dyn BackoffScheduler>,
    jitter: Arc<dyn JitterSource>,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn TelemetrySink>,
    sink_error_seen: AtomicBool,
}

impl RetryExecutor {
    /// Create a builder for an executor.
    pub fn builder() -> RetryExecutorBuilder {
        RetryExecutorBuilder::default()
    }

    /// Run one sequence, retrying every error.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Exhausted`] when every permitted attempt failed.
    /// - [`RetryError::Cancelled`] when the token fired first.
    pub async fn execute<O>(
        &self,
        policy: &RetryPolicy,
        stats: &Statistics,
        cancel: &CancellationToken,
        operation: O,
    ) -> Result<O::Output, RetryError<O::Error>>
    where
        O: Operation,
        O::Error: fmt::Display,
    {
        self.execute_with(policy, stats, cancel, &RetryAll, operation)
            .await
    }

    /// Run one sequence, consulting `classifier` for every outcome.
    ///
    /// # Errors
    ///
    /// - [`RetryError::Terminal`] when the classifier marked an error terminal.
    /// - [`RetryError::Exhausted`] when every permitted attempt failed.
    /// - [`RetryError::Rejected`] when the final attempt's value was rejected.
    /// - [`RetryError::Cancelled`] when the token fired first.
    pub async fn execute_with<O, C>(
        &self,
        policy: &RetryPolicy,
        stats: &Statistics,
        cancel: &CancellationToken,
        classifier: &C,
        mut operation: O,
    ) -> Result<O::Output, RetryError<O::Error>>
    where
        O: Operation,
        O::Error: fmt::Display,
        C: FaultClassifier<O::Output, O::Error> + ?Sized,
    {
        stats.record_invocation();
        let max_attempts = policy.max_attempts();
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(self.cancelled(stats, attempt - 1));
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation.invoke(cancel) => Some(result),
            };
            let Some(result) = result else {
                return Err(self.cancelled(stats, attempt));
            };

            let (classification, fault) = match result {
                Ok(value) => match classifier.reject(&value) {
                    None => {
                        self.notify(|sink| {
                            sink.on_attempt(&AttemptRecord {
                                attempt,
                                outcome: AttemptOutcome::Success,
                                delay_before_next: None,
                            })
                        });
                        stats.record_success();
                        self.notify(|sink| sink.on_success(attempt));
                        return Ok(value);
                    }
                    Some(reason) => {
                        let classification = classifier.classify(&Fault::Rejected {
                            value: &value,
                            reason: &reason,
                        });
                        (classification, LastFault::Rejected(reason))
                    }
                },
                Err(err) => (
                    classifier.classify(&Fault::Error(&err)),
                    LastFault::Error(err),
                ),
            };
            let message = match &fault {
                LastFault::Error(err) => err.to_string(),
                LastFault::Rejected(reason) => reason.clone(),
            };

            if classification == Classification::Terminal || attempt >= max_attempts {
                self.notify(|sink| {
                    sink.on_attempt(&AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Fault {
                            message: message.clone(),
                            classification,
                        },
                        delay_before_next: None,
                    })
                });
                stats.record_failure();
                self.notify(|sink| sink.on_failure(attempt, &message));
                return Err(match fault {
                    LastFault::Error(source) if classification == Classification::Terminal => {
                        RetryError::Terminal {
                            attempts: attempt,
                            source,
                        }
                    }
                    LastFault::Error(source) => RetryError::Exhausted {
                        attempts: attempt,
                        source,
                    },
                    LastFault::Rejected(reason) => RetryError::Rejected {
                        attempts: attempt,
                        reason,
                    },
                });
            }

            let delay = self
                .scheduler
                .delay_for(attempt, policy, self.jitter.as_ref());
            self.notify(|sink| {
                sink.on_attempt(&AttemptRecord {
                    attempt,
                    outcome: AttemptOutcome::Fault {
                        message: message.clone(),
                        classification,
                    },
                    delay_before_next: Some(delay),
                })
            });
            self.notify(|sink| sink.on_retry(attempt, &message, delay));
            stats.record_retry();

            let waited = tokio::select! {
                biased;
                _ = cancel.cancelled() => false,
                _ = self.sleeper.sleep(delay) => true,
            };
            if !waited {
                return Err(self.cancelled(stats, attempt));
            }
            attempt += 1;
        }
    }

    fn cancelled<E>(&self, stats: &Statistics, attempts: u32) -> RetryError<E> {
        stats.record_cancellation();
        self.notify(|sink| sink.on_cancelled(attempts));
        RetryError::Cancelled { attempts }
    }

    /// Deliver telemetry, swallowing sink errors and panics. Only the first one is logged.
    fn notify(&self, deliver: impl FnOnce(&dyn TelemetrySink) -> Result<(), TelemetryError>) {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| deliver(self.sink.as_ref())))
            .unwrap_or_else(|payload| Err(TelemetryError::from_panic(payload.as_ref())));
        if let Err(err) = delivered {
            let first = !self.sink_error_seen.swap(true, Ordering::Relaxed);
            #[cfg(feature = "tracing")]
            if first {
                tracing::warn!(error = %err, "Telemetry sink failed, suppressing further sink errors");
            }
            #[cfg(not(feature = "tracing"))]
            let _ = (first, err);
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("sink_error_seen", &self.sink_error_seen.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryExecutor`].
///
/// Defaults: [`StandardBackoff`], [`EqualJitter`], [`TokioSleeper`], and a
/// `tracing` sink when the `tracing` feature is enabled ([`NullSink`]
/// otherwise).
///
/// [`NullSink`]: crate::telemetry::NullSink
#[derive(Default)]
pub struct RetryExecutorBuilder {
    scheduler: Option<Arc<dyn BackoffScheduler>>,
    jitter: Option<Arc<dyn JitterSource>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    sink: Option<Arc<dyn TelemetrySink>>,
}

impl RetryExecutorBuilder {
    /// Replace the backoff scheduler.
    pub fn scheduler(mut self, scheduler: impl BackoffScheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Replace the jitter source.
    pub fn jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Some(Arc::new(jitter));
        self
    }

    /// Replace the sleeper used for backoff waits.
    pub fn sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    /// Replace the telemetry sink.
    pub fn sink(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Build the executor.
    pub fn build(self) -> RetryExecutor {
        RetryExecutor {
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(StandardBackoff)),
            jitter: self.jitter.unwrap_or_else(|| Arc::new(EqualJitter)),
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
            sink: self.sink.unwrap_or_else(default_sink),
            sink_error_seen: AtomicBool::new(false),
        }
    }
}

#[cfg(feature = "tracing")]
fn default_sink() -> Arc<dyn TelemetrySink> {
    Arc::new(crate::telemetry::TracingSink)
}

#[cfg(not(feature = "tracing"))]
fn default_sink() -> Arc<dyn TelemetrySink> {
    Arc::new(crate::telemetry::NullSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{PredicateClassifier, backoff::NoJitter};
    use crate::telemetry::{ChannelSink, EventKind};
    use crate::testing::{PanickingSink, RecordingSink, RecordingSleeper, ScriptedOperation};
    use std::io;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .base_delay(Duration::from_secs(1))
            .jitter(false)
            .build()
            .unwrap()
    }

    fn executor(sleeper: &RecordingSleeper, sink: &RecordingSink) -> RetryExecutor {
        RetryExecutor::builder()
            .jitter(NoJitter)
            .sleeper(sleeper.clone())
            .sink(sink.clone())
            .build()
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();

        let result = executor(&sleeper, &sink)
            .execute(&policy(3), &stats, &CancellationToken::new(), |_: CancellationToken| async {
                Ok::<_, io::Error>(42)
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_invocations, 1);
        assert_eq!(snapshot.eventual_successes, 1);
        assert_eq!(snapshot.retries_performed, 0);
        assert!(sleeper.delays().is_empty());
        assert_eq!(sink.kinds(), vec![EventKind::Success]);
    }

    #[tokio::test]
    async fn test_retry_success_on_third_attempt() {
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();
        let op = ScriptedOperation::failing_times(2, 42);

        let result = executor(&sleeper, &sink)
            .execute(&policy(5), &stats, &CancellationToken::new(), op.clone())
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(op.calls(), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert_eq!(
            sink.kinds(),
            vec![EventKind::Retry, EventKind::Retry, EventKind::Success]
        );
        assert_eq!(stats.snapshot().retries_performed, 2);
    }

    #[tokio::test]
    async fn test_terminal_fault_stops_immediately() {
        let classifier =
            PredicateClassifier::new(|err: &io::Error| err.kind() != io::ErrorKind::PermissionDenied);
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();
        let calls = AtomicU32::new(0);

        let result = executor(&sleeper, &sink)
            .execute_with(
                &policy(5),
                &stats,
                &CancellationToken::new(),
                &classifier,
                |_: CancellationToken| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(io::Error::new(io::ErrorKind::PermissionDenied, "denied")) }
                },
            )
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Terminal { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays().is_empty());
        assert_eq!(stats.snapshot().eventual_failures, 1);
        assert_eq!(sink.kinds(), vec![EventKind::Failure]);
    }

    #[tokio::test]
    async fn test_single_attempt_policy_never_backs_off() {
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();

        let result = executor(&sleeper, &sink)
            .execute(&policy(1), &stats, &CancellationToken::new(), |_: CancellationToken| async {
                Err::<(), _>(io::Error::other("down"))
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 1, .. })));
        assert!(sleeper.delays().is_empty());
        assert_eq!(stats.snapshot().retries_performed, 0);
    }

    #[tokio::test]
    async fn test_rejected_value_is_retried_then_surfaced() {
        struct RejectOdd;
        impl FaultClassifier<u32, io::Error> for RejectOdd {
            fn classify(&self, _fault: &Fault<'_, u32, io::Error>) -> Classification {
                Classification::Retryable
            }

            fn reject(&self, value: &u32) -> Option<String> {
                (value % 2 == 1).then(|| format!("odd value {value}"))
            }
        }

        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();
        let calls = AtomicU32::new(0);

        let result = executor(&sleeper, &sink)
            .execute_with(
                &policy(3),
                &stats,
                &CancellationToken::new(),
                &RejectOdd,
                |_: CancellationToken| {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, io::Error>(2 * n + 1) }
                },
            )
            .await;

        match result {
            Err(RetryError::Rejected { attempts, reason }) => {
                assert_eq!(attempts, 3);
                assert_eq!(reason, "odd value 5");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(sink.events()[0].message, "odd value 1");
        assert_eq!(stats.snapshot().eventual_failures, 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();
        let stats = Statistics::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let op = ScriptedOperation::failing_times(0, ());

        let result = executor(&sleeper, &sink)
            .execute(&policy(3), &stats, &cancel, op.clone())
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
        assert_eq!(op.calls(), 0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_invocations, 1);
        assert_eq!(snapshot.eventual_failures, 0);
        assert_eq!(snapshot.eventual_cancellations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_operation_pending() {
        let stats = Statistics::new();
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::builder().jitter(NoJitter).build();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = executor
            .execute(&policy(3), &stats, &cancel, |_: CancellationToken| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, io::Error>(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert_eq!(stats.snapshot().eventual_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_full_delay_between_attempts() {
        let stats = Statistics::new();
        let executor = RetryExecutor::builder().jitter(NoJitter).build();
        let op = ScriptedOperation::failing_times(3, ());
        let start = tokio::time::Instant::now();

        executor
            .execute(&policy(4), &stats, &CancellationToken::new(), op.clone())
            .await
            .unwrap();

        // 1s + 2s + 4s
        assert!(start.elapsed() >= Duration::from_secs(7));
        assert_eq!(op.calls(), 4);
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_abort_sequence() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        let sleeper = RecordingSleeper::new();
        let stats = Statistics::new();
        let executor = RetryExecutor::builder()
            .jitter(NoJitter)
            .sleeper(sleeper.clone())
            .sink(sink)
            .build();

        let result = executor
            .execute(
                &policy(3),
                &stats,
                &CancellationToken::new(),
                ScriptedOperation::failing_times(1, 7),
            )
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.snapshot().eventual_successes, 1);
        assert!(executor.sink_error_seen.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_panicking_sink_does_not_abort_sequence() {
        let stats = Statistics::new();
        let executor = RetryExecutor::builder()
            .jitter(NoJitter)
            .sleeper(RecordingSleeper::new())
            .sink(PanickingSink)
            .build();

        let value = tokio::spawn(async move {
            let result = executor
                .execute(
                    &policy(3),
                    &stats,
                    &CancellationToken::new(),
                    ScriptedOperation::failing_times(1, 7),
                )
                .await;
            assert!(executor.sink_error_seen.load(Ordering::Relaxed));
            (result.unwrap(), stats.snapshot())
        })
        .await
        .expect("sequence task must not unwind");

        let (value, snapshot) = value;
        assert_eq!(value, 7);
        assert_eq!(snapshot.total_invocations, 1);
        assert_eq!(snapshot.retries_performed, 1);
        assert_eq!(snapshot.eventual_successes, 1);
        assert_eq!(snapshot.eventual_failures, 0);
        assert_eq!(snapshot.eventual_cancellations, 0);
    }

    #[tokio::test]
    async fn test_panicking_sink_still_counts_exhaustion() {
        let stats = Statistics::new();
        let executor = RetryExecutor::builder()
            .jitter(NoJitter)
            .sleeper(RecordingSleeper::new())
            .sink(PanickingSink)
            .build();

        let err = executor
            .execute(
                &policy(2),
                &stats,
                &CancellationToken::new(),
                ScriptedOperation::always_failing(()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted { attempts: 2, .. }));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.eventual_failures, 1);
        assert_eq!(snapshot.eventual_successes, 0);
        assert_eq!(snapshot.retries_performed, 1);
    }

    #[tokio::test]
    async fn test_attempt_records_mark_final_attempt() {
        let sleeper = RecordingSleeper::new();
        let sink = RecordingSink::new();

        executor(&sleeper, &sink)
            .execute(
                &policy(3),
                &Statistics::new(),
                &CancellationToken::new(),
                ScriptedOperation::failing_times(1, ()),
            )
            .await
            .unwrap();

        let records = sink.attempts();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].delay_before_next, Some(Duration::from_secs(1)));
        assert!(!records[0].is_final());
        assert_eq!(records[1].outcome, AttemptOutcome::Success);
        assert!(records[1].is_final());
    }
}
