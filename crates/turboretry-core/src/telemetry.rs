//! Retry telemetry events and sinks.
//!
//! Sinks are side-effect only. The executor ignores whatever a sink returns,
//! so a broken sink can never change the outcome of a sequence.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::TelemetryError;
use crate::retry::Classification;

/// Kind of a [`TelemetryEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A retryable fault; a backoff wait follows.
    Retry,
    /// The sequence produced a value.
    Success,
    /// The sequence ended with a terminal fault.
    Failure,
    /// The sequence was cancelled.
    Cancelled,
}

/// One structured telemetry record, with no formatting attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// What happened.
    pub kind: EventKind,
    /// Error message for retries and failures, summary otherwise.
    pub message: String,
    /// Attempt the event refers to (1-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Backoff delay about to be waited, retries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl TelemetryEvent {
    /// Retry after `attempt` failed with `message`; the executor waits `delay` next.
    pub fn retry(attempt: u32, message: impl Into<String>, delay: Duration) -> Self {
        Self {
            kind: EventKind::Retry,
            message: message.into(),
            attempt: Some(attempt),
            delay_ms: Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Success on attempt `attempt`.
    pub fn success(attempt: u32) -> Self {
        Self {
            kind: EventKind::Success,
            message: format!("succeeded on attempt {attempt}"),
            attempt: Some(attempt),
            delay_ms: None,
        }
    }

    /// Terminal failure on attempt `attempt` with the last error message.
    pub fn failure(attempt: u32, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Failure,
            message: message.into(),
            attempt: Some(attempt),
            delay_ms: None,
        }
    }

    /// Cancellation after `attempts` attempts.
    pub fn cancelled(attempts: u32) -> Self {
        Self {
            kind: EventKind::Cancelled,
            message: format!("cancelled after {attempts} attempt(s)"),
            attempt: (attempts > 0).then_some(attempts),
            delay_ms: None,
        }
    }
}

/// What a single attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The attempt produced an accepted value.
    Success,
    /// The attempt faulted.
    Fault {
        /// Error or rejection message.
        message: String,
        /// Verdict of the classifier.
        classification: Classification,
    },
}

/// Per-attempt record, built by the executor and handed to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Attempt number (1-based).
    pub attempt: u32,
    /// What the attempt produced.
    pub outcome: AttemptOutcome,
    /// Backoff scheduled after this attempt, `None` when the sequence ends here.
    pub delay_before_next: Option<Duration>,
}

impl AttemptRecord {
    /// Whether this attempt ended the sequence.
    pub fn is_final(&self) -> bool {
        self.delay_before_next.is_none()
    }
}

/// Receives retry telemetry.
///
/// Implementors only need [`record`](TelemetrySink::record); the `on_*`
/// hooks build the matching [`TelemetryEvent`] and forward to it. Override a
/// hook to handle one kind of event differently.
pub trait TelemetrySink: Send + Sync {
    /// Record one event.
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError>;

    /// Called after every attempt, before the matching retry, success or
    /// failure hook. The default ignores it.
    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        let _ = record;
        Ok(())
    }

    /// Called before each backoff wait.
    fn on_retry(&self, attempt: u32, message: &str, delay: Duration) -> Result<(), TelemetryError> {
        self.record(&TelemetryEvent::retry(attempt, message, delay))
    }

    /// Called once when a sequence succeeds.
    fn on_success(&self, attempt: u32) -> Result<(), TelemetryError> {
        self.record(&TelemetryEvent::success(attempt))
    }

    /// Called once when a sequence fails terminally.
    fn on_failure(&self, attempt: u32, message: &str) -> Result<(), TelemetryError> {
        self.record(&TelemetryEvent::failure(attempt, message))
    }

    /// Called once when a sequence is cancelled.
    fn on_cancelled(&self, attempts: u32) -> Result<(), TelemetryError> {
        self.record(&TelemetryEvent::cancelled(attempts))
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        (**self).record(event)
    }

    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        (**self).on_attempt(record)
    }

    fn on_retry(&self, attempt: u32, message: &str, delay: Duration) -> Result<(), TelemetryError> {
        (**self).on_retry(attempt, message, delay)
    }

    fn on_success(&self, attempt: u32) -> Result<(), TelemetryError> {
        (**self).on_success(attempt)
    }

    fn on_failure(&self, attempt: u32, message: &str) -> Result<(), TelemetryError> {
        (**self).on_failure(attempt, message)
    }

    fn on_cancelled(&self, attempts: u32) -> Result<(), TelemetryError> {
        (**self).on_cancelled(attempts)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn record(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Logs events through `tracing`.
///
/// Retries and failures are logged at `warn`, successes at `info`,
/// cancellations at `debug`.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl TelemetrySink for TracingSink {
    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        match &record.outcome {
            AttemptOutcome::Success => tracing::debug!(attempt = record.attempt, "Attempt succeeded"),
            AttemptOutcome::Fault {
                message,
                classification,
            } => tracing::debug!(
                attempt = record.attempt,
                classification = ?classification,
                delay_ms = record
                    .delay_before_next
                    .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                error = %message,
                "Attempt faulted"
            ),
        }
        Ok(())
    }

    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        match event.kind {
            EventKind::Retry => tracing::warn!(
                attempt = event.attempt,
                delay_ms = event.delay_ms,
                error = %event.message,
                "Attempt failed, backing off"
            ),
            EventKind::Success => tracing::info!(attempt = event.attempt, "Sequence succeeded"),
            EventKind::Failure => tracing::warn!(
                attempt = event.attempt,
                error = %event.message,
                "Sequence failed"
            ),
            EventKind::Cancelled => tracing::debug!(attempt = event.attempt, "Sequence cancelled"),
        }
        Ok(())
    }
}

/// Forwards events over an unbounded channel.
///
/// Recording fails with [`TelemetryError::Disconnected`] once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TelemetryEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver that consumes its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TelemetryEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TelemetrySink for ChannelSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        self.tx
            .send(event.clone())
            .map_err(|_| TelemetryError::Disconnected)
    }
}

/// Delivers every event to several sinks.
///
/// All sinks see the event even if an earlier one fails; the first error is returned.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    /// Create an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: impl TelemetrySink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl FanoutSink {
    fn deliver(
        &self,
        mut hook: impl FnMut(&dyn TelemetrySink) -> Result<(), TelemetryError>,
    ) -> Result<(), TelemetryError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = hook(sink.as_ref()) {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.record(event))
    }

    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.on_attempt(record))
    }

    fn on_retry(&self, attempt: u32, message: &str, delay: Duration) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.on_retry(attempt, message, delay))
    }

    fn on_success(&self, attempt: u32) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.on_success(attempt))
    }

    fn on_failure(&self, attempt: u32, message: &str) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.on_failure(attempt, message))
    }

    fn on_cancelled(&self, attempts: u32) -> Result<(), TelemetryError> {
        self.deliver(|sink| sink.on_cancelled(attempts))
    }
}
