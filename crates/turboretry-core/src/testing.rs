//! Test doubles for the retry engine.
//!
//! Deterministic stand-ins for the clock, the telemetry sink and the
//! protected operation, so delay sequences and event streams can be
//! asserted exactly.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::TelemetryError;
use crate::retry::{Operation, Sleeper};
use crate::telemetry::{AttemptRecord, EventKind, TelemetryEvent, TelemetrySink};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sleeper that returns immediately and remembers every requested delay.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Create a sleeper with no recorded delays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.delays).clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        lock(&self.delays).push(delay);
        tokio::task::yield_now().await;
    }
}

/// Sink that keeps every event and attempt record in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<TelemetryEvent>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        lock(&self.events).clone()
    }

    /// Kinds of the events recorded so far.
    pub fn kinds(&self) -> Vec<EventKind> {
        lock(&self.events).iter().map(|event| event.kind).collect()
    }

    /// Attempt records received so far.
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        lock(&self.attempts).clone()
    }

    /// Number of events of `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        lock(&self.events)
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }

    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        lock(&self.attempts).push(record.clone());
        Ok(())
    }
}

/// Sink whose every hook fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSink;

impl TelemetrySink for FailingSink {
    fn record(&self, _event: &TelemetryEvent) -> Result<(), TelemetryError> {
        Err(TelemetryError::Other("sink unavailable".to_string()))
    }

    fn on_attempt(&self, _record: &AttemptRecord) -> Result<(), TelemetryError> {
        Err(TelemetryError::Other("sink unavailable".to_string()))
    }
}

/// Sink whose every hook panics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingSink;

impl TelemetrySink for PanickingSink {
    fn record(&self, event: &TelemetryEvent) -> Result<(), TelemetryError> {
        panic!("sink panicked on {:?} event", event.kind)
    }

    fn on_attempt(&self, record: &AttemptRecord) -> Result<(), TelemetryError> {
        panic!("sink panicked on attempt {}", record.attempt)
    }
}

/// Operation that fails a fixed number of times, then succeeds.
///
/// The error of attempt `n` reads `transient failure on attempt n`, so tests
/// can check which attempt's error was surfaced. Clones share the call
/// counter.
#[derive(Debug, Clone)]
pub struct ScriptedOperation<T> {
    failures: u32,
    value: T,
    calls: Arc<AtomicU32>,
}

impl<T: Clone> ScriptedOperation<T> {
    /// Fail `failures` times, then return `value` on every later call.
    pub fn failing_times(failures: u32, value: T) -> Self {
        Self {
            failures,
            value,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Never succeed.
    pub fn always_failing(value: T) -> Self {
        Self::failing_times(u32::MAX, value)
    }

    /// Number of times the operation has been invoked.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> Operation for ScriptedOperation<T>
where
    T: Clone + Send + Sync,
{
    type Output = T;
    type Error = std::io::Error;

    async fn invoke(&mut self, _cancel: &CancellationToken) -> Result<T, std::io::Error> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(std::io::Error::other(format!(
                "transient failure on attempt {attempt}"
            )))
        } else {
            Ok(self.value.clone())
        }
    }
}
