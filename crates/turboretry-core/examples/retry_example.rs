//! Example: Retrying an unreliable operation with the retry executor
//!
//! This example demonstrates:
//! 1. Simple retry with exponential backoff
//! 2. Custom fault classification (permission errors are terminal)
//! 3. Jitter impact on the computed delays
//! 4. Consuming telemetry over a channel
//!
//! Run with:
//! ```bash
//! cargo run -p turboretry-core --example retry_example
//! ```

use std::error::Error;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use turboretry_core::prelude::*;
use turboretry_core::retry::{
    BackoffScheduler, EqualJitter, FullJitter, PredicateClassifier, StandardBackoff,
};
use turboretry_core::telemetry::{ChannelSink, EventKind};

/// A simulated API that fails the first few calls
#[derive(Clone)]
struct UnreliableApi {
    calls: Arc<AtomicU32>,
    fail_count: u32,
    kind: io::ErrorKind,
}

impl UnreliableApi {
    fn new(fail_count: u32, kind: io::ErrorKind) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            fail_count,
            kind,
        }
    }

    async fn call(&self) -> Result<String, io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_count {
            println!("  Call {call}: FAILED");
            Err(io::Error::new(self.kind, format!("simulated error on call {call}")))
        } else {
            println!("  Call {call}: SUCCESS");
            Ok("API response data".to_string())
        }
    }

    fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("=== Exponential backoff ===");
    let policy = RetryPolicy::builder()
        .max_attempts(5)
        .base_delay(Duration::from_millis(50))
        .build()?;
    let stats = Statistics::new();
    let cancel = CancellationToken::new();
    let executor = RetryExecutor::default();

    let api = UnreliableApi::new(2, io::ErrorKind::ConnectionReset);
    let start = Instant::now();
    let result = executor
        .execute(&policy, &stats, &cancel, |_: CancellationToken| {
            let api = api.clone();
            async move { api.call().await }
        })
        .await?;
    println!(
        "Result: {result} after {} calls in {:?}\n",
        api.total_calls(),
        start.elapsed()
    );

    println!("=== Custom classification ===");
    let classifier = PredicateClassifier::new(|err: &io::Error| {
        err.kind() != io::ErrorKind::PermissionDenied
    });
    let api = UnreliableApi::new(3, io::ErrorKind::PermissionDenied);
    let outcome = executor
        .execute_with(&policy, &stats, &cancel, &classifier, |_: CancellationToken| {
            let api = api.clone();
            async move { api.call().await }
        })
        .await;
    match outcome {
        Err(err @ RetryError::Terminal { .. }) => {
            println!("Stopped early after {} call(s): {err}\n", err.attempts())
        }
        other => println!("Unexpected outcome: {other:?}\n"),
    }

    println!("=== Jitter impact ===");
    let policy = RetryPolicy::builder()
        .base_delay(Duration::from_millis(100))
        .max_delay(Duration::from_secs(2))
        .build()?;
    println!("attempt  bound     equal     full");
    for attempt in 1..=6 {
        println!(
            "{attempt:>7}  {:>8?}  {:>8?}  {:>8?}",
            StandardBackoff::bound(attempt, &policy),
            StandardBackoff.delay_for(attempt, &policy, &EqualJitter),
            StandardBackoff.delay_for(attempt, &policy, &FullJitter),
        );
    }
    println!();

    println!("=== Telemetry over a channel ===");
    let (sink, mut events) = ChannelSink::new();
    let executor = RetryExecutor::builder().sink(sink).build();
    let quick = RetryPolicy::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(10))
        .build()?;
    let api = UnreliableApi::new(u32::MAX, io::ErrorKind::TimedOut);
    let _ = executor
        .execute(&quick, &stats, &cancel, |_: CancellationToken| {
            let api = api.clone();
            async move { api.call().await }
        })
        .await;
    drop(executor);
    while let Some(event) = events.recv().await {
        let label = match event.kind {
            EventKind::Retry => "retry",
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Cancelled => "cancelled",
        };
        println!("  {label:<9} {}", event.message);
    }

    let snapshot = stats.snapshot();
    println!(
        "\nTotals: {} sequences, {} succeeded, {} failed, {} retries",
        snapshot.total_invocations,
        snapshot.eventual_successes,
        snapshot.eventual_failures,
        snapshot.retries_performed
    );
    Ok(())
}
