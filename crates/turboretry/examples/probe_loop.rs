//! Probe an HTTP endpoint in a loop with retries
//!
//! Each sequence GETs the target URL, retrying connection errors, timeouts,
//! 5xx and 429 responses with backoff. Press Ctrl-C to stop; the in-flight
//! sequence is abandoned and a summary is printed.
//!
//! ## Usage
//!
//! ```bash
//! # Configuration from the environment
//! TURBORETRY_TARGET_URL=http://localhost:8080/health \
//! TURBORETRY_MAX_ATTEMPTS=4 \
//! cargo run --example probe_loop
//!
//! # Configuration from a TOML file
//! cargo run --example probe_loop -- harness.toml
//!
//! # Engine logs
//! RUST_LOG=turboretry=debug,turboretry_core=debug cargo run --example probe_loop
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use turboretry::{ConsoleReporter, Harness, HarnessConfig, HttpProbe, StatusClassifier};
use turboretry_core::retry::RetryExecutor;
use turboretry_core::telemetry::{FanoutSink, TracingSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::from_env()?,
    };

    println!("Probing {}", config.target_url);
    println!(
        "Policy: {} attempts, {:?} backoff from {:?}, jitter {}\n",
        config.policy.max_attempts(),
        config.policy.backoff(),
        config.policy.base_delay(),
        if config.policy.jitter() { "on" } else { "off" },
    );

    let probe = HttpProbe::from_config(&config)?;
    let reporter = Arc::new(ConsoleReporter::stdout());
    let sink = FanoutSink::new()
        .with(Arc::clone(&reporter))
        .with(TracingSink);
    let harness = Harness::new(RetryExecutor::builder().sink(sink).build(), &config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let report = harness
        .run_with(|| probe.clone(), &StatusClassifier, &cancel)
        .await;

    println!();
    reporter.summary(&report.stats)?;
    println!(
        "{} sequences in {:.1}s",
        report.sequences,
        report.elapsed.as_secs_f64()
    );
    Ok(())
}
