//! # TurboRetry
//!
//! Harness around the `turboretry-core` retry engine:
//! - Runs retry sequences back to back or concurrently
//! - Probes HTTP endpoints, retrying 5xx and 429 responses
//! - Configuration from environment variables or TOML files
//! - Console progress reporting and aggregated statistics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turboretry::{ConsoleReporter, Harness, HarnessConfig, HttpProbe, StatusClassifier};
//! use turboretry_core::retry::RetryExecutor;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarnessConfig::from_env()?;
//!     let probe = HttpProbe::from_config(&config)?;
//!     let reporter = Arc::new(ConsoleReporter::stdout());
//!
//!     let executor = RetryExecutor::builder().sink(Arc::clone(&reporter)).build();
//!     let harness = Harness::new(executor, &config);
//!
//!     let report = harness
//!         .run_with(|| probe.clone(), &StatusClassifier, &CancellationToken::new())
//!         .await;
//!     reporter.summary(&report.stats)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub use config::HarnessConfig;
pub use error::{HarnessError, Result};
pub use harness::{Harness, RunReport};
pub use probe::{HttpProbe, ProbeError, ProbeResponse, StatusClassifier};
pub use reporter::ConsoleReporter;

pub mod config;
pub mod error;
pub mod harness;
pub mod probe;
pub mod reporter;
