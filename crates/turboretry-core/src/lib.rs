#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Retry-with-backoff engine for the TurboRetry workspace.
//!
//! This crate wraps an arbitrary fallible async operation and:
//!
//! - **Classifies faults** via the `FaultClassifier` trait
//!   - Retry everything by default
//!   - Reject successful-but-unusable values (e.g. an HTTP 503 body)
//! - **Schedules backoff** via the `BackoffScheduler` trait
//!   - Constant, linear and exponential growth
//!   - Injectable jitter to prevent thundering herd
//! - **Honors cancellation** at every suspension point via `CancellationToken`
//! - **Reports telemetry** via the `TelemetrySink` trait without letting it
//!   influence control flow
//! - **Aggregates statistics** in an explicit, atomically updated `Statistics`
//!
//! # Examples
//!
//! Using the prelude for convenient imports:
//!
//! ```rust
//! use turboretry_core::prelude::*;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(100))
//!     .build()?;
//! let stats = Statistics::new();
//!
//! let result = RetryExecutor::default()
//!     .execute(&policy, &stats, &CancellationToken::new(), |_cancel: CancellationToken| async {
//!         Ok::<_, std::io::Error>(42)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod retry;
pub mod stats;
pub mod telemetry;
pub mod testing;

pub use error::{PolicyError, RetryError, TelemetryError};
pub use tokio_util::sync::CancellationToken;

/// Outcome of one full sequence: the value, or why there is none.
pub type PipelineOutcome<T, E> = Result<T, RetryError<E>>;

/// Convenient re-exports of commonly used items.
///
/// Import all core abstractions with:
///
/// ```rust
/// use turboretry_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::RetryError;
    pub use crate::retry::{
        BackoffKind, Classification, Fault, FaultClassifier, Operation, RetryExecutor,
        RetryPolicy,
    };
    pub use crate::stats::{Statistics, StatisticsSnapshot};
    pub use crate::telemetry::{TelemetryEvent, TelemetrySink};
    pub use tokio_util::sync::CancellationToken;
}
