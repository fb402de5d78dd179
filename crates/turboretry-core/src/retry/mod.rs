//! Retry policies, backoff scheduling, fault classification and the executor.
//!
//! # Key Types
//!
//! - [`RetryPolicy`] - Immutable attempt budget and delay configuration
//! - [`BackoffScheduler`] - Computes the wait after a failed attempt
//! - [`JitterSource`] - Injectable randomized variance
//! - [`FaultClassifier`] - Decides whether a fault is worth retrying
//! - [`RetryExecutor`] - Runs the attempt loop
//!
//! # Examples
//!
//! ```rust
//! use turboretry_core::retry::{BackoffKind, RetryExecutor, RetryPolicy};
//! use turboretry_core::stats::Statistics;
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(4)
//!     .backoff(BackoffKind::Exponential)
//!     .base_delay(Duration::from_millis(100))
//!     .build()?;
//! let stats = Statistics::new();
//!
//! let body = RetryExecutor::default()
//!     .execute(&policy, &stats, &CancellationToken::new(), |_cancel: CancellationToken| async {
//!         // Your operation here
//!         Ok::<_, std::io::Error>("pong")
//!     })
//!     .await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

mod backoff;
mod classifier;
mod executor;
mod operation;
mod policy;

pub use backoff::{
    BackoffScheduler, EqualJitter, FixedJitter, FullJitter, JitterSource, NoJitter,
    StandardBackoff,
};
pub use classifier::{Classification, Fault, FaultClassifier, PredicateClassifier, RetryAll};
pub use executor::{RetryExecutor, RetryExecutorBuilder};
pub use operation::{Operation, Sleeper, TokioSleeper};
pub use policy::{BackoffKind, RetryPolicy, RetryPolicyBuilder};
