//! The units of work and waiting the executor drives.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A fallible unit of work protected by the executor.
///
/// The executor calls [`invoke`](Operation::invoke) once per attempt and
/// passes the sequence's cancellation token through, so long-running
/// operations can stop early. Closures of the form
/// `FnMut(CancellationToken) -> impl Future<Output = Result<T, E>>` implement
/// this trait.
///
/// # Examples
///
/// ```rust
/// use turboretry_core::retry::Operation;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let mut op = |_cancel: CancellationToken| async { Ok::<_, std::io::Error>(42) };
/// let value = op.invoke(&CancellationToken::new()).await.unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
#[async_trait]
pub trait Operation: Send {
    /// Value produced by a successful attempt.
    type Output: Send;

    /// Error produced by a failed attempt.
    type Error: Send;

    /// Run one attempt.
    async fn invoke(&mut self, cancel: &CancellationToken) -> Result<Self::Output, Self::Error>;
}

#[async_trait]
impl<F, Fut, T, E> Operation for F
where
    F: FnMut(CancellationToken) -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    type Output = T;
    type Error = E;

    async fn invoke(&mut self, cancel: &CancellationToken) -> Result<T, E> {
        (self)(cancel.clone()).await
    }
}

/// Waits out a backoff delay.
///
/// The executor races this against the cancellation token, so an
/// implementation only has to wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
