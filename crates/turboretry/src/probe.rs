//! HTTP probe operation
//!
//! Issues a GET against a target URL on every attempt. Transport failures are
//! errors; the response status is judged by [`StatusClassifier`] so a 503 is
//! retried like a dropped connection while a 404 stops the sequence.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use turboretry_core::retry::{Classification, Fault, FaultClassifier, Operation};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Errors produced by a single probe attempt
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The request did not complete in time
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established or was dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// The request could not be built (bad URL, invalid header)
    #[error("invalid request: {0}")]
    Request(String),

    /// The response body could not be read
    #[error("body error: {0}")]
    Body(String),

    /// The attempt was abandoned because the sequence was cancelled
    #[error("probe cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Connection(err.to_string())
        }
    }
}

/// Result of a completed probe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body size in bytes
    pub body_len: usize,
    /// Time elapsed for the request
    pub elapsed: Duration,
}

/// [`Operation`] that GETs a URL.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    /// Create a probe for `url` with a per-request `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| HarnessError::Client(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Create a probe from harness configuration.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        Self::new(config.target_url.clone(), config.request_timeout)
    }

    /// The probed URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> std::result::Result<ProbeResponse, ProbeError> {
        let start = Instant::now();
        tracing::debug!(url = %self.url, "Sending probe request");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(ProbeResponse {
            status,
            body_len: body.len(),
            elapsed: start.elapsed(),
        })
    }
}

#[async_trait]
impl Operation for HttpProbe {
    type Output = ProbeResponse;
    type Error = ProbeError;

    async fn invoke(
        &mut self,
        cancel: &CancellationToken,
    ) -> std::result::Result<ProbeResponse, ProbeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProbeError::Cancelled),
            result = self.fetch() => result,
        }
    }
}

/// Classifies probe outcomes by transport error kind and HTTP status.
///
/// # Retry Logic
///
/// Retryable:
/// - Timeouts and connection errors
/// - Body read errors
/// - 5xx responses and 429 Too Many Requests
///
/// Terminal:
/// - Invalid requests
/// - Any other non-2xx response
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl StatusClassifier {
    /// Whether a response status is worth retrying.
    pub fn is_retryable_status(status: StatusCode) -> bool {
        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
    }
}

impl FaultClassifier<ProbeResponse, ProbeError> for StatusClassifier {
    fn classify(&self, fault: &Fault<'_, ProbeResponse, ProbeError>) -> Classification {
        match fault {
            Fault::Error(ProbeError::Request(_) | ProbeError::Cancelled) => {
                Classification::Terminal
            }
            Fault::Error(_) => Classification::Retryable,
            Fault::Rejected { value, .. } if Self::is_retryable_status(value.status) => {
                Classification::Retryable
            }
            Fault::Rejected { .. } => Classification::Terminal,
        }
    }

    fn reject(&self, value: &ProbeResponse) -> Option<String> {
        (!value.status.is_success()).then(|| format!("unexpected status {}", value.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn response(status: u16) -> ProbeResponse {
        ProbeResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body_len: 0,
            elapsed: Duration::ZERO,
        }
    }

    #[rstest]
    #[case(500, Classification::Retryable)]
    #[case(503, Classification::Retryable)]
    #[case(429, Classification::Retryable)]
    #[case(404, Classification::Terminal)]
    #[case(401, Classification::Terminal)]
    fn test_status_classification(#[case] status: u16, #[case] expected: Classification) {
        let value = response(status);
        let reason = StatusClassifier.reject(&value).unwrap();
        let fault = Fault::Rejected {
            value: &value,
            reason: &reason,
        };

        assert_eq!(StatusClassifier.classify(&fault), expected);
    }

    #[test]
    fn test_success_status_is_accepted() {
        assert!(StatusClassifier.reject(&response(200)).is_none());
        assert!(StatusClassifier.reject(&response(204)).is_none());
    }

    #[test]
    fn test_rejection_reason_names_status() {
        let reason = StatusClassifier.reject(&response(503)).unwrap();
        assert_eq!(reason, "unexpected status 503 Service Unavailable");
    }

    #[test]
    fn test_error_classification() {
        let classify = |err: ProbeError| StatusClassifier.classify(&Fault::Error(&err));

        assert_eq!(classify(ProbeError::Timeout), Classification::Retryable);
        assert_eq!(
            classify(ProbeError::Connection("reset".into())),
            Classification::Retryable
        );
        assert_eq!(
            classify(ProbeError::Request("bad url".into())),
            Classification::Terminal
        );
    }
}
