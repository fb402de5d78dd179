//! Error types for the retry engine.

/// Terminal outcome of a sequence that did not succeed.
///
/// Every variant carries the number of attempts that were actually made, so a
/// caller can tell a first-attempt terminal fault from an exhausted budget.
/// [`RetryError::Cancelled`] is a cooperative abort and is never counted as an
/// eventual failure.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed with a retryable fault.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: E,
    },

    /// The classifier marked the fault as not worth retrying.
    #[error("non-retryable fault on attempt {attempts}: {source}")]
    Terminal {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: E,
    },

    /// The final attempt returned a value the classifier rejected.
    #[error("result rejected on attempt {attempts}: {reason}")]
    Rejected {
        /// Attempts made.
        attempts: u32,
        /// Why the value was rejected.
        reason: String,
    },

    /// The cancellation token fired before a terminal outcome.
    #[error("cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Attempts started before cancellation was observed.
        attempts: u32,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before the sequence ended.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. }
            | Self::Terminal { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Whether the sequence ended because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The error returned by the final attempt, if the sequence ended on one.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            Self::Exhausted { source, .. } | Self::Terminal { source, .. } => Some(source),
            Self::Rejected { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Consume the error and return the final attempt's error, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::Terminal { source, .. } => Some(source),
            Self::Rejected { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Invalid retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// `max_attempts` must be at least 1.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// Unrecognised backoff kind name.
    #[error("unknown backoff kind: {0}")]
    UnknownBackoff(String),

    /// A delay that cannot be expressed as a whole number of milliseconds.
    #[error("{field} must be a whole number of milliseconds, got {delay:?}")]
    InvalidDelay {
        /// Policy field holding the delay.
        field: &'static str,
        /// The rejected value.
        delay: std::time::Duration,
    },
}

/// Failure reported by a telemetry sink.
///
/// The executor discards these; they never change the outcome of a sequence.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The consumer on the other side of the sink has gone away.
    #[error("telemetry consumer disconnected")]
    Disconnected,

    /// Writing the event failed.
    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink panicked while handling an event.
    #[error("telemetry sink panicked: {0}")]
    Panicked(String),

    /// Any other sink failure.
    #[error("{0}")]
    Other(String),
}

impl TelemetryError {
    /// Build a [`TelemetryError::Panicked`] from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_exhausted_exposes_last_error() {
        let err: RetryError<std::io::Error> = RetryError::Exhausted {
            attempts: 3,
            source: std::io::Error::other("boom"),
        };

        assert_eq!(err.attempts(), 3);
        assert!(!err.is_cancelled());
        assert_eq!(err.last_error().unwrap().to_string(), "boom");
        assert_eq!(err.to_string(), "gave up after 3 attempt(s): boom");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_cancelled_has_no_last_error() {
        let err: RetryError<std::io::Error> = RetryError::Cancelled { attempts: 2 };

        assert!(err.is_cancelled());
        assert!(err.last_error().is_none());
        assert!(err.into_last_error().is_none());
    }

    #[test]
    fn test_rejected_display_includes_reason() {
        let err: RetryError<std::io::Error> = RetryError::Rejected {
            attempts: 1,
            reason: "status 404".to_string(),
        };

        assert_eq!(err.to_string(), "result rejected on attempt 1: status 404");
    }

    #[test]
    fn test_panic_payload_message_is_kept() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("sink exploded");
        let err = TelemetryError::from_panic(payload.as_ref());
        assert_eq!(err.to_string(), "telemetry sink panicked: sink exploded");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert!(matches!(
            TelemetryError::from_panic(payload.as_ref()),
            TelemetryError::Panicked(msg) if msg == "owned"
        ));

        let payload: Box<dyn std::any::Any + Send> = Box::new(17u8);
        assert!(matches!(
            TelemetryError::from_panic(payload.as_ref()),
            TelemetryError::Panicked(_)
        ));
    }
}
