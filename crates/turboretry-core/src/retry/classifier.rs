//! Fault classification.

use std::fmt;
use std::marker::PhantomData;

/// Verdict for a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Back off and try again, budget permitting.
    Retryable,
    /// Stop now and surface the fault.
    Terminal,
}

/// An unsuccessful attempt outcome.
#[derive(Debug)]
pub enum Fault<'a, T, E> {
    /// The operation returned an error.
    Error(&'a E),
    /// The operation returned a value that [`FaultClassifier::reject`] refused.
    Rejected {
        /// The refused value.
        value: &'a T,
        /// Reason given by the classifier.
        reason: &'a str,
    },
}

impl<T, E: fmt::Display> Fault<'_, T, E> {
    /// Human-readable description used for telemetry.
    pub fn message(&self) -> String {
        match self {
            Self::Error(err) => err.to_string(),
            Self::Rejected { reason, .. } => (*reason).to_string(),
        }
    }
}

/// Decides whether an attempt outcome is worth retrying.
///
/// Implementations must be pure: no I/O, no side effects, and the same
/// answer for the same input.
///
/// # Examples
///
/// ```rust
/// use turboretry_core::retry::{Classification, Fault, FaultClassifier};
///
/// /// Retries everything except permission errors.
/// struct SkipPermissionDenied;
///
/// impl<T> FaultClassifier<T, std::io::Error> for SkipPermissionDenied {
///     fn classify(&self, fault: &Fault<'_, T, std::io::Error>) -> Classification {
///         match fault {
///             Fault::Error(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
///                 Classification::Terminal
///             }
///             _ => Classification::Retryable,
///         }
///     }
/// }
/// ```
pub trait FaultClassifier<T, E>: Send + Sync {
    /// Classify a fault.
    fn classify(&self, fault: &Fault<'_, T, E>) -> Classification;

    /// Inspect a successful value.
    ///
    /// Returning `Some(reason)` turns the value into a [`Fault::Rejected`],
    /// which is then classified like any other fault. The default accepts
    /// every value.
    fn reject(&self, value: &T) -> Option<String> {
        let _ = value;
        None
    }
}

/// Treats every error as retryable and accepts every value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryAll;

impl<T, E> FaultClassifier<T, E> for RetryAll {
    fn classify(&self, _fault: &Fault<'_, T, E>) -> Classification {
        Classification::Retryable
    }
}

/// Classifies errors with a predicate; rejected values are retryable.
///
/// # Examples
///
/// ```rust
/// use turboretry_core::retry::PredicateClassifier;
///
/// let classifier = PredicateClassifier::new(|err: &std::io::Error| {
///     err.kind() != std::io::ErrorKind::NotFound
/// });
/// # let _ = classifier;
/// ```
pub struct PredicateClassifier<F, E> {
    predicate: F,
    _error: PhantomData<fn(&E)>,
}

impl<F, E> PredicateClassifier<F, E>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    /// `predicate` returns `true` when the error should be retried.
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            _error: PhantomData,
        }
    }
}

impl<F, E> fmt::Debug for PredicateClassifier<F, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateClassifier").finish_non_exhaustive()
    }
}

impl<T, E, F> FaultClassifier<T, E> for PredicateClassifier<F, E>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn classify(&self, fault: &Fault<'_, T, E>) -> Classification {
        match fault {
            Fault::Error(err) if !(self.predicate)(err) => Classification::Terminal,
            _ => Classification::Retryable,
        }
    }
}
