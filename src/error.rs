//! Error types for the multi provider.

use std::fmt;

use open_feature::{EvaluationError, EvaluationErrorCode};
use thiserror::Error;

/// Errors that can occur when constructing or evaluating a multi provider.
#[derive(Debug, Error)]
pub enum Error {
    /// Two providers were registered under the same name.
    #[error("duplicate provider name: {0}")]
    DuplicateProviderName(String),

    /// One or more member providers failed; carries every individual failure.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// The comparison fallback provider produced no resolution to fall back on.
    #[error("fallback provider produced no resolution for flag \"{0}\"")]
    FallbackUnavailable(String),

    /// No provider was eligible to evaluate the flag.
    #[error("no provider produced a result for flag \"{0}\"")]
    NoProviderResult(String),
}

/// Result type alias for the multi provider.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Convert into the error shape the OpenFeature SDK expects at the
    /// provider boundary.
    pub fn into_evaluation_error(self) -> EvaluationError {
        EvaluationError::builder()
            .code(EvaluationErrorCode::General(self.to_string()))
            .build()
    }
}

/// A single member provider's failure, tagged with its registered name.
#[derive(Debug)]
pub struct ProviderError {
    /// Registered name of the provider that failed.
    pub provider_name: String,
    /// The failure as reported by the provider.
    pub error: EvaluationError,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error.message {
            Some(message) => write!(f, "{}: {:?}: {}", self.provider_name, self.error.code, message),
            None => write!(f, "{}: {:?}", self.provider_name, self.error.code),
        }
    }
}

/// Every per-provider failure encountered during one evaluation or one
/// lifecycle fan-out.
///
/// The message highlights the first failure for quick diagnosis; the full
/// list is available via [`AggregateError::errors`] for programmatic
/// inspection.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<ProviderError>,
}

impl AggregateError {
    /// Create an aggregate from the collected per-provider failures.
    pub fn new(errors: Vec<ProviderError>) -> Self {
        Self { errors }
    }

    /// The individual failures, in evaluation order.
    pub fn errors(&self) -> &[ProviderError] {
        &self.errors
    }

    /// Consume the aggregate and return the individual failures.
    pub fn into_errors(self) -> Vec<ProviderError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.first() {
            Some(first) => write!(f, "{} provider error(s), first: {}", self.errors.len(), first),
            None => write!(f, "provider error(s)"),
        }
    }
}

impl std::error::Error for AggregateError {}
