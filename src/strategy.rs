//! Evaluation strategies.
//!
//! A strategy decides which providers to consult, in what run mode, and
//! how to reduce the accumulated per-provider results into one final
//! result. The orchestration loop stays the same for every strategy; new
//! strategies only implement the decision points.

use std::sync::Arc;

use open_feature::provider::ResolutionDetails;
use open_feature::{EvaluationContext, EvaluationError, EvaluationErrorCode, Value};

use crate::error::{AggregateError, Error, ProviderError, Result};
use crate::member::{FlagType, MemberProvider};
use crate::status::MemberStatus;

/// How the orchestration loop drives the selected providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Await each provider before deciding whether to continue; later
    /// providers are never started unless the strategy permits it.
    Sequential,
    /// Start every eligible provider concurrently and await them all.
    Parallel,
}

/// Immutable per-evaluation context passed to strategy decision points.
pub struct StrategyEvaluationContext<'a> {
    /// Flag key being evaluated.
    pub flag_key: &'a str,
    /// Expected type of the flag value.
    pub flag_type: FlagType,
}

/// Per-provider view of one evaluation, including a live status snapshot.
pub struct StrategyPerProviderContext<'a> {
    /// Flag key being evaluated.
    pub flag_key: &'a str,
    /// Expected type of the flag value.
    pub flag_type: FlagType,
    /// The provider under consideration.
    pub provider: &'a Arc<dyn MemberProvider>,
    /// The provider's registered name.
    pub provider_name: &'a str,
    /// The provider's status as tracked at call time.
    pub provider_status: MemberStatus,
}

/// One provider's outcome within one evaluation. Exactly one of success
/// details or error is present, enforced by `Result`.
pub struct ProviderResolutionResult {
    /// The provider that produced this result.
    pub provider: Arc<dyn MemberProvider>,
    /// The provider's registered name.
    pub provider_name: String,
    /// The resolution or the failure, normalized into one shape.
    pub outcome: std::result::Result<ResolutionDetails<Value>, EvaluationError>,
}

/// The reduced outcome of one evaluation, attributed to the provider whose
/// resolution was selected.
#[derive(Debug)]
pub struct FinalResult {
    /// Registered name of the selected provider.
    pub provider_name: String,
    /// The selected resolution.
    pub details: ResolutionDetails<Value>,
}

/// Policy deciding which providers to consult and how to reduce their
/// results.
///
/// `should_evaluate_next_provider` is consulted in sequential run mode
/// only; `determine_final_result` always runs once, over the full
/// accumulated result list in registration order.
pub trait EvaluationStrategy: Send + Sync {
    /// The run mode the orchestration loop uses for this strategy.
    fn run_mode(&self) -> RunMode {
        RunMode::Sequential
    }

    /// Whether to evaluate this provider at all. The default skips
    /// providers that are not ready or have failed fatally.
    fn should_evaluate_this_provider(
        &self,
        context: &StrategyPerProviderContext<'_>,
        _evaluation_context: &EvaluationContext,
    ) -> bool {
        !matches!(
            context.provider_status,
            MemberStatus::NotReady | MemberStatus::Fatal
        )
    }

    /// Whether to continue with the next provider after seeing this
    /// provider's result. Sequential run mode only; the default always
    /// continues.
    fn should_evaluate_next_provider(
        &self,
        _context: &StrategyPerProviderContext<'_>,
        _evaluation_context: &EvaluationContext,
        _result: &ProviderResolutionResult,
    ) -> bool {
        true
    }

    /// Reduce the accumulated results into the final resolution or an
    /// aggregate error.
    fn determine_final_result(
        &self,
        context: &StrategyEvaluationContext<'_>,
        evaluation_context: &EvaluationContext,
        resolutions: Vec<ProviderResolutionResult>,
    ) -> Result<FinalResult>;
}

/// Evaluates providers in order and returns the first real answer.
///
/// Moves past a provider only when it reports the flag as not found; any
/// other failure stops the evaluation and surfaces an aggregate of every
/// error seen along the way.
pub struct FirstMatchStrategy;

impl EvaluationStrategy for FirstMatchStrategy {
    fn should_evaluate_next_provider(
        &self,
        _context: &StrategyPerProviderContext<'_>,
        _evaluation_context: &EvaluationContext,
        result: &ProviderResolutionResult,
    ) -> bool {
        matches!(
            &result.outcome,
            Err(error) if matches!(error.code, EvaluationErrorCode::FlagNotFound)
        )
    }

    fn determine_final_result(
        &self,
        context: &StrategyEvaluationContext<'_>,
        _evaluation_context: &EvaluationContext,
        resolutions: Vec<ProviderResolutionResult>,
    ) -> Result<FinalResult> {
        final_from_last(context.flag_key, resolutions)
    }
}

/// Evaluates providers in order until any of them succeeds.
///
/// Moves past a provider on any failure; only a success stops the
/// iteration. When every provider fails, all failures are reported
/// together.
pub struct FirstSuccessfulStrategy;

impl EvaluationStrategy for FirstSuccessfulStrategy {
    fn should_evaluate_next_provider(
        &self,
        _context: &StrategyPerProviderContext<'_>,
        _evaluation_context: &EvaluationContext,
        result: &ProviderResolutionResult,
    ) -> bool {
        result.outcome.is_err()
    }

    fn determine_final_result(
        &self,
        context: &StrategyEvaluationContext<'_>,
        _evaluation_context: &EvaluationContext,
        resolutions: Vec<ProviderResolutionResult>,
    ) -> Result<FinalResult> {
        final_from_last(context.flag_key, resolutions)
    }
}

/// Callback invoked with the full resolution list when providers disagree.
pub type OnMismatch = Box<dyn Fn(&[ProviderResolutionResult]) + Send + Sync>;

/// Evaluates every eligible provider concurrently and compares their
/// answers.
///
/// When all providers agree the shared value is returned, attributed to
/// the first resolution. On disagreement the configured fallback
/// provider's answer wins and the optional `on_mismatch` callback observes
/// the full resolution list; disagreement alone never fails the
/// evaluation. Any provider error short-circuits to an aggregate error
/// before comparison.
pub struct ComparisonStrategy {
    fallback_provider: Arc<dyn MemberProvider>,
    on_mismatch: Option<OnMismatch>,
}

impl ComparisonStrategy {
    /// Create a comparison strategy designating the provider whose answer
    /// wins on disagreement.
    pub fn new(fallback_provider: Arc<dyn MemberProvider>) -> Self {
        Self {
            fallback_provider,
            on_mismatch: None,
        }
    }

    /// Install a callback observing mismatching evaluations.
    pub fn with_on_mismatch(
        mut self,
        callback: impl Fn(&[ProviderResolutionResult]) + Send + Sync + 'static,
    ) -> Self {
        self.on_mismatch = Some(Box::new(callback));
        self
    }
}

impl EvaluationStrategy for ComparisonStrategy {
    fn run_mode(&self) -> RunMode {
        RunMode::Parallel
    }

    fn determine_final_result(
        &self,
        context: &StrategyEvaluationContext<'_>,
        _evaluation_context: &EvaluationContext,
        resolutions: Vec<ProviderResolutionResult>,
    ) -> Result<FinalResult> {
        if resolutions.iter().any(|r| r.outcome.is_err()) {
            return Err(aggregate_error(resolutions));
        }

        let mismatched = {
            let mut values = resolutions
                .iter()
                .filter_map(|r| r.outcome.as_ref().ok())
                .map(|details| &details.value);
            match values.next() {
                Some(first) => values.any(|value| value != first),
                None => return Err(Error::NoProviderResult(context.flag_key.to_string())),
            }
        };

        if mismatched {
            if let Some(callback) = &self.on_mismatch {
                callback(&resolutions);
            }
        }

        let chosen = if mismatched {
            resolutions
                .into_iter()
                .find(|r| Arc::ptr_eq(&r.provider, &self.fallback_provider))
                .ok_or_else(|| Error::FallbackUnavailable(context.flag_key.to_string()))?
        } else {
            match resolutions.into_iter().next() {
                Some(first) => first,
                None => return Err(Error::NoProviderResult(context.flag_key.to_string())),
            }
        };

        match chosen.outcome {
            Ok(details) => Ok(FinalResult {
                provider_name: chosen.provider_name,
                details,
            }),
            Err(error) => Err(Error::Aggregate(AggregateError::new(vec![ProviderError {
                provider_name: chosen.provider_name,
                error,
            }]))),
        }
    }
}

/// Shared sequential reduction: the last recorded resolution is the
/// answer; when it is itself a failure, every error seen along the way is
/// surfaced together.
fn final_from_last(flag_key: &str, mut resolutions: Vec<ProviderResolutionResult>) -> Result<FinalResult> {
    let Some(last) = resolutions.pop() else {
        return Err(Error::NoProviderResult(flag_key.to_string()));
    };

    match last.outcome {
        Ok(details) => Ok(FinalResult {
            provider_name: last.provider_name,
            details,
        }),
        Err(error) => {
            let mut errors: Vec<ProviderError> = resolutions
                .into_iter()
                .filter_map(|r| match r.outcome {
                    Err(error) => Some(ProviderError {
                        provider_name: r.provider_name,
                        error,
                    }),
                    Ok(_) => None,
                })
                .collect();
            errors.push(ProviderError {
                provider_name: last.provider_name,
                error,
            });
            Err(Error::Aggregate(AggregateError::new(errors)))
        }
    }
}

/// Collect every failed resolution into an aggregate error.
fn aggregate_error(resolutions: Vec<ProviderResolutionResult>) -> Error {
    let errors: Vec<ProviderError> = resolutions
        .into_iter()
        .filter_map(|r| match r.outcome {
            Err(error) => Some(ProviderError {
                provider_name: r.provider_name,
                error,
            }),
            Ok(_) => None,
        })
        .collect();
    Error::Aggregate(AggregateError::new(errors))
}
