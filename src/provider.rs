//! The MultiProvider facade.
//!
//! Composes any number of member providers behind a single OpenFeature
//! provider. Registration resolves name collisions up front; evaluation
//! drives the configured strategy; lifecycle calls fan out to every
//! member and aggregate their failures.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use open_feature::provider::{FeatureProvider, ProviderMetadata, ProviderStatus, ResolutionDetails};
use open_feature::{
    EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationResult, StructValue, Value,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{AggregateError, Error, ProviderError, Result};
use crate::events::ProviderEvent;
use crate::hooks::{self, Hook, HookContext, HookHints};
use crate::member::{call_provider_resolve, FlagType, ProviderEntry, RegisteredProvider};
use crate::status::{MemberStatus, StatusTracker};
use crate::strategy::{
    EvaluationStrategy, FinalResult, FirstMatchStrategy, ProviderResolutionResult, RunMode,
    StrategyEvaluationContext, StrategyPerProviderContext,
};

/// Metadata name reported for the composed provider.
const PROVIDER_NAME: &str = "multiprovider";

/// An OpenFeature provider composed of multiple member providers.
///
/// The set of members is fixed at construction; per-flag evaluation is
/// delegated to the configured [`EvaluationStrategy`]
/// ([`FirstMatchStrategy`] by default).
pub struct MultiProvider {
    metadata: ProviderMetadata,
    providers: Vec<RegisteredProvider>,
    strategy: Arc<dyn EvaluationStrategy>,
    status_tracker: Arc<StatusTracker>,
    listener_tasks: Vec<JoinHandle<()>>,
}

impl MultiProvider {
    /// Create a multi provider using the default first-match strategy.
    pub fn new(entries: Vec<ProviderEntry>) -> Result<Self> {
        Self::with_strategy(entries, Arc::new(FirstMatchStrategy))
    }

    /// Create a multi provider with an explicit evaluation strategy.
    ///
    /// Fails fast with [`Error::DuplicateProviderName`] when two providers
    /// end up with the same registered name.
    pub fn with_strategy(
        entries: Vec<ProviderEntry>,
        strategy: Arc<dyn EvaluationStrategy>,
    ) -> Result<Self> {
        let providers = register_providers(entries)?;
        let status_tracker = Arc::new(StatusTracker::new(
            providers.iter().map(|registered| registered.name.clone()),
        ));

        Ok(Self {
            metadata: ProviderMetadata::new(PROVIDER_NAME),
            providers,
            strategy,
            status_tracker,
            listener_tasks: Vec::new(),
        })
    }

    /// Initialize every member provider concurrently.
    ///
    /// Every member runs to completion regardless of the others; any
    /// failures are aggregated into the returned error, so one failing
    /// provider does not mask another's. Also wires each member's event
    /// stream into the aggregate status tracker.
    pub async fn init(&mut self, context: &EvaluationContext) -> Result<()> {
        self.start_event_listeners();

        let tasks: Vec<_> = self
            .providers
            .iter()
            .map(|registered| async move {
                (
                    registered.name.clone(),
                    registered.provider.initialize(context).await,
                )
            })
            .collect();

        let mut errors = Vec::new();
        for (name, outcome) in join_all(tasks).await {
            match outcome {
                Ok(()) => self.status_tracker.record_status(&name, MemberStatus::Ready),
                Err(error) => {
                    tracing::error!("provider {} failed to initialize: {:?}", name, error);
                    self.status_tracker.record_status(&name, MemberStatus::Error);
                    errors.push(ProviderError {
                        provider_name: name,
                        error,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(AggregateError::new(errors)))
        }
    }

    /// Close every member provider concurrently, aggregating failures the
    /// same way as [`MultiProvider::init`], then stop the event listeners.
    pub async fn shutdown(&mut self) -> Result<()> {
        let tasks: Vec<_> = self
            .providers
            .iter()
            .map(|registered| async move {
                (registered.name.clone(), registered.provider.close().await)
            })
            .collect();

        let mut errors = Vec::new();
        for (name, outcome) in join_all(tasks).await {
            if let Err(error) = outcome {
                tracing::error!("provider {} failed to close: {:?}", name, error);
                errors.push(ProviderError {
                    provider_name: name,
                    error,
                });
            }
        }

        for task in self.listener_tasks.drain(..) {
            task.abort();
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(AggregateError::new(errors)))
        }
    }

    /// The registered provider names, in registration order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers
            .iter()
            .map(|registered| registered.name.as_str())
            .collect()
    }

    /// The registered names paired with each member's own metadata.
    pub fn registered_metadata(&self) -> Vec<(&str, &ProviderMetadata)> {
        self.providers
            .iter()
            .map(|registered| (registered.name.as_str(), registered.provider.metadata()))
            .collect()
    }

    /// Last known status of the named member provider.
    pub fn provider_status(&self, provider_name: &str) -> MemberStatus {
        self.status_tracker.provider_status(provider_name)
    }

    /// The current aggregate status across all members.
    pub fn aggregate_status(&self) -> MemberStatus {
        self.status_tracker.aggregate_status()
    }

    /// Subscribe to aggregate status-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.status_tracker.subscribe()
    }

    /// Evaluate a flag through the configured strategy.
    ///
    /// This is the generic resolution proxy every typed entry point
    /// funnels into. Results accumulate in registration order; the
    /// strategy's reduction decides the final resolution or the aggregate
    /// error.
    pub async fn evaluate(
        &self,
        flag_key: &str,
        flag_type: FlagType,
        evaluation_context: &EvaluationContext,
        hints: Option<&HookHints>,
    ) -> Result<FinalResult> {
        let context = StrategyEvaluationContext {
            flag_key,
            flag_type,
        };

        let resolutions = match self.strategy.run_mode() {
            RunMode::Sequential => {
                self.evaluate_sequential(flag_key, flag_type, evaluation_context, hints)
                    .await
            }
            RunMode::Parallel => {
                self.evaluate_parallel(flag_key, flag_type, evaluation_context, hints)
                    .await
            }
        };

        self.strategy
            .determine_final_result(&context, evaluation_context, resolutions)
    }

    async fn evaluate_sequential(
        &self,
        flag_key: &str,
        flag_type: FlagType,
        evaluation_context: &EvaluationContext,
        hints: Option<&HookHints>,
    ) -> Vec<ProviderResolutionResult> {
        let mut resolutions = Vec::new();

        for registered in &self.providers {
            let context = self.per_provider_context(registered, flag_key, flag_type);
            if !self
                .strategy
                .should_evaluate_this_provider(&context, evaluation_context)
            {
                continue;
            }

            let result =
                evaluate_with_hooks(registered, flag_type, flag_key, evaluation_context, hints)
                    .await;
            let proceed =
                self.strategy
                    .should_evaluate_next_provider(&context, evaluation_context, &result);
            resolutions.push(result);
            if !proceed {
                break;
            }
        }

        resolutions
    }

    async fn evaluate_parallel(
        &self,
        flag_key: &str,
        flag_type: FlagType,
        evaluation_context: &EvaluationContext,
        hints: Option<&HookHints>,
    ) -> Vec<ProviderResolutionResult> {
        // Ordered join: the resolution list follows registration order no
        // matter which provider completes first.
        let tasks: Vec<_> = self
            .providers
            .iter()
            .filter(|registered| {
                let context = self.per_provider_context(registered, flag_key, flag_type);
                self.strategy
                    .should_evaluate_this_provider(&context, evaluation_context)
            })
            .map(|registered| {
                evaluate_with_hooks(registered, flag_type, flag_key, evaluation_context, hints)
            })
            .collect();

        join_all(tasks).await
    }

    fn per_provider_context<'a>(
        &self,
        registered: &'a RegisteredProvider,
        flag_key: &'a str,
        flag_type: FlagType,
    ) -> StrategyPerProviderContext<'a> {
        StrategyPerProviderContext {
            flag_key,
            flag_type,
            provider: &registered.provider,
            provider_name: &registered.name,
            provider_status: self.status_tracker.provider_status(&registered.name),
        }
    }

    fn start_event_listeners(&mut self) {
        if !self.listener_tasks.is_empty() {
            return;
        }

        for registered in &self.providers {
            let Some(emitter) = registered.provider.events() else {
                continue;
            };
            let mut rx = emitter.subscribe();
            let name = registered.name.clone();
            let tracker = Arc::clone(&self.status_tracker);

            let task = tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => tracker.record_event(&name, &event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                "provider {} event stream lagged, skipped {} events",
                                name,
                                skipped
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            });
            self.listener_tasks.push(task);
        }
    }
}

/// Resolve provider names, enforcing uniqueness.
///
/// Explicit names are taken as-is; a repeated explicit name is a
/// configuration error. Unnamed providers derive their name from metadata,
/// and when the same derived name occurs more than once every occurrence
/// is suffixed `-1`, `-2`, ... in registration order.
fn register_providers(entries: Vec<ProviderEntry>) -> Result<Vec<RegisteredProvider>> {
    let mut derived_counts: HashMap<String, usize> = HashMap::new();
    for entry in &entries {
        if entry.name.is_none() {
            *derived_counts
                .entry(entry.provider.metadata().name.clone())
                .or_insert(0) += 1;
        }
    }

    let mut used: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, usize> = HashMap::new();
    let mut registered = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = match entry.name {
            Some(name) => name,
            None => {
                let base = entry.provider.metadata().name.clone();
                if derived_counts.get(&base).copied().unwrap_or(0) > 1 {
                    let counter = next_suffix.entry(base.clone()).or_insert(0);
                    *counter += 1;
                    format!("{}-{}", base, counter)
                } else {
                    base
                }
            }
        };

        if !used.insert(name.clone()) {
            return Err(Error::DuplicateProviderName(name));
        }
        registered.push(RegisteredProvider {
            provider: entry.provider,
            name,
        });
    }

    Ok(registered)
}

/// Run one provider's hook chain around its resolve call and normalize the
/// outcome into a [`ProviderResolutionResult`].
async fn evaluate_with_hooks(
    registered: &RegisteredProvider,
    flag_type: FlagType,
    flag_key: &str,
    evaluation_context: &EvaluationContext,
    hints: Option<&HookHints>,
) -> ProviderResolutionResult {
    let outcome = run_resolution(registered, flag_type, flag_key, evaluation_context, hints).await;
    ProviderResolutionResult {
        provider: Arc::clone(&registered.provider),
        provider_name: registered.name.clone(),
        outcome,
    }
}

async fn run_resolution(
    registered: &RegisteredProvider,
    flag_type: FlagType,
    flag_key: &str,
    evaluation_context: &EvaluationContext,
    hints: Option<&HookHints>,
) -> EvaluationResult<ResolutionDetails<Value>> {
    let provider_hooks = registered.provider.hooks();
    let mut hook_context = HookContext {
        flag_key: flag_key.to_string(),
        flag_type,
        provider_name: registered.name.clone(),
        evaluation_context: evaluation_context.clone(),
    };

    if let Err(error) = hooks::run_before_hooks(provider_hooks, &mut hook_context, hints).await {
        return Err(finish_with_error(provider_hooks, &hook_context, error, hints).await);
    }

    // The before stage may have patched the context; only this provider
    // sees the patched version.
    match call_provider_resolve(
        registered.provider.as_ref(),
        flag_type,
        flag_key,
        &hook_context.evaluation_context,
    )
    .await
    {
        Ok(details) => {
            if let Err(error) =
                hooks::run_after_hooks(provider_hooks, &hook_context, &details, hints).await
            {
                return Err(finish_with_error(provider_hooks, &hook_context, error, hints).await);
            }
            hooks::run_finally_hooks(provider_hooks, &hook_context, hints).await;
            Ok(details)
        }
        Err(error) => Err(finish_with_error(provider_hooks, &hook_context, error, hints).await),
    }
}

/// Run the error and finally stages for a failed resolution. A failing
/// error hook takes precedence over the original error, but only after the
/// finally stage has run.
async fn finish_with_error(
    provider_hooks: &[Arc<dyn Hook>],
    hook_context: &HookContext,
    error: EvaluationError,
    hints: Option<&HookHints>,
) -> EvaluationError {
    let hook_failure = hooks::run_error_hooks(provider_hooks, hook_context, &error, hints)
        .await
        .err();
    hooks::run_finally_hooks(provider_hooks, hook_context, hints).await;
    hook_failure.unwrap_or(error)
}

#[async_trait]
impl FeatureProvider for MultiProvider {
    async fn initialize(&mut self, context: &EvaluationContext) {
        if let Err(error) = self.init(context).await {
            tracing::error!("failed to initialize multi provider: {}", error);
        }
    }

    fn status(&self) -> ProviderStatus {
        match self.status_tracker.aggregate_status() {
            MemberStatus::NotReady => ProviderStatus::NotReady,
            MemberStatus::Ready => ProviderStatus::Ready,
            MemberStatus::Stale => ProviderStatus::STALE,
            MemberStatus::Error | MemberStatus::Fatal => ProviderStatus::Error,
        }
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>> {
        let result = self
            .evaluate(flag_key, FlagType::Bool, evaluation_context, None)
            .await
            .map_err(Error::into_evaluation_error)?;

        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = result.details;
        match value {
            Value::Bool(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch("boolean")),
        }
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>> {
        let result = self
            .evaluate(flag_key, FlagType::Int, evaluation_context, None)
            .await
            .map_err(Error::into_evaluation_error)?;

        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = result.details;
        match value {
            Value::Int(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch("integer")),
        }
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>> {
        let result = self
            .evaluate(flag_key, FlagType::Float, evaluation_context, None)
            .await
            .map_err(Error::into_evaluation_error)?;

        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = result.details;
        match value {
            Value::Float(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch("float")),
        }
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>> {
        let result = self
            .evaluate(flag_key, FlagType::String, evaluation_context, None)
            .await
            .map_err(Error::into_evaluation_error)?;

        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = result.details;
        match value {
            Value::String(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch("string")),
        }
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        evaluation_context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>> {
        let result = self
            .evaluate(flag_key, FlagType::Struct, evaluation_context, None)
            .await
            .map_err(Error::into_evaluation_error)?;

        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = result.details;
        match value {
            Value::Struct(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch("struct")),
        }
    }
}

fn type_mismatch(expected: &str) -> EvaluationError {
    EvaluationError::builder()
        .code(EvaluationErrorCode::TypeMismatch)
        .message(format!("value is not a {}", expected))
        .build()
}
