//! The contract member providers implement, and provider registration
//! types.

use std::sync::Arc;

use async_trait::async_trait;
use open_feature::provider::{ProviderMetadata, ResolutionDetails};
use open_feature::{EvaluationContext, EvaluationResult, StructValue, Value};

use crate::events::EventEmitter;
use crate::hooks::Hook;

/// The type a flag evaluation expects, decided at the API boundary and
/// carried explicitly through the resolution pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagType {
    /// Boolean flag.
    Bool,
    /// Integer flag.
    Int,
    /// Floating-point flag.
    Float,
    /// String flag.
    String,
    /// Structured flag.
    Struct,
}

/// A feature-flag provider that can be composed into a [`MultiProvider`].
///
/// This is the standard resolve-by-type contract plus the optional
/// surfaces the multi provider consumes: the provider's own hooks, its
/// lifecycle event stream, and initialize/close. Providers are shared
/// behind `Arc` and initialized concurrently, so lifecycle methods take
/// `&self`; interior mutability is the provider's concern.
///
/// [`MultiProvider`]: crate::provider::MultiProvider
#[async_trait]
pub trait MemberProvider: Send + Sync + 'static {
    /// Provider metadata; the name seeds registered-name derivation.
    fn metadata(&self) -> &ProviderMetadata;

    /// Hooks this provider brings; run around its own resolve calls only.
    fn hooks(&self) -> &[Arc<dyn Hook>] {
        &[]
    }

    /// The provider's lifecycle event stream, if it has one.
    fn events(&self) -> Option<&EventEmitter> {
        None
    }

    /// Initialize the provider.
    async fn initialize(&self, _context: &EvaluationContext) -> EvaluationResult<()> {
        Ok(())
    }

    /// Release the provider's resources.
    async fn close(&self) -> EvaluationResult<()> {
        Ok(())
    }

    /// Resolve a boolean flag.
    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>>;

    /// Resolve an integer flag.
    async fn resolve_int_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>>;

    /// Resolve a floating-point flag.
    async fn resolve_float_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>>;

    /// Resolve a string flag.
    async fn resolve_string_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>>;

    /// Resolve a structured flag.
    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>>;
}

/// A provider handed to the multi provider at construction, optionally
/// under an explicit name.
pub struct ProviderEntry {
    /// The provider itself.
    pub provider: Arc<dyn MemberProvider>,
    /// Explicit registered name; when absent the name derives from the
    /// provider's metadata.
    pub name: Option<String>,
}

impl ProviderEntry {
    /// Register a provider under its metadata name.
    pub fn new(provider: Arc<dyn MemberProvider>) -> Self {
        Self {
            provider,
            name: None,
        }
    }

    /// Register a provider under an explicit name.
    pub fn named(provider: Arc<dyn MemberProvider>, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: Some(name.into()),
        }
    }
}

/// A provider after registration, with its unique resolved name. Created
/// once at construction and never mutated afterwards.
#[derive(Clone)]
pub struct RegisteredProvider {
    /// The provider itself.
    pub provider: Arc<dyn MemberProvider>,
    /// The unique registered name.
    pub name: String,
}

/// Call the resolve method matching `flag_type` and erase the typed result
/// into a [`Value`]-carrying one so the rest of the pipeline is
/// type-agnostic.
pub async fn call_provider_resolve(
    provider: &dyn MemberProvider,
    flag_type: FlagType,
    flag_key: &str,
    context: &EvaluationContext,
) -> EvaluationResult<ResolutionDetails<Value>> {
    match flag_type {
        FlagType::Bool => provider
            .resolve_bool_value(flag_key, context)
            .await
            .map(|details| erase(details, Value::Bool)),
        FlagType::Int => provider
            .resolve_int_value(flag_key, context)
            .await
            .map(|details| erase(details, Value::Int)),
        FlagType::Float => provider
            .resolve_float_value(flag_key, context)
            .await
            .map(|details| erase(details, Value::Float)),
        FlagType::String => provider
            .resolve_string_value(flag_key, context)
            .await
            .map(|details| erase(details, Value::String)),
        FlagType::Struct => provider
            .resolve_struct_value(flag_key, context)
            .await
            .map(|details| erase(details, Value::Struct)),
    }
}

fn erase<T>(details: ResolutionDetails<T>, wrap: impl FnOnce(T) -> Value) -> ResolutionDetails<Value> {
    ResolutionDetails {
        value: wrap(details.value),
        variant: details.variant,
        reason: details.reason,
        flag_metadata: details.flag_metadata,
    }
}
