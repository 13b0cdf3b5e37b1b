//! Demo application for the OpenFeature multi provider.
//!
//! Registers two in-memory providers behind a multi provider and
//! evaluates flags through the OpenFeature SDK.
//!
//! ## Running
//!
//! ```bash
//! cargo run --example demo
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use open_feature::provider::{ProviderMetadata, ResolutionDetails};
use open_feature::{
    EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationReason, EvaluationResult,
    OpenFeature, StructValue, Value,
};

use openfeature_multi_provider::{MemberProvider, MultiProvider, ProviderEntry};

const TARGETING_KEY: &str = "dennis";

/// A member provider serving a fixed set of flag values.
struct StaticProvider {
    metadata: ProviderMetadata,
    flags: HashMap<String, Value>,
}

impl StaticProvider {
    fn new(name: &str, flags: &[(&str, Value)]) -> Self {
        Self {
            metadata: ProviderMetadata::new(name),
            flags: flags
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        }
    }

    fn lookup(&self, flag_key: &str) -> EvaluationResult<ResolutionDetails<Value>> {
        match self.flags.get(flag_key) {
            Some(value) => Ok(ResolutionDetails {
                value: value.clone(),
                variant: Some("static".to_string()),
                reason: Some(EvaluationReason::Static),
                flag_metadata: None,
            }),
            None => Err(EvaluationError::builder()
                .code(EvaluationErrorCode::FlagNotFound)
                .message(format!("flag '{}' not found", flag_key))
                .build()),
        }
    }
}

fn typed<T>(details: ResolutionDetails<Value>, value: T) -> ResolutionDetails<T> {
    ResolutionDetails {
        value,
        variant: details.variant,
        reason: details.reason,
        flag_metadata: details.flag_metadata,
    }
}

fn type_mismatch() -> EvaluationError {
    EvaluationError::builder()
        .code(EvaluationErrorCode::TypeMismatch)
        .build()
}

#[async_trait]
impl MemberProvider for StaticProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>> {
        let details = self.lookup(flag_key)?;
        match details.value.clone() {
            Value::Bool(value) => Ok(typed(details, value)),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>> {
        let details = self.lookup(flag_key)?;
        match details.value.clone() {
            Value::Int(value) => Ok(typed(details, value)),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>> {
        let details = self.lookup(flag_key)?;
        match details.value.clone() {
            Value::Float(value) => Ok(typed(details, value)),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>> {
        let details = self.lookup(flag_key)?;
        match details.value.clone() {
            Value::String(value) => Ok(typed(details, value)),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        _context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>> {
        let details = self.lookup(flag_key)?;
        match details.value.clone() {
            Value::Struct(value) => Ok(typed(details, value)),
            _ => Err(type_mismatch()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("=== OpenFeature Multi Provider Demo ===");
    println!();

    // A local override provider in front of the "remote" one: first match
    // resolves from the override where it knows the flag and falls through
    // otherwise.
    let overrides = Arc::new(StaticProvider::new(
        "local-overrides",
        &[("beta-banner", Value::Bool(true))],
    ));
    let remote = Arc::new(StaticProvider::new(
        "remote-flags",
        &[
            ("beta-banner", Value::Bool(false)),
            ("welcome-message", Value::String("Welcome aboard!".to_string())),
            ("max-retries", Value::Int(3)),
        ],
    ));

    println!("Creating multi provider (first match)...");
    let provider = MultiProvider::new(vec![
        ProviderEntry::new(overrides),
        ProviderEntry::new(remote),
    ])?;
    println!("Registered providers: {:?}", provider.provider_names());
    println!();

    println!("Setting provider on OpenFeature...");
    OpenFeature::singleton_mut().await.set_provider(provider).await;
    println!();

    let client = OpenFeature::singleton().await.create_client();
    let context = EvaluationContext::default()
        .with_targeting_key(TARGETING_KEY)
        .with_custom_field("environment", "production");

    println!("Evaluating flags for targeting key: {}", TARGETING_KEY);
    println!();

    // The override provider wins for beta-banner
    println!("--- Boolean: beta-banner ---");
    match client.get_bool_details("beta-banner", Some(&context), None).await {
        Ok(details) => {
            println!("  Value: {}", details.value);
            println!("  Variant: {:?}", details.variant);
            println!("  Reason: {:?}", details.reason);
        }
        Err(e) => println!("  Error: {:?}", e),
    }
    println!();

    // Only the remote provider knows welcome-message
    println!("--- String: welcome-message ---");
    match client
        .get_string_details("welcome-message", Some(&context), None)
        .await
    {
        Ok(details) => {
            println!("  Value: {}", details.value);
            println!("  Variant: {:?}", details.variant);
            println!("  Reason: {:?}", details.reason);
        }
        Err(e) => println!("  Error: {:?}", e),
    }
    println!();

    println!("--- Int: max-retries ---");
    match client.get_int_details("max-retries", Some(&context), None).await {
        Ok(details) => {
            println!("  Value: {}", details.value);
            println!("  Reason: {:?}", details.reason);
        }
        Err(e) => println!("  Error: {:?}", e),
    }
    println!();

    // Nobody knows this flag; the caller supplies the default
    println!("--- Boolean: unknown-flag (caller default) ---");
    let value = client
        .get_bool_value("unknown-flag", Some(&context), None)
        .await
        .unwrap_or(false);
    println!("  Value: {}", value);
    println!();

    println!("Done!");

    Ok(())
}
