//! Test utilities for the multi provider.
//!
//! Provides a scriptable member provider and a recording hook, used by the
//! unit tests across modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use open_feature::provider::{ProviderMetadata, ResolutionDetails};
use open_feature::{
    EvaluationContext, EvaluationError, EvaluationErrorCode, EvaluationReason, EvaluationResult,
    StructValue, Value,
};

use crate::events::EventEmitter;
use crate::hooks::{Hook, HookContext, HookHints};
use crate::member::MemberProvider;

/// Scripted outcome for one flag key.
#[derive(Clone)]
pub enum Response {
    /// Resolve successfully with this value.
    Value(Value),
    /// Fail with a general error carrying this message.
    Fail(String),
}

/// A member provider with per-flag scripted outcomes.
///
/// Unscripted keys resolve as flag-not-found. Every resolve call is
/// counted and the evaluation context it received is recorded, so tests
/// can assert on invocation counts and context isolation.
pub struct TestProvider {
    metadata: ProviderMetadata,
    hooks: Vec<Arc<dyn Hook>>,
    events: EventEmitter,
    responses: HashMap<String, Response>,
    init_failure: Option<String>,
    close_failure: Option<String>,
    call_count: AtomicUsize,
    seen_contexts: Mutex<Vec<EvaluationContext>>,
}

impl TestProvider {
    /// Create a provider whose metadata carries the given name.
    pub fn new(name: &str) -> Self {
        Self {
            metadata: ProviderMetadata::new(name),
            hooks: Vec::new(),
            events: EventEmitter::new(),
            responses: HashMap::new(),
            init_failure: None,
            close_failure: None,
            call_count: AtomicUsize::new(0),
            seen_contexts: Mutex::new(Vec::new()),
        }
    }

    /// Script a successful resolution for the given flag key.
    pub fn with_flag(mut self, flag_key: &str, value: Value) -> Self {
        self.responses
            .insert(flag_key.to_string(), Response::Value(value));
        self
    }

    /// Script a general failure for the given flag key.
    pub fn with_failing_flag(mut self, flag_key: &str, message: &str) -> Self {
        self.responses
            .insert(flag_key.to_string(), Response::Fail(message.to_string()));
        self
    }

    /// Attach a hook to this provider.
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Make `initialize` fail with the given message.
    pub fn with_init_failure(mut self, message: &str) -> Self {
        self.init_failure = Some(message.to_string());
        self
    }

    /// Make `close` fail with the given message.
    pub fn with_close_failure(mut self, message: &str) -> Self {
        self.close_failure = Some(message.to_string());
        self
    }

    /// Number of resolve calls this provider has served.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// The evaluation contexts received by resolve calls, in order.
    pub fn seen_contexts(&self) -> Vec<EvaluationContext> {
        self.seen_contexts.lock().unwrap().clone()
    }

    /// Emit a lifecycle event on this provider's event stream.
    pub fn emit(&self, event: crate::events::ProviderEvent) {
        self.events.emit(event);
    }

    fn respond(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<Value>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.seen_contexts.lock().unwrap().push(context.clone());

        match self.responses.get(flag_key) {
            Some(Response::Value(value)) => Ok(ResolutionDetails {
                value: value.clone(),
                variant: Some("scripted".to_string()),
                reason: Some(EvaluationReason::TargetingMatch),
                flag_metadata: None,
            }),
            Some(Response::Fail(message)) => Err(general_error(message)),
            None => Err(EvaluationError::builder()
                .code(EvaluationErrorCode::FlagNotFound)
                .message(format!("flag '{}' not found", flag_key))
                .build()),
        }
    }
}

#[async_trait]
impl MemberProvider for TestProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn hooks(&self) -> &[Arc<dyn Hook>] {
        &self.hooks
    }

    fn events(&self) -> Option<&EventEmitter> {
        Some(&self.events)
    }

    async fn initialize(&self, _context: &EvaluationContext) -> EvaluationResult<()> {
        match &self.init_failure {
            Some(message) => Err(general_error(message)),
            None => Ok(()),
        }
    }

    async fn close(&self) -> EvaluationResult<()> {
        match &self.close_failure {
            Some(message) => Err(general_error(message)),
            None => Ok(()),
        }
    }

    async fn resolve_bool_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<bool>> {
        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = self.respond(flag_key, context)?;
        match value {
            Value::Bool(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_int_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<i64>> {
        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = self.respond(flag_key, context)?;
        match value {
            Value::Int(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_float_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<f64>> {
        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = self.respond(flag_key, context)?;
        match value {
            Value::Float(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_string_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<String>> {
        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = self.respond(flag_key, context)?;
        match value {
            Value::String(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch()),
        }
    }

    async fn resolve_struct_value(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> EvaluationResult<ResolutionDetails<StructValue>> {
        let ResolutionDetails {
            value,
            variant,
            reason,
            flag_metadata,
        } = self.respond(flag_key, context)?;
        match value {
            Value::Struct(value) => Ok(ResolutionDetails {
                value,
                variant,
                reason,
                flag_metadata,
            }),
            _ => Err(type_mismatch()),
        }
    }
}

/// A hook recording which stages ran, with optional scripted behavior per
/// stage.
pub struct RecordingHook {
    label: String,
    before_patch: Option<(String, bool)>,
    fail_before: bool,
    fail_after: bool,
    fail_error: bool,
    stages: Mutex<Vec<String>>,
    before_contexts: Mutex<Vec<EvaluationContext>>,
}

impl RecordingHook {
    /// Create a recording hook with no scripted behavior.
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            before_patch: None,
            fail_before: false,
            fail_after: false,
            fail_error: false,
            stages: Mutex::new(Vec::new()),
            before_contexts: Mutex::new(Vec::new()),
        }
    }

    /// Make the before stage return a context patch with one bool field.
    pub fn with_before_patch(mut self, field: &str, value: bool) -> Self {
        self.before_patch = Some((field.to_string(), value));
        self
    }

    /// Make the before stage fail.
    pub fn failing_before(mut self) -> Self {
        self.fail_before = true;
        self
    }

    /// Make the after stage fail.
    pub fn failing_after(mut self) -> Self {
        self.fail_after = true;
        self
    }

    /// Make the error stage fail.
    pub fn failing_error(mut self) -> Self {
        self.fail_error = true;
        self
    }

    /// The stages that ran, in order.
    pub fn stages(&self) -> Vec<String> {
        self.stages.lock().unwrap().clone()
    }

    /// Whether any before-stage invocation saw the given custom field in
    /// its evaluation context.
    pub fn saw_field_in_before(&self, field: &str) -> bool {
        self.before_contexts
            .lock()
            .unwrap()
            .iter()
            .any(|context| context.custom_fields.contains_key(field))
    }

    fn record(&self, stage: &str) {
        self.stages.lock().unwrap().push(stage.to_string());
    }
}

#[async_trait]
impl Hook for RecordingHook {
    async fn before(
        &self,
        context: &HookContext,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<Option<EvaluationContext>> {
        self.record("before");
        self.before_contexts
            .lock()
            .unwrap()
            .push(context.evaluation_context.clone());
        if self.fail_before {
            return Err(general_error(&format!("before hook '{}' failed", self.label)));
        }
        Ok(self
            .before_patch
            .as_ref()
            .map(|(field, value)| {
                EvaluationContext::default().with_custom_field(field.clone(), *value)
            }))
    }

    async fn after(
        &self,
        _context: &HookContext,
        _details: &ResolutionDetails<Value>,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<()> {
        self.record("after");
        if self.fail_after {
            return Err(general_error(&format!("after hook '{}' failed", self.label)));
        }
        Ok(())
    }

    async fn error(
        &self,
        _context: &HookContext,
        _error: &EvaluationError,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<()> {
        self.record("error");
        if self.fail_error {
            return Err(general_error(&format!("error hook '{}' failed", self.label)));
        }
        Ok(())
    }

    async fn finally(&self, _context: &HookContext, _hints: Option<&HookHints>) {
        self.record("finally");
    }
}

fn general_error(message: &str) -> EvaluationError {
    EvaluationError::builder()
        .code(EvaluationErrorCode::General(message.to_string()))
        .message(message)
        .build()
}

fn type_mismatch() -> EvaluationError {
    EvaluationError::builder()
        .code(EvaluationErrorCode::TypeMismatch)
        .message("scripted value has a different type")
        .build()
}
