//! Per-provider hook execution.
//!
//! A member provider may bring its own hooks; the multi provider runs them
//! around that provider's resolve call, threading context mutation from the
//! `before` stage into the actual resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use open_feature::provider::ResolutionDetails;
use open_feature::{EvaluationContext, EvaluationError, EvaluationResult, Value};

use crate::member::FlagType;

/// Free-form hints passed through to every hook stage.
pub type HookHints = HashMap<String, Value>;

/// Context handed to every hook stage of one provider within one
/// evaluation.
///
/// `evaluation_context` starts as the evaluation's context and accumulates
/// `before`-stage patches; after the before stage it is the effective
/// context the provider is resolved with.
#[derive(Clone)]
pub struct HookContext {
    /// Flag key being evaluated.
    pub flag_key: String,
    /// Expected type of the flag value.
    pub flag_type: FlagType,
    /// Registered name of the provider whose hooks are running.
    pub provider_name: String,
    /// The (possibly patched) evaluation context.
    pub evaluation_context: EvaluationContext,
}

/// A hook around one provider's flag resolution.
///
/// Stages run in registration order. Every stage has a default no-op
/// implementation, so hooks implement only the stages they care about.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Runs before the provider resolve call. May return a context patch
    /// that is merged into the effective evaluation context.
    async fn before(
        &self,
        _context: &HookContext,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<Option<EvaluationContext>> {
        Ok(None)
    }

    /// Runs after a successful resolve call with the resolved details.
    async fn after(
        &self,
        _context: &HookContext,
        _details: &ResolutionDetails<Value>,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<()> {
        Ok(())
    }

    /// Runs when the resolve call or an earlier stage failed.
    async fn error(
        &self,
        _context: &HookContext,
        _error: &EvaluationError,
        _hints: Option<&HookHints>,
    ) -> EvaluationResult<()> {
        Ok(())
    }

    /// Runs last on every path, success or failure.
    async fn finally(&self, _context: &HookContext, _hints: Option<&HookHints>) {}
}

/// Merge a context patch over a base context. The patch wins per custom
/// field; its targeting key, when set, replaces the base one.
pub fn merge_context(base: &EvaluationContext, patch: EvaluationContext) -> EvaluationContext {
    let mut merged = base.clone();
    if patch.targeting_key.is_some() {
        merged.targeting_key = patch.targeting_key;
    }
    for (key, value) in patch.custom_fields {
        merged.custom_fields.insert(key, value);
    }
    merged
}

/// Run every hook's `before` stage, accumulating context patches into
/// `context.evaluation_context`. A failing hook aborts the remaining
/// same-stage hooks; the caller is responsible for the error/finally
/// stages.
pub async fn run_before_hooks(
    hooks: &[Arc<dyn Hook>],
    context: &mut HookContext,
    hints: Option<&HookHints>,
) -> EvaluationResult<()> {
    for hook in hooks {
        if let Some(patch) = hook.before(context, hints).await? {
            context.evaluation_context = merge_context(&context.evaluation_context, patch);
        }
    }
    Ok(())
}

/// Run every hook's `after` stage. A failing hook aborts the remaining
/// same-stage hooks; the caller is responsible for the error/finally
/// stages.
pub async fn run_after_hooks(
    hooks: &[Arc<dyn Hook>],
    context: &HookContext,
    details: &ResolutionDetails<Value>,
    hints: Option<&HookHints>,
) -> EvaluationResult<()> {
    for hook in hooks {
        hook.after(context, details, hints).await?;
    }
    Ok(())
}

/// Run every hook's `error` stage. A failing error hook aborts the
/// remaining error hooks and its failure is reported to the caller, which
/// must still run the finally stage before propagating it.
pub async fn run_error_hooks(
    hooks: &[Arc<dyn Hook>],
    context: &HookContext,
    error: &EvaluationError,
    hints: Option<&HookHints>,
) -> EvaluationResult<()> {
    for hook in hooks {
        hook.error(context, error, hints).await?;
    }
    Ok(())
}

/// Run every hook's `finally` stage. Infallible; runs on every path.
pub async fn run_finally_hooks(
    hooks: &[Arc<dyn Hook>],
    context: &HookContext,
    hints: Option<&HookHints>,
) {
    for hook in hooks {
        hook.finally(context, hints).await;
    }
}
