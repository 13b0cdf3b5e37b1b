//! Multi provider for the OpenFeature Rust SDK.
//!
//! Composes an arbitrary number of feature-flag providers behind a single
//! [`MultiProvider`] facade. A pluggable [`EvaluationStrategy`] decides
//! which member providers to consult per flag evaluation, sequentially or
//! concurrently, and how to reduce their results into one answer:
//!
//! - [`FirstMatchStrategy`] walks providers in order and returns the first
//!   real answer, moving on only when a provider reports the flag as not
//!   found.
//! - [`FirstSuccessfulStrategy`] walks providers in order until any of
//!   them succeeds.
//! - [`ComparisonStrategy`] evaluates all providers concurrently, compares
//!   their answers, and falls back to a designated provider when they
//!   disagree.
//!
//! Member providers implement [`MemberProvider`]; the facade itself
//! implements `open_feature::provider::FeatureProvider`, so it can be
//! installed on the OpenFeature singleton like any other provider.

pub mod error;
pub mod events;
pub mod hooks;
pub mod member;
pub mod provider;
pub mod status;
pub mod strategy;

#[cfg(test)]
pub mod test_utils;

pub use error::{AggregateError, Error, ProviderError, Result};
pub use events::{EventEmitter, ProviderEvent};
pub use hooks::{Hook, HookContext, HookHints};
pub use member::{FlagType, MemberProvider, ProviderEntry, RegisteredProvider};
pub use provider::MultiProvider;
pub use status::{MemberStatus, StatusTracker};
pub use strategy::{
    ComparisonStrategy, EvaluationStrategy, FinalResult, FirstMatchStrategy,
    FirstSuccessfulStrategy, ProviderResolutionResult, RunMode, StrategyEvaluationContext,
    StrategyPerProviderContext,
};

// Re-export commonly used types from open-feature
pub use open_feature::{EvaluationContext, EvaluationError, EvaluationErrorCode, Value};
