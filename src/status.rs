//! Aggregate status tracking across member providers.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use crate::events::{EventEmitter, ProviderEvent};

/// Last-known readiness of a member provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    /// The provider has not (yet) reported readiness.
    NotReady,
    /// The provider is ready to resolve flags.
    Ready,
    /// The provider's flag data may be out of date.
    Stale,
    /// The provider is in a recoverable error state.
    Error,
    /// The provider is in an unrecoverable error state.
    Fatal,
}

impl MemberStatus {
    fn from_event(event: &ProviderEvent) -> Self {
        match event {
            ProviderEvent::Ready => MemberStatus::Ready,
            ProviderEvent::Stale => MemberStatus::Stale,
            ProviderEvent::Error { .. } => MemberStatus::Error,
            ProviderEvent::Fatal { .. } => MemberStatus::Fatal,
        }
    }

    /// Severity used by the worst-wins aggregation. Higher loses.
    fn rank(self) -> u8 {
        match self {
            MemberStatus::Ready => 0,
            MemberStatus::NotReady => 1,
            MemberStatus::Stale => 2,
            MemberStatus::Error => 3,
            MemberStatus::Fatal => 4,
        }
    }
}

struct TrackerState {
    statuses: HashMap<String, MemberStatus>,
    aggregate: MemberStatus,
}

/// Derives one aggregate status from the independent status streams of all
/// member providers.
///
/// The aggregate is worst-wins: any `Fatal` member makes the aggregate
/// `Fatal`, else any `Error` member makes it `Error`, else any `Stale`
/// member makes it `Stale`, else any `NotReady` member makes it `NotReady`;
/// the aggregate is `Ready` only once every member is. An aggregate event
/// is emitted only when the computed aggregate actually changes, so several
/// members independently reaching the same status produce a single event.
pub struct StatusTracker {
    inner: Mutex<TrackerState>,
    emitter: EventEmitter,
}

impl StatusTracker {
    /// Create a tracker seeded with every registered provider name at
    /// [`MemberStatus::NotReady`].
    pub fn new(provider_names: impl IntoIterator<Item = String>) -> Self {
        let statuses: HashMap<String, MemberStatus> = provider_names
            .into_iter()
            .map(|name| (name, MemberStatus::NotReady))
            .collect();

        Self {
            inner: Mutex::new(TrackerState {
                statuses,
                aggregate: MemberStatus::NotReady,
            }),
            emitter: EventEmitter::new(),
        }
    }

    /// Record a lifecycle event from the named provider.
    pub fn record_event(&self, provider_name: &str, event: &ProviderEvent) {
        self.apply(provider_name, MemberStatus::from_event(event), Some(event));
    }

    /// Record a status for the named provider directly (used for lifecycle
    /// outcomes of providers that expose no event stream).
    pub fn record_status(&self, provider_name: &str, status: MemberStatus) {
        self.apply(provider_name, status, None);
    }

    /// Last known status of the named provider. Unknown names report
    /// [`MemberStatus::NotReady`].
    pub fn provider_status(&self, provider_name: &str) -> MemberStatus {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .statuses
            .get(provider_name)
            .copied()
            .unwrap_or(MemberStatus::NotReady)
    }

    /// The current aggregate status.
    pub fn aggregate_status(&self) -> MemberStatus {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        state.aggregate
    }

    /// Subscribe to aggregate status-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.emitter.subscribe()
    }

    fn apply(&self, provider_name: &str, status: MemberStatus, source: Option<&ProviderEvent>) {
        let emitted = {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            state.statuses.insert(provider_name.to_string(), status);

            let aggregate = reduce(state.statuses.values().copied());
            if aggregate == state.aggregate {
                None
            } else {
                state.aggregate = aggregate;
                aggregate_event(aggregate, source)
            }
        };

        if let Some(event) = emitted {
            self.emitter.emit(event);
        }
    }
}

/// Pure worst-wins reduction over the member statuses.
fn reduce(statuses: impl Iterator<Item = MemberStatus>) -> MemberStatus {
    statuses.fold(MemberStatus::Ready, |aggregate, status| {
        if status.rank() > aggregate.rank() {
            status
        } else {
            aggregate
        }
    })
}

/// Map a new aggregate status to the event announcing it. The triggering
/// member event supplies the detail message when its kind matches the
/// aggregate; a transition back to `NotReady` has no event.
fn aggregate_event(aggregate: MemberStatus, source: Option<&ProviderEvent>) -> Option<ProviderEvent> {
    match aggregate {
        MemberStatus::Ready => Some(ProviderEvent::Ready),
        MemberStatus::Stale => Some(ProviderEvent::Stale),
        MemberStatus::Error => match source {
            Some(event @ ProviderEvent::Error { .. }) => Some(event.clone()),
            _ => Some(ProviderEvent::Error { message: None }),
        },
        MemberStatus::Fatal => match source {
            Some(event @ ProviderEvent::Fatal { .. }) => Some(event.clone()),
            _ => Some(ProviderEvent::Fatal { message: None }),
        },
        MemberStatus::NotReady => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    fn tracker(names: &[&str]) -> StatusTracker {
        StatusTracker::new(names.iter().map(|n| n.to_string()))
    }

    #[test]
    fn test_reduce_worst_wins() {
        let statuses = vec![MemberStatus::Ready, MemberStatus::Stale, MemberStatus::Error];
        assert_eq!(reduce(statuses.into_iter()), MemberStatus::Error);

        let statuses = vec![MemberStatus::Ready, MemberStatus::Fatal, MemberStatus::Error];
        assert_eq!(reduce(statuses.into_iter()), MemberStatus::Fatal);

        let statuses = vec![MemberStatus::Ready, MemberStatus::Ready];
        assert_eq!(reduce(statuses.into_iter()), MemberStatus::Ready);
    }

    #[test]
    fn test_ready_requires_every_member() {
        let tracker = tracker(&["a", "b"]);
        let mut rx = tracker.subscribe();

        tracker.record_event("a", &ProviderEvent::Ready);
        assert_eq!(tracker.aggregate_status(), MemberStatus::NotReady);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        tracker.record_event("b", &ProviderEvent::Ready);
        assert_eq!(tracker.aggregate_status(), MemberStatus::Ready);
        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::Ready);
    }

    #[test]
    fn test_error_emitted_once_for_repeated_member_errors() {
        let tracker = tracker(&["a", "b"]);
        let mut rx = tracker.subscribe();

        tracker.record_event("a", &ProviderEvent::Error { message: None });
        assert_eq!(
            rx.try_recv().unwrap(),
            ProviderEvent::Error { message: None }
        );

        // A second provider erroring while the aggregate is already Error
        // must not re-emit.
        tracker.record_event("b", &ProviderEvent::Error { message: None });
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_error_event_carries_source_message() {
        let tracker = tracker(&["a"]);
        let mut rx = tracker.subscribe();

        tracker.record_event(
            "a",
            &ProviderEvent::Error {
                message: Some("connection refused".to_string()),
            },
        );

        assert_eq!(
            rx.try_recv().unwrap(),
            ProviderEvent::Error {
                message: Some("connection refused".to_string()),
            }
        );
    }

    #[test]
    fn test_fatal_outranks_error() {
        let tracker = tracker(&["a", "b"]);
        let mut rx = tracker.subscribe();

        tracker.record_event("a", &ProviderEvent::Error { message: None });
        assert_eq!(
            rx.try_recv().unwrap(),
            ProviderEvent::Error { message: None }
        );

        tracker.record_event("b", &ProviderEvent::Fatal { message: None });
        assert_eq!(tracker.aggregate_status(), MemberStatus::Fatal);
        assert_eq!(
            rx.try_recv().unwrap(),
            ProviderEvent::Fatal { message: None }
        );
    }

    #[test]
    fn test_recovery_re_emits_ready() {
        let tracker = tracker(&["a"]);
        let mut rx = tracker.subscribe();

        tracker.record_event("a", &ProviderEvent::Ready);
        tracker.record_event("a", &ProviderEvent::Stale);
        tracker.record_event("a", &ProviderEvent::Ready);

        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::Ready);
        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::Stale);
        assert_eq!(rx.try_recv().unwrap(), ProviderEvent::Ready);
    }

    #[test]
    fn test_provider_status_defaults_to_not_ready() {
        let tracker = tracker(&["a"]);
        assert_eq!(tracker.provider_status("a"), MemberStatus::NotReady);
        assert_eq!(tracker.provider_status("unknown"), MemberStatus::NotReady);
    }

    #[test]
    fn test_lifecycle_status_recording() {
        let tracker = tracker(&["a", "b"]);

        tracker.record_status("a", MemberStatus::Ready);
        tracker.record_status("b", MemberStatus::Error);

        assert_eq!(tracker.provider_status("a"), MemberStatus::Ready);
        assert_eq!(tracker.provider_status("b"), MemberStatus::Error);
        assert_eq!(tracker.aggregate_status(), MemberStatus::Error);
    }
}
