//! Lifecycle state machine for governed agent invocations.

use mesh_primitives::TrackingId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// States an invocation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Accepted by enforcement, not yet delivered to the target.
    Queued,
    /// Delivered to the target agent; awaiting its reply.
    Processing,
    /// Target replied successfully.
    Completed,
    /// Target failed, timed out, or could not be reached.
    Error,
}

impl InvocationState {
    /// Returns `true` for `completed` and `error`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns the wire representation of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive invocation transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// The request was delivered to the target agent.
    Dispatch,
    /// The target replied successfully.
    Complete,
    /// The dispatch or the target failed.
    Fail,
}

/// Tracks one invocation from `queued` to a terminal state.
///
/// Transitions are total: every non-terminal state accepts `Fail`, so a
/// lifecycle can never get stuck.
#[derive(Debug, Clone, Copy)]
pub struct InvocationLifecycle {
    tracking_id: TrackingId,
    state: InvocationState,
}

impl InvocationLifecycle {
    /// Starts a lifecycle in `queued` with a fresh tracking id.
    #[must_use]
    pub fn begin() -> Self {
        Self {
            tracking_id: TrackingId::random(),
            state: InvocationState::Queued,
        }
    }

    /// Returns the lifecycle correlation id.
    #[must_use]
    pub const fn tracking_id(&self) -> TrackingId {
        self.tracking_id
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> InvocationState {
        self.state
    }

    /// Applies an event, returning the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`InvocationError::InvalidTransition`] when the event is not
    /// allowed from the current state.
    pub fn transition(&mut self, event: InvocationEvent) -> Result<InvocationState, InvocationError> {
        let next = match (self.state, event) {
            (InvocationState::Queued, InvocationEvent::Dispatch) => {
                Some(InvocationState::Processing)
            }
            (InvocationState::Processing, InvocationEvent::Complete) => {
                Some(InvocationState::Completed)
            }
            (InvocationState::Queued | InvocationState::Processing, InvocationEvent::Fail) => {
                Some(InvocationState::Error)
            }
            _ => None,
        };

        let Some(next_state) = next else {
            return Err(InvocationError::InvalidTransition {
                tracking_id: self.tracking_id,
                from: self.state,
                event,
            });
        };

        debug!(
            tracking_id = %self.tracking_id,
            from = %self.state,
            to = %next_state,
            "invocation transition"
        );
        self.state = next_state;
        Ok(self.state)
    }
}

/// Errors emitted by the invocation lifecycle.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Transition was not permitted from the current state.
    #[error("invalid invocation transition from {from:?} via {event:?} for {tracking_id}")]
    InvalidTransition {
        /// Lifecycle whose transition failed.
        tracking_id: TrackingId,
        /// State prior to the attempted transition.
        from: InvocationState,
        /// Offending event.
        event: InvocationEvent,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_completed() {
        let mut lifecycle = InvocationLifecycle::begin();
        assert_eq!(lifecycle.state(), InvocationState::Queued);
        lifecycle.transition(InvocationEvent::Dispatch).unwrap();
        assert_eq!(lifecycle.state(), InvocationState::Processing);
        lifecycle.transition(InvocationEvent::Complete).unwrap();
        assert!(lifecycle.state().is_terminal());
    }

    #[test]
    fn failure_is_reachable_from_every_non_terminal_state() {
        let mut queued = InvocationLifecycle::begin();
        queued.transition(InvocationEvent::Fail).unwrap();
        assert_eq!(queued.state(), InvocationState::Error);

        let mut processing = InvocationLifecycle::begin();
        processing.transition(InvocationEvent::Dispatch).unwrap();
        processing.transition(InvocationEvent::Fail).unwrap();
        assert_eq!(processing.state(), InvocationState::Error);
    }

    #[test]
    fn terminal_states_reject_events() {
        let mut lifecycle = InvocationLifecycle::begin();
        lifecycle.transition(InvocationEvent::Fail).unwrap();
        let err = lifecycle.transition(InvocationEvent::Dispatch).unwrap_err();
        assert!(matches!(err, InvocationError::InvalidTransition { .. }));
    }

    #[test]
    fn completing_before_dispatch_is_rejected() {
        let mut lifecycle = InvocationLifecycle::begin();
        assert!(lifecycle.transition(InvocationEvent::Complete).is_err());
        assert_eq!(lifecycle.state(), InvocationState::Queued);
    }
}
