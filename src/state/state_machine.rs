use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of a round.
///
/// Transitions are monotonic: Waiting → Running → Finished. A Finished
/// round never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players are joining and readying up; no scans accepted.
    Waiting,
    /// The round clock is running and scans are scored.
    Running,
    /// Terminal state; the round only serves result retrieval.
    Finished,
}

/// Indicates why a round reached [`SessionStatus::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The engine was told to end the round.
    Stopped,
    /// The round duration elapsed.
    Expired,
    /// Every player left before the round ended.
    Abandoned,
}

/// Events that can be applied to a round's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// All joined players are ready; the round begins.
    Start,
    /// The round ends for the carried reason.
    Finish(FinishReason),
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the round was in when the invalid event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: RoundEvent,
}

/// Compute the next status for an event, rejecting anything that would move
/// the lifecycle backwards or out of a terminal state.
pub fn compute_transition(
    from: SessionStatus,
    event: RoundEvent,
) -> Result<SessionStatus, InvalidTransition> {
    let next = match (from, event) {
        (SessionStatus::Waiting, RoundEvent::Start) => SessionStatus::Running,
        (SessionStatus::Waiting, RoundEvent::Finish(_)) => SessionStatus::Finished,
        (SessionStatus::Running, RoundEvent::Finish(_)) => SessionStatus::Finished,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
