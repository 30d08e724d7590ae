use thiserror::Error;

use crate::state::session::{PlayerId, SessionId};
use crate::state::state_machine::{InvalidTransition, RoundEvent, SessionStatus};

/// Recoverable errors returned by engine operations.
///
/// Every variant maps to a caller mistake or a race the engine resolved
/// against the caller; none is fatal to the process. Internal invariant
/// violations are not represented here and fail loudly instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// No round with this id is in the store.
    #[error("round `{0}` not found")]
    NotFound(SessionId),
    /// The operation is not valid for the round's current status.
    #[error("cannot {operation} while round is {status:?}")]
    InvalidTransition {
        /// Status the round was in.
        status: SessionStatus,
        /// The rejected operation, for the user-facing message.
        operation: &'static str,
    },
    /// The tag was already scored this round; first scanner wins.
    #[error("tag `{tag_uid}` was already scanned this round")]
    DuplicateTag {
        /// The rejected tag uid.
        tag_uid: String,
    },
    /// The roster already holds the maximum number of players.
    #[error("round is full ({max_players} players)")]
    SessionFull {
        /// The roster limit that was hit.
        max_players: usize,
    },
    /// The player is already part of this round.
    #[error("player `{player_id}` already joined this round")]
    AlreadyJoined {
        /// The duplicate joiner.
        player_id: PlayerId,
    },
    /// The player is not part of this round.
    #[error("player `{player_id}` is not part of this round")]
    NotInSession {
        /// The unknown player.
        player_id: PlayerId,
    },
    /// The round's duration elapsed before the scan was observed.
    #[error("round `{session_id}` expired")]
    RoundExpired {
        /// The expired round.
        session_id: SessionId,
    },
    /// The player scanned again before the cooldown elapsed.
    #[error("scan cooldown active for player `{player_id}` ({remaining_ms} ms remaining)")]
    CooldownActive {
        /// The throttled player.
        player_id: PlayerId,
        /// Time left until the next scan is accepted.
        remaining_ms: u64,
    },
}

impl From<InvalidTransition> for EngineError {
    fn from(err: InvalidTransition) -> Self {
        let operation = match err.event {
            RoundEvent::Start => "start",
            RoundEvent::Finish(_) => "finish",
        };
        EngineError::InvalidTransition {
            status: err.from,
            operation,
        }
    }
}
