//! Domain events emitted by the engine and the hub that fans them out.
//!
//! Events for one round are published while that round's lock is held, so
//! subscribers observe them in the exact order the operations were
//! applied. Events from different rounds have no relative order.

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::session::{PlayerId, PlayerStanding, ScanLocation, SessionId};
use crate::state::state_machine::FinishReason;

/// Dispatched payload carried to broadcast subscribers.
#[derive(Clone, Debug)]
pub struct SessionEvent {
    /// Round the event belongs to.
    pub session_id: SessionId,
    /// Event name, one of the `EVENT_*` constants in
    /// [`crate::services::events`].
    pub event: String,
    /// JSON-serialized payload.
    pub data: String,
}

impl SessionEvent {
    /// Convenience wrapper that serializes `payload` into the data field.
    pub fn json<T: Serialize>(
        session_id: SessionId,
        event: impl Into<String>,
        payload: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            session_id,
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Broadcast hub fanning engine events out to subscribers.
///
/// Delivery is at-most-once per publish: subscribers that lag behind the
/// channel capacity lose the oldest events. Retrying towards end clients
/// is the transport's concern.
pub struct EventHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventHub {
    /// Construct a new hub backed by a broadcast channel with the given
    /// capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe as a [`Stream`], silently skipping over lagged gaps.
    pub fn stream(&self) -> impl Stream<Item = SessionEvent> + Send + use<> {
        BroadcastStream::new(self.subscribe()).filter_map(|received| received.ok())
    }
}

/// Payload for `player.joined`.
#[derive(Debug, Serialize)]
pub struct PlayerJoinedEvent {
    /// Player who joined.
    pub player_id: PlayerId,
    /// Roster size after the join.
    pub player_count: usize,
}

/// Payload for `player.left`.
#[derive(Debug, Serialize)]
pub struct PlayerLeftEvent {
    /// Player who left.
    pub player_id: PlayerId,
    /// Roster size after the departure.
    pub player_count: usize,
}

/// Payload for `round.started`.
#[derive(Debug, Serialize)]
pub struct RoundStartedEvent {
    /// Game mode tag of the round.
    pub mode: String,
    /// When the round clock started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Round length in seconds.
    pub duration_secs: u64,
    /// Roster at start time, in join order.
    pub players: Vec<PlayerId>,
}

/// Payload for `tag.scanned`.
#[derive(Debug, Serialize)]
pub struct TagScannedEvent {
    /// Player who scored the scan.
    pub player_id: PlayerId,
    /// Scanned tag uid.
    pub tag_uid: String,
    /// Base value of the tag before the multiplier.
    pub base_points: u32,
    /// Points awarded after the multiplier.
    pub points_awarded: u32,
    /// Combo multiplier applied.
    pub multiplier: u32,
    /// Player's round score after the scan.
    pub session_score: u32,
    /// When the scan was observed.
    #[serde(with = "time::serde::rfc3339")]
    pub scanned_at: OffsetDateTime,
    /// Device-reported scan location, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<ScanLocation>,
}

/// Payload for `achievement.unlocked`.
#[derive(Debug, Serialize)]
pub struct AchievementUnlockedEvent {
    /// Player who unlocked the achievement.
    pub player_id: PlayerId,
    /// Stable id of the achievement.
    pub achievement_id: String,
    /// Display name of the achievement.
    pub name: String,
    /// Bonus points attached to the unlock.
    pub reward_points: u32,
}

/// Payload for `round.finished`.
#[derive(Debug, Serialize)]
pub struct RoundFinishedEvent {
    /// Why the round ended.
    pub reason: FinishReason,
    /// When the round ended.
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    /// Final ranked scoreboard.
    pub standings: Vec<PlayerStanding>,
}
