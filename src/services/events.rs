//! Broadcast helpers turning engine state changes into hub events.
//!
//! Every helper is synchronous and called while the affected round's lock
//! is held, which is what gives subscribers FIFO ordering per round.

use serde::Serialize;
use tracing::warn;

use crate::achievements::Achievement;
use crate::events::{
    AchievementUnlockedEvent, EventHub, PlayerJoinedEvent, PlayerLeftEvent, RoundFinishedEvent,
    RoundStartedEvent, SessionEvent, TagScannedEvent,
};
use crate::services::engine::FinalResult;
use crate::state::session::{PlayerId, Session, SessionId};

/// Name of the event emitted when a player joins a waiting round.
pub const EVENT_PLAYER_JOINED: &str = "player.joined";
/// Name of the event emitted when a player leaves a round.
pub const EVENT_PLAYER_LEFT: &str = "player.left";
/// Name of the event emitted exactly once when a round starts.
pub const EVENT_ROUND_STARTED: &str = "round.started";
/// Name of the event emitted for every accepted scan.
pub const EVENT_TAG_SCANNED: &str = "tag.scanned";
/// Name of the event emitted for every newly unlocked achievement.
pub const EVENT_ACHIEVEMENT_UNLOCKED: &str = "achievement.unlocked";
/// Name of the event emitted when a round reaches Finished.
pub const EVENT_ROUND_FINISHED: &str = "round.finished";

/// Broadcast that a player joined the round.
pub fn broadcast_player_joined(hub: &EventHub, session: &Session, player_id: PlayerId) {
    let payload = PlayerJoinedEvent {
        player_id,
        player_count: session.players.len(),
    };
    send(hub, session.id, EVENT_PLAYER_JOINED, &payload);
}

/// Broadcast that a player left the round.
pub fn broadcast_player_left(hub: &EventHub, session: &Session, player_id: PlayerId) {
    let payload = PlayerLeftEvent {
        player_id,
        player_count: session.players.len(),
    };
    send(hub, session.id, EVENT_PLAYER_LEFT, &payload);
}

/// Broadcast that the round transitioned to Running.
pub fn broadcast_round_started(hub: &EventHub, session: &Session) {
    let payload = RoundStartedEvent {
        mode: session.mode.clone(),
        started_at: session.started_at.unwrap_or(session.created_at),
        duration_secs: session.duration.whole_seconds() as u64,
        players: session.players.keys().copied().collect(),
    };
    send(hub, session.id, EVENT_ROUND_STARTED, &payload);
}

/// Broadcast one accepted scan with its scoring outcome.
pub fn broadcast_tag_scanned(hub: &EventHub, session_id: SessionId, payload: &TagScannedEvent) {
    send(hub, session_id, EVENT_TAG_SCANNED, payload);
}

/// Broadcast a newly unlocked achievement for a player.
pub fn broadcast_achievement_unlocked(
    hub: &EventHub,
    session_id: SessionId,
    player_id: PlayerId,
    achievement: &Achievement,
) {
    let payload = AchievementUnlockedEvent {
        player_id,
        achievement_id: achievement.id.clone(),
        name: achievement.name.clone(),
        reward_points: achievement.reward_points,
    };
    send(hub, session_id, EVENT_ACHIEVEMENT_UNLOCKED, &payload);
}

/// Broadcast the final outcome of a finished round.
pub fn broadcast_round_finished(hub: &EventHub, session: &Session, result: &FinalResult) {
    let payload = RoundFinishedEvent {
        reason: result.reason,
        ended_at: result.ended_at,
        standings: result.standings.clone(),
    };
    send(hub, session.id, EVENT_ROUND_FINISHED, &payload);
}

fn send(hub: &EventHub, session_id: SessionId, event: &str, payload: &impl Serialize) {
    match SessionEvent::json(session_id, event, payload) {
        Ok(event) => hub.broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize event payload"),
    }
}
