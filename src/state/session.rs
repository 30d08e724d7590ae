use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::achievements::AchievementId;
use crate::dao::models::PlayerProfileEntity;
use crate::state::state_machine::{
    FinishReason, InvalidTransition, RoundEvent, SessionStatus, compute_transition,
};

/// Unique identifier for a round.
pub type SessionId = Uuid;
/// Unique identifier for a player, assigned by the surrounding service.
pub type PlayerId = Uuid;

/// Optional geolocation attached to a scan by the submitting device.
///
/// The engine never interprets coordinates; they are forwarded in events
/// and storage deltas as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanLocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

/// A player's mutable state within one specific round.
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    /// Identifier of the participating player.
    pub player_id: PlayerId,
    /// When the player joined; breaks score ties in the final ranking.
    pub joined_at: OffsetDateTime,
    /// Whether the player has readied up during the waiting phase.
    pub ready: bool,
    /// Cumulative score within this round. Never decreases.
    pub score: u32,
    /// Current combo streak; the next scan's multiplier.
    pub combo_streak: u32,
    /// Timestamp of the player's last accepted scan.
    pub last_scan_at: Option<OffsetDateTime>,
    /// Timestamps of recent accepted scans, pruned to the widest
    /// achievement window.
    pub recent_scans: Vec<OffsetDateTime>,
    /// Tags this player scored in this round.
    pub tags_scanned: u32,
    /// Highest combo streak reached this round.
    pub best_combo: u32,
    /// Smallest positive gap between two consecutive accepted scans.
    pub fastest_gap: Option<Duration>,
    /// Cross-round totals snapshotted from storage at join time so that
    /// achievement evaluation stays free of I/O.
    pub profile: PlayerProfileEntity,
    /// Achievement ids already unlocked for this player; grows as the
    /// round unlocks more.
    pub unlocked: HashSet<AchievementId>,
}

impl PlayerEntry {
    /// Build a fresh entry for a player joining a waiting round.
    pub fn new(
        player_id: PlayerId,
        joined_at: OffsetDateTime,
        profile: PlayerProfileEntity,
        unlocked: HashSet<AchievementId>,
    ) -> Self {
        Self {
            player_id,
            joined_at,
            ready: false,
            score: 0,
            combo_streak: 0,
            last_scan_at: None,
            recent_scans: Vec::new(),
            tags_scanned: 0,
            best_combo: 0,
            fastest_gap: None,
            profile,
            unlocked,
        }
    }

    /// Fold one accepted scan into the entry.
    ///
    /// `gap` is the time since the previous accepted scan, when there was
    /// one; `horizon` bounds how far back `recent_scans` is retained.
    pub fn record_scan(
        &mut self,
        at: OffsetDateTime,
        points: u32,
        streak: u32,
        gap: Option<Duration>,
        horizon: Duration,
    ) {
        self.score += points;
        self.combo_streak = streak;
        self.best_combo = self.best_combo.max(streak);
        if let Some(gap) = gap
            && gap.is_positive()
        {
            self.fastest_gap = Some(match self.fastest_gap {
                Some(current) => current.min(gap),
                None => gap,
            });
        }
        self.last_scan_at = Some(at);
        self.tags_scanned += 1;
        self.recent_scans.push(at);
        let cutoff = at - horizon;
        self.recent_scans.retain(|scan| *scan >= cutoff);
    }
}

/// Final placement of a player within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerStanding {
    /// 1-based rank, descending by score, earlier joiner first on ties.
    pub rank: u32,
    /// Identifier of the ranked player.
    pub player_id: PlayerId,
    /// Score at the time the standing was computed.
    pub score: u32,
    /// Tags scored by this player this round.
    pub tags_scanned: u32,
    /// Highest combo streak the player reached this round.
    pub best_combo: u32,
}

/// One active or recently finished round.
///
/// Owned by the [`SessionStore`](crate::state::store::SessionStore); all
/// mutation happens under its per-id exclusive access.
#[derive(Debug, Clone)]
pub struct Session {
    /// Primary key of the round, assigned at creation.
    pub id: SessionId,
    /// Game mode tag, opaque to the engine.
    pub mode: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Roster limit enforced on join.
    pub max_players: usize,
    /// Round length, measured from the start timestamp.
    pub duration: Duration,
    /// Creation timestamp for auditing/debugging.
    pub created_at: OffsetDateTime,
    /// Set when the round transitions to Running.
    pub started_at: Option<OffsetDateTime>,
    /// Set when the round transitions to Finished.
    pub ended_at: Option<OffsetDateTime>,
    /// Why the round finished, once it has.
    pub finish_reason: Option<FinishReason>,
    /// Participating players keyed by id; iteration order is join order.
    pub players: IndexMap<PlayerId, PlayerEntry>,
    /// Tag uids already scored this round. Only ever grows.
    pub scanned_tags: HashSet<String>,
}

impl Session {
    /// Build a new waiting round with the provided configuration.
    pub fn new(mode: String, max_players: usize, duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            status: SessionStatus::Waiting,
            max_players: max_players.max(1),
            duration,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            ended_at: None,
            finish_reason: None,
            players: IndexMap::new(),
            scanned_tags: HashSet::new(),
        }
    }

    /// Move the round to Running and stamp the start time.
    pub fn start(&mut self, at: OffsetDateTime) -> Result<(), InvalidTransition> {
        self.status = compute_transition(self.status, RoundEvent::Start)?;
        self.started_at = Some(at);
        Ok(())
    }

    /// Move the round to Finished and stamp the end time and reason.
    pub fn finish(
        &mut self,
        at: OffsetDateTime,
        reason: FinishReason,
    ) -> Result<(), InvalidTransition> {
        self.status = compute_transition(self.status, RoundEvent::Finish(reason))?;
        self.ended_at = Some(at);
        self.finish_reason = Some(reason);
        Ok(())
    }

    /// Whether a running round's duration has elapsed at `at`.
    pub fn is_expired(&self, at: OffsetDateTime) -> bool {
        match (self.status, self.started_at) {
            (SessionStatus::Running, Some(started)) => at - started >= self.duration,
            _ => false,
        }
    }

    /// Whether every joined player has readied up.
    pub fn all_ready(&self) -> bool {
        self.players.values().all(|entry| entry.ready)
    }

    /// Ranked scoreboard: descending score, ties broken by earliest join.
    ///
    /// The player table iterates in join order and the sort is stable, so
    /// the tie-break falls out without comparing timestamps.
    pub fn standings(&self) -> Vec<PlayerStanding> {
        let mut entries: Vec<&PlayerEntry> = self.players.values().collect();
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| PlayerStanding {
                rank: index as u32 + 1,
                player_id: entry.player_id,
                score: entry.score,
                tags_scanned: entry.tags_scanned,
                best_combo: entry.best_combo,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("race".into(), 4, Duration::seconds(300))
    }

    fn entry(session: &mut Session, score: u32) -> PlayerId {
        let player_id = Uuid::new_v4();
        let mut player = PlayerEntry::new(
            player_id,
            OffsetDateTime::now_utc(),
            PlayerProfileEntity::empty(player_id),
            HashSet::new(),
        );
        player.score = score;
        session.players.insert(player_id, player);
        player_id
    }

    #[test]
    fn new_session_waits() {
        let session = session();
        assert_eq!(session.status, SessionStatus::Waiting);
        assert!(session.started_at.is_none());
        assert!(session.scanned_tags.is_empty());
    }

    #[test]
    fn lifecycle_is_monotonic() {
        let mut session = session();
        let now = OffsetDateTime::now_utc();

        session.start(now).unwrap();
        assert_eq!(session.status, SessionStatus::Running);
        assert_eq!(session.started_at, Some(now));

        session.finish(now, FinishReason::Stopped).unwrap();
        assert_eq!(session.status, SessionStatus::Finished);
        assert_eq!(session.finish_reason, Some(FinishReason::Stopped));

        assert!(session.start(now).is_err());
        assert!(session.finish(now, FinishReason::Stopped).is_err());
    }

    #[test]
    fn expiry_uses_the_duration_boundary() {
        let mut session = Session::new("race".into(), 2, Duration::seconds(60));
        let start = OffsetDateTime::now_utc();
        session.start(start).unwrap();

        assert!(!session.is_expired(start + Duration::seconds(59)));
        assert!(session.is_expired(start + Duration::seconds(60)));
        assert!(session.is_expired(start + Duration::seconds(61)));
    }

    #[test]
    fn waiting_session_never_expires() {
        let session = session();
        assert!(!session.is_expired(OffsetDateTime::now_utc() + Duration::hours(2)));
    }

    #[test]
    fn standings_break_ties_by_join_order() {
        let mut session = session();
        let first = entry(&mut session, 20);
        let second = entry(&mut session, 30);
        let third = entry(&mut session, 20);

        let standings = session.standings();
        assert_eq!(standings[0].player_id, second);
        assert_eq!(standings[0].rank, 1);
        assert_eq!(standings[1].player_id, first);
        assert_eq!(standings[2].player_id, third);
        assert_eq!(standings[2].rank, 3);
    }

    #[test]
    fn record_scan_tracks_combo_and_fastest_gap() {
        let player_id = Uuid::new_v4();
        let mut player = PlayerEntry::new(
            player_id,
            OffsetDateTime::now_utc(),
            PlayerProfileEntity::empty(player_id),
            HashSet::new(),
        );
        let t0 = OffsetDateTime::now_utc();

        player.record_scan(t0, 10, 1, None, Duration::seconds(30));
        player.record_scan(
            t0 + Duration::seconds(4),
            20,
            2,
            Some(Duration::seconds(4)),
            Duration::seconds(30),
        );
        player.record_scan(
            t0 + Duration::seconds(6),
            30,
            3,
            Some(Duration::seconds(2)),
            Duration::seconds(30),
        );

        assert_eq!(player.score, 60);
        assert_eq!(player.tags_scanned, 3);
        assert_eq!(player.best_combo, 3);
        assert_eq!(player.fastest_gap, Some(Duration::seconds(2)));
        assert_eq!(player.recent_scans.len(), 3);
    }

    #[test]
    fn record_scan_prunes_outside_the_horizon() {
        let player_id = Uuid::new_v4();
        let mut player = PlayerEntry::new(
            player_id,
            OffsetDateTime::now_utc(),
            PlayerProfileEntity::empty(player_id),
            HashSet::new(),
        );
        let t0 = OffsetDateTime::now_utc();

        player.record_scan(t0, 10, 1, None, Duration::seconds(30));
        player.record_scan(
            t0 + Duration::seconds(45),
            10,
            1,
            Some(Duration::seconds(45)),
            Duration::seconds(30),
        );

        assert_eq!(player.recent_scans.len(), 1);
        assert_eq!(player.recent_scans[0], t0 + Duration::seconds(45));
    }
}
