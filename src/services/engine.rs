//! The Game Session Engine: orchestrates round lifecycle, scoring,
//! achievement evaluation, and event broadcast.
//!
//! Every mutating operation runs under the session store's per-round
//! exclusive access, so concurrent submissions for one round serialize
//! while distinct rounds never contend. Storage writes and event fan-out
//! never block an operation's return: events go through a non-blocking
//! broadcast channel and storage writes are spawned after the in-memory
//! commit.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::achievements::{Achievement, AchievementId, AchievementRuleSet, PlayerView};
use crate::config::{EngineConfig, GameRules};
use crate::dao::models::{PlayerDeltaEntity, PlayerProfileEntity};
use crate::dao::{ScoreStore, StorageResult};
use crate::error::EngineError;
use crate::events::{EventHub, TagScannedEvent};
use crate::registry::TagRegistryCache;
use crate::scoring;
use crate::services::events;
use crate::state::session::{
    PlayerEntry, PlayerId, PlayerStanding, ScanLocation, Session, SessionId,
};
use crate::state::state_machine::{FinishReason, SessionStatus};
use crate::state::store::SessionStore;

/// Shared handle to the engine, cloned cheaply across host tasks.
pub type SharedEngine = Arc<GameEngine>;

/// Value object returned for every accepted scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagScanResult {
    /// Points awarded for this scan.
    pub points_awarded: u32,
    /// Combo multiplier that was applied.
    pub multiplier: u32,
    /// Player's round score after the scan.
    pub session_score: u32,
    /// Achievement ids newly unlocked by this scan.
    pub unlocked: Vec<AchievementId>,
}

/// Final outcome of a finished round.
#[derive(Debug, Clone, Serialize)]
pub struct FinalResult {
    /// The finished round.
    pub session_id: SessionId,
    /// Why the round ended.
    pub reason: FinishReason,
    /// When the round clock started, if it ever ran.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// When the round ended.
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    /// Ranked scoreboard: descending score, earlier joiner wins ties.
    pub standings: Vec<PlayerStanding>,
}

/// Parameters of one scan submission, resolved before the session lock is
/// taken so the exclusive section stays free of lookups with I/O behind
/// them.
struct ScanAttempt {
    player_id: PlayerId,
    tag_uid: String,
    base_points: u32,
    observed_at: OffsetDateTime,
    location: Option<ScanLocation>,
}

/// The in-memory authority over every active round.
pub struct GameEngine {
    rules: GameRules,
    achievements: AchievementRuleSet,
    /// How far back per-player scan timestamps are retained; the widest
    /// achievement window.
    scan_horizon: Duration,
    store: SessionStore,
    registry: Arc<TagRegistryCache>,
    hub: EventHub,
    storage: RwLock<Option<Arc<dyn ScoreStore>>>,
}

impl GameEngine {
    /// Construct a new engine wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The engine starts without a storage backend and runs
    /// rounds regardless; persistence begins once one is installed.
    pub fn new(config: EngineConfig) -> SharedEngine {
        let achievements = AchievementRuleSet::new(config.achievements);
        let scan_horizon = achievements.max_scan_window();

        Arc::new(Self {
            registry: Arc::new(TagRegistryCache::new(config.rules.default_tag_points)),
            hub: EventHub::new(config.event_capacity),
            store: SessionStore::new(),
            storage: RwLock::new(None),
            rules: config.rules,
            achievements,
            scan_horizon,
        })
    }

    /// Engine with the built-in configuration.
    pub fn with_defaults() -> SharedEngine {
        Self::new(EngineConfig::default())
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn install_storage(&self, store: Arc<dyn ScoreStore>) {
        let mut guard = self.storage.write().await;
        *guard = Some(store);
    }

    /// Remove the current storage backend and enter degraded mode.
    pub async fn clear_storage(&self) {
        self.storage.write().await.take();
    }

    /// Obtain a handle to the current storage backend, if one is installed.
    pub async fn storage(&self) -> Option<Arc<dyn ScoreStore>> {
        self.storage.read().await.as_ref().cloned()
    }

    /// Whether the engine is running without a storage backend.
    pub async fn is_degraded(&self) -> bool {
        self.storage.read().await.is_none()
    }

    /// Hub carrying the engine's ordered event stream.
    pub fn events(&self) -> &EventHub {
        &self.hub
    }

    /// Read-mostly cache of tag base point values.
    pub fn registry(&self) -> &TagRegistryCache {
        self.registry.as_ref()
    }

    /// Create a new waiting round. Always succeeds.
    pub fn create_session(
        &self,
        mode: impl Into<String>,
        max_players: usize,
        duration_secs: u64,
    ) -> SessionId {
        let session = Session::new(
            mode.into(),
            max_players,
            Duration::seconds(duration_secs as i64),
        );
        let session_id = self.store.insert(session);
        info!(%session_id, "round created");
        session_id
    }

    /// Add a player to a waiting round.
    ///
    /// The player's durable profile and unlock set are loaded here, before
    /// the session lock is taken, so later scans evaluate achievements
    /// without any I/O.
    pub async fn join_session(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<(), EngineError> {
        let storage = self.storage().await;
        let (profile, unlocked) = self.load_player_state(&storage, player_id).await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                if session.status != SessionStatus::Waiting {
                    return Err(EngineError::InvalidTransition {
                        status: session.status,
                        operation: "join",
                    });
                }
                if session.players.contains_key(&player_id) {
                    return Err(EngineError::AlreadyJoined { player_id });
                }
                if session.players.len() >= session.max_players {
                    return Err(EngineError::SessionFull {
                        max_players: session.max_players,
                    });
                }

                session
                    .players
                    .insert(player_id, PlayerEntry::new(player_id, now, profile, unlocked));
                debug!(%session_id, %player_id, "player joined");
                events::broadcast_player_joined(&self.hub, session, player_id);
                Ok(())
            })
            .await
            .ok_or(EngineError::NotFound(session_id))?
    }

    /// Mark a player ready. When every joined player is ready and the
    /// roster meets the configured minimum, the round atomically starts;
    /// the returned flag reports whether this call started it.
    pub async fn set_ready(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<bool, EngineError> {
        let storage = self.storage().await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                self.expire_if_due(session, now, &storage);
                if session.status != SessionStatus::Waiting {
                    return Err(EngineError::InvalidTransition {
                        status: session.status,
                        operation: "ready up",
                    });
                }
                let Some(entry) = session.players.get_mut(&player_id) else {
                    return Err(EngineError::NotInSession { player_id });
                };
                entry.ready = true;

                if session.players.len() < self.rules.min_players_to_start
                    || !session.all_ready()
                {
                    return Ok(false);
                }

                session.start(now)?;
                info!(%session_id, players = session.players.len(), "round started");
                events::broadcast_round_started(&self.hub, session);
                self.evaluate_round_start_unlocks(session, now, &storage);
                Ok(true)
            })
            .await
            .ok_or(EngineError::NotFound(session_id))?
    }

    /// Score one tag scan.
    ///
    /// Validation order, first failure wins: round exists and is running
    /// and not past its deadline (an elapsed deadline finishes the round
    /// and rejects with [`EngineError::RoundExpired`]), the player is a
    /// member, the tag was not already scored this round (first scanner
    /// wins, whoever it was), and the player's scan cooldown has elapsed.
    pub async fn scan_tag(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
        tag_uid: &str,
        observed_at: OffsetDateTime,
        location: Option<ScanLocation>,
    ) -> Result<TagScanResult, EngineError> {
        let tag_uid = normalize_tag_uid(tag_uid);
        let cached_points = self.registry.lookup(&tag_uid);
        let base_points = cached_points.unwrap_or_else(|| self.registry.default_points());
        let storage = self.storage().await;

        let attempt = ScanAttempt {
            player_id,
            tag_uid: tag_uid.clone(),
            base_points,
            observed_at,
            location,
        };
        let result = self
            .store
            .with_session(session_id, |session| {
                self.apply_scan(session, &storage, attempt)
            })
            .await
            .ok_or(EngineError::NotFound(session_id))??;

        if cached_points.is_none() {
            // The scan was scored with the fallback value; fetch the real
            // one for next time, registering brand-new tags along the way.
            self.refresh_tag(&storage, tag_uid, base_points);
        }

        Ok(result)
    }

    /// Force a waiting or running round to Finished and return the ranked
    /// outcome. Later commands on the round fail; results stay readable.
    pub async fn end_session(
        &self,
        session_id: SessionId,
        reason: FinishReason,
    ) -> Result<FinalResult, EngineError> {
        let storage = self.storage().await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                self.finish_round(session, now, reason, &storage)
            })
            .await
            .ok_or(EngineError::NotFound(session_id))?
    }

    /// Remove a player from the round. A round left by its last player is
    /// finished as abandoned.
    pub async fn leave_session(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<(), EngineError> {
        let storage = self.storage().await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                self.expire_if_due(session, now, &storage);
                if session.players.shift_remove(&player_id).is_none() {
                    return Err(EngineError::NotInSession { player_id });
                }
                debug!(%session_id, %player_id, "player left");
                events::broadcast_player_left(&self.hub, session, player_id);

                if session.players.is_empty() && session.status != SessionStatus::Finished {
                    self.finish_round(session, now, FinishReason::Abandoned, &storage)?;
                }
                Ok(())
            })
            .await
            .ok_or(EngineError::NotFound(session_id))?
    }

    /// Current ranked scoreboard for a round in any status.
    pub async fn session_scores(
        &self,
        session_id: SessionId,
    ) -> Result<Vec<PlayerStanding>, EngineError> {
        let storage = self.storage().await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                self.expire_if_due(session, now, &storage);
                session.standings()
            })
            .await
            .ok_or(EngineError::NotFound(session_id))
    }

    /// Final outcome of a finished round. A running round past its
    /// deadline is finished here first, so results become readable as
    /// soon as the duration elapses.
    pub async fn final_result(&self, session_id: SessionId) -> Result<FinalResult, EngineError> {
        let storage = self.storage().await;
        let now = OffsetDateTime::now_utc();

        self.store
            .with_session(session_id, |session| {
                self.expire_if_due(session, now, &storage);
                if session.status != SessionStatus::Finished {
                    return Err(EngineError::InvalidTransition {
                        status: session.status,
                        operation: "retrieve results",
                    });
                }
                Ok(FinalResult {
                    session_id: session.id,
                    reason: session.finish_reason.unwrap_or(FinishReason::Stopped),
                    started_at: session.started_at,
                    ended_at: session.ended_at.unwrap_or(now),
                    standings: session.standings(),
                })
            })
            .await
            .ok_or(EngineError::NotFound(session_id))?
    }

    /// Consistent snapshot of a round's current state.
    pub async fn session_snapshot(&self, session_id: SessionId) -> Option<Session> {
        self.store.snapshot(session_id).await
    }

    /// Drop a round from the store once the surrounding service is done
    /// with its results.
    pub fn evict_session(&self, session_id: SessionId) -> bool {
        self.store.remove(session_id)
    }

    /// Number of rounds currently held.
    pub fn active_sessions(&self) -> usize {
        self.store.len()
    }

    // -----------------------------------------------------------------
    // Internals, all running under the round's exclusive access
    // -----------------------------------------------------------------

    fn apply_scan(
        &self,
        session: &mut Session,
        storage: &Option<Arc<dyn ScoreStore>>,
        attempt: ScanAttempt,
    ) -> Result<TagScanResult, EngineError> {
        let ScanAttempt {
            player_id,
            tag_uid,
            base_points,
            observed_at,
            location,
        } = attempt;

        if self.expire_if_due(session, observed_at, storage) {
            return Err(EngineError::RoundExpired {
                session_id: session.id,
            });
        }
        if session.status != SessionStatus::Running {
            return Err(EngineError::InvalidTransition {
                status: session.status,
                operation: "scan",
            });
        }
        let Some(entry) = session.players.get(&player_id) else {
            return Err(EngineError::NotInSession { player_id });
        };
        let previous_streak = entry.combo_streak;
        let gap = entry.last_scan_at.map(|last| observed_at - last);

        if session.scanned_tags.contains(&tag_uid) {
            return Err(EngineError::DuplicateTag { tag_uid });
        }
        if let Some(gap) = gap
            && self.rules.scan_cooldown.is_positive()
            && gap < self.rules.scan_cooldown
        {
            let remaining = (self.rules.scan_cooldown - gap).whole_milliseconds().max(0) as u64;
            return Err(EngineError::CooldownActive {
                player_id,
                remaining_ms: remaining,
            });
        }

        let score = scoring::score_scan(
            base_points,
            previous_streak,
            gap,
            self.rules.combo_window,
            self.rules.max_multiplier,
        );

        session.scanned_tags.insert(tag_uid.clone());
        let Some(entry) = session.players.get_mut(&player_id) else {
            return Err(EngineError::NotInSession { player_id });
        };
        entry.record_scan(observed_at, score.points, score.streak, gap, self.scan_horizon);

        let view = PlayerView {
            games_played: entry.profile.games_played + 1,
            total_tags: entry.profile.total_tags + entry.tags_scanned,
            session_score: entry.score,
            recent_scans: &entry.recent_scans,
            now: observed_at,
        };
        let newly: Vec<Achievement> = self
            .achievements
            .evaluate(&view, &entry.unlocked)
            .into_iter()
            .cloned()
            .collect();
        for achievement in &newly {
            entry.unlocked.insert(achievement.id.clone());
        }
        let session_score = entry.score;

        events::broadcast_tag_scanned(
            &self.hub,
            session.id,
            &TagScannedEvent {
                player_id,
                tag_uid: tag_uid.clone(),
                base_points,
                points_awarded: score.points,
                multiplier: score.streak,
                session_score,
                scanned_at: observed_at,
                location,
            },
        );
        for achievement in &newly {
            events::broadcast_achievement_unlocked(&self.hub, session.id, player_id, achievement);
        }

        if let Some(store) = storage {
            Self::spawn_store_write(
                store.apply_player_delta(
                    player_id,
                    PlayerDeltaEntity {
                        score: score.points,
                        tags: 1,
                        combo: score.streak,
                        scan_gap_secs: gap.map(|gap| gap.as_seconds_f64()),
                        location,
                    },
                ),
                "apply player delta",
            );
            for achievement in &newly {
                Self::spawn_store_write(
                    store.record_achievement_unlock(player_id, achievement.id.clone()),
                    "record achievement unlock",
                );
            }
        }

        debug!(
            session_id = %session.id,
            %player_id,
            tag_uid = %tag_uid,
            points = score.points,
            multiplier = score.streak,
            "tag scanned"
        );

        Ok(TagScanResult {
            points_awarded: score.points,
            multiplier: score.streak,
            session_score,
            unlocked: newly.into_iter().map(|achievement| achievement.id).collect(),
        })
    }

    /// Finish a running round whose deadline has passed. Returns whether
    /// the round expired here.
    fn expire_if_due(
        &self,
        session: &mut Session,
        now: OffsetDateTime,
        storage: &Option<Arc<dyn ScoreStore>>,
    ) -> bool {
        if !session.is_expired(now) {
            return false;
        }
        // is_expired only holds for running rounds, so this cannot fail.
        let _ = self.finish_round(session, now, FinishReason::Expired, storage);
        true
    }

    fn finish_round(
        &self,
        session: &mut Session,
        at: OffsetDateTime,
        reason: FinishReason,
        storage: &Option<Arc<dyn ScoreStore>>,
    ) -> Result<FinalResult, EngineError> {
        session.finish(at, reason)?;

        let result = FinalResult {
            session_id: session.id,
            reason,
            started_at: session.started_at,
            ended_at: at,
            standings: session.standings(),
        };
        events::broadcast_round_finished(&self.hub, session, &result);

        if let Some(store) = storage {
            for player_id in session.players.keys() {
                Self::spawn_store_write(store.record_game_played(*player_id), "record game played");
            }
        } else if !session.players.is_empty() {
            debug!(session_id = %session.id, "no storage installed; skipping played-round records");
        }

        info!(session_id = %session.id, ?reason, players = session.players.len(), "round finished");
        Ok(result)
    }

    /// Evaluate achievements for every player right after the round
    /// starts, counting the round as played so games-played rules fire at
    /// ready-up time.
    fn evaluate_round_start_unlocks(
        &self,
        session: &mut Session,
        now: OffsetDateTime,
        storage: &Option<Arc<dyn ScoreStore>>,
    ) {
        let session_id = session.id;
        let mut unlocked_now: Vec<(PlayerId, Achievement)> = Vec::new();

        for entry in session.players.values_mut() {
            let view = PlayerView {
                games_played: entry.profile.games_played + 1,
                total_tags: entry.profile.total_tags + entry.tags_scanned,
                session_score: entry.score,
                recent_scans: &entry.recent_scans,
                now,
            };
            let newly: Vec<Achievement> = self
                .achievements
                .evaluate(&view, &entry.unlocked)
                .into_iter()
                .cloned()
                .collect();
            for achievement in newly {
                entry.unlocked.insert(achievement.id.clone());
                unlocked_now.push((entry.player_id, achievement));
            }
        }

        for (player_id, achievement) in &unlocked_now {
            events::broadcast_achievement_unlocked(&self.hub, session_id, *player_id, achievement);
            if let Some(store) = storage {
                Self::spawn_store_write(
                    store.record_achievement_unlock(*player_id, achievement.id.clone()),
                    "record achievement unlock",
                );
            }
        }
    }

    async fn load_player_state(
        &self,
        storage: &Option<Arc<dyn ScoreStore>>,
        player_id: PlayerId,
    ) -> (PlayerProfileEntity, HashSet<AchievementId>) {
        let Some(store) = storage else {
            return (PlayerProfileEntity::empty(player_id), HashSet::new());
        };

        let profile = match store.load_player_profile(player_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => PlayerProfileEntity::empty(player_id),
            Err(err) => {
                warn!(error = %err, %player_id, "failed to load player profile");
                PlayerProfileEntity::empty(player_id)
            }
        };
        let unlocked = match store.load_unlocked_achievements(player_id).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                warn!(error = %err, %player_id, "failed to load unlocked achievements");
                HashSet::new()
            }
        };

        (profile, unlocked)
    }

    /// Fetch a tag's registered value in the background, creating the
    /// record for tags storage has never seen. Last writer wins in the
    /// cache.
    fn refresh_tag(
        &self,
        storage: &Option<Arc<dyn ScoreStore>>,
        tag_uid: String,
        fallback: u32,
    ) {
        let Some(store) = storage else {
            return;
        };
        let store = Arc::clone(store);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            match store.load_tag_points(tag_uid.clone()).await {
                Ok(Some(points)) => registry.prime(tag_uid, points),
                Ok(None) => {
                    registry.prime(tag_uid.clone(), fallback);
                    if let Err(err) = store.upsert_tag(tag_uid, fallback).await {
                        warn!(error = %err, "failed to register unknown tag");
                    }
                }
                Err(err) => warn!(error = %err, tag_uid = %tag_uid, "failed to refresh tag points"),
            }
        });
    }

    fn spawn_store_write(
        future: BoxFuture<'static, StorageResult<()>>,
        context: &'static str,
    ) {
        tokio::spawn(async move {
            if let Err(err) = future.await {
                warn!(error = %err, context, "storage write failed");
            }
        });
    }
}

/// Normalize a tag uid the way devices report them: trimmed, lowercase hex.
fn normalize_tag_uid(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
