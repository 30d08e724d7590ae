//! In-memory storage backend.
//!
//! The reference [`ScoreStore`] implementation: used by the test suite
//! and by deployments that run rounds without a database.

use std::collections::HashSet;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::achievements::AchievementId;
use crate::dao::models::{PlayerDeltaEntity, PlayerProfileEntity};
use crate::dao::{ScoreStore, StorageResult};
use crate::state::session::PlayerId;

/// Process-local storage backend keeping every record in maps.
#[derive(Default)]
pub struct InMemoryStore {
    profiles: DashMap<PlayerId, PlayerProfileEntity>,
    unlocks: DashMap<PlayerId, HashSet<AchievementId>>,
    tags: DashMap<String, u32>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag with a point value, as an operator would seed the
    /// registry table.
    pub fn seed_tag(&self, tag_uid: impl Into<String>, points: u32) {
        self.tags.insert(tag_uid.into(), points);
    }

    /// Install a pre-existing profile for a player.
    pub fn seed_profile(&self, profile: PlayerProfileEntity) {
        self.profiles.insert(profile.player_id, profile);
    }

    /// Current totals for a player, if any scan or round reached storage.
    pub fn profile(&self, player_id: PlayerId) -> Option<PlayerProfileEntity> {
        self.profiles.get(&player_id).map(|entry| entry.value().clone())
    }

    /// Achievement ids recorded as unlocked for a player.
    pub fn unlocked(&self, player_id: PlayerId) -> HashSet<AchievementId> {
        self.unlocks
            .get(&player_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Registered point value for a tag.
    pub fn tag_points(&self, tag_uid: &str) -> Option<u32> {
        self.tags.get(tag_uid).map(|entry| *entry.value())
    }
}

impl ScoreStore for InMemoryStore {
    fn load_tag_points(&self, tag_uid: String) -> BoxFuture<'static, StorageResult<Option<u32>>> {
        let points = self.tag_points(&tag_uid);
        futures::future::ready(Ok(points)).boxed()
    }

    fn upsert_tag(&self, tag_uid: String, points: u32) -> BoxFuture<'static, StorageResult<()>> {
        self.tags.entry(tag_uid).or_insert(points);
        futures::future::ready(Ok(())).boxed()
    }

    fn load_player_profile(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>> {
        let profile = self.profile(player_id);
        futures::future::ready(Ok(profile)).boxed()
    }

    fn load_unlocked_achievements(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Vec<AchievementId>>> {
        let unlocked = self.unlocked(player_id).into_iter().collect();
        futures::future::ready(Ok(unlocked)).boxed()
    }

    fn apply_player_delta(
        &self,
        player_id: PlayerId,
        delta: PlayerDeltaEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let mut profile = self
            .profiles
            .entry(player_id)
            .or_insert_with(|| PlayerProfileEntity::empty(player_id));
        profile.total_score += u64::from(delta.score);
        profile.total_tags += delta.tags;
        profile.longest_combo = profile.longest_combo.max(delta.combo);
        if let Some(gap) = delta.scan_gap_secs {
            profile.fastest_scan_secs = Some(match profile.fastest_scan_secs {
                Some(current) => current.min(gap),
                None => gap,
            });
        }
        futures::future::ready(Ok(())).boxed()
    }

    fn record_achievement_unlock(
        &self,
        player_id: PlayerId,
        achievement_id: AchievementId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.unlocks
            .entry(player_id)
            .or_default()
            .insert(achievement_id);
        futures::future::ready(Ok(())).boxed()
    }

    fn record_game_played(&self, player_id: PlayerId) -> BoxFuture<'static, StorageResult<()>> {
        let mut profile = self
            .profiles
            .entry(player_id)
            .or_insert_with(|| PlayerProfileEntity::empty(player_id));
        profile.games_played += 1;
        futures::future::ready(Ok(())).boxed()
    }
}
