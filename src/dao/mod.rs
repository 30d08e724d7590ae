//! Storage collaborator boundary.
//!
//! The engine treats persistence as best-effort: writes are spawned after
//! the in-memory commit and failures are logged, never retried. Reads
//! happen outside any session lock.

pub mod memory;
pub mod models;

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::achievements::AchievementId;
use crate::state::session::PlayerId;
use self::models::{PlayerDeltaEntity, PlayerProfileEntity};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or refused the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failure.
        message: String,
        /// The backend error that caused it.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Abstraction over the persistence layer for player profiles,
/// achievement unlocks, and the tag registry.
pub trait ScoreStore: Send + Sync {
    /// Base point value registered for a tag, when the tag is known.
    fn load_tag_points(&self, tag_uid: String) -> BoxFuture<'static, StorageResult<Option<u32>>>;
    /// Ensure a tag record exists, creating it with `points` when absent.
    fn upsert_tag(&self, tag_uid: String, points: u32) -> BoxFuture<'static, StorageResult<()>>;
    /// Cross-round totals for a player, when storage has seen them.
    fn load_player_profile(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Option<PlayerProfileEntity>>>;
    /// Achievement ids already unlocked for a player.
    fn load_unlocked_achievements(
        &self,
        player_id: PlayerId,
    ) -> BoxFuture<'static, StorageResult<Vec<AchievementId>>>;
    /// Fold one scan's increments into the player's totals.
    fn apply_player_delta(
        &self,
        player_id: PlayerId,
        delta: PlayerDeltaEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Persist an achievement unlock.
    fn record_achievement_unlock(
        &self,
        player_id: PlayerId,
        achievement_id: AchievementId,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Count one finished round for a player.
    fn record_game_played(&self, player_id: PlayerId) -> BoxFuture<'static, StorageResult<()>>;
}
