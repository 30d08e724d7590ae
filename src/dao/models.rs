use serde::{Deserialize, Serialize};

use crate::state::session::{PlayerId, ScanLocation};

/// Durable cross-round totals for one player.
///
/// The engine snapshots this at join time and only ever hands increments
/// back; the storage collaborator owns the record's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfileEntity {
    /// Identifier of the player the totals belong to.
    pub player_id: PlayerId,
    /// Points accumulated across every round.
    pub total_score: u64,
    /// Rounds the player has finished or is finishing.
    pub games_played: u32,
    /// Tags scanned across every round.
    pub total_tags: u32,
    /// Smallest gap between two consecutive accepted scans, in seconds.
    pub fastest_scan_secs: Option<f64>,
    /// Longest combo streak ever reached.
    pub longest_combo: u32,
}

impl PlayerProfileEntity {
    /// Zeroed totals for a player storage has never seen.
    pub fn empty(player_id: PlayerId) -> Self {
        Self {
            player_id,
            total_score: 0,
            games_played: 0,
            total_tags: 0,
            fastest_scan_secs: None,
            longest_combo: 0,
        }
    }
}

/// Increments produced by one accepted scan, applied best-effort by the
/// storage collaborator after the in-memory commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDeltaEntity {
    /// Points awarded by the scan.
    pub score: u32,
    /// Tags scored (always 1 for a single scan).
    pub tags: u32,
    /// Combo streak reached by the scan.
    pub combo: u32,
    /// Gap since the player's previous scan, in seconds.
    pub scan_gap_secs: Option<f64>,
    /// Device-reported location of the scan, if any.
    pub location: Option<ScanLocation>,
}
