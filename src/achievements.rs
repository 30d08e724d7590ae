//! Declarative achievement rules and their evaluation.
//!
//! Each rule is one variant of [`AchievementRule`], matched exhaustively,
//! so evaluation is total and adding a rule kind cannot be forgotten in a
//! branching chain. Unlock persistence belongs to the storage
//! collaborator; evaluation only reports which ids became satisfied.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Stable identifier of an achievement definition (a string slug).
pub type AchievementId = String;

/// Requirement predicate for one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AchievementRule {
    /// Player has played at least `count` rounds, counting the one in
    /// progress.
    GamesPlayed {
        /// Rounds required.
        count: u32,
    },
    /// Player has scanned at least `count` tags across all rounds.
    TotalTags {
        /// Cumulative tags required.
        count: u32,
    },
    /// Player scored at least `count` scans within the trailing window.
    ScansWithin {
        /// Window length in seconds, measured back from the latest scan.
        window_secs: u64,
        /// Scans required inside the window.
        count: u32,
    },
    /// Player reached at least `points` within a single round.
    SessionScore {
        /// Round score required.
        points: u32,
    },
}

/// One unlockable achievement definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    /// Stable slug used as the unlock key.
    pub id: AchievementId,
    /// Display name.
    pub name: String,
    /// Human-readable description of the requirement.
    pub description: String,
    /// The requirement predicate.
    pub rule: AchievementRule,
    /// Bonus points credited by the surrounding service on unlock.
    pub reward_points: u32,
}

/// Read-only view of a player's merged cumulative and in-round state,
/// assembled by the engine before evaluation.
#[derive(Debug, Clone, Copy)]
pub struct PlayerView<'a> {
    /// Rounds played, counting the one in progress.
    pub games_played: u32,
    /// Tags scanned across all rounds, including this one.
    pub total_tags: u32,
    /// Score within the current round.
    pub session_score: u32,
    /// Timestamps of the player's recent scans in this round.
    pub recent_scans: &'a [OffsetDateTime],
    /// Evaluation instant; windows are measured back from here.
    pub now: OffsetDateTime,
}

/// The full set of achievement definitions evaluated by the engine.
#[derive(Debug, Clone)]
pub struct AchievementRuleSet {
    achievements: Vec<Achievement>,
}

impl AchievementRuleSet {
    /// Build a rule set from explicit definitions.
    pub fn new(achievements: Vec<Achievement>) -> Self {
        Self { achievements }
    }

    /// Achievements whose rule is newly satisfied for `view` and whose id
    /// is not in `unlocked`. Never fails; an empty view satisfies nothing
    /// beyond zero-threshold rules.
    pub fn evaluate<'a>(
        &'a self,
        view: &PlayerView<'_>,
        unlocked: &HashSet<AchievementId>,
    ) -> Vec<&'a Achievement> {
        self.achievements
            .iter()
            .filter(|achievement| !unlocked.contains(&achievement.id))
            .filter(|achievement| satisfied(&achievement.rule, view))
            .collect()
    }

    /// Widest [`AchievementRule::ScansWithin`] window, used by the engine
    /// to bound how long per-player scan timestamps are retained.
    pub fn max_scan_window(&self) -> Duration {
        self.achievements
            .iter()
            .filter_map(|achievement| match achievement.rule {
                AchievementRule::ScansWithin { window_secs, .. } => {
                    Some(Duration::seconds(window_secs as i64))
                }
                _ => None,
            })
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Look up a definition by id.
    pub fn get(&self, id: &str) -> Option<&Achievement> {
        self.achievements
            .iter()
            .find(|achievement| achievement.id == id)
    }

    /// Iterate over all definitions.
    pub fn iter(&self) -> impl Iterator<Item = &Achievement> {
        self.achievements.iter()
    }
}

fn satisfied(rule: &AchievementRule, view: &PlayerView<'_>) -> bool {
    match *rule {
        AchievementRule::GamesPlayed { count } => view.games_played >= count,
        AchievementRule::TotalTags { count } => view.total_tags >= count,
        AchievementRule::ScansWithin { window_secs, count } => {
            let cutoff = view.now - Duration::seconds(window_secs as i64);
            let within = view
                .recent_scans
                .iter()
                .filter(|scan| **scan >= cutoff && **scan <= view.now)
                .count();
            within as u32 >= count
        }
        AchievementRule::SessionScore { points } => view.session_score >= points,
    }
}

/// Built-in achievement set shipped with the engine.
pub fn default_achievements() -> Vec<Achievement> {
    vec![
        Achievement {
            id: "first-game".into(),
            name: "First Game".into(),
            description: "Play your first round".into(),
            rule: AchievementRule::GamesPlayed { count: 1 },
            reward_points: 10,
        },
        Achievement {
            id: "tag-master".into(),
            name: "Tag Master".into(),
            description: "Scan 50 tags".into(),
            rule: AchievementRule::TotalTags { count: 50 },
            reward_points: 50,
        },
        Achievement {
            id: "speed-demon".into(),
            name: "Speed Demon".into(),
            description: "Scan 5 tags in 30 seconds".into(),
            rule: AchievementRule::ScansWithin {
                window_secs: 30,
                count: 5,
            },
            reward_points: 100,
        },
        Achievement {
            id: "high-scorer".into(),
            name: "High Scorer".into(),
            description: "Score 100 points in a single round".into(),
            rule: AchievementRule::SessionScore { points: 100 },
            reward_points: 25,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_set() -> AchievementRuleSet {
        AchievementRuleSet::new(default_achievements())
    }

    fn view(now: OffsetDateTime) -> PlayerView<'static> {
        PlayerView {
            games_played: 0,
            total_tags: 0,
            session_score: 0,
            recent_scans: &[],
            now,
        }
    }

    fn ids<'a>(unlocked: &[&'a Achievement]) -> Vec<&'a str> {
        unlocked.iter().map(|a| a.id.as_str()).collect()
    }

    #[test]
    fn empty_view_unlocks_nothing() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        assert!(rules.evaluate(&view(now), &HashSet::new()).is_empty());
    }

    #[test]
    fn first_game_fires_on_the_first_round() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        let view = PlayerView {
            games_played: 1,
            ..view(now)
        };

        assert_eq!(ids(&rules.evaluate(&view, &HashSet::new())), ["first-game"]);
    }

    #[test]
    fn tag_master_needs_fifty_cumulative_tags() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        let almost = PlayerView {
            games_played: 3,
            total_tags: 49,
            ..view(now)
        };
        let unlocked: HashSet<AchievementId> = ["first-game".to_string()].into();

        assert!(rules.evaluate(&almost, &unlocked).is_empty());

        let there = PlayerView {
            total_tags: 50,
            ..almost
        };
        assert_eq!(ids(&rules.evaluate(&there, &unlocked)), ["tag-master"]);
    }

    #[test]
    fn scans_within_window_counts_only_the_window() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        let scans: Vec<OffsetDateTime> = (0..5)
            .map(|i| now - Duration::seconds(40 - i * 10))
            .collect();
        let unlocked: HashSet<AchievementId> = ["first-game".to_string()].into();

        // The scan at -40s falls outside the 30s window; four remain,
        // short of the required five.
        let sparse = PlayerView {
            games_played: 1,
            total_tags: 5,
            recent_scans: &scans,
            ..view(now)
        };
        assert!(rules.evaluate(&sparse, &unlocked).is_empty());

        let burst: Vec<OffsetDateTime> = (0..5).map(|i| now - Duration::seconds(i * 5)).collect();
        let fast = PlayerView {
            recent_scans: &burst,
            ..sparse
        };
        assert_eq!(ids(&rules.evaluate(&fast, &unlocked)), ["speed-demon"]);
    }

    #[test]
    fn session_score_threshold() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        let unlocked: HashSet<AchievementId> = ["first-game".to_string()].into();
        let view = PlayerView {
            games_played: 1,
            session_score: 120,
            ..view(now)
        };

        assert_eq!(ids(&rules.evaluate(&view, &unlocked)), ["high-scorer"]);
    }

    #[test]
    fn unlocked_ids_never_fire_again() {
        let rules = rule_set();
        let now = OffsetDateTime::now_utc();
        let view = PlayerView {
            games_played: 10,
            total_tags: 200,
            session_score: 500,
            ..view(now)
        };

        let all: HashSet<AchievementId> =
            rules.iter().map(|achievement| achievement.id.clone()).collect();
        assert!(rules.evaluate(&view, &all).is_empty());
    }

    #[test]
    fn max_scan_window_spans_the_widest_rule() {
        assert_eq!(rule_set().max_scan_window(), Duration::seconds(30));
        assert_eq!(
            AchievementRuleSet::new(Vec::new()).max_scan_window(),
            Duration::ZERO
        );
    }
}
