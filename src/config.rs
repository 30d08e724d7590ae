//! Engine configuration loading, including the achievement rule set.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use time::Duration;
use tracing::{info, warn};

use crate::achievements::{Achievement, default_achievements};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TAGRACER_ENGINE_CONFIG_PATH";

const DEFAULT_COMBO_WINDOW_SECS: u64 = 5;
const DEFAULT_MAX_MULTIPLIER: u32 = 5;
const DEFAULT_TAG_POINTS: u32 = 10;
const DEFAULT_MIN_PLAYERS: usize = 2;
const DEFAULT_SCAN_COOLDOWN_SECS: u64 = 2;
const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Gameplay constants applied to every round.
    pub rules: GameRules,
    /// Achievement definitions evaluated after qualifying operations.
    pub achievements: Vec<Achievement>,
    /// Capacity of the broadcast channel behind the event hub.
    pub event_capacity: usize,
}

/// Tunable gameplay constants.
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Maximum gap between two scans that still extends a combo.
    pub combo_window: Duration,
    /// Cap on the combo multiplier.
    pub max_multiplier: u32,
    /// Points awarded for tags the registry does not know.
    pub default_tag_points: u32,
    /// Smallest roster for which ready-up starts the round.
    pub min_players_to_start: usize,
    /// Required gap between a player's accepted scans; zero disables it.
    pub scan_cooldown: Duration,
}

impl EngineConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        achievements = config.achievements.len(),
                        "loaded engine configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            achievements: default_achievements(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            combo_window: Duration::seconds(DEFAULT_COMBO_WINDOW_SECS as i64),
            max_multiplier: DEFAULT_MAX_MULTIPLIER,
            default_tag_points: DEFAULT_TAG_POINTS,
            min_players_to_start: DEFAULT_MIN_PLAYERS,
            scan_cooldown: Duration::seconds(DEFAULT_SCAN_COOLDOWN_SECS as i64),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    combo_window_secs: Option<u64>,
    max_multiplier: Option<u32>,
    default_tag_points: Option<u32>,
    min_players_to_start: Option<usize>,
    scan_cooldown_secs: Option<u64>,
    event_capacity: Option<usize>,
    achievements: Option<Vec<Achievement>>,
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let rules = GameRules {
            combo_window: Duration::seconds(
                raw.combo_window_secs.unwrap_or(DEFAULT_COMBO_WINDOW_SECS) as i64,
            ),
            max_multiplier: raw.max_multiplier.unwrap_or(DEFAULT_MAX_MULTIPLIER).max(1),
            default_tag_points: raw.default_tag_points.unwrap_or(DEFAULT_TAG_POINTS),
            min_players_to_start: raw
                .min_players_to_start
                .unwrap_or(DEFAULT_MIN_PLAYERS)
                .max(1),
            scan_cooldown: Duration::seconds(
                raw.scan_cooldown_secs.unwrap_or(DEFAULT_SCAN_COOLDOWN_SECS) as i64,
            ),
        };

        Self {
            rules,
            achievements: raw.achievements.unwrap_or_else(default_achievements),
            event_capacity: raw.event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use crate::achievements::AchievementRule;

    use super::*;

    #[test]
    fn defaults_match_the_shipped_rules() {
        let config = EngineConfig::default();
        assert_eq!(config.rules.combo_window, Duration::seconds(5));
        assert_eq!(config.rules.max_multiplier, 5);
        assert_eq!(config.rules.default_tag_points, 10);
        assert_eq!(config.rules.min_players_to_start, 2);
        assert_eq!(config.rules.scan_cooldown, Duration::seconds(2));
        assert_eq!(config.achievements.len(), 4);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"combo_window_secs": 8, "min_players_to_start": 1}"#)
                .unwrap();
        let config: EngineConfig = raw.into();

        assert_eq!(config.rules.combo_window, Duration::seconds(8));
        assert_eq!(config.rules.min_players_to_start, 1);
        assert_eq!(config.rules.max_multiplier, 5);
        assert_eq!(config.achievements.len(), 4);
    }

    #[test]
    fn achievements_deserialize_from_tagged_rules() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "achievements": [
                    {
                        "id": "marathon",
                        "name": "Marathon",
                        "description": "Scan 500 tags",
                        "rule": {"kind": "total_tags", "count": 500},
                        "reward_points": 200
                    }
                ]
            }"#,
        )
        .unwrap();
        let config: EngineConfig = raw.into();

        assert_eq!(config.achievements.len(), 1);
        assert_eq!(config.achievements[0].id, "marathon");
        assert_eq!(
            config.achievements[0].rule,
            AchievementRule::TotalTags { count: 500 }
        );
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"max_multiplier": 0, "min_players_to_start": 0}"#).unwrap();
        let config: EngineConfig = raw.into();

        assert_eq!(config.rules.max_multiplier, 1);
        assert_eq!(config.rules.min_players_to_start, 1);
    }
}
