//! In-memory Game Session Engine for TagRacer scanning rounds.
//!
//! The engine owns the authoritative state of every active round: it
//! enforces the Waiting → Running → Finished lifecycle, serializes
//! concurrent tag-scan submissions per round so each physical tag scores
//! at most once, computes combo-multiplied points, evaluates achievement
//! rules, and emits an ordered stream of domain events for the host
//! transport to fan out. Persistence and transport live behind
//! collaborator boundaries; the engine exposes in-process operations only.

pub mod achievements;
pub mod config;
pub mod dao;
pub mod error;
pub mod events;
pub mod registry;
pub mod scoring;
pub mod services;
pub mod state;

pub use config::EngineConfig;
pub use error::EngineError;
pub use services::engine::{FinalResult, GameEngine, SharedEngine, TagScanResult};
