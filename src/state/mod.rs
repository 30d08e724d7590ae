//! In-memory authoritative state for active rounds.

pub mod session;
pub mod state_machine;
pub mod store;

pub use self::session::{PlayerEntry, PlayerId, PlayerStanding, ScanLocation, Session, SessionId};
pub use self::state_machine::{FinishReason, InvalidTransition, RoundEvent, SessionStatus};
pub use self::store::SessionStore;
