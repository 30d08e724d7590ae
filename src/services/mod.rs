/// Core game session engine operations.
pub mod engine;
/// Broadcast helpers emitting engine domain events.
pub mod events;
