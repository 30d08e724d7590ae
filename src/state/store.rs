use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::state::session::{Session, SessionId};

/// Authoritative table of active rounds.
///
/// This is the engine's central concurrency primitive: every round lives
/// behind its own lock, so all mutation of one round is serialized while
/// operations on distinct rounds proceed fully in parallel. Rounds are
/// removed explicitly by the surrounding service; there is no implicit
/// garbage collection.
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly created round, returning its id.
    pub fn insert(&self, session: Session) -> SessionId {
        let id = session.id;
        self.sessions.insert(id, Arc::new(Mutex::new(session)));
        id
    }

    /// Run `work` with exclusive mutable access to one round.
    ///
    /// Callers targeting the same id queue on the round's lock; callers
    /// targeting other ids are unaffected. Returns `None` when the id is
    /// unknown.
    pub async fn with_session<T>(
        &self,
        id: SessionId,
        work: impl FnOnce(&mut Session) -> T,
    ) -> Option<T> {
        // Clone the cell out of the map so no shard lock is held while
        // awaiting the session lock.
        let cell = self
            .sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))?;
        let mut session = cell.lock().await;
        Some(work(&mut session))
    }

    /// Clone the round's current state, reflecting the latest committed
    /// mutation.
    pub async fn snapshot(&self, id: SessionId) -> Option<Session> {
        self.with_session(id, |session| session.clone()).await
    }

    /// Drop a round from the store. Returns whether it existed.
    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Number of rounds currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no rounds.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
