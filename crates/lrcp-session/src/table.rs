use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lrcp_frame::SessionId;

use crate::session::{Session, SessionStats};

/// A session shared between the dispatcher and its retransmit timer.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Live sessions by id.
///
/// The table is the only owner that creates and evicts sessions. Callers
/// that need both locks take the table lock first and release it before
/// holding a session lock for any length of time.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SessionId, SharedSession>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SessionId) -> Option<SharedSession> {
        self.sessions.get(&id).cloned()
    }

    /// Return the session for `id`, creating it with `create` if absent.
    ///
    /// The flag is `true` when a new session was created.
    pub fn get_or_insert_with(
        &mut self,
        id: SessionId,
        create: impl FnOnce() -> Session,
    ) -> (SharedSession, bool) {
        if let Some(existing) = self.sessions.get(&id) {
            return (Arc::clone(existing), false);
        }
        let shared = Arc::new(Mutex::new(create()));
        self.sessions.insert(id, Arc::clone(&shared));
        (shared, true)
    }

    /// Evict `id`. The caller closes the returned session.
    pub fn remove(&mut self, id: SessionId) -> Option<SharedSession> {
        self.sessions.remove(&id)
    }

    /// Evict every session.
    pub fn drain(&mut self) -> Vec<(SessionId, SharedSession)> {
        self.sessions.drain().collect()
    }

    /// Ids of sessions currently bound to `peer`.
    pub fn ids_for_peer(&self, peer: SocketAddr) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|(_, session)| lock(session).peer() == peer)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Stats of all live sessions, sorted by id.
    pub fn stats(&self) -> Vec<SessionStats> {
        let mut stats: Vec<_> = self
            .sessions
            .values()
            .map(|session| lock(session).stats())
            .collect();
        stats.sort_by_key(|stats| stats.id);
        stats
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
