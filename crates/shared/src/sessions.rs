use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_SESSION_ID: &str = "default";
pub const RECENT_EVENTS_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub history: Vec<SessionTurn>,
    pub attributes: HashMap<String, String>,
    /// Event titles surfaced by tools in earlier exchanges, most recent first.
    pub recent_events: Vec<String>,
}

/// In-process conversation memory keyed by session id.
///
/// History is bounded to `history_limit` turns with the oldest evicted first.
/// Sessions live until reset; there is no expiry.
#[derive(Clone)]
pub struct SessionStore {
    history_limit: usize,
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    exchange_locks: Arc<Mutex<ExchangeLocks>>,
}

type ExchangeLocks = HashMap<String, Arc<AsyncMutex<()>>>;

/// Held for the duration of one exchange on a session.
pub struct ExchangeGuard {
    guard: Option<OwnedMutexGuard<()>>,
    session_id: String,
    locks: Arc<Mutex<ExchangeLocks>>,
}

impl Drop for ExchangeGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters clone the lock under the map mutex, so a count of one means
        // nobody else holds or awaits it.
        let mut locks = lock_exchange_map(&self.locks);
        if locks
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.session_id);
        }
    }
}

fn lock_exchange_map(locks: &Mutex<ExchangeLocks>) -> MutexGuard<'_, ExchangeLocks> {
    match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SessionStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            exchange_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Returns a snapshot of the session, creating an empty one on first use.
    pub fn get(&self, session_id: &str) -> Session {
        let mut sessions = self.lock_sessions();
        sessions.entry(session_id.to_string()).or_default().clone()
    }

    /// Snapshot of an existing session without creating one.
    pub fn peek(&self, session_id: &str) -> Option<Session> {
        self.lock_sessions().get(session_id).cloned()
    }

    pub fn append(&self, session_id: &str, role: TurnRole, content: impl Into<String>) {
        let mut sessions = self.lock_sessions();
        let session = sessions.entry(session_id.to_string()).or_default();
        push_turn(session, self.history_limit, role, content.into());
    }

    /// Appends both turns of a completed exchange and remembers the events it
    /// mentioned, all under one lock.
    pub fn record_exchange(
        &self,
        session_id: &str,
        user_message: &str,
        assistant_message: &str,
        mentioned_events: &[String],
    ) {
        let mut sessions = self.lock_sessions();
        let session = sessions.entry(session_id.to_string()).or_default();
        push_turn(
            session,
            self.history_limit,
            TurnRole::User,
            user_message.to_string(),
        );
        push_turn(
            session,
            self.history_limit,
            TurnRole::Assistant,
            assistant_message.to_string(),
        );

        for title in mentioned_events.iter().rev() {
            session.recent_events.retain(|existing| existing != title);
            session.recent_events.insert(0, title.clone());
        }
        session.recent_events.truncate(RECENT_EVENTS_LIMIT);
    }

    pub fn recent_events(&self, session_id: &str) -> Vec<String> {
        self.lock_sessions()
            .get(session_id)
            .map(|session| session.recent_events.clone())
            .unwrap_or_default()
    }

    /// Drops all state for the session. Unknown ids are a no-op.
    pub fn reset(&self, session_id: &str) {
        self.lock_sessions().remove(session_id);

        let mut locks = self.lock_exchange_locks();
        if locks
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(session_id);
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.lock_sessions().len()
    }

    /// Serialises exchanges for one session id. Different ids never contend.
    /// The per-id lock is dropped from the map once the last holder releases it.
    pub async fn lock_session(&self, session_id: &str) -> ExchangeGuard {
        let lock = {
            let mut locks = self.lock_exchange_locks();
            Arc::clone(
                locks
                    .entry(session_id.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        ExchangeGuard {
            guard: Some(lock.lock_owned().await),
            session_id: session_id.to_string(),
            locks: Arc::clone(&self.exchange_locks),
        }
    }

    #[cfg(test)]
    fn tracked_exchange_locks(&self) -> usize {
        self.lock_exchange_locks().len()
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_exchange_locks(&self) -> MutexGuard<'_, ExchangeLocks> {
        lock_exchange_map(&self.exchange_locks)
    }
}

fn push_turn(session: &mut Session, history_limit: usize, role: TurnRole, content: String) {
    session.history.push(SessionTurn { role, content });
    if session.history.len() > history_limit {
        let overflow = session.history.len() - history_limit;
        session.history.drain(..overflow);
    }
}
