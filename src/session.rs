//! Conversation state keyed by generated session ids.
//!
//! Sessions expire `ttl` after their last use and the store never holds more
//! than `max_sessions`; creating one past the limit evicts the least
//! recently used session.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

struct Session {
    turns: Vec<Turn>,
    created: Instant,
    last_seen: Instant,
}

impl Session {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            turns: Vec::new(),
            created: now,
            last_seen: now,
        }
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Session>>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
            max_sessions: max_sessions.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        // a panic mid-update leaves at worst a stale history behind
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge_locked(&self, sessions: &mut HashMap<Uuid, Session>) -> usize {
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, session| session.last_seen.elapsed() <= ttl);
        let purged = before - sessions.len();
        if purged > 0 {
            tracing::debug!(purged, "expired sessions removed");
        }
        purged
    }

    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.lock();
        self.purge_locked(&mut sessions)
    }

    pub fn create(&self) -> Uuid {
        let mut sessions = self.lock();
        self.purge_locked(&mut sessions);
        self.create_locked(&mut sessions)
    }

    fn create_locked(&self, sessions: &mut HashMap<Uuid, Session>) -> Uuid {
        while sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_seen)
                .map(|(id, session)| (*id, session.created.elapsed()));
            match oldest {
                Some((id, age)) => {
                    tracing::debug!(session_id = %id, age = ?age, "evicting least recently used session");
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        sessions.insert(id, Session::new());
        id
    }

    fn parse_id(id: &str) -> Result<Uuid> {
        Uuid::parse_str(id.trim()).map_err(|_| Error::SessionNotFound(id.to_string()))
    }

    /// Returns the id of an existing live session, or a fresh one when no id
    /// is given. Unknown and expired ids are errors.
    pub fn resolve(&self, id: Option<&str>) -> Result<Uuid> {
        match id.map(str::trim).filter(|id| !id.is_empty()) {
            None => Ok(self.create()),
            Some(raw) => {
                let id = Self::parse_id(raw)?;
                let mut sessions = self.lock();
                self.purge_locked(&mut sessions);
                let session = sessions
                    .get_mut(&id)
                    .ok_or_else(|| Error::SessionNotFound(raw.to_string()))?;
                session.last_seen = Instant::now();
                Ok(id)
            }
        }
    }

    /// The most recent `limit` turns of a live session, oldest first.
    pub fn recent_turns(&self, id: &Uuid, limit: usize) -> Result<Vec<Turn>> {
        let mut sessions = self.lock();
        self.purge_locked(&mut sessions);
        let session = sessions
            .get(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let skip = session.turns.len().saturating_sub(limit);
        Ok(session.turns[skip..].to_vec())
    }

    pub fn append(&self, id: &Uuid, turns: impl IntoIterator<Item = Turn>) -> Result<()> {
        let mut sessions = self.lock();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        session.turns.extend(turns);
        session.last_seen = Instant::now();
        Ok(())
    }

    /// Appends a completed exchange. A session that expired or was evicted
    /// in the meantime is replaced by a fresh one; `None` always starts one.
    /// Returns the id the turns were recorded under.
    pub fn record(&self, id: Option<Uuid>, turns: impl IntoIterator<Item = Turn>) -> Uuid {
        let mut sessions = self.lock();
        self.purge_locked(&mut sessions);
        let id = match id {
            Some(id) if sessions.contains_key(&id) => id,
            Some(stale) => {
                tracing::warn!(session_id = %stale, "session gone before its answer was recorded; starting a new one");
                self.create_locked(&mut sessions)
            }
            None => self.create_locked(&mut sessions),
        };
        if let Some(session) = sessions.get_mut(&id) {
            session.turns.extend(turns);
            session.last_seen = Instant::now();
        }
        id
    }

    pub fn list(&self) -> Vec<Uuid> {
        let mut sessions = self.lock();
        self.purge_locked(&mut sessions);
        sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn missing_id_creates_a_session() {
        let store = SessionStore::new(Duration::from_secs(60), 10);
        let id = store.resolve(None).unwrap();
        assert_eq!(store.list(), vec![id]);
        assert_eq!(store.resolve(Some(&id.to_string())).unwrap(), id);
    }

    #[test]
    fn unknown_or_malformed_ids_are_not_found() {
        let store = SessionStore::new(Duration::from_secs(60), 10);
        assert!(matches!(
            store.resolve(Some(&Uuid::new_v4().to_string())),
            Err(Error::SessionNotFound(_))
        ));
        assert!(matches!(store.resolve(Some("nope")), Err(Error::SessionNotFound(_))));
    }

    #[test]
    fn recent_turns_are_bounded_and_ordered() {
        let store = SessionStore::new(Duration::from_secs(60), 10);
        let id = store.create();
        store
            .append(&id, [Turn::user("q1"), Turn::assistant("a1"), Turn::user("q2"), Turn::assistant("a2")])
            .unwrap();
        let turns = store.recent_turns(&id, 2).unwrap();
        assert_eq!(turns, vec![Turn::user("q2"), Turn::assistant("a2")]);
        assert_eq!(store.recent_turns(&id, 0).unwrap(), Vec::<Turn>::new());
    }

    #[test]
    fn sessions_expire_after_ttl() {
        let store = SessionStore::new(Duration::from_millis(30), 10);
        let id = store.create();
        thread::sleep(Duration::from_millis(80));
        assert!(matches!(
            store.resolve(Some(&id.to_string())),
            Err(Error::SessionNotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn record_replaces_an_evicted_session() {
        let store = SessionStore::new(Duration::from_secs(60), 1);
        let first = store.create();
        let other = store.create();
        assert!(!store.list().contains(&first));

        let recorded = store.record(Some(first), [Turn::user("q"), Turn::assistant("a")]);
        assert_ne!(recorded, first);
        assert_ne!(recorded, other);
        assert_eq!(
            store.recent_turns(&recorded, 10).unwrap(),
            vec![Turn::user("q"), Turn::assistant("a")]
        );
    }

    #[test]
    fn record_keeps_a_live_session() {
        let store = SessionStore::new(Duration::from_secs(60), 4);
        let id = store.create();
        assert_eq!(store.record(Some(id), [Turn::user("q")]), id);
        assert_ne!(store.record(None, [Turn::user("r")]), id);
        assert_eq!(store.recent_turns(&id, 10).unwrap(), vec![Turn::user("q")]);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let store = SessionStore::new(Duration::from_secs(60), 2);
        let first = store.create();
        thread::sleep(Duration::from_millis(5));
        let second = store.create();
        thread::sleep(Duration::from_millis(5));
        // touching `first` makes `second` the eviction victim
        store.resolve(Some(&first.to_string())).unwrap();
        thread::sleep(Duration::from_millis(5));
        let third = store.create();

        let mut live = store.list();
        live.sort();
        let mut expected = vec![first, third];
        expected.sort();
        assert_eq!(live, expected);
        assert!(!live.contains(&second));
    }
}
