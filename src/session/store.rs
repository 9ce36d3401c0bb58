//! Session store backed by redb embedded database.
//!
//! Provides persistent storage for SAML2 sessions with:
//! - In-memory cache for hot sessions
//! - Replay prevention via assertion ID tracking
//! - Relay-state correlators for in-flight AuthnRequests
//! - TTL-based expiry

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::{debug, warn};

use super::types::{Session, SessionId};
use crate::command::StoredRequestState;
use crate::error::Saml2Error;

/// redb table for sessions (key: session_id hex, value: MessagePack bytes).
const SESSIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("saml2_sessions");

/// redb table for assertion ID tracking (key: assertion_id, value: expiry timestamp).
const ASSERTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("saml2_assertions");

/// redb table for stored request state (key: relay state, value: MessagePack bytes).
const REQUEST_STATES_TABLE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("saml2_request_states");

/// Session store with in-memory cache and persistent storage.
pub struct SessionStore {
    db: Database,

    /// In-memory cache for frequently accessed sessions.
    cache: RwLock<HashMap<SessionId, Session>>,

    /// Maximum number of sessions to keep in cache.
    max_cache_size: usize,
}

impl SessionStore {
    /// Open or create a session store at the given path.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let db = Database::create(&path)
            .with_context(|| format!("Failed to open session database: {:?}", path))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(SESSIONS_TABLE)?;
            let _ = write_txn.open_table(ASSERTIONS_TABLE)?;
            let _ = write_txn.open_table(REQUEST_STATES_TABLE)?;
        }
        write_txn.commit()?;

        let cache = Self::load_active_sessions(&db)?;
        debug!(sessions = cache.len(), "Loaded active sessions into cache");

        Ok(Self {
            db,
            cache: RwLock::new(cache),
            max_cache_size: 10000,
        })
    }

    /// Create a new session and store it.
    ///
    /// The assertion record and the session are written in one
    /// transaction. Fails with [`Saml2Error::Replay`] if the session's
    /// assertion was already used.
    pub fn create(&self, session: Session) -> Result<SessionId> {
        let id = session.id;
        let marker = rmp_serde::to_vec(&session.expires_at)?;
        let data = rmp_serde::to_vec(&session).context("Failed to serialize session")?;

        let write_txn = self.db.begin_write()?;
        let replayed = {
            let mut assertions = write_txn.open_table(ASSERTIONS_TABLE)?;
            let previous = assertions.insert(session.assertion_id.as_str(), marker.as_slice())?;
            previous.is_some()
        };

        if replayed {
            write_txn.abort()?;
            return Err(Saml2Error::Replay(session.assertion_id).into());
        }

        {
            let mut sessions = write_txn.open_table(SESSIONS_TABLE)?;
            sessions.insert(id.to_hex().as_str(), data.as_slice())?;
        }
        write_txn.commit()?;

        if let Ok(mut cache) = self.cache.write() {
            if cache.len() >= self.max_cache_size {
                self.evict_cache_lru(&mut cache);
            }
            cache.insert(id, session);
        }

        Ok(id)
    }

    /// Get session by ID, updating last_accessed time.
    pub fn get(&self, id: SessionId) -> Result<Option<Session>> {
        if let Ok(mut cache) = self.cache.write() {
            if let Some(session) = cache.get_mut(&id) {
                if session.is_expired() {
                    cache.remove(&id);
                    // Left in the database for the cleanup task
                    return Ok(None);
                }
                session.touch();
                if let Err(e) = self.persist(session) {
                    warn!(session_id = %id, error = %e, "Failed to persist session access time");
                }
                return Ok(Some(session.clone()));
            }
        }

        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        let key = id.to_hex();
        match table.get(key.as_str())? {
            Some(value) => {
                let mut session: Session = rmp_serde::from_slice(value.value())
                    .context("Failed to deserialize session")?;

                if session.is_expired() {
                    return Ok(None);
                }

                session.touch();

                if let Ok(mut cache) = self.cache.write() {
                    cache.insert(id, session.clone());
                }

                // Persist updated last_accessed (drop read_txn first)
                drop(read_txn);
                if let Err(e) = self.persist(&session) {
                    warn!(session_id = %id, error = %e, "Failed to persist session access time");
                }

                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Delete a session by ID.
    pub fn delete(&self, id: SessionId) -> Result<bool> {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&id);
        }

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            let key = id.to_hex();
            let result = table.remove(key.as_str())?;
            result.is_some()
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Check if an assertion ID has been used (replay prevention).
    pub fn is_assertion_used(&self, assertion_id: &str) -> Result<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ASSERTIONS_TABLE)?;
        Ok(table.get(assertion_id)?.is_some())
    }

    /// Persist a relay-state correlator.
    pub fn save_request_state(&self, state: &StoredRequestState) -> Result<()> {
        let data = rmp_serde::to_vec(state).context("Failed to serialize request state")?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(REQUEST_STATES_TABLE)?;
            table.insert(state.relay_state.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Remove and return the correlator for a relay state. Each state can be
    /// taken once; expired states are discarded.
    pub fn take_request_state(&self, relay_state: &str) -> Result<Option<StoredRequestState>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(REQUEST_STATES_TABLE)?;
            let removed = table.remove(relay_state)?;
            removed.map(|value| value.value().to_vec())
        };
        write_txn.commit()?;

        let Some(data) = removed else {
            return Ok(None);
        };

        let state: StoredRequestState =
            rmp_serde::from_slice(&data).context("Failed to deserialize request state")?;

        if state.is_expired() {
            debug!(relay_state = %relay_state, "Discarding expired request state");
            return Ok(None);
        }

        Ok(Some(state))
    }

    /// Evict all expired sessions, assertion records and request states.
    /// Returns the number of sessions evicted.
    pub fn evict_expired(&self) -> Result<usize> {
        let now = Utc::now();

        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, session| !session.is_expired());
        }

        let expired_sessions: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(SESSIONS_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<Session>(value.value()) {
                    Ok(session) if session.is_expired() => {
                        ids.push(key.value().to_string());
                    }
                    Err(e) => {
                        warn!(key = key.value(), error = %e, "Failed to deserialize session, marking for deletion");
                        ids.push(key.value().to_string());
                    }
                    _ => {}
                }
            }
            ids
        };

        let expired_assertions: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(ASSERTIONS_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<DateTime<Utc>>(value.value()) {
                    Ok(expires_at) if now > expires_at => ids.push(key.value().to_string()),
                    Err(_) => ids.push(key.value().to_string()),
                    _ => {}
                }
            }
            ids
        };

        let expired_states: Vec<String> = {
            let read_txn = self.db.begin_read()?;
            let table = read_txn.open_table(REQUEST_STATES_TABLE)?;

            let mut ids = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                match rmp_serde::from_slice::<StoredRequestState>(value.value()) {
                    Ok(state) if state.is_expired() => ids.push(key.value().to_string()),
                    Err(_) => ids.push(key.value().to_string()),
                    _ => {}
                }
            }
            ids
        };

        let mut evicted = 0;
        let write_txn = self.db.begin_write()?;
        {
            let mut sessions = write_txn.open_table(SESSIONS_TABLE)?;
            for id in &expired_sessions {
                if sessions.remove(id.as_str())?.is_some() {
                    evicted += 1;
                }
            }

            let mut assertions = write_txn.open_table(ASSERTIONS_TABLE)?;
            for id in &expired_assertions {
                assertions.remove(id.as_str())?;
            }

            let mut states = write_txn.open_table(REQUEST_STATES_TABLE)?;
            for id in &expired_states {
                states.remove(id.as_str())?;
            }
        }
        write_txn.commit()?;

        Ok(evicted)
    }

    /// Get session count (for metrics).
    pub fn session_count(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;
        Ok(table.len()? as usize)
    }

    fn persist(&self, session: &Session) -> Result<()> {
        let data = rmp_serde::to_vec(session).context("Failed to serialize session")?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS_TABLE)?;
            table.insert(session.id.to_hex().as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn load_active_sessions(db: &Database) -> Result<HashMap<SessionId, Session>> {
        let mut sessions = HashMap::new();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(SESSIONS_TABLE)?;

        for entry in table.iter()? {
            let (_, value) = entry?;
            if let Ok(session) = rmp_serde::from_slice::<Session>(value.value()) {
                if !session.is_expired() {
                    sessions.insert(session.id, session);
                }
            }
        }

        Ok(sessions)
    }

    /// Evict the least recently accessed session from cache.
    fn evict_cache_lru(&self, cache: &mut HashMap<SessionId, Session>) {
        if let Some(oldest_id) = cache
            .iter()
            .min_by_key(|(_, s)| s.last_accessed)
            .map(|(id, _)| *id)
        {
            cache.remove(&oldest_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.redb");
        let store = SessionStore::open(path).unwrap();
        (store, dir)
    }

    fn session(assertion_id: &str) -> Session {
        Session::new(
            "user@example.com".to_string(),
            assertion_id.to_string(),
            "https://idp.example.com".to_string(),
            3600,
        )
    }

    #[test]
    fn test_session_create_and_get() {
        let (store, _dir) = test_store();

        let session = session("assertion-123");
        let id = session.id;
        store.create(session).unwrap();

        let retrieved = store.get(id).unwrap().unwrap();
        assert_eq!(retrieved.user_id, "user@example.com");
        assert_eq!(retrieved.assertion_id, "assertion-123");
    }

    #[test]
    fn test_session_expiry() {
        let (store, _dir) = test_store();

        let mut session = session("assertion-456");
        session.expires_at = Utc::now() - chrono::Duration::seconds(10);
        let id = session.id;
        store.create(session).unwrap();

        assert!(store.get(id).unwrap().is_none());
    }

    #[test]
    fn test_assertion_replay_prevention() {
        let (store, _dir) = test_store();

        store.create(session("unique-assertion")).unwrap();

        let result = store.create(session("unique-assertion"));
        let err = result.unwrap_err();
        assert!(err.to_string().contains("replay"));
        assert!(matches!(
            err.downcast_ref::<Saml2Error>(),
            Some(Saml2Error::Replay(_))
        ));
    }

    #[test]
    fn test_concurrent_create_admits_one_session_per_assertion() {
        use std::sync::Barrier;

        const THREADS: usize = 8;
        const ROUNDS: usize = 20;

        let (store, _dir) = test_store();

        for round in 0..ROUNDS {
            let assertion_id = format!("_race-{}", round);
            let barrier = Barrier::new(THREADS);

            let created = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..THREADS)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            store.create(session(&assertion_id)).is_ok()
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap())
                    .filter(|ok| *ok)
                    .count()
            });

            assert_eq!(created, 1, "round {} admitted {} sessions", round, created);
        }

        assert_eq!(store.session_count().unwrap(), ROUNDS);
    }

    #[test]
    fn test_session_delete() {
        let (store, _dir) = test_store();

        let session = session("assertion-789");
        let id = session.id;
        store.create(session).unwrap();
        assert!(store.get(id).unwrap().is_some());

        assert!(store.delete(id).unwrap());
        assert!(store.get(id).unwrap().is_none());
        assert!(!store.delete(id).unwrap());
    }

    #[test]
    fn test_request_state_taken_once() {
        let (store, _dir) = test_store();

        let state = StoredRequestState::new(
            "_id-1".to_string(),
            Some("/dashboard".to_string()),
            "https://idp.example.com".to_string(),
            600,
        );
        store.save_request_state(&state).unwrap();

        assert_eq!(store.take_request_state(&state.relay_state).unwrap(), Some(state.clone()));
        assert_eq!(store.take_request_state(&state.relay_state).unwrap(), None);
        assert_eq!(store.take_request_state("unknown").unwrap(), None);
    }

    #[test]
    fn test_expired_request_state_discarded() {
        let (store, _dir) = test_store();

        let mut state = StoredRequestState::new(
            "_id-2".to_string(),
            None,
            "https://idp.example.com".to_string(),
            600,
        );
        state.expires_at = Utc::now() - chrono::Duration::seconds(10);
        store.save_request_state(&state).unwrap();

        assert_eq!(store.take_request_state(&state.relay_state).unwrap(), None);
    }

    #[test]
    fn test_evict_expired() {
        let (store, _dir) = test_store();

        let mut expired = session("assertion-expired");
        expired.expires_at = Utc::now() - chrono::Duration::seconds(10);
        store.persist(&expired).unwrap();
        store.create(session("assertion-live")).unwrap();

        let evicted = store.evict_expired().unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(store.session_count().unwrap(), 1);
    }
}
