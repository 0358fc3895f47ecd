//! Session storage and per-session serialization
//!
//! The dialogue engine reads a session once, mutates it and writes it back.
//! [`SessionLockMap`] makes that read-modify-write exclusive per session so
//! two tabs on the same conversation cannot interleave; different sessions
//! never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use campus_assist_core::{Result, SessionState, SessionStore, SessionSummary};

use crate::AgentError;

/// Process-local session store
///
/// State does not survive a restart; other backends plug in through the
/// `SessionStore` trait.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, state: SessionState) -> Result<()> {
        self.sessions.write().insert(session_id.to_string(), state);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.write().remove(session_id).is_some())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .read()
            .iter()
            .map(|(id, state)| state.summary(id.as_str()))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

/// Per-session run locks
///
/// Each session id maps to a `Semaphore(1)`; the permit is held for the
/// whole action and released on drop.
#[derive(Debug, Default)]
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a session
    pub async fn acquire(&self, session_id: &str) -> std::result::Result<OwnedSemaphorePermit, AgentError> {
        let semaphore = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };

        semaphore
            .acquire_owned()
            .await
            .map_err(|_| AgentError::Session(format!("lock for session {} was closed", session_id)))
    }

    /// Number of tracked sessions
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Forget locks nobody holds or waits on
    ///
    /// Holders and waiters keep a clone of the semaphore, so an entry whose
    /// only reference is the map is idle. Returns the number removed.
    pub fn prune_idle(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, semaphore| Arc::strong_count(semaphore) > 1);
        before - locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_store_roundtrip_and_delete() {
        let store = InMemorySessionStore::new();
        let mut state = SessionState::new("device-1");
        state.push_user("Hello");

        store.put("s1", state.clone()).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Some(state));
        assert!(store.get("missing").await.unwrap().is_none());

        assert!(store.delete("s1").await.unwrap());
        assert!(!store.delete("s1").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = InMemorySessionStore::new();
        let mut older = SessionState::new("a");
        older.updated_at -= chrono::Duration::seconds(60);
        let mut newer = SessionState::new("a");
        newer.push_user("latest");

        store.put("old", older).await.unwrap();
        store.put("new", newer).await.unwrap();

        let ids: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let locks = Arc::new(SessionLockMap::new());
        let held = locks.acquire("s1").await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("s1").await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_sessions_concurrent() {
        let locks = SessionLockMap::new();
        let p1 = locks.acquire("s1").await.unwrap();
        let p2 = locks.acquire("s2").await.unwrap();
        assert_eq!(locks.session_count(), 2);
        drop(p1);
        drop(p2);

        assert_eq!(locks.prune_idle(), 2);
        assert_eq!(locks.session_count(), 0);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_and_awaited_locks() {
        let locks = Arc::new(SessionLockMap::new());
        let held = locks.acquire("busy").await.unwrap();
        let _idle = locks.acquire("idle").await.map(drop);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("busy").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.session_count(), 1);

        drop(held);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        // The entry survived, so a newcomer still queues behind the holder
        let third = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("busy").await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!third.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), third)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
