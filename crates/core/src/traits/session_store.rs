use async_trait::async_trait;

use crate::{Result, SessionState, SessionSummary};

/// Key-value store for session state, keyed by session id
///
/// Writes are last-write-wins; callers serialize per session.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, session_id: &str) -> Result<Option<SessionState>>;

    async fn put(&self, session_id: &str, state: SessionState) -> Result<()>;

    /// Returns whether a session was removed
    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Summaries of all stored sessions, most recently updated first
    async fn list(&self) -> Result<Vec<SessionSummary>>;
}
