//! Background session cleanup task.
//!
//! Periodically evicts expired sessions, assertion records and request
//! states from the store.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::store::SessionStore;

/// Default cleanup interval in seconds.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Spawn a background task that periodically cleans up expired entries.
///
/// Returns a `JoinHandle` that can be used to abort the task.
pub fn spawn_cleanup_task(
    session_store: Arc<SessionStore>,
    cleanup_interval_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(cleanup_interval_secs));

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;

            match session_store.evict_expired() {
                Ok(count) if count > 0 => info!(evicted = count, "Session cleanup completed"),
                Ok(_) => debug!("Session cleanup: no expired sessions"),
                Err(e) => warn!(error = %e, "Session cleanup failed"),
            }

            match session_store.session_count() {
                Ok(count) => debug!(active_sessions = count, "Session store status"),
                Err(e) => debug!(error = %e, "Failed to get session count"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Session;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cleanup_task_evicts_expired_sessions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.redb");
        let store = Arc::new(SessionStore::open(path).unwrap());

        store
            .create(Session::new(
                "live@example.com".to_string(),
                "valid-assertion".to_string(),
                "https://idp.example.com".to_string(),
                3600,
            ))
            .unwrap();
        store
            .create(Session::new(
                "stale@example.com".to_string(),
                "short-assertion".to_string(),
                "https://idp.example.com".to_string(),
                0,
            ))
            .unwrap();
        assert_eq!(store.session_count().unwrap(), 2);

        let handle = spawn_cleanup_task(Arc::clone(&store), 1);

        // Wait for at least one cleanup cycle
        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.abort();

        assert_eq!(store.session_count().unwrap(), 1, "Only the live session should remain");
    }
}
