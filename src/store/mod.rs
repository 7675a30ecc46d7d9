//! Session snapshot cache and durable match results

pub mod cache;
pub mod results;
pub mod supabase;

pub use cache::MemorySessionStore;
pub use results::{GameRecord, MemoryResultStore, TournamentRecord};
pub use supabase::{SupabaseClient, SupabaseError, SupabaseResultStore};

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::game::{PlayMode, SessionData};

/// Cache key for a reconnectable session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub mode: PlayMode,
    pub user_id: u64,
}

impl SessionKey {
    pub fn new(mode: PlayMode, user_id: u64) -> Self {
        Self { mode, user_id }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_data_{}_{}", self.mode, self.user_id)
    }
}

/// Short-lived, reconnect-survivable session snapshots
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionData>, StoreError>;

    async fn save(
        &self,
        key: &SessionKey,
        data: &SessionData,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError>;

    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> usize {
        0
    }
}

/// Durable history of finished games and tournaments
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_game(&self, record: &GameRecord) -> Result<Uuid, StoreError>;

    async fn save_tournament(&self, record: &TournamentRecord) -> Result<Uuid, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to encode session snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Supabase(#[from] SupabaseError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Run a write, retrying once on failure. The second error is returned.
pub async fn retry_once<T, F, Fut>(operation: &str, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(operation, error = %e, "Store write failed, retrying once");
            op().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn key_format() {
        assert_eq!(
            SessionKey::new(PlayMode::Tournament, 42).to_string(),
            "session_data_tournament_42"
        );
        assert_eq!(
            SessionKey::new(PlayMode::Normal, 7).to_string(),
            "session_data_normal_7"
        );
    }

    #[test]
    fn retry_recovers_from_one_failure() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result = tokio_test::block_on(retry_once("test", move || async move {
            if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable("down".into()))
            } else {
                Ok(5)
            }
        }));

        assert_eq!(result.unwrap(), 5);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn retry_surfaces_second_failure() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result: Result<(), _> = tokio_test::block_on(retry_once("test", move || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        }));

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
