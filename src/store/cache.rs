//! In-process expiring cache for session snapshots

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::game::SessionData;

use super::{SessionKey, SessionStore, StoreError};

#[derive(Debug, Clone)]
struct CachedSnapshot {
    /// Serialized the same way an external cache would hold it
    json: String,
    expires_at: Instant,
}

/// Session snapshot cache keyed by `(mode, user_id)`
#[derive(Default)]
pub struct MemorySessionStore {
    entries: DashMap<SessionKey, CachedSnapshot>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionData>, StoreError> {
        let Some(entry) = self.entries.get(key).map(|e| e.value().clone()) else {
            return Ok(None);
        };

        if entry.expires_at <= Instant::now() {
            self.entries.remove(key);
            debug!(key = %key, "Session snapshot expired");
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&entry.json)?))
    }

    async fn save(
        &self,
        key: &SessionKey,
        data: &SessionData,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(data)?;
        self.entries.insert(
            *key,
            CachedSnapshot {
                json,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}
