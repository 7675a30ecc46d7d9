//! Live connection registry

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use super::PlayMode;

#[derive(Debug, Clone)]
pub struct LiveConnection {
    pub user_id: u64,
    pub mode: PlayMode,
    pub connected_at: DateTime<Utc>,
}

/// Open game connections. Two connections for the same user and mode are
/// allowed; their snapshot writes race and the last one wins.
#[derive(Default)]
pub struct SessionRegistry {
    connections: DashMap<Uuid, LiveConnection>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: u64, mode: PlayMode) -> Uuid {
        let duplicate = self
            .connections
            .iter()
            .any(|c| c.user_id == user_id && c.mode == mode);
        if duplicate {
            warn!(user_id, mode = %mode, "User already has a live session in this mode");
        }

        let id = Uuid::new_v4();
        self.connections.insert(
            id,
            LiveConnection {
                user_id,
                mode,
                connected_at: Utc::now(),
            },
        );
        id
    }

    pub fn remove(&self, id: &Uuid) -> Option<LiveConnection> {
        self.connections.remove(id).map(|(_, c)| c)
    }

    pub fn active_sessions(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_remove() {
        let registry = SessionRegistry::new();
        let a = registry.register(1, PlayMode::Normal);
        let b = registry.register(1, PlayMode::Normal);
        registry.register(2, PlayMode::Tournament);

        assert_ne!(a, b);
        assert_eq!(registry.active_sessions(), 3);

        let removed = registry.remove(&a).unwrap();
        assert_eq!(removed.user_id, 1);
        assert!(registry.remove(&a).is_none());
        assert_eq!(registry.active_sessions(), 2);
    }
}
