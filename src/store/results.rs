//! Finished game and tournament records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ResultStore, StoreError};

/// One finished match. The id is assigned once so a retried write lands on
/// the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: Uuid,
    pub user_id: u64,
    pub player1_nick: String,
    pub player2_nick: String,
    pub player1_score: u32,
    pub player2_score: u32,
    /// "1on1" or "Tournament"
    pub mode: String,
}

/// A finished bracket: both semifinals and the final, in play order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentRecord {
    pub id: Uuid,
    pub user_id: u64,
    pub games: Vec<GameRecord>,
}

#[derive(Debug, Clone)]
pub struct StoredGame {
    pub id: Uuid,
    pub tournament_id: Option<Uuid>,
    pub record: GameRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredTournament {
    pub id: Uuid,
    pub user_id: u64,
    pub game_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Result store kept in process memory, used when no results API is configured.
/// Writes are keyed by record id, so repeating one replaces the earlier row.
#[derive(Default)]
pub struct MemoryResultStore {
    games: Mutex<Vec<StoredGame>>,
    tournaments: Mutex<Vec<StoredTournament>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert_game(&self, record: &GameRecord, tournament_id: Option<Uuid>) -> Uuid {
        let row = StoredGame {
            id: record.id,
            tournament_id,
            record: record.clone(),
            created_at: Utc::now(),
        };

        let mut games = self.games.lock();
        match games.iter_mut().find(|g| g.id == record.id) {
            Some(existing) => *existing = row,
            None => games.push(row),
        }
        record.id
    }

    #[cfg(test)]
    pub fn games(&self) -> Vec<StoredGame> {
        self.games.lock().clone()
    }

    #[cfg(test)]
    pub fn tournaments(&self) -> Vec<StoredTournament> {
        self.tournaments.lock().clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_game(&self, record: &GameRecord) -> Result<Uuid, StoreError> {
        Ok(self.upsert_game(record, None))
    }

    async fn save_tournament(&self, record: &TournamentRecord) -> Result<Uuid, StoreError> {
        let game_ids = record
            .games
            .iter()
            .map(|game| self.upsert_game(game, Some(record.id)))
            .collect();
        let row = StoredTournament {
            id: record.id,
            user_id: record.user_id,
            game_ids,
            created_at: Utc::now(),
        };

        let mut tournaments = self.tournaments.lock();
        match tournaments.iter_mut().find(|t| t.id == record.id) {
            Some(existing) => *existing = row,
            None => tournaments.push(row),
        }
        Ok(record.id)
    }
}
