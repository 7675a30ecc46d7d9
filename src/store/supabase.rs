//! PostgREST client for durable game history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::ResultsApiConfig;

use super::results::{GameRecord, TournamentRecord};
use super::{ResultStore, StoreError};

/// Insert, or merge into the row with the same primary key
const UPSERT_PREFER: &str = "return=representation,resolution=merge-duplicates";

/// Supabase REST client using the service role key
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &ResultsApiConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_role_key: config.key.clone(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Insert-or-merge URL keyed on the primary key
    fn upsert_url(&self, table: &str) -> String {
        format!("{}?on_conflict=id", self.rest_url(table))
    }

    /// Make an authenticated POST request (upsert on `id`). Repeating it
    /// with the same row leaves one row.
    pub async fn upsert<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        data: &T,
    ) -> Result<R, SupabaseError> {
        let url = self.upsert_url(table);

        let response = self
            .client
            .post(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .header("Prefer", UPSERT_PREFER)
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api { status: status.as_u16(), body });
        }

        // PostgREST returns an array, get first element
        let results: Vec<R> = response.json().await.map_err(SupabaseError::Parse)?;
        results
            .into_iter()
            .next()
            .ok_or(SupabaseError::NoRowReturned)
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), SupabaseError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .client
            .patch(&url)
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SupabaseError::Api { status: status.as_u16(), body });
        }

        Ok(())
    }
}

/// Row for the `games` table
#[derive(Debug, Clone, Serialize)]
struct NewGameRow<'a> {
    id: Uuid,
    user_id: u64,
    player1_nick: &'a str,
    player2_nick: &'a str,
    player1_score: u32,
    player2_score: u32,
    mode: &'a str,
    tournament_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'a> NewGameRow<'a> {
    fn new(record: &'a GameRecord, tournament_id: Option<Uuid>) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            player1_nick: &record.player1_nick,
            player2_nick: &record.player2_nick,
            player1_score: record.player1_score,
            player2_score: record.player2_score,
            mode: &record.mode,
            tournament_id,
            created_at: Utc::now(),
        }
    }
}

/// Row for the `tournaments` table
#[derive(Debug, Clone, Serialize)]
struct NewTournamentRow {
    id: Uuid,
    user_id: u64,
    created_at: DateTime<Utc>,
}

/// Links a tournament to its three games once they exist
#[derive(Debug, Clone, Serialize)]
struct TournamentGames {
    game1: Uuid,
    game2: Uuid,
    game3: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
struct InsertedRow {
    id: Uuid,
}

/// Durable results persisted through PostgREST
#[derive(Clone)]
pub struct SupabaseResultStore {
    client: SupabaseClient,
}

impl SupabaseResultStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    async fn upsert_game(
        &self,
        record: &GameRecord,
        tournament_id: Option<Uuid>,
    ) -> Result<Uuid, SupabaseError> {
        let row: InsertedRow = self
            .client
            .upsert("games", &NewGameRow::new(record, tournament_id))
            .await?;
        Ok(row.id)
    }
}

/// Every row id comes from the record, so a retry after a partial failure
/// merges into the rows already written.
#[async_trait]
impl ResultStore for SupabaseResultStore {
    async fn save_game(&self, record: &GameRecord) -> Result<Uuid, StoreError> {
        let id = self.upsert_game(record, None).await?;
        info!(game_id = %id, user_id = record.user_id, "Saved game result");
        Ok(id)
    }

    async fn save_tournament(&self, record: &TournamentRecord) -> Result<Uuid, StoreError> {
        let [g1, g2, g3] = record.games.as_slice() else {
            return Err(StoreError::Unavailable(format!(
                "tournament record needs 3 games, got {}",
                record.games.len()
            )));
        };

        let tournament = NewTournamentRow {
            id: record.id,
            user_id: record.user_id,
            created_at: Utc::now(),
        };
        let inserted: InsertedRow = self.client.upsert("tournaments", &tournament).await?;

        let games = TournamentGames {
            game1: self.upsert_game(g1, Some(inserted.id)).await?,
            game2: self.upsert_game(g2, Some(inserted.id)).await?,
            game3: self.upsert_game(g3, Some(inserted.id)).await?,
        };
        self.client
            .update("tournaments", &format!("id=eq.{}", inserted.id), &games)
            .await?;

        info!(
            tournament_id = %inserted.id,
            user_id = record.user_id,
            "Saved tournament result"
        );
        Ok(inserted.id)
    }
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(#[source] reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,
}
