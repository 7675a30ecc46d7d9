//! Session snapshot and match/tournament orchestration
//!
//! A session wraps the live [`Match`] with the data that survives
//! reconnects. Normal sessions are one match; tournament sessions are a
//! four-player single-elimination bracket of three matches played in
//! order. The only behavior that differs between the two is what happens
//! when a match ends ([`GameSession::on_match_ended`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{
    retry_once, GameRecord, ResultStore, SessionKey, SessionStore, StoreError, TournamentRecord,
};

use super::paddle::KeyFrame;
use super::r#match::{Match, MatchPhase, TickReport};
use super::{Side, GAME_END_SCORE};

/// Matches in a bracket: two semifinals and the final
pub const MATCHES_PER_TOURNAMENT: usize = 3;
const FINAL_MATCH: usize = 2;

const NORMAL_RECORD_TAG: &str = "1on1";
const TOURNAMENT_RECORD_TAG: &str = "Tournament";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    Normal,
    Tournament,
}

impl PlayMode {
    /// Route segment to mode. Anything but "tournament" is a normal game.
    pub fn from_path(segment: &str) -> Self {
        if segment == "tournament" {
            Self::Tournament
        } else {
            Self::Normal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Tournament => "tournament",
        }
    }

    pub fn player_count(self) -> usize {
        match self {
            Self::Normal => 2,
            Self::Tournament => 4,
        }
    }

    fn default_players(self) -> Vec<String> {
        (1..=self.player_count())
            .map(|i| format!("player{i}"))
            .collect()
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player indices (into `players_name`) for one bracket match
pub type BracketSlot = [Option<usize>; 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub player1_nick: String,
    pub player2_nick: String,
    pub player1_score: u32,
    pub player2_score: u32,
}

impl MatchResult {
    fn into_record(self, user_id: u64, mode: &str) -> GameRecord {
        GameRecord {
            id: Uuid::new_v4(),
            user_id,
            player1_nick: self.player1_nick,
            player2_nick: self.player2_nick,
            player1_score: self.player1_score,
            player2_score: self.player2_score,
            mode: mode.to_string(),
        }
    }
}

/// Bracket position of a tournament session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentProgress {
    /// Index of the match being played, 0..=2; 3 once the final is done
    pub current_match: usize,
    /// Winner's player index per finished match, in play order
    pub win_history: Vec<usize>,
    pub match_results: Vec<MatchResult>,
    pub matches: [BracketSlot; MATCHES_PER_TOURNAMENT],
}

impl Default for TournamentProgress {
    fn default() -> Self {
        Self {
            current_match: 0,
            win_history: Vec::new(),
            match_results: Vec::new(),
            matches: [[Some(0), Some(1)], [Some(2), Some(3)], [None, None]],
        }
    }
}

impl TournamentProgress {
    pub fn is_finished(&self) -> bool {
        self.current_match >= MATCHES_PER_TOURNAMENT
    }

    /// Player indices of the match currently being played
    pub fn pairing(&self) -> Result<(usize, usize), SessionError> {
        let slot = self.matches.get(self.current_match).ok_or_else(|| {
            SessionError::InvalidBracket(format!("match index {} out of range", self.current_match))
        })?;

        match *slot {
            [Some(p1), Some(p2)] => Ok((p1, p2)),
            _ => Err(SessionError::InvalidBracket(format!(
                "bracket slot {} has no players",
                self.current_match
            ))),
        }
    }

    /// Record the finished current match and move the bracket forward.
    /// Nothing is modified when an error is returned.
    pub fn record(
        &mut self,
        players_name: &[String],
        left_score: u32,
        right_score: u32,
    ) -> Result<(), SessionError> {
        let (p1, p2) = self.pairing()?;
        let nick = |index: usize| {
            players_name.get(index).cloned().ok_or_else(|| {
                SessionError::InvalidBracket(format!("no player name at index {index}"))
            })
        };
        let result = MatchResult {
            player1_nick: nick(p1)?,
            player2_nick: nick(p2)?,
            player1_score: left_score,
            player2_score: right_score,
        };

        let winner = match left_score.cmp(&right_score) {
            std::cmp::Ordering::Greater => p1,
            std::cmp::Ordering::Less => p2,
            std::cmp::Ordering::Equal => {
                return Err(SessionError::TiedMatch {
                    match_index: self.current_match,
                    score: left_score,
                })
            }
        };

        let next_match = self.current_match + 1;
        // The final is wired from both semifinal winners
        let final_slot = match (next_match == FINAL_MATCH, self.win_history.as_slice()) {
            (false, _) => None,
            (true, &[first]) => Some([Some(first), Some(winner)]),
            (true, history) => {
                return Err(SessionError::InvalidBracket(format!(
                    "{} winners recorded before the second semifinal",
                    history.len()
                )))
            }
        };

        self.match_results.push(result);
        self.win_history.push(winner);
        self.current_match = next_match;
        if let Some(slot) = final_slot {
            self.matches[FINAL_MATCH] = slot;
        }

        Ok(())
    }

    /// Whether a stored bracket can be played on from `current_match`
    fn is_resumable(&self, player_count: usize) -> bool {
        let played = self.current_match;
        let indices_in_range = self
            .matches
            .iter()
            .flatten()
            .flatten()
            .chain(self.win_history.iter())
            .all(|&index| index < player_count);
        let final_wired = played < FINAL_MATCH
            || self.matches[FINAL_MATCH]
                == [
                    self.win_history.first().copied(),
                    self.win_history.get(1).copied(),
                ];

        !self.is_finished()
            && self.win_history.len() == played
            && self.match_results.len() == played
            && indices_in_range
            && final_wired
    }
}

/// Reconnect-survivable session snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: u64,
    pub mode: PlayMode,
    pub players_name: Vec<String>,
    pub left_score: u32,
    pub right_score: u32,
    /// Present exactly when `mode` is tournament
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tournament: Option<TournamentProgress>,
}

impl SessionData {
    pub fn new(user_id: u64, mode: PlayMode) -> Self {
        Self {
            user_id,
            mode,
            players_name: mode.default_players(),
            left_score: 0,
            right_score: 0,
            tournament: match mode {
                PlayMode::Normal => None,
                PlayMode::Tournament => Some(TournamentProgress::default()),
            },
        }
    }

    /// Fresh session with caller-chosen display names
    pub fn with_players(
        user_id: u64,
        mode: PlayMode,
        players_name: Vec<String>,
    ) -> Result<Self, SessionError> {
        if players_name.len() != mode.player_count() {
            return Err(SessionError::PlayerCount {
                mode,
                expected: mode.player_count(),
                got: players_name.len(),
            });
        }

        Ok(Self {
            players_name,
            ..Self::new(user_id, mode)
        })
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(self.mode, self.user_id)
    }

    /// 1-based round shown to players
    pub fn game_round(&self) -> usize {
        self.tournament.as_ref().map_or(1, |t| t.current_match + 1)
    }

    pub fn win_history(&self) -> &[usize] {
        self.tournament.as_ref().map_or(&[], |t| t.win_history.as_slice())
    }

    /// Replace snapshots that cannot be resumed. Returns the usable data.
    fn sanitized(mut self) -> Self {
        let bracket_ok = match (self.mode, &self.tournament) {
            (PlayMode::Normal, None) => true,
            (PlayMode::Tournament, Some(t)) => t.is_resumable(self.players_name.len()),
            _ => false,
        };
        if !bracket_ok || self.players_name.len() < self.mode.player_count() {
            warn!(
                user_id = self.user_id,
                mode = %self.mode,
                "Discarding unusable session snapshot"
            );
            return Self::new(self.user_id, self.mode);
        }

        if self.left_score >= GAME_END_SCORE || self.right_score >= GAME_END_SCORE {
            warn!(
                user_id = self.user_id,
                left_score = self.left_score,
                right_score = self.right_score,
                "Snapshot holds a finished scoreboard, resetting live scores"
            );
            self.left_score = 0;
            self.right_score = 0;
        }

        self
    }
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid bracket state: {0}")]
    InvalidBracket(String),

    #[error("Match {match_index} ended tied at {score}")]
    TiedMatch { match_index: usize, score: u32 },

    #[error("Tick task panicked")]
    TaskPanicked,

    #[error("{mode} mode needs {expected} player names, got {got}")]
    PlayerCount {
        mode: PlayMode,
        expected: usize,
        got: usize,
    },
}

impl SessionError {
    /// Invariant violations end the session; store failures do not
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidBracket(_) | Self::TiedMatch { .. } | Self::TaskPanicked
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    /// Results are saved; nothing left to play
    Completed,
}

/// Stores a session reads from and writes to
#[derive(Clone)]
pub struct SessionStores {
    pub sessions: Arc<dyn SessionStore>,
    pub results: Arc<dyn ResultStore>,
    pub ttl: Duration,
}

/// One connection's game: the live match plus its snapshot
pub struct GameSession {
    data: SessionData,
    current: Match,
    status: SessionStatus,
    stores: SessionStores,
}

impl GameSession {
    pub fn new(data: SessionData, stores: SessionStores) -> Self {
        Self {
            current: Match::resume(data.left_score, data.right_score),
            data,
            status: SessionStatus::Active,
            stores,
        }
    }

    /// Resume the cached snapshot for `key`, or start from defaults
    pub async fn load(key: SessionKey, stores: SessionStores) -> Self {
        let data = match stores.sessions.load(&key).await {
            Ok(Some(data)) => {
                info!(key = %key, round = data.game_round(), "Resuming session");
                data.sanitized()
            }
            Ok(None) => SessionData::new(key.user_id, key.mode),
            Err(e) => {
                error!(key = %key, error = %e, "Failed to load session snapshot, starting fresh");
                SessionData::new(key.user_id, key.mode)
            }
        };

        Self::new(data, stores)
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn is_complete(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    pub fn current_match(&self) -> &Match {
        &self.current
    }

    pub fn apply_input(&mut self, frame: &KeyFrame) {
        self.current.apply_input(frame);
    }

    /// Advance the live match one tick, keeping the snapshot's scores in step
    pub fn tick(&mut self) -> TickReport {
        let report = self.current.tick();
        self.data.left_score = self.current.score(Side::Left);
        self.data.right_score = self.current.score(Side::Right);
        report
    }

    /// Make sure a playable match is loaded. Returns false once the session
    /// is complete.
    pub fn begin_next_match(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        if self.current.phase() == MatchPhase::Ended {
            self.current = Match::resume(self.data.left_score, self.data.right_score);
            info!(
                user_id = self.data.user_id,
                round = self.data.game_round(),
                "Starting next bracket match"
            );
        }
        true
    }

    /// Settle the finished match: save results and update or clear the
    /// snapshot. In-memory state is updated before any store write, so a
    /// store error leaves the session consistent.
    pub async fn on_match_ended(&mut self, winner: Side) -> Result<SessionStatus, SessionError> {
        info!(
            user_id = self.data.user_id,
            mode = %self.data.mode,
            winner = ?winner,
            left_score = self.data.left_score,
            right_score = self.data.right_score,
            "Match ended"
        );

        match self.data.mode {
            PlayMode::Normal => self.finish_normal().await,
            PlayMode::Tournament => self.advance_bracket().await,
        }
    }

    async fn finish_normal(&mut self) -> Result<SessionStatus, SessionError> {
        self.status = SessionStatus::Completed;

        // Ids are fixed before the first attempt so a retry overwrites
        let record = GameRecord {
            id: Uuid::new_v4(),
            user_id: self.data.user_id,
            player1_nick: self.data.players_name[0].clone(),
            player2_nick: self.data.players_name[1].clone(),
            player1_score: self.data.left_score,
            player2_score: self.data.right_score,
            mode: NORMAL_RECORD_TAG.to_string(),
        };

        let results = self.stores.results.as_ref();
        let record = &record;
        let save = move || results.save_game(record);
        let saved = retry_once("save game", save).await;
        let cleared = self.stores.sessions.delete(&self.data.key()).await;

        let game_id = saved?;
        cleared?;
        info!(user_id = self.data.user_id, game_id = %game_id, "Normal game saved");
        Ok(self.status)
    }

    async fn advance_bracket(&mut self) -> Result<SessionStatus, SessionError> {
        let progress = self.data.tournament.as_mut().ok_or_else(|| {
            SessionError::InvalidBracket("tournament session without a bracket".to_string())
        })?;
        progress.record(
            &self.data.players_name,
            self.data.left_score,
            self.data.right_score,
        )?;
        self.data.left_score = 0;
        self.data.right_score = 0;

        if !progress.is_finished() {
            info!(
                user_id = self.data.user_id,
                next_match = progress.current_match,
                win_history = ?progress.win_history,
                "Tournament advanced"
            );
            self.stores
                .sessions
                .save(&self.data.key(), &self.data, self.stores.ttl)
                .await?;
            return Ok(self.status);
        }

        self.status = SessionStatus::Completed;
        let record = TournamentRecord {
            id: Uuid::new_v4(),
            user_id: self.data.user_id,
            games: progress
                .match_results
                .iter()
                .cloned()
                .map(|r| r.into_record(self.data.user_id, TOURNAMENT_RECORD_TAG))
                .collect(),
        };

        let results = self.stores.results.as_ref();
        let record = &record;
        let save = move || results.save_tournament(record);
        let saved = retry_once("save tournament", save).await;
        let cleared = self.stores.sessions.delete(&self.data.key()).await;

        let tournament_id = saved?;
        cleared?;
        info!(
            user_id = self.data.user_id,
            tournament_id = %tournament_id,
            "Tournament complete"
        );
        Ok(self.status)
    }

    /// Write the snapshot so a reconnect resumes here. Completed sessions
    /// have nothing to resume.
    pub async fn persist_snapshot(&self) -> Result<(), SessionError> {
        if self.is_complete() {
            return Ok(());
        }
        self.stores
            .sessions
            .save(&self.data.key(), &self.data, self.stores.ttl)
            .await?;
        info!(
            user_id = self.data.user_id,
            mode = %self.data.mode,
            left_score = self.data.left_score,
            right_score = self.data.right_score,
            "Session snapshot saved"
        );
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn current_mut(&mut self) -> &mut Match {
        &mut self.current
    }
}
