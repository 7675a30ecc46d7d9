//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::paddle::KeyFrame;

/// Text frames sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Begin (or continue to the next bracket match) the tick loop
    Start,
    Pause,
    Resume,
    /// Latest held-key snapshot
    Keys(KeyFrame),
}

impl ClientCommand {
    /// Control words are matched verbatim; anything else must be a JSON
    /// object of key name -> bool
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        match text {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            other => serde_json::from_str(other)
                .map(Self::Keys)
                .map_err(ProtocolError::MalformedInput),
        }
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Per-tick world state
    State {
        ball_pos: [f64; 3],
        panel1: [f64; 3],
        panel2: [f64; 3],
        ball_rot: [f64; 3],
    },

    /// Sent on every goal
    Score { left_score: u32, right_score: u32 },

    /// The current match (or the whole tournament) is over
    GameEnd,

    /// Error message
    Error { code: String, message: String },
}

impl ServerMsg {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed input frame: {0}")]
    MalformedInput(#[source] serde_json::Error),
}
