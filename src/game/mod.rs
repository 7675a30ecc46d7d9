//! Game simulation modules

pub mod geometry;
pub mod r#match;
pub mod paddle;
pub mod physics;
pub mod registry;
pub mod scheduler;
pub mod session;

pub use registry::SessionRegistry;
pub use scheduler::{GameDriver, TickTiming};
pub use session::{GameSession, PlayMode, SessionData, SessionError};

/// Points needed to win a match
pub const GAME_END_SCORE: u32 = 3;

/// |z| of both paddle planes
pub const PADDLE_Z: f64 = 50.0;

/// Player side. Left owns the paddle at +z (`panel1`), right the one at -z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Sign of the z coordinate of this side's paddle
    pub fn goal_sign(self) -> f64 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }
}
