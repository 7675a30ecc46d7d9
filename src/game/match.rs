//! Single match: ball, paddles, held keys and the scoreboard

use tracing::debug;

use crate::ws::protocol::ServerMsg;

use super::paddle::{KeyFrame, KeyState, PaddleController};
use super::physics::{Arena, Ball, Collision};
use super::{Side, GAME_END_SCORE};

/// Match phase. `Ended` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Playing,
    Ended,
}

/// What one tick produced
#[derive(Debug, Default)]
pub struct TickReport {
    /// Outbound events in emission order
    pub events: Vec<ServerMsg>,
    pub collision: Option<Collision>,
    /// Set on the tick that ended the match
    pub winner: Option<Side>,
}

/// Match state (owned by the session's tick loop)
#[derive(Debug, Clone)]
pub struct Match {
    arena: Arena,
    ball: Ball,
    paddles: PaddleController,
    keys: KeyState,
    left_score: u32,
    right_score: u32,
    phase: MatchPhase,
    winner: Option<Side>,
}

impl Match {
    pub fn new() -> Self {
        Self::resume(0, 0)
    }

    /// Fresh ball and paddles with a carried-over scoreboard
    pub fn resume(left_score: u32, right_score: u32) -> Self {
        let winner = if left_score >= GAME_END_SCORE {
            Some(Side::Left)
        } else if right_score >= GAME_END_SCORE {
            Some(Side::Right)
        } else {
            None
        };

        Self {
            arena: Arena::standard(),
            ball: Ball::new(),
            paddles: PaddleController::new(),
            keys: KeyState::default(),
            left_score,
            right_score,
            phase: if winner.is_some() {
                MatchPhase::Ended
            } else {
                MatchPhase::Playing
            },
            winner,
        }
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn score(&self, side: Side) -> u32 {
        match side {
            Side::Left => self.left_score,
            Side::Right => self.right_score,
        }
    }

    pub fn ball(&self) -> &Ball {
        &self.ball
    }

    pub fn paddles(&self) -> &PaddleController {
        &self.paddles
    }

    /// Replace the held-key state with a new frame
    pub fn apply_input(&mut self, frame: &KeyFrame) {
        self.keys = KeyState::from_frame(frame);
    }

    /// Move paddles, advance the ball and settle any goal. No-op once ended.
    pub fn tick(&mut self) -> TickReport {
        if self.phase == MatchPhase::Ended {
            return TickReport::default();
        }

        self.paddles.move_panels(&self.keys);
        let collision = self.ball.advance(&self.arena, &self.paddles);

        let mut events = Vec::with_capacity(2);
        let mut winner = None;
        if let Some(Collision::Goal { scorer }) = collision {
            events.push(self.award_point(scorer));
            winner = self.winner;
        }
        events.push(self.state_msg());

        TickReport {
            events,
            collision,
            winner,
        }
    }

    fn award_point(&mut self, scorer: Side) -> ServerMsg {
        let score = match scorer {
            Side::Left => &mut self.left_score,
            Side::Right => &mut self.right_score,
        };
        *score += 1;

        debug!(
            scorer = ?scorer,
            left_score = self.left_score,
            right_score = self.right_score,
            "Point scored"
        );

        if self.score(scorer) >= GAME_END_SCORE {
            self.phase = MatchPhase::Ended;
            self.winner = Some(scorer);
            self.ball.reset();
        }

        self.score_msg()
    }

    pub fn score_msg(&self) -> ServerMsg {
        ServerMsg::Score {
            left_score: self.left_score,
            right_score: self.right_score,
        }
    }

    pub fn state_msg(&self) -> ServerMsg {
        ServerMsg::State {
            ball_pos: self.ball.position().to_array(),
            panel1: self.paddles.paddle(Side::Left).position().to_array(),
            panel2: self.paddles.paddle(Side::Right).position().to_array(),
            ball_rot: self.ball.spin().to_array(),
        }
    }

    #[cfg(test)]
    pub(crate) fn place(&mut self, ball: Ball, paddles: PaddleController) {
        self.ball = ball;
        self.paddles = paddles;
    }
}

impl Default for Match {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::geometry::Vec3;
    use crate::game::paddle::Paddle;
    use crate::game::PADDLE_Z;

    /// Put the ball just past `loser`'s goal line with the paddle out of reach
    pub(crate) fn set_up_miss(game: &mut Match, loser: Side) {
        let sign = loser.goal_sign();
        let far = Paddle::at(Vec3::new(7.0, 7.0, sign * PADDLE_Z));
        let paddles = match loser {
            Side::Left => PaddleController::with_paddles(far, Paddle::home(Side::Right)),
            Side::Right => PaddleController::with_paddles(Paddle::home(Side::Left), far),
        };
        let ball = Ball::at(Vec3::new(0.0, 0.0, sign * 47.99), Vec3::new(0.0, 0.0, sign));
        game.place(ball, paddles);
    }

    /// Play points until `winner` takes the match; returns every report
    pub(crate) fn play_out(game: &mut Match, winner: Side) -> Vec<TickReport> {
        let mut reports = Vec::new();
        while game.phase() == MatchPhase::Playing {
            set_up_miss(game, winner.opponent());
            reports.push(game.tick());
        }
        reports
    }

    fn score_events(reports: &[TickReport]) -> Vec<(u32, u32)> {
        reports
            .iter()
            .flat_map(|r| r.events.iter())
            .filter_map(|e| match e {
                ServerMsg::Score {
                    left_score,
                    right_score,
                } => Some((*left_score, *right_score)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn every_tick_emits_state() {
        let mut game = Match::new();
        let report = game.tick();
        assert_eq!(report.events.len(), 1);
        assert!(matches!(report.events[0], ServerMsg::State { .. }));
        assert_eq!(report.winner, None);
    }

    #[test]
    fn goal_emits_score_then_state() {
        let mut game = Match::new();
        set_up_miss(&mut game, Side::Left);

        let report = game.tick();

        assert_eq!(
            report.events[0],
            ServerMsg::Score {
                left_score: 0,
                right_score: 1
            }
        );
        assert!(matches!(report.events[1], ServerMsg::State { .. }));
        assert_eq!(game.ball().position(), Vec3::ZERO);
    }

    #[test]
    fn scores_only_grow_one_point_at_a_time() {
        let mut game = Match::new();
        let sequence = [Side::Left, Side::Right, Side::Right, Side::Left, Side::Left];
        let mut previous = (0, 0);

        for scorer in sequence {
            if game.phase() == MatchPhase::Ended {
                break;
            }
            set_up_miss(&mut game, scorer.opponent());
            let scores = score_events(&[game.tick()]);
            assert_eq!(scores.len(), 1);

            let now = scores[0];
            assert!(now.0 >= previous.0 && now.1 >= previous.1);
            assert_eq!((now.0 - previous.0) + (now.1 - previous.1), 1);
            previous = now;
        }

        assert_eq!(previous, (3, 2));
    }

    #[test]
    fn match_ends_exactly_at_three() {
        let mut game = Match::new();
        let reports = play_out(&mut game, Side::Left);

        assert_eq!(score_events(&reports), vec![(1, 0), (2, 0), (3, 0)]);
        let winners: Vec<_> = reports.iter().filter_map(|r| r.winner).collect();
        assert_eq!(winners, vec![Side::Left]);
        assert_eq!(game.phase(), MatchPhase::Ended);
        assert_eq!(game.winner(), Some(Side::Left));
    }

    #[test]
    fn ended_match_ignores_further_ticks() {
        let mut game = Match::new();
        play_out(&mut game, Side::Right);

        set_up_miss(&mut game, Side::Right);
        let report = game.tick();

        assert!(report.events.is_empty());
        assert_eq!(game.score(Side::Left), 0);
        assert_eq!(game.score(Side::Right), 3);
    }

    #[test]
    fn resume_restores_scoreboard() {
        let game = Match::resume(2, 1);
        assert_eq!(game.score(Side::Left), 2);
        assert_eq!(game.score(Side::Right), 1);
        assert_eq!(game.phase(), MatchPhase::Playing);

        let done = Match::resume(1, 3);
        assert_eq!(done.phase(), MatchPhase::Ended);
        assert_eq!(done.winner(), Some(Side::Right));
    }

    #[test]
    fn input_moves_paddles_on_tick() {
        let mut game = Match::new();
        let frame: KeyFrame = [("KeyW", true), ("ArrowRight", true)].into_iter().collect();
        game.apply_input(&frame);
        game.tick();
        game.tick();

        let left = game.paddles().paddle(Side::Left).position();
        let right = game.paddles().paddle(Side::Right).position();
        assert!((left.y - 0.4).abs() < 1e-9);
        assert!((right.x + 0.4).abs() < 1e-9);
    }
}
