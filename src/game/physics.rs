//! Ball motion and collision response

use super::geometry::{Plane, Vec3};
use super::paddle::PaddleController;
use super::{Side, PADDLE_Z};

pub const BALL_RADIUS: f64 = 2.0;
/// Distance covered by a unit-velocity ball in one tick
pub const DISTANCE_PER_TICK: f64 = 0.4;
/// Linear substeps per tick, each checked for collisions
pub const SUBSTEPS: u32 = 10;
/// |z| at which the ball is judged against a paddle
pub const GOAL_LINE: f64 = 48.0;
/// Side walls sit at x = ±ARENA_HALF_WIDTH and y = ±ARENA_HALF_WIDTH
pub const ARENA_HALF_WIDTH: f64 = 10.0;

const WALL_SPIN_LOSS: f64 = 0.01;
const PADDLE_FORWARD_NUDGE: f64 = 0.04;
const PADDLE_AIM_BIAS: f64 = 2.0;
const PADDLE_AIM_SCALE: f64 = 24.0;

const BALL_MASS: f64 = 4.0;
const BALL_INERTIA: f64 = 0.4 * BALL_MASS * BALL_RADIUS * BALL_RADIUS;
const SPIN_DT: f64 = 0.1;
const SPIN_DAMPING: f64 = 0.5;

/// Serve direction after every point
pub const SERVE_VELOCITY: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Fixed playfield: four side walls and the two paddle planes
#[derive(Debug, Clone)]
pub struct Arena {
    walls: [Plane; 4],
    left_goal: Plane,
    right_goal: Plane,
}

impl Arena {
    pub fn standard() -> Self {
        Self {
            walls: [
                Plane::new(Vec3::new(1.0, 0.0, 0.0), ARENA_HALF_WIDTH),
                Plane::new(Vec3::new(-1.0, 0.0, 0.0), ARENA_HALF_WIDTH),
                Plane::new(Vec3::new(0.0, 1.0, 0.0), ARENA_HALF_WIDTH),
                Plane::new(Vec3::new(0.0, -1.0, 0.0), ARENA_HALF_WIDTH),
            ],
            left_goal: Plane::new(Vec3::new(0.0, 0.0, -1.0), PADDLE_Z),
            right_goal: Plane::new(Vec3::new(0.0, 0.0, 1.0), PADDLE_Z),
        }
    }

    /// First side wall (in fixed order) the ball is touching
    fn wall_contact(&self, center: Vec3) -> Option<&Plane> {
        self.walls.iter().find(|w| w.distance(center) <= BALL_RADIUS)
    }

    pub fn goal_plane(&self, side: Side) -> &Plane {
        match side {
            Side::Left => &self.left_goal,
            Side::Right => &self.right_goal,
        }
    }

    /// Which side's goal area the point has entered, if any
    fn goal_area(&self, center: Vec3) -> Option<Side> {
        if center.z >= GOAL_LINE {
            Some(Side::Left)
        } else if center.z <= -GOAL_LINE {
            Some(Side::Right)
        } else {
            None
        }
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::standard()
    }
}

/// Notable contact during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collision {
    Wall,
    Paddle(Side),
    /// Ball got past `Side`'s paddle; the opponent scores
    Goal { scorer: Side },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ball {
    position: Vec3,
    velocity: Vec3,
    spin: Vec3,
}

impl Ball {
    pub fn new() -> Self {
        Self::at(Vec3::ZERO, SERVE_VELOCITY)
    }

    pub fn at(position: Vec3, velocity: Vec3) -> Self {
        Self {
            position,
            velocity,
            spin: Vec3::ZERO,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn spin(&self) -> Vec3 {
        self.spin
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance one tick in `SUBSTEPS` linear moves.
    ///
    /// At most one side wall is resolved per tick; the remaining substeps
    /// are dropped after a wall bounce. A goal resets the ball and ends the
    /// tick. A paddle contact is reported even when a wall follows it in the
    /// same tick.
    pub fn advance(&mut self, arena: &Arena, paddles: &PaddleController) -> Option<Collision> {
        let step = DISTANCE_PER_TICK / SUBSTEPS as f64;
        let mut last = None;

        for _ in 0..SUBSTEPS {
            self.position = self.position + self.velocity * step;

            if let Some(wall) = arena.wall_contact(self.position) {
                self.bounce_off_wall(wall);
                return Some(last.unwrap_or(Collision::Wall));
            }

            if let Some(side) = arena.goal_area(self.position) {
                let paddle = paddles.paddle(side);
                if paddle.covers(self.position) {
                    self.bounce_off_paddle(arena.goal_plane(side), paddle.position());
                    last = Some(Collision::Paddle(side));
                } else {
                    self.reset();
                    return Some(Collision::Goal {
                        scorer: side.opponent(),
                    });
                }
            }
        }

        last
    }

    /// Put the center exactly one radius off the plane and shed a little spin
    fn snap_to(&mut self, plane: &Plane) {
        self.spin = self.spin - plane.normal * WALL_SPIN_LOSS;
        self.position = plane.project(self.position) + plane.normal * BALL_RADIUS;
    }

    fn bounce_off_wall(&mut self, wall: &Plane) {
        self.snap_to(wall);
        self.velocity = self.velocity.reflect(wall.normal);
    }

    /// Reflect off the paddle plane, then aim by where the paddle was hit
    fn bounce_off_paddle(&mut self, plane: &Plane, paddle: Vec3) {
        self.snap_to(plane);
        self.velocity = self.velocity.reflect(plane.normal);
        self.damp_spin();

        let aim = |paddle_axis: f64, ball_axis: f64| {
            (PADDLE_AIM_BIAS - (paddle_axis - ball_axis)) / PADDLE_AIM_SCALE
        };
        self.velocity = Vec3::new(
            aim(paddle.x, self.position.x),
            aim(paddle.y, self.position.y),
            self.velocity.z + plane.normal.z * PADDLE_FORWARD_NUDGE,
        );
    }

    /// Rolling friction against the current spin, then flat damping.
    /// Only affects the rendered rotation.
    fn damp_spin(&mut self) {
        let friction_torque = -self.spin;
        let angular_acceleration = friction_torque * (1.0 / BALL_INERTIA);
        self.spin = (self.spin + angular_acceleration * SPIN_DT) * SPIN_DAMPING;
    }
}

impl Default for Ball {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::paddle::Paddle;
    use assert_approx_eq::assert_approx_eq;

    fn centered_paddles() -> PaddleController {
        PaddleController::new()
    }

    #[test]
    fn free_flight_moves_one_tick_distance() {
        let arena = Arena::standard();
        let mut ball = Ball::new();
        assert_eq!(ball.advance(&arena, &centered_paddles()), None);
        assert_approx_eq!(ball.position().z, DISTANCE_PER_TICK);
        assert_eq!(ball.velocity(), SERVE_VELOCITY);
    }

    #[test]
    fn side_wall_reflects_and_pushes_out() {
        let arena = Arena::standard();
        let mut ball = Ball::at(Vec3::new(-7.9, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.5));

        let hit = ball.advance(&arena, &centered_paddles());

        assert_eq!(hit, Some(Collision::Wall));
        assert_approx_eq!(ball.position().x, -8.0);
        assert_approx_eq!(ball.velocity().x, 1.0);
        assert_approx_eq!(ball.velocity().z, 0.5);
        assert_approx_eq!(ball.spin().x, -WALL_SPIN_LOSS);
    }

    #[test]
    fn wall_bounce_keeps_speed() {
        let arena = Arena::standard();
        let mut ball = Ball::at(Vec3::new(0.0, 7.95, 3.0), Vec3::new(0.2, 0.9, -0.4));
        let before = ball.velocity().length();

        assert_eq!(ball.advance(&arena, &centered_paddles()), Some(Collision::Wall));
        assert_approx_eq!(ball.velocity().length(), before, 1e-12);
        assert!(ball.velocity().y < 0.0);
    }

    #[test]
    fn only_one_wall_per_tick() {
        let arena = Arena::standard();
        // Heading into the x = -10 / y = -10 corner
        let mut ball = Ball::at(Vec3::new(-7.99, -7.99, 0.0), Vec3::new(-1.0, -1.0, 0.0));

        assert_eq!(ball.advance(&arena, &centered_paddles()), Some(Collision::Wall));
        assert_approx_eq!(ball.velocity().x, 1.0);
        assert_approx_eq!(ball.velocity().y, -1.0);
    }

    #[test]
    fn ball_near_paddle_bounces_back() {
        let arena = Arena::standard();
        let paddles = centered_paddles();
        let mut ball = Ball::at(Vec3::new(0.0, 0.0, 47.5), Vec3::new(0.0, 0.0, 1.0));

        let mut bounce = None;
        for _ in 0..3 {
            let before = ball.position().z;
            match ball.advance(&arena, &paddles) {
                Some(hit) => {
                    bounce = Some(hit);
                    break;
                }
                None => {
                    assert!(ball.position().z > before);
                    assert!(ball.position().z < GOAL_LINE);
                    assert!(ball.velocity().z > 0.0);
                }
            }
        }

        assert_eq!(bounce, Some(Collision::Paddle(Side::Left)));
        assert!(ball.velocity().z < 0.0);
        assert!(ball.position().z <= GOAL_LINE);
        assert_approx_eq!(ball.velocity().x, PADDLE_AIM_BIAS / PADDLE_AIM_SCALE);
        assert_approx_eq!(ball.velocity().y, PADDLE_AIM_BIAS / PADDLE_AIM_SCALE);
    }

    #[test]
    fn paddle_bounce_pushes_ball_forward() {
        let arena = Arena::standard();
        let paddles = centered_paddles();
        let mut ball = Ball::at(Vec3::new(1.0, -2.0, -47.99), Vec3::new(0.0, 0.0, -1.0));

        assert_eq!(
            ball.advance(&arena, &paddles),
            Some(Collision::Paddle(Side::Right))
        );
        assert_approx_eq!(ball.velocity().z, 1.04);
        assert_approx_eq!(ball.velocity().x, (2.0 - (0.0 - 1.0)) / 24.0);
        assert_approx_eq!(ball.velocity().y, (2.0 - (0.0 + 2.0)) / 24.0);
        assert!(ball.position().z > -GOAL_LINE);
    }

    #[test]
    fn missing_paddle_scores_for_opponent() {
        let arena = Arena::standard();
        let paddles = PaddleController::with_paddles(
            Paddle::at(Vec3::new(9.0, 9.0, PADDLE_Z)),
            Paddle::home(Side::Right),
        );
        let mut ball = Ball::at(Vec3::new(0.0, 0.0, 49.0), Vec3::new(0.0, 0.0, 1.0));

        let hit = ball.advance(&arena, &paddles);

        assert_eq!(hit, Some(Collision::Goal { scorer: Side::Right }));
        assert_eq!(ball.position(), Vec3::ZERO);
        assert_eq!(ball.velocity(), SERVE_VELOCITY);
        assert_eq!(ball.spin(), Vec3::ZERO);
    }

    #[test]
    fn paddle_bounce_damps_spin() {
        let arena = Arena::standard();
        let paddles = PaddleController::with_paddles(
            Paddle::at(Vec3::new(0.0, -7.0, PADDLE_Z)),
            Paddle::home(Side::Right),
        );
        let mut ball = Ball::at(Vec3::new(0.0, -7.99, 47.99), Vec3::new(0.0, -1.0, 1.0));

        // Wall first, then the paddle on the next tick
        assert_eq!(ball.advance(&arena, &paddles), Some(Collision::Wall));
        let spin_after_wall = ball.spin();
        assert_approx_eq!(spin_after_wall.y, -WALL_SPIN_LOSS);

        assert_eq!(
            ball.advance(&arena, &paddles),
            Some(Collision::Paddle(Side::Left))
        );
        assert!(ball.spin().y.abs() < spin_after_wall.y.abs());
        assert!(ball.velocity().y > 0.0);
        assert!(ball.velocity().z < 0.0);
    }

    #[test]
    fn paddle_hit_is_reported_over_later_wall() {
        let arena = Arena::standard();
        let paddles = PaddleController::with_paddles(
            Paddle::at(Vec3::new(0.0, 7.0, PADDLE_Z)),
            Paddle::home(Side::Right),
        );
        let mut ball = Ball::at(Vec3::new(0.0, 7.99, 47.99), Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(ball.advance(&arena, &paddles), Some(Collision::Wall));

        // High on the paddle the aim sends the ball back into the y = 10 wall
        assert_eq!(
            ball.advance(&arena, &paddles),
            Some(Collision::Paddle(Side::Left))
        );
        assert!(ball.velocity().y < 0.0);
        assert!(ball.velocity().z < 0.0);
    }
}
