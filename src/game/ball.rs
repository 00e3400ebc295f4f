//! Ball integration, wall and paddle reflection, goal detection

use crate::game::{
    PaddleState, BAT_DISTANCE, LEFT_GOAL_LINE, PADDLE_BOUNCE_X, PADDLE_BOUNCE_Y, PADDLE_REACH,
    RIGHT_GOAL_LINE, SERVE_ANGLE_MIN, SERVE_SPEED, WALL_LIMIT,
};
use crate::types::{PerSide, PlayerSide, Vec2};
use rand::Rng;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BallState {
    pub position: Vec2,
    pub velocity: Vec2,
}

/// What happened during a single ball step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BallStep {
    pub wall_bounce: bool,
    pub paddle_hit: Option<PlayerSide>,
    /// Side whose goal line the ball crossed; the opponent scores
    pub goal: Option<PlayerSide>,
}

impl BallState {
    pub fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }

    /// Fresh ball at the center, heading off at a random angle
    ///
    /// The angle is drawn from [0.2, 1.2) radians off the x axis and each
    /// axis gets an independent random sign, so every quadrant is possible
    /// but the ball never starts close to vertical.
    pub fn serve<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let angle = SERVE_ANGLE_MIN + rng.gen::<f64>();
        let vx = if rng.gen_bool(0.5) { angle.cos() } else { -angle.cos() };
        let vy = if rng.gen_bool(0.5) { angle.sin() } else { -angle.sin() };
        let ball = Self::new(Vec2::ZERO, Vec2::new(SERVE_SPEED * vx, SERVE_SPEED * vy));
        debug!("Serving ball with velocity ({:.3}, {:.3})", ball.velocity.x, ball.velocity.y);
        ball
    }

    /// Advances the ball by `dt` seconds against the current paddle positions
    ///
    /// At most one reflection per axis happens per step. A goal ends the step
    /// before any paddle check. Speed is never capped: each paddle hit adds
    /// 10% on both axes.
    pub fn step(&mut self, dt: f64, paddles: &PerSide<PaddleState>) -> BallStep {
        let mut outcome = BallStep::default();
        let start = self.position;

        let x = start.x + self.velocity.x * dt;
        let mut y = start.y + self.velocity.y * dt;

        if y >= WALL_LIMIT || y <= -WALL_LIMIT {
            self.velocity.y = -self.velocity.y;
            y = start.y + self.velocity.y * dt;
            outcome.wall_bounce = true;
        }

        self.position = Vec2::new(x, y);

        if x < LEFT_GOAL_LINE {
            outcome.goal = Some(PlayerSide::Left);
        } else if x > RIGHT_GOAL_LINE {
            outcome.goal = Some(PlayerSide::Right);
        }
        if let Some(side) = outcome.goal {
            debug!("Goal on the {} side at ({:.3}, {:.3})", side, x, y);
            return outcome;
        }

        let approaching = if x <= BAT_DISTANCE - 1.0 {
            Some(PlayerSide::Left)
        } else if x >= 1.0 - BAT_DISTANCE {
            Some(PlayerSide::Right)
        } else {
            None
        };

        if let Some(side) = approaching {
            if (y - paddles[side].position).abs() < PADDLE_REACH {
                self.velocity.x *= PADDLE_BOUNCE_X;
                self.velocity.y *= PADDLE_BOUNCE_Y;
                // Re-integrated from the pre-step x and kept: the ball bounces off
                // the paddle face instead of staying at the tentative x' behind it
                self.position.x = start.x + self.velocity.x * dt;
                outcome.paddle_hit = Some(side);
                trace!(
                    "Paddle hit on the {} side, velocity now ({:.3}, {:.3})",
                    side,
                    self.velocity.x,
                    self.velocity.y
                );
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const EPS: f64 = 1e-12;

    fn paddles_at(left: f64, right: f64) -> PerSide<PaddleState> {
        let mut paddles = PerSide::from_fn(PaddleState::new);
        paddles.left.position = left;
        paddles.right.position = right;
        paddles
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn free_flight_moves_linearly() {
        let mut ball = BallState::new(Vec2::ZERO, Vec2::new(0.5, 0.5));

        let step = ball.step(0.1, &paddles_at(0.0, 0.0));

        assert_eq!(step, BallStep::default());
        assert!(close(ball.position.x, 0.05));
        assert!(close(ball.position.y, 0.05));
        assert_eq!(ball.velocity, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn top_wall_reflects_once() {
        let mut ball = BallState::new(Vec2::new(0.0, 0.995), Vec2::new(0.0, 0.5));

        let step = ball.step(0.02, &paddles_at(0.0, 0.0));

        assert!(step.wall_bounce);
        assert_eq!(ball.velocity.y, -0.5);
        assert!(close(ball.position.y, 0.985));
    }

    #[test]
    fn bottom_wall_reflects_once() {
        let mut ball = BallState::new(Vec2::new(0.3, -0.98), Vec2::new(0.1, -1.0));

        let step = ball.step(0.02, &paddles_at(0.0, 0.0));

        assert!(step.wall_bounce);
        assert_eq!(ball.velocity, Vec2::new(0.1, 1.0));
        assert!(close(ball.position.y, -0.96));
    }

    #[test]
    fn goal_lines_sit_half_a_bat_from_the_wall() {
        assert!(close(LEFT_GOAL_LINE, -0.98));
        assert!(close(RIGHT_GOAL_LINE, 0.98));
    }

    #[test]
    fn crossing_the_left_line_is_a_left_goal() {
        let mut ball = BallState::new(Vec2::new(-0.97, 0.0), Vec2::new(-1.0, 0.0));

        let step = ball.step(0.02, &paddles_at(0.0, 0.0));

        assert_eq!(step.goal, Some(PlayerSide::Left));
        assert_eq!(step.paddle_hit, None);
        assert!(close(ball.position.x, -0.99));
        // No reflection on a scoring step even though the paddle is in reach
        assert_eq!(ball.velocity, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn crossing_the_right_line_is_a_right_goal() {
        let mut ball = BallState::new(Vec2::new(0.97, 0.5), Vec2::new(1.0, 0.0));

        let step = ball.step(0.02, &paddles_at(0.0, -1.0));

        assert_eq!(step.goal, Some(PlayerSide::Right));
        assert!(close(ball.position.x, 0.99));
    }

    #[test]
    fn left_paddle_returns_the_ball_faster() {
        let mut ball = BallState::new(Vec2::new(-0.95, 0.04), Vec2::new(-1.0, 0.5));

        let step = ball.step(0.02, &paddles_at(0.0, 0.0));

        assert_eq!(step.goal, None);
        assert_eq!(step.paddle_hit, Some(PlayerSide::Left));
        assert!(close(ball.velocity.x, 1.1));
        assert!(close(ball.velocity.y, 0.55));
        assert!(close(ball.position.y, 0.05));
        // x recomputed from the pre-step position with the reversed velocity
        assert!(close(ball.position.x, -0.95 + 1.1 * 0.02));
    }

    #[test]
    fn right_paddle_keeps_vertical_direction() {
        let mut ball = BallState::new(Vec2::new(0.95, -0.3), Vec2::new(1.0, -0.5));

        let step = ball.step(0.02, &paddles_at(0.0, -0.35));

        assert_eq!(step.paddle_hit, Some(PlayerSide::Right));
        assert!(close(ball.velocity.x, -1.1));
        assert!(close(ball.velocity.y, -0.55));
    }

    #[test]
    fn paddle_out_of_reach_lets_the_ball_pass() {
        let mut ball = BallState::new(Vec2::new(-0.95, 0.5), Vec2::new(-1.0, 0.0));

        let step = ball.step(0.02, &paddles_at(0.0, 0.0));

        assert_eq!(step.paddle_hit, None);
        assert_eq!(ball.velocity, Vec2::new(-1.0, 0.0));
    }

    #[test]
    fn repeated_hits_compound_without_a_cap() {
        let paddles = paddles_at(0.0, 0.0);
        let mut ball = BallState::new(Vec2::new(-0.95, 0.0), Vec2::new(-1.0, 0.0));

        for _ in 0..20 {
            // Shrink the step so the ball always lands just in front of the paddle
            let dt = 0.02 / ball.velocity.x.abs();
            ball.position = Vec2::new(-0.95, 0.0);
            ball.velocity.x = -ball.velocity.x.abs();
            assert_eq!(ball.step(dt, &paddles).paddle_hit, Some(PlayerSide::Left));
        }

        assert!((ball.velocity.x - 1.1f64.powi(20)).abs() < 1e-9);
    }

    #[test]
    fn serve_starts_at_center_within_the_angle_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut quadrants = std::collections::HashSet::new();

        for _ in 0..200 {
            let ball = BallState::serve(&mut rng);
            assert_eq!(ball.position, Vec2::ZERO);

            let speed = ball.velocity.x.hypot(ball.velocity.y);
            assert!(close(speed, SERVE_SPEED));

            let angle = (ball.velocity.y.abs()).atan2(ball.velocity.x.abs());
            assert!((0.2 - EPS..1.2 + EPS).contains(&angle), "angle {angle}");

            quadrants.insert((ball.velocity.x > 0.0, ball.velocity.y > 0.0));
        }

        assert_eq!(quadrants.len(), 4);
    }
}
