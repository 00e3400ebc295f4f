//! Game simulation: paddles, ball, serve cycle and the frame stepper
//!
//! Coordinates span [-1, 1] on both axes with the origin at the center of
//! the playfield. Paddles sit `BAT_DISTANCE` in from each side wall.
//!
//! The rule constants below are fixed; they are not part of the runtime
//! configuration.

pub mod ball;
pub mod paddle;
pub mod rally;
pub mod score;
pub mod stepper;

pub use ball::{BallState, BallStep};
pub use paddle::PaddleState;
pub use rally::MatchStateMachine;
pub use score::Scoreboard;
pub use stepper::{GameLoop, Snapshot, Stepper};

use std::time::Duration;

/// Paddle offset from its wall as a fraction of the playfield half-width
pub const BAT_DISTANCE: f64 = 0.04;

/// |y| beyond which the ball reflects off the top or bottom wall
pub const WALL_LIMIT: f64 = 0.99;

/// Half-height of the paddle's catch zone around its center
pub const PADDLE_REACH: f64 = 0.1;

/// Velocity multipliers applied on a paddle hit (x reverses, y keeps its sign)
pub const PADDLE_BOUNCE_X: f64 = -1.1;
pub const PADDLE_BOUNCE_Y: f64 = 1.1;

pub const SERVE_SPEED: f64 = 0.5;
pub const SERVE_ANGLE_MIN: f64 = 0.2;
pub const SERVE_DELAY: Duration = Duration::from_secs(2);

pub const LEFT_GOAL_LINE: f64 = -1.0 + 0.5 * BAT_DISTANCE;
pub const RIGHT_GOAL_LINE: f64 = 1.0 - 0.5 * BAT_DISTANCE;
