//! Serve/rally cycle as a statum state machine
//!
//! ```text
//!            poll_serve (deadline reached)
//! Serving ────────────────────────────────► Running
//!    ▲                                         │
//!    └──────────── goal(side) ─────────────────┘
//! ```
//!
//! The serve deadline is armed when a rally enters Serving after a goal, or
//! on the first poll of the opening serve, and cleared on the way to Running,
//! so a rally can only ever wait once.

use crate::game::{BallState, SERVE_DELAY};
use crate::types::{MatchPhase, PlayerSide};
use rand::Rng;
use statum::{machine, state};
use std::time::Duration;
use tracing::{debug, info, warn};

#[state]
#[derive(Debug, Clone)]
pub enum RallyState {
    Serving, // Ball parked at the center, waiting for the serve delay
    Running, // Ball in play
}

#[machine]
#[derive(Debug)]
pub struct Rally<S: RallyState> {
    // Frame-clock time at which the serve happens, armed on entering Serving
    serve_at: Option<Duration>,

    // Completed rallies, i.e. goals scored so far
    rallies: u32,
}

impl<S: RallyState> Rally<S> {
    pub fn rallies(&self) -> u32 {
        self.rallies
    }
}

impl Rally<Serving> {
    pub fn create() -> Self {
        Self::new(None, 0)
    }

    /// Arms the serve deadline unless it is already armed
    pub fn arm(&mut self, now: Duration) -> Duration {
        *self.serve_at.get_or_insert_with(|| {
            debug!("Serve armed for {:?} from now", SERVE_DELAY);
            now + SERVE_DELAY
        })
    }

    pub fn serve_at(&self) -> Option<Duration> {
        self.serve_at
    }

    pub fn is_due(&self, now: Duration) -> bool {
        self.serve_at.is_some_and(|deadline| now >= deadline)
    }

    pub fn serve(mut self) -> Rally<Running> {
        self.serve_at = None;
        info!("Ball in play, rally {}", self.rallies + 1);
        self.transition()
    }
}

impl Rally<Running> {
    /// Ends the rally at frame-clock time `now`; the next serve is due
    /// `SERVE_DELAY` later
    pub fn score(mut self, side: PlayerSide, now: Duration) -> Rally<Serving> {
        self.rallies += 1;
        info!("Rally {} ended on the {} side", self.rallies, side);
        let mut serving: Rally<Serving> = self.transition();
        serving.arm(now);
        serving
    }
}

/// Runtime wrapper so the stepper can hold either state in one field
#[derive(Debug)]
pub enum MatchStateMachine {
    Serving(Rally<Serving>),
    Running(Rally<Running>),
}

impl Default for MatchStateMachine {
    fn default() -> Self {
        Self::start()
    }
}

impl MatchStateMachine {
    pub fn start() -> Self {
        Self::Serving(Rally::create())
    }

    pub fn phase(&self) -> MatchPhase {
        match self {
            Self::Serving(_) => MatchPhase::Serving,
            Self::Running(_) => MatchPhase::Running,
        }
    }

    pub fn rallies(&self) -> u32 {
        match self {
            Self::Serving(rally) => rally.rallies(),
            Self::Running(rally) => rally.rallies(),
        }
    }

    /// Pending serve deadline, if the machine is Serving and armed
    pub fn serve_at(&self) -> Option<Duration> {
        match self {
            Self::Serving(rally) => rally.serve_at(),
            Self::Running(_) => None,
        }
    }

    /// Drives the serve timer; returns the new phase on a transition
    pub fn poll_serve(&mut self, now: Duration) -> Option<MatchPhase> {
        let Self::Serving(rally) = self else {
            return None;
        };

        rally.arm(now);
        if !rally.is_due(now) {
            return None;
        }

        *self = match std::mem::replace(self, Self::start()) {
            Self::Serving(rally) => Self::Running(rally.serve()),
            running => running,
        };
        Some(MatchPhase::Running)
    }

    /// Ends the current rally at `now` and re-serves the ball
    ///
    /// Returns the new phase, or `None` when no rally was running.
    pub fn goal<R: Rng + ?Sized>(
        &mut self,
        side: PlayerSide,
        now: Duration,
        ball: &mut BallState,
        rng: &mut R,
    ) -> Option<MatchPhase> {
        if let Self::Serving(_) = self {
            warn!("Goal on the {} side reported while serving, ignoring", side);
            return None;
        }

        *self = match std::mem::replace(self, Self::start()) {
            Self::Running(rally) => Self::Serving(rally.score(side, now)),
            serving => serving,
        };
        *ball = BallState::serve(rng);
        Some(MatchPhase::Serving)
    }
}
