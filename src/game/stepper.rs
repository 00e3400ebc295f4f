//! Fixed-loop stepper and the task that drives it
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐  tick(now)  ┌─────────┐  velocity(side)  ┌─────────────┐
//! │ GameLoop │ ──────────► │ Stepper │ ◄─────────────── │ InputFusion │
//! └──────────┘             └─────────┘                  └─────────────┘
//!                            │     │
//!          watch<Snapshot> ◄─┘     └─► EventBus (Goal, PhaseChanged)
//! ```
//!
//! Each tick runs in a fixed order: serve timer, ball, then paddles. The ball
//! therefore collides against the paddle positions of the previous tick.

use crate::events::{EventBus, GameEvent};
use crate::game::{BallState, MatchStateMachine, PaddleState};
use crate::input::InputFusion;
use crate::types::{MatchPhase, PerSide, PlayerSide, Vec2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything a renderer needs to draw one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Snapshot {
    pub frame: u64,
    pub ball: Vec2,
    pub paddles: PerSide<f64>,
    pub phase: MatchPhase,
}

#[derive(Debug)]
pub struct Stepper {
    fusion: Arc<InputFusion>,
    events: EventBus<GameEvent>,
    snapshots: watch::Sender<Snapshot>,

    ball: BallState,
    paddles: PerSide<PaddleState>,
    state: MatchStateMachine,
    rng: StdRng,

    // Timestamp of the previous tick; None until the first tick
    last_frame: Option<Duration>,
    frame: u64,
}

impl Stepper {
    pub fn new(fusion: Arc<InputFusion>, events: EventBus<GameEvent>) -> Self {
        Self::with_rng(fusion, events, StdRng::from_entropy())
    }

    /// Deterministic serves, for tests and replays
    pub fn with_seed(fusion: Arc<InputFusion>, events: EventBus<GameEvent>, seed: u64) -> Self {
        Self::with_rng(fusion, events, StdRng::seed_from_u64(seed))
    }

    fn with_rng(fusion: Arc<InputFusion>, events: EventBus<GameEvent>, mut rng: StdRng) -> Self {
        let ball = BallState::serve(&mut rng);
        let paddles = PerSide::from_fn(PaddleState::new);
        let (snapshots, _) = watch::channel(Snapshot::default());

        Self {
            fusion,
            events,
            snapshots,
            ball,
            paddles,
            state: MatchStateMachine::start(),
            rng,
            last_frame: None,
            frame: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    pub fn ball(&self) -> &BallState {
        &self.ball
    }

    pub fn paddles(&self) -> &PerSide<PaddleState> {
        &self.paddles
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.phase()
    }

    pub fn rallies(&self) -> u32 {
        self.state.rallies()
    }

    /// Advances the simulation to frame-clock time `now`
    ///
    /// The first call only records the baseline and arms the serve timer.
    pub fn tick(&mut self, now: Duration) -> Snapshot {
        self.frame += 1;

        let Some(previous) = self.last_frame.replace(now) else {
            debug!("First frame at {:?}, waiting for serve", now);
            self.state.poll_serve(now);
            return self.publish();
        };
        let dt = now.saturating_sub(previous).as_secs_f64();

        if let Some(phase) = self.state.poll_serve(now) {
            self.events.publish(GameEvent::PhaseChanged(phase));
        }

        if self.state.phase() == MatchPhase::Running {
            let step = self.ball.step(dt, &self.paddles);
            if let Some(side) = step.goal {
                self.events.publish(GameEvent::Goal { side });
                if let Some(phase) = self.state.goal(side, now, &mut self.ball, &mut self.rng) {
                    self.events.publish(GameEvent::PhaseChanged(phase));
                }
            }
        }

        for side in PlayerSide::ALL {
            let paddle = &mut self.paddles[side];
            paddle.velocity = self.fusion.velocity(side);
            paddle.step(dt);
        }

        self.publish()
    }

    fn publish(&self) -> Snapshot {
        let snapshot = Snapshot {
            frame: self.frame,
            ball: self.ball.position,
            paddles: self.paddles.map(|paddle| paddle.position),
            phase: self.state.phase(),
        };
        self.snapshots.send_replace(snapshot);
        snapshot
    }
}

/// Drives a [`Stepper`] at a fixed interval on the tokio runtime
pub struct GameLoop;

impl GameLoop {
    /// Runs the stepper until `cancel` fires, then hands it back
    ///
    /// Late ticks are skipped rather than bunched; the stepper sees the real
    /// elapsed time either way.
    pub fn spawn(
        mut stepper: Stepper,
        frame_interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<Stepper> {
        tokio::spawn(async move {
            let origin = Instant::now();
            let mut interval = tokio::time::interval(frame_interval.max(Duration::from_millis(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Game loop started with {:?} frames", frame_interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Game loop cancelled after {} frames", stepper.frame);
                        break;
                    }
                    at = interval.tick() => {
                        stepper.tick(at.saturating_duration_since(origin));
                    }
                }
            }

            stepper
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::SERVE_DELAY;
    use crate::types::KeyDirection;
    use tokio::sync::broadcast;

    const FRAME: Duration = Duration::from_millis(20);

    fn stepper() -> (Stepper, Arc<InputFusion>, broadcast::Receiver<GameEvent>) {
        let bus = EventBus::new(64);
        let events = bus.subscribe();
        let fusion = Arc::new(InputFusion::new(bus.clone()));
        (Stepper::with_seed(fusion.clone(), bus, 11), fusion, events)
    }

    fn drain(events: &mut broadcast::Receiver<GameEvent>) -> Vec<GameEvent> {
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    /// Ticks from `from` (exclusive) to `to` (inclusive) in whole frames
    fn run(stepper: &mut Stepper, from: Duration, to: Duration) -> Duration {
        let mut now = from;
        while now < to {
            now += FRAME;
            stepper.tick(now);
        }
        now
    }

    #[test]
    fn first_tick_has_no_physics() {
        let (mut stepper, fusion, _events) = stepper();
        fusion.set_key_edge(PlayerSide::Left, KeyDirection::Up, true);

        let snapshot = stepper.tick(Duration::from_secs(5));

        assert_eq!(snapshot.frame, 1);
        assert_eq!(snapshot.ball, Vec2::ZERO);
        assert_eq!(snapshot.paddles, PerSide::new(0.0, 0.0));
        assert_eq!(snapshot.phase, MatchPhase::Serving);
    }

    #[test]
    fn ball_stays_parked_until_the_serve_delay_elapses() {
        let (mut stepper, _fusion, mut events) = stepper();
        stepper.tick(Duration::ZERO);

        let now = run(&mut stepper, Duration::ZERO, Duration::from_millis(1980));
        assert_eq!(stepper.phase(), MatchPhase::Serving);
        assert_eq!(stepper.ball().position, Vec2::ZERO);
        assert!(drain(&mut events).is_empty());

        stepper.tick(now + FRAME);
        assert_eq!(stepper.phase(), MatchPhase::Running);
        assert_ne!(stepper.ball().position, Vec2::ZERO);
        assert_eq!(
            drain(&mut events),
            vec![GameEvent::PhaseChanged(MatchPhase::Running)]
        );
    }

    #[test]
    fn paddles_follow_fused_velocity() {
        let (mut stepper, fusion, _events) = stepper();
        stepper.tick(Duration::ZERO);

        fusion.set_key_edge(PlayerSide::Left, KeyDirection::Down, true);
        fusion.set_telemetry(PlayerSide::Right, -0.5);
        let snapshot = stepper.tick(Duration::from_millis(100));

        assert!((snapshot.paddles.left - 0.1).abs() < 1e-12);
        assert!((snapshot.paddles.right + 0.05).abs() < 1e-12);
    }

    #[test]
    fn goal_publishes_and_returns_to_serving() {
        let (mut stepper, _fusion, mut events) = stepper();
        stepper.tick(Duration::ZERO);
        let now = run(&mut stepper, Duration::ZERO, Duration::from_secs(2));
        assert_eq!(stepper.phase(), MatchPhase::Running);
        drain(&mut events);

        stepper.ball = BallState::new(Vec2::new(0.97, 0.5), Vec2::new(1.0, 0.0));
        stepper.paddles.right.position = -0.8;
        let snapshot = stepper.tick(now + FRAME);

        assert_eq!(snapshot.phase, MatchPhase::Serving);
        assert_eq!(snapshot.ball, Vec2::ZERO);
        assert_eq!(stepper.rallies(), 1);
        assert_eq!(
            drain(&mut events),
            vec![
                GameEvent::Goal {
                    side: PlayerSide::Right
                },
                GameEvent::PhaseChanged(MatchPhase::Serving)
            ]
        );

        // The next serve is due a full delay after the goal tick
        let goal_at = now + FRAME;
        run(&mut stepper, goal_at, goal_at + Duration::from_millis(1980));
        assert_eq!(stepper.phase(), MatchPhase::Serving);
        stepper.tick(goal_at + SERVE_DELAY);
        assert_eq!(stepper.phase(), MatchPhase::Running);
    }

    #[test]
    fn serve_delay_after_a_goal_does_not_depend_on_frame_length() {
        let (mut stepper, _fusion, mut events) = stepper();
        let frame = Duration::from_millis(500);
        stepper.tick(Duration::ZERO);
        let now = run(&mut stepper, Duration::ZERO, SERVE_DELAY);
        assert_eq!(stepper.phase(), MatchPhase::Running);

        stepper.ball = BallState::new(Vec2::new(-0.5, 0.0), Vec2::new(-1.0, 0.0));
        let goal_at = now + frame;
        stepper.tick(goal_at);
        assert_eq!(stepper.phase(), MatchPhase::Serving);
        drain(&mut events);

        stepper.tick(goal_at + frame);
        stepper.tick(goal_at + frame * 2);
        stepper.tick(goal_at + frame * 3);
        assert_eq!(stepper.phase(), MatchPhase::Serving);

        stepper.tick(goal_at + SERVE_DELAY);
        assert_eq!(stepper.phase(), MatchPhase::Running);
        assert_eq!(
            drain(&mut events),
            vec![GameEvent::PhaseChanged(MatchPhase::Running)]
        );
    }

    #[test]
    fn ball_collides_with_last_ticks_paddle_position() {
        let (mut stepper, fusion, _events) = stepper();
        stepper.tick(Duration::ZERO);
        let now = run(&mut stepper, Duration::ZERO, Duration::from_secs(2));

        stepper.ball = BallState::new(Vec2::new(-0.95, 0.0), Vec2::new(-1.0, 0.0));
        stepper.paddles.left.position = 0.0;
        // Paddle leaves this tick, but the ball still sees it in place
        fusion.set_telemetry(PlayerSide::Left, 50.0);
        stepper.tick(now + FRAME);

        assert!(stepper.ball().velocity.x > 0.0);
        assert_eq!(stepper.paddles().left.position, 1.0);
    }

    #[test]
    fn snapshots_reach_watchers() {
        let (mut stepper, _fusion, _events) = stepper();
        let watcher = stepper.subscribe();

        stepper.tick(Duration::ZERO);
        stepper.tick(FRAME);

        assert_eq!(watcher.borrow().frame, 2);
    }

    #[tokio::test]
    async fn game_loop_runs_until_cancelled() {
        let (stepper, _fusion, _events) = stepper();
        let mut watcher = stepper.subscribe();
        let cancel = CancellationToken::new();

        let handle = GameLoop::spawn(stepper, Duration::from_millis(5), cancel.clone());
        tokio::time::timeout(Duration::from_secs(1), watcher.changed())
            .await
            .expect("no frame within a second")
            .expect("stepper alive");
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let stepper = handle.await.expect("loop task panicked");
        assert!(stepper.frame > 2);
        assert_eq!(stepper.phase(), MatchPhase::Serving);
        assert!(stepper.state.serve_at().is_some());
    }
}
