use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use thingy_pong::config::GameConfig;
use thingy_pong::device::{DeviceId, SessionManagerHandle, SimulatedTransport, SlotStatus};
use thingy_pong::events::{EventBus, GameEvent};
use thingy_pong::game::{GameLoop, Scoreboard, Snapshot, Stepper};
use thingy_pong::input::InputFusion;
use thingy_pong::types::PlayerSide;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Strongest tilt the autopilot reports
const AUTOPILOT_MAX_SPEED: f64 = 0.8;
const AUTOPILOT_GAIN: f64 = 4.0;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = {
        // Startup messages use the default level until the configured one is known
        let _startup = tracing::subscriber::set_default(log_subscriber(Level::INFO));
        setup_config().await?
    };
    setup_logging_env(config.level()?)?;
    info!("Starting thingy-pong with {}ms frames", config.frame_interval_ms);

    let bus = EventBus::new(config.event_capacity);
    let fusion = Arc::new(InputFusion::new(bus.clone()));

    let (transport, transport_events) = SimulatedTransport::new(config.event_capacity);
    let transport = Arc::new(transport);
    let mut manager = SessionManagerHandle::spawn(
        transport.clone(),
        transport_events,
        fusion.clone(),
        bus.clone(),
        config.colors(),
    );

    let stepper = Stepper::new(fusion.clone(), bus.clone());
    let snapshots = stepper.subscribe();
    let cancel = CancellationToken::new();

    let scoreboard = spawn_scoreboard(bus.subscribe(), cancel.clone());
    let game_loop = GameLoop::spawn(stepper, config.frame_interval(), cancel.clone());

    let mut autopilots = Vec::new();
    for player in PlayerSide::ALL {
        let device = DeviceId::new(format!("thingy-{}", player));
        transport.queue_scan(Some(device.clone()));
        connect_player(&manager, player).await?;

        autopilots.push(spawn_autopilot(
            player,
            device,
            transport.clone(),
            snapshots.clone(),
            cancel.clone(),
        ));
    }

    info!("Both players connected, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;

    info!("Shutting down");
    cancel.cancel();

    let stepper = game_loop
        .await
        .map_err(|e| eyre!("Game loop task failed: {}", e))?;
    info!("Played {} rallies", stepper.rallies());

    for autopilot in autopilots {
        if let Err(e) = autopilot.await {
            warn!("Autopilot task failed: {}", e);
        }
    }

    manager.shutdown().await?;

    match scoreboard.await {
        Ok(board) => info!("Final score {}", board),
        Err(e) => warn!("Scoreboard task failed: {}", e),
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging_env(level: Level) -> Result<()> {
    tracing::subscriber::set_global_default(log_subscriber(level))
        .map_err(|e| eyre!("Failed to install logging: {}", e))
}

fn log_subscriber(level: Level) -> impl tracing::Subscriber + Send + Sync + 'static {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .finish()
}

async fn setup_config() -> Result<GameConfig> {
    let path = GameConfig::default_path();
    if let Err(e) = GameConfig::ensure_default(&path).await {
        // A read-only config dir is not fatal, the defaults still apply
        warn!("Could not write default config: {}", e);
    }
    GameConfig::load_or_default(&path).await
}

/// Toggles a player and waits until the slot reports a live session
async fn connect_player(manager: &SessionManagerHandle, player: PlayerSide) -> Result<()> {
    let mut status = manager.status();
    manager.toggle(player).await?;

    tokio::time::timeout(
        CONNECT_TIMEOUT,
        status.wait_for(|slots| slots[player] == SlotStatus::Connected),
    )
    .await
    .map_err(|_| eyre!("Timed out connecting the {} player", player))?
    .map_err(|e| eyre!("Session manager stopped: {}", e))?;

    match manager.session(player).await? {
        Some(session) => info!(
            "{} player linked to {} at {}",
            player,
            session.device_id,
            session.connected_at.format("%H:%M:%S")
        ),
        None => warn!("{} player reported connected without a session", player),
    }
    Ok(())
}

/// Tilt a simulated device so its paddle chases the ball
fn autopilot_velocity(ball_y: f64, paddle: f64) -> f64 {
    let raw = ((ball_y - paddle) * AUTOPILOT_GAIN).clamp(-AUTOPILOT_MAX_SPEED, AUTOPILOT_MAX_SPEED);
    // Coarse steps, like a real accelerometer, so repeats are common
    (raw * 10.0).round() / 10.0
}

fn spawn_autopilot(
    player: PlayerSide,
    device: DeviceId,
    transport: Arc<SimulatedTransport>,
    mut snapshots: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Autopilot for the {} player steering {}", player, device);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *snapshots.borrow_and_update();
                    let value = autopilot_velocity(snapshot.ball.y, snapshot.paddles[player]);
                    transport.emit_telemetry(&device, value).await;
                }
            }
        }
    })
}

fn spawn_scoreboard(
    mut events: broadcast::Receiver<GameEvent>,
    cancel: CancellationToken,
) -> JoinHandle<Scoreboard> {
    tokio::spawn(async move {
        let mut board = Scoreboard::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(GameEvent::Goal { side }) => {
                        let scorer = board.record_goal(side);
                        info!("Point for the {} player, score {}", scorer, board);
                    }
                    Ok(GameEvent::ConnectionChanged { player, state }) => {
                        info!("{} player is now {:?}", player, state);
                    }
                    Ok(GameEvent::PhaseChanged(phase)) => debug!("Match {}", phase),
                    Ok(GameEvent::VelocityChanged { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Scoreboard lagged, {} events skipped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Event bus closed");
                        break;
                    }
                }
            }
        }
        board
    })
}
