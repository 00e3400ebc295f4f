use std::sync::Arc;
use std::time::Duration;
use thingy_pong::config::GameConfig;
use thingy_pong::device::{DeviceId, IndicatorColor, SessionManagerHandle, SimulatedTransport};
use thingy_pong::events::{EventBus, GameEvent};
use thingy_pong::game::Stepper;
use thingy_pong::input::{InputFusion, KeyEvent, KeyboardInput};
use thingy_pong::types::{ConnectionState, MatchPhase, PlayerSide};
use tokio::sync::broadcast;
use tokio::time::timeout;

struct Table {
    transport: Arc<SimulatedTransport>,
    fusion: Arc<InputFusion>,
    keyboard: KeyboardInput,
    manager: SessionManagerHandle,
    stepper: Stepper,
    events: broadcast::Receiver<GameEvent>,
}

fn table() -> Table {
    let config = GameConfig::default();
    let bus = EventBus::new(config.event_capacity);
    let events = bus.subscribe();
    let fusion = Arc::new(InputFusion::new(bus.clone()));
    let keyboard =
        KeyboardInput::new(&config.key_bindings(), fusion.clone()).expect("default bindings");

    let (transport, transport_events) = SimulatedTransport::new(32);
    let transport = Arc::new(transport);
    let manager = SessionManagerHandle::spawn(
        transport.clone(),
        transport_events,
        fusion.clone(),
        bus.clone(),
        config.colors(),
    );
    let stepper = Stepper::with_seed(fusion.clone(), bus, 42);

    Table {
        transport,
        fusion,
        keyboard,
        manager,
        stepper,
        events,
    }
}

/// Waits for the first event matching `pred`, skipping everything else
async fn wait_for(
    events: &mut broadcast::Receiver<GameEvent>,
    pred: impl Fn(&GameEvent) -> bool,
) -> GameEvent {
    timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event bus failed: {e}"),
            }
        }
    })
    .await
    .expect("event did not arrive in time")
}

async fn connect(table: &mut Table, player: PlayerSide, device: &DeviceId) {
    table.transport.queue_scan(Some(device.clone()));
    table.manager.toggle(player).await.expect("manager alive");
    let event = wait_for(&mut table.events, |e| {
        matches!(e, GameEvent::ConnectionChanged { .. })
    })
    .await;
    assert_eq!(
        event,
        GameEvent::ConnectionChanged {
            player,
            state: ConnectionState::Connected
        }
    );
}

async fn velocity_for(table: &mut Table, side: PlayerSide) -> f64 {
    match wait_for(&mut table.events, |e| {
        matches!(e, GameEvent::VelocityChanged { side: s, .. } if *s == side)
    })
    .await
    {
        GameEvent::VelocityChanged { value, .. } => value,
        other => unreachable!("filtered to velocity events, got {other:?}"),
    }
}

#[tokio::test]
async fn device_tilt_moves_the_paddle() {
    let mut table = table();
    let device = DeviceId::new("thingy-left");
    connect(&mut table, PlayerSide::Left, &device).await;
    assert_eq!(table.transport.indicator(&device), Some(IndicatorColor::RED));

    assert!(table.transport.emit_telemetry(&device, 0.5).await);
    assert_eq!(velocity_for(&mut table, PlayerSide::Left).await, 0.5);

    table.stepper.tick(Duration::ZERO);
    let snapshot = table.stepper.tick(Duration::from_millis(100));

    assert!((snapshot.paddles.left - 0.05).abs() < 1e-12);
    assert_eq!(snapshot.paddles.right, 0.0);
    assert_eq!(snapshot.phase, MatchPhase::Serving);

    table.manager.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn keys_and_tilt_add_up_until_the_device_drops() {
    let mut table = table();
    let device = DeviceId::new("thingy-right");
    connect(&mut table, PlayerSide::Right, &device).await;

    table.keyboard.handle(&KeyEvent::pressed("KeyM"));
    assert_eq!(velocity_for(&mut table, PlayerSide::Right).await, 1.0);

    table.transport.emit_telemetry(&device, 0.25).await;
    assert_eq!(velocity_for(&mut table, PlayerSide::Right).await, 1.25);

    table.transport.drop_link(&device).await;
    let event = wait_for(&mut table.events, |e| {
        matches!(e, GameEvent::ConnectionChanged { .. })
    })
    .await;
    assert_eq!(
        event,
        GameEvent::ConnectionChanged {
            player: PlayerSide::Right,
            state: ConnectionState::Disconnected
        }
    );
    assert_eq!(table.fusion.velocity(PlayerSide::Right), 1.0);

    table.stepper.tick(Duration::ZERO);
    let snapshot = table.stepper.tick(Duration::from_millis(200));
    assert!((snapshot.paddles.right - 0.2).abs() < 1e-12);

    table.manager.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn rally_starts_after_the_serve_delay_with_players_linked() {
    let mut table = table();
    connect(&mut table, PlayerSide::Left, &DeviceId::new("a")).await;
    connect(&mut table, PlayerSide::Right, &DeviceId::new("b")).await;

    let frame = Duration::from_millis(16);
    let mut now = Duration::ZERO;
    table.stepper.tick(now);
    while table.stepper.phase() == MatchPhase::Serving {
        now += frame;
        table.stepper.tick(now);
        assert!(now <= Duration::from_millis(2016), "serve never happened");
    }

    assert!(now >= Duration::from_secs(2));
    wait_for(&mut table.events, |e| {
        *e == GameEvent::PhaseChanged(MatchPhase::Running)
    })
    .await;

    table.manager.shutdown().await.expect("clean shutdown");
    assert!(table.transport.connected_devices().is_empty());
}
