//! Device session manager - binds player slots to connected controller devices
//!
//! Runs as a tokio task that exclusively owns the per-player slots. Toggle
//! intents, transport events and results of in-flight transport calls all
//! arrive as messages, so slot state is only ever touched from one place.
//!
//! # Slot lifecycle
//!
//! ```text
//!           toggle              setup ok
//!   Idle ──────────► Connecting ─────────► Connected
//!    ▲                   │                     │ toggle
//!    │  declined/failed  │                     ▼
//!    └───────────────────┘               Disconnecting
//!    ▲                                         │
//!    └──────── transport reports Disconnected ─┘
//! ```
//!
//! A toggle for a player whose slot is `Connecting` or `Disconnecting` is
//! dropped. That per-player guard is what keeps a player from ever owning
//! two sessions or two outstanding transport calls, whatever the caller's
//! own busy indicator says.
//!
//! Transport failures end here: they are logged and turned into a
//! `Disconnected` connection event, never propagated.

use crate::device::{
    DeviceId, DeviceTransport, IndicatorColor, SessionError, TransportError, TransportEvent,
};
use crate::events::{EventBus, GameEvent};
use crate::input::InputFusion;
use crate::types::{ConnectionState, PerSide, PlayerSide};
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Live binding between a player and a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    pub device_id: DeviceId,
    pub player: PlayerSide,
    pub color: IndicatorColor,
    pub connected_at: DateTime<Local>,
}

/// Externally visible slot state, e.g. to grey out a connect button
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    Connecting,
    Connected(DeviceSession),
    Disconnecting(DeviceSession),
}

impl Slot {
    fn status(&self) -> SlotStatus {
        match self {
            Slot::Idle => SlotStatus::Idle,
            Slot::Connecting => SlotStatus::Connecting,
            Slot::Connected(_) => SlotStatus::Connected,
            Slot::Disconnecting(_) => SlotStatus::Disconnecting,
        }
    }

    fn session(&self) -> Option<&DeviceSession> {
        match self {
            Slot::Connected(session) | Slot::Disconnecting(session) => Some(session),
            Slot::Idle | Slot::Connecting => None,
        }
    }
}

/// Result of the connect sequence run outside the worker
#[derive(Debug)]
enum ConnectOutcome {
    Declined,
    Ready(DeviceId),
    ScanFailed(TransportError),
    SetupFailed(DeviceId, TransportError),
}

#[derive(Debug)]
enum SessionCommand {
    Toggle {
        player: PlayerSide,
    },
    ConnectFinished {
        player: PlayerSide,
        outcome: ConnectOutcome,
    },
    DisconnectFailed {
        player: PlayerSide,
        device_id: DeviceId,
        error: TransportError,
    },
    Query {
        player: PlayerSide,
        response_tx: oneshot::Sender<Option<DeviceSession>>,
    },
    Shutdown,
}

struct SessionWorker<T: DeviceTransport> {
    transport: Arc<T>,
    fusion: Arc<InputFusion>,
    events: EventBus<GameEvent>,
    colors: PerSide<IndicatorColor>,
    slots: PerSide<Slot>,
    status_tx: watch::Sender<PerSide<SlotStatus>>,
    // Weak so that dropping the handle lets the worker wind down
    command_tx: mpsc::WeakSender<SessionCommand>,
}

impl<T: DeviceTransport> SessionWorker<T> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut transport_events: mpsc::Receiver<TransportEvent>,
    ) {
        info!("Device session manager running");
        let mut transport_open = true;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                event = transport_events.recv(), if transport_open => match event {
                    Some(event) => self.handle_transport_event(event),
                    None => {
                        warn!("Transport event stream closed");
                        transport_open = false;
                    }
                },
            }
        }

        // Neither channel is drained past this point; late senders must fail fast
        transport_events.close();
        commands.close();
        while let Ok(command) = commands.try_recv() {
            if let SessionCommand::ConnectFinished { player, outcome } = command {
                release_orphan(self.transport.as_ref(), player, outcome).await;
            }
        }
        self.release_all().await;
        info!("Device session manager stopped");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Toggle { player } => self.toggle(player),
            SessionCommand::ConnectFinished { player, outcome } => {
                self.finish_connect(player, outcome)
            }
            SessionCommand::DisconnectFailed {
                player,
                device_id,
                error,
            } => {
                warn!("Disconnect of {} for {} failed: {}", device_id, player, error);
                match std::mem::take(&mut self.slots[player]) {
                    Slot::Disconnecting(session) if session.device_id == device_id => {
                        self.set_slot(player, Slot::Connected(session));
                    }
                    other => self.slots[player] = other,
                }
            }
            SessionCommand::Query {
                player,
                response_tx,
            } => {
                let _ = response_tx.send(self.slots[player].session().cloned());
            }
            SessionCommand::Shutdown => unreachable!("shutdown is handled by the run loop"),
        }
    }

    fn toggle(&mut self, player: PlayerSide) {
        match &self.slots[player] {
            Slot::Idle => self.begin_connect(player),
            Slot::Connected(_) => self.begin_disconnect(player),
            Slot::Connecting | Slot::Disconnecting(_) => {
                debug!("Toggle for {} ignored, transport call in flight", player);
            }
        }
    }

    fn begin_connect(&mut self, player: PlayerSide) {
        let Some(reply) = self.command_tx.upgrade() else {
            return;
        };
        info!("Connecting device for {}", player);
        self.set_slot(player, Slot::Connecting);

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            let outcome = connect_device(transport.as_ref()).await;
            let finished = SessionCommand::ConnectFinished { player, outcome };
            if let Err(mpsc::error::SendError(command)) = reply.send(finished).await {
                debug!("Connect result for {} dropped, manager stopped", player);
                if let SessionCommand::ConnectFinished { outcome, .. } = command {
                    release_orphan(transport.as_ref(), player, outcome).await;
                }
            }
        });
    }

    fn begin_disconnect(&mut self, player: PlayerSide) {
        let Some(reply) = self.command_tx.upgrade() else {
            return;
        };
        let Slot::Connected(session) = std::mem::take(&mut self.slots[player]) else {
            return;
        };
        let device_id = session.device_id.clone();
        info!("Disconnecting {} from {}", device_id, player);
        self.set_slot(player, Slot::Disconnecting(session));

        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(error) = transport.disconnect(&device_id).await {
                let _ = reply
                    .send(SessionCommand::DisconnectFailed {
                        player,
                        device_id,
                        error,
                    })
                    .await;
            }
        });
    }

    fn finish_connect(&mut self, player: PlayerSide, outcome: ConnectOutcome) {
        if !matches!(self.slots[player], Slot::Connecting) {
            warn!("Unexpected connect result for {}: {:?}", player, outcome);
            return;
        }

        let device_id = match outcome {
            ConnectOutcome::Ready(device_id) => device_id,
            ConnectOutcome::Declined => {
                info!("Device selection for {} declined", player);
                return self.abandon_connect(player);
            }
            ConnectOutcome::ScanFailed(e) => {
                warn!("Scan for {} failed: {}", player, e);
                return self.abandon_connect(player);
            }
            ConnectOutcome::SetupFailed(device_id, e) => {
                warn!("Setup of {} for {} failed: {}", device_id, player, e);
                if self.owner_of(&device_id).is_none() {
                    self.release_untracked(device_id);
                }
                return self.abandon_connect(player);
            }
        };

        if let Some(owner) = self.owner_of(&device_id) {
            warn!("Device {} is already linked to {}", device_id, owner);
            return self.abandon_connect(player);
        }

        let color = self.colors[player];
        if let Err(e) = self.transport.set_indicator(&device_id, color) {
            warn!("Could not set indicator {} on {}: {}", color, device_id, e);
        }

        info!("Player {} connected to {}", player, device_id);
        let session = DeviceSession {
            device_id,
            player,
            color,
            connected_at: Local::now(),
        };
        self.set_slot(player, Slot::Connected(session));
        self.events.publish(GameEvent::ConnectionChanged {
            player,
            state: ConnectionState::Connected,
        });
    }

    fn abandon_connect(&mut self, player: PlayerSide) {
        self.set_slot(player, Slot::Idle);
        self.events.publish(GameEvent::ConnectionChanged {
            player,
            state: ConnectionState::Disconnected,
        });
    }

    // Best effort; the resulting disconnect event is untracked and ignored
    fn release_untracked(&self, device_id: DeviceId) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(e) = transport.disconnect(&device_id).await {
                debug!("Releasing half-connected {} failed: {}", device_id, e);
            }
        });
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Telemetry { device_id, value } => match self.owner_of(&device_id) {
                Some(player) => {
                    trace!("Telemetry {} from {} for {}", value, device_id, player);
                    self.fusion.set_telemetry(player, value);
                }
                None => trace!("Telemetry from untracked device {}", device_id),
            },
            TransportEvent::Disconnected { device_id } => match self.owner_of(&device_id) {
                Some(player) => {
                    if let Some(session) = std::mem::take(&mut self.slots[player]).session() {
                        let linked_for = Local::now() - session.connected_at;
                        info!(
                            "Player {} disconnected from {} after {}s",
                            player,
                            session.device_id,
                            linked_for.num_seconds()
                        );
                    }
                    self.set_slot(player, Slot::Idle);
                    self.fusion.clear_telemetry(player);
                    self.events.publish(GameEvent::ConnectionChanged {
                        player,
                        state: ConnectionState::Disconnected,
                    });
                }
                None => debug!("Ignoring disconnect of untracked device {}", device_id),
            },
        }
    }

    async fn release_all(&mut self) {
        for player in PlayerSide::ALL {
            if let Some(session) = std::mem::take(&mut self.slots[player]).session() {
                debug!("Releasing {} from {} on shutdown", session.device_id, player);
                if let Err(e) = self.transport.disconnect(&session.device_id).await {
                    warn!("Could not release {}: {}", session.device_id, e);
                }
            }
        }
        self.status_tx.send_replace(PerSide::default());
    }

    fn owner_of(&self, device_id: &DeviceId) -> Option<PlayerSide> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.session().is_some_and(|s| &s.device_id == device_id))
            .map(|(player, _)| player)
    }

    fn set_slot(&mut self, player: PlayerSide, slot: Slot) {
        self.slots[player] = slot;
        self.status_tx.send_replace(self.slots.map(Slot::status));
    }
}

/// Disconnects a device whose connect finished after the manager stopped
async fn release_orphan<T: DeviceTransport>(
    transport: &T,
    player: PlayerSide,
    outcome: ConnectOutcome,
) {
    let device_id = match outcome {
        ConnectOutcome::Ready(device_id) | ConnectOutcome::SetupFailed(device_id, _) => device_id,
        ConnectOutcome::Declined | ConnectOutcome::ScanFailed(_) => return,
    };
    warn!("Releasing {} for {}, manager stopped mid-connect", device_id, player);
    if let Err(e) = transport.disconnect(&device_id).await {
        warn!("Could not release {}: {}", device_id, e);
    }
}

async fn connect_device<T: DeviceTransport>(transport: &T) -> ConnectOutcome {
    let device_id = match transport.scan().await {
        Ok(Some(device_id)) => device_id,
        Ok(None) => return ConnectOutcome::Declined,
        Err(e) => return ConnectOutcome::ScanFailed(e),
    };

    if let Err(e) = transport.subscribe_telemetry(&device_id).await {
        return ConnectOutcome::SetupFailed(device_id, e);
    }
    if let Err(e) = transport.prepare_indicator(&device_id).await {
        return ConnectOutcome::SetupFailed(device_id, e);
    }
    ConnectOutcome::Ready(device_id)
}

/// Handle to the session manager task
///
/// Cheap to query; all state lives in the task. Dropping the handle stops the
/// task once in-flight transport calls have reported back.
pub struct SessionManagerHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    status_rx: watch::Receiver<PerSide<SlotStatus>>,
    task_handle: Option<JoinHandle<()>>,
}

impl SessionManagerHandle {
    /// Spawns the manager task
    ///
    /// # Arguments
    ///
    /// * `transport` - device link used for scan, setup and teardown
    /// * `transport_events` - telemetry and disconnect reports from that link
    /// * `fusion` - receives each player's telemetry contribution
    /// * `events` - bus for `ConnectionChanged` notifications
    /// * `colors` - indicator color per player
    pub fn spawn<T: DeviceTransport>(
        transport: Arc<T>,
        transport_events: mpsc::Receiver<TransportEvent>,
        fusion: Arc<InputFusion>,
        events: EventBus<GameEvent>,
        colors: PerSide<IndicatorColor>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (status_tx, status_rx) = watch::channel(PerSide::default());

        let worker = SessionWorker {
            transport,
            fusion,
            events,
            colors,
            slots: PerSide::default(),
            status_tx,
            command_tx: command_tx.downgrade(),
        };
        let task_handle = tokio::spawn(worker.run(command_rx, transport_events));
        debug!("Session manager task spawned");

        Self {
            command_tx,
            status_rx,
            task_handle: Some(task_handle),
        }
    }

    /// Connects an idle player or disconnects a linked one
    ///
    /// Returns once the intent is queued; results arrive as
    /// [`GameEvent::ConnectionChanged`].
    pub async fn toggle(&self, player: PlayerSide) -> Result<(), SessionError> {
        self.command_tx
            .send(SessionCommand::Toggle { player })
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    pub async fn session(&self, player: PlayerSide) -> Result<Option<DeviceSession>, SessionError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Query {
                player,
                response_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        response_rx.await.map_err(|_| SessionError::ChannelClosed)
    }

    pub fn status(&self) -> watch::Receiver<PerSide<SlotStatus>> {
        self.status_rx.clone()
    }

    /// Stops the task, releasing any linked devices, and waits for it
    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        if self.command_tx.send(SessionCommand::Shutdown).await.is_err() {
            warn!("Session manager already stopped");
        }

        match self.task_handle.take() {
            Some(handle) => handle.await.map_err(|e| {
                error!("Session manager task panicked: {}", e);
                SessionError::TaskFailed(e.to_string())
            }),
            None => Ok(()),
        }
    }
}
