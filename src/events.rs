//! Publish/subscribe bus connecting the core to its observers
//!
//! Replaces process-wide event hubs with an owned value that is cloned into
//! every component needing it. Subscribing hands out a broadcast receiver;
//! dropping the receiver unsubscribes.

use crate::types::{ConnectionState, MatchPhase, PlayerSide};
use tokio::sync::broadcast;
use tracing::trace;

/// Notifications raised by the core
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Net paddle velocity for a side changed to a distinct value
    VelocityChanged { side: PlayerSide, value: f64 },
    /// A player's device link came up or went down
    ConnectionChanged {
        player: PlayerSide,
        state: ConnectionState,
    },
    /// The ball crossed the goal line behind `side`
    Goal { side: PlayerSide },
    PhaseChanged(MatchPhase),
}

#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a bus buffering up to `capacity` events per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// Delivers an event to every current subscriber
    ///
    /// Returns the number of subscribers reached. Publishing with nobody
    /// listening is not an error.
    pub fn publish(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                trace!("Event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(256)
    }
}
