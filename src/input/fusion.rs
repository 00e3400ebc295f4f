//! Input fusion - merges key edges and device telemetry into paddle velocity
//!
//! Each side keeps a [`VelocitySource`] with three independent contributions:
//! the up key, the down key and the last telemetry value reported by that
//! side's controller device. The fused value is
//!
//! ```text
//! net = (down - up) + telemetry
//! ```
//!
//! and is deliberately left unclamped: a strong tilt plus a held key may
//! exceed the keyboard-only range.
//!
//! A [`GameEvent::VelocityChanged`] is published only when the recomputed
//! value differs from the last published one for that side. The comparison
//! is exact float inequality, so a repeated identical telemetry value is
//! silent while any bit-different value emits.

use crate::events::{EventBus, GameEvent};
use crate::types::{KeyDirection, PerSide, PlayerSide};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Velocity contributions for one side
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VelocitySource {
    pub key_up: bool,
    pub key_down: bool,
    pub telemetry: f64,
    emitted: f64,
}

impl VelocitySource {
    pub fn net_velocity(&self) -> f64 {
        (f64::from(u8::from(self.key_down)) - f64::from(u8::from(self.key_up))) + self.telemetry
    }

    /// Value most recently published for this side
    pub fn emitted(&self) -> f64 {
        self.emitted
    }
}

/// Shared fusion state for both sides
///
/// Producers (keyboard, device telemetry, the disconnect reset) and the
/// frame loop may run on different threads. Every mutation and read takes
/// the single lock, so a tick never sees a half-applied update.
#[derive(Debug)]
pub struct InputFusion {
    sources: Mutex<PerSide<VelocitySource>>,
    events: EventBus<GameEvent>,
}

impl InputFusion {
    pub fn new(events: EventBus<GameEvent>) -> Self {
        Self {
            sources: Mutex::new(PerSide::default()),
            events,
        }
    }

    /// Applies a key transition
    ///
    /// A press of an already pressed key (or a release of a released one) is
    /// a no-op and returns `None` without recomputing. Otherwise returns the
    /// new net velocity if it was published.
    pub fn set_key_edge(
        &self,
        side: PlayerSide,
        direction: KeyDirection,
        pressed: bool,
    ) -> Option<f64> {
        let mut sources = self.lock();
        let source = &mut sources[side];
        let key = match direction {
            KeyDirection::Up => &mut source.key_up,
            KeyDirection::Down => &mut source.key_down,
        };
        if *key == pressed {
            debug!("Ignoring repeated {:?} edge for {} ({})", direction, side, pressed);
            return None;
        }
        *key = pressed;
        self.recompute(side, source)
    }

    /// Stores the latest telemetry contribution for a side
    pub fn set_telemetry(&self, side: PlayerSide, value: f64) -> Option<f64> {
        let mut sources = self.lock();
        let source = &mut sources[side];
        source.telemetry = value;
        self.recompute(side, source)
    }

    /// Drops the telemetry contribution, e.g. after the device went away
    pub fn clear_telemetry(&self, side: PlayerSide) -> Option<f64> {
        self.set_telemetry(side, 0.0)
    }

    /// Current net velocity for a side
    pub fn velocity(&self, side: PlayerSide) -> f64 {
        self.lock()[side].net_velocity()
    }

    pub fn source(&self, side: PlayerSide) -> VelocitySource {
        self.lock()[side]
    }

    // Publishing while the lock is held keeps event order equal to mutation order
    fn recompute(&self, side: PlayerSide, source: &mut VelocitySource) -> Option<f64> {
        let value = source.net_velocity();
        if value != source.emitted {
            source.emitted = value;
            debug!("Velocity for {} changed to {}", side, value);
            self.events.publish(GameEvent::VelocityChanged { side, value });
            Some(value)
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, PerSide<VelocitySource>> {
        // The guarded data is plain numbers; a panicking holder cannot leave it torn
        self.sources.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
