//! Two-player pong core with keyboard and controller-device input
//!
//! # Architecture
//!
//! ```text
//! KeyboardInput ──┐                                  ┌──► watch<Snapshot>
//!                 ├──► InputFusion ──► Stepper ──────┤
//! SessionManager ─┘         │             │          └──► EventBus<GameEvent>
//!      ▲                    └─────────────┴──────────────────────▲
//!      └── DeviceTransport (scan, setup, telemetry, disconnect)
//! ```
//!
//! Nothing here renders or talks to real hardware. A presentation layer
//! subscribes to the snapshot channel and the event bus; a hardware layer
//! implements [`device::DeviceTransport`].

pub mod config;
pub mod device;
pub mod events;
pub mod game;
pub mod input;
pub mod types;
