//! Input subsystem for paddle velocity commands
//!
//! Two producers feed one shared state per side:
//!
//! 1. [`keyboard`] - discrete key edges, auto-repeat filtered
//! 2. device telemetry, routed in by [`crate::device::session`]
//!
//! # Architecture
//!
//! ```text
//! KeyEvent ──► KeyboardInput ──┐
//!                              ├──► InputFusion ──► velocity per side (read each tick)
//! Telemetry ─► SessionManager ─┘         │
//!                                        └──► GameEvent::VelocityChanged
//! ```

pub mod error;
pub mod fusion;
pub mod keyboard;

pub use error::InputError;
pub use fusion::{InputFusion, VelocitySource};
pub use keyboard::{KeyBinding, KeyBindings, KeyEvent, KeyOutcome, KeyState, KeyboardInput};
