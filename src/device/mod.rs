//! Controller device subsystem
//!
//! 1. [`transport`] - the seam to a physical link (scan, setup, disconnect, events)
//! 2. [`session`] - per-player session lifecycle on top of a transport
//! 3. [`simulated`] - in-memory transport for the headless runner and tests
//!
//! # Architecture
//!
//! ```text
//! toggle(player) ──► SessionManager ──► DeviceTransport
//!                        ▲    │
//!    TransportEvent ─────┘    └──► InputFusion::set_telemetry
//!                             └──► GameEvent::ConnectionChanged
//! ```

pub mod error;
pub mod indicator;
pub mod session;
pub mod simulated;
pub mod transport;

pub use error::{ColorParseError, SessionError, TransportError};
pub use indicator::IndicatorColor;
pub use session::{DeviceSession, SessionManagerHandle, SlotStatus};
pub use simulated::SimulatedTransport;
pub use transport::{DeviceId, DeviceTransport, TransportEvent};
