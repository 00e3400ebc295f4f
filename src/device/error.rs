//! Error definitions for the device module

use thiserror::Error;

/// Failures reported by a device transport
///
/// These never leave the session manager; it folds them into the
/// connected/disconnected lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Capability setup (telemetry subscription, indicator lookup) failed
    #[error("Device setup failed: {0}")]
    Setup(String),

    /// A command to a connected device could not be delivered
    #[error("Device command failed: {0}")]
    Command(String),

    /// The transport itself is not usable (adapter off, permission denied)
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the session manager handle
#[derive(Debug, Error)]
pub enum SessionError {
    /// The manager task is gone; no intents can be delivered
    #[error("Session manager channel closed")]
    ChannelClosed,

    #[error("Session manager task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid color {input:?}, expected #RRGGBB")]
pub struct ColorParseError {
    pub input: String,
}
