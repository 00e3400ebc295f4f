//! Transport seam between the session manager and a physical controller link
//!
//! The concrete radio protocol (service discovery, payload decoding) lives
//! behind [`DeviceTransport`]. The core only sees four primitives plus a
//! stream of [`TransportEvent`]s delivered on an mpsc channel handed to the
//! session manager at spawn time.
//!
//! # Call latency
//!
//! `scan`, the setup calls and `disconnect` may take arbitrarily long (a
//! user picks a device from a system dialog). The session manager always
//! runs them in spawned tasks, never inline in its event loop.

use crate::device::{IndicatorColor, TransportError};
use std::fmt;
use std::future::Future;

/// Opaque handle for a device, as assigned by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events a transport reports at arbitrary times
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// New analog velocity contribution from a device
    Telemetry { device_id: DeviceId, value: f64 },
    /// Link lost, either requested or spontaneous
    Disconnected { device_id: DeviceId },
}

pub trait DeviceTransport: Send + Sync + 'static {
    /// Lets the user pick a device
    ///
    /// `Ok(None)` means the user declined or cancelled; that is not an error.
    fn scan(&self) -> impl Future<Output = Result<Option<DeviceId>, TransportError>> + Send;

    /// Starts telemetry notifications for the device
    fn subscribe_telemetry(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolves whatever the device needs before indicator commands work
    fn prepare_indicator(
        &self,
        device: &DeviceId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Fire-and-forget indicator command
    fn set_indicator(&self, device: &DeviceId, color: IndicatorColor)
        -> Result<(), TransportError>;

    /// Requests link teardown
    ///
    /// Completion is reported through [`TransportEvent::Disconnected`].
    fn disconnect(&self, device: &DeviceId)
        -> impl Future<Output = Result<(), TransportError>> + Send;
}
