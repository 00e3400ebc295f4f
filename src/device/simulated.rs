//! In-memory device transport
//!
//! Stands in for a radio link in the headless runner and in tests. Scan
//! outcomes are scripted up front, scans can be held in flight to provoke
//! overlapping toggles, and setup failures can be injected per device.

use crate::device::{DeviceId, DeviceTransport, IndicatorColor, TransportError, TransportEvent};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LinkTable {
    pending_scans: VecDeque<Option<DeviceId>>,
    failing_setup: HashSet<DeviceId>,
    connected: HashSet<DeviceId>,
    subscribed: HashSet<DeviceId>,
    indicators: HashMap<DeviceId, IndicatorColor>,
}

#[derive(Debug)]
pub struct SimulatedTransport {
    events: mpsc::Sender<TransportEvent>,
    links: Mutex<LinkTable>,
    scan_gate: watch::Sender<bool>,
    scans: AtomicUsize,
    disconnect_requests: AtomicUsize,
}

impl SimulatedTransport {
    /// Creates the transport together with the event stream it reports on
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events, receiver) = mpsc::channel(capacity);
        let (scan_gate, _) = watch::channel(true);
        let transport = Self {
            events,
            links: Mutex::new(LinkTable::default()),
            scan_gate,
            scans: AtomicUsize::new(0),
            disconnect_requests: AtomicUsize::new(0),
        };
        (transport, receiver)
    }

    /// Scripts the result of the next scan; `None` plays a declined dialog
    ///
    /// Scans with nothing scripted are declined as well.
    pub fn queue_scan(&self, outcome: Option<DeviceId>) {
        self.links().pending_scans.push_back(outcome);
    }

    pub fn fail_setup_for(&self, device: DeviceId) {
        self.links().failing_setup.insert(device);
    }

    /// Keeps every scan pending until [`release_scans`](Self::release_scans)
    pub fn hold_scans(&self) {
        self.scan_gate.send_replace(false);
    }

    pub fn release_scans(&self) {
        self.scan_gate.send_replace(true);
    }

    /// Reports a telemetry value if the device is subscribed
    pub async fn emit_telemetry(&self, device: &DeviceId, value: f64) -> bool {
        if !self.links().subscribed.contains(device) {
            return false;
        }
        self.inject(TransportEvent::Telemetry {
            device_id: device.clone(),
            value,
        })
        .await
    }

    /// Drops the link from the device side, as if it went out of range
    pub async fn drop_link(&self, device: &DeviceId) -> bool {
        if !self.forget(device) {
            return false;
        }
        info!("Simulated link lost: {}", device);
        self.inject(TransportEvent::Disconnected {
            device_id: device.clone(),
        })
        .await
    }

    /// Pushes a raw event, tracked device or not
    pub async fn inject(&self, event: TransportEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    pub fn is_connected(&self, device: &DeviceId) -> bool {
        self.links().connected.contains(device)
    }

    pub fn indicator(&self, device: &DeviceId) -> Option<IndicatorColor> {
        self.links().indicators.get(device).copied()
    }

    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.links().connected.iter().cloned().collect()
    }

    pub fn scan_count(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_requests.load(Ordering::SeqCst)
    }

    fn forget(&self, device: &DeviceId) -> bool {
        let mut links = self.links();
        links.subscribed.remove(device);
        links.indicators.remove(device);
        links.connected.remove(device)
    }

    fn links(&self) -> MutexGuard<'_, LinkTable> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceTransport for SimulatedTransport {
    async fn scan(&self) -> Result<Option<DeviceId>, TransportError> {
        self.scans.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.scan_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Unavailable("scan gate closed".to_string()));
        }

        let mut links = self.links();
        let outcome = links.pending_scans.pop_front().flatten();
        match &outcome {
            Some(device) => {
                links.connected.insert(device.clone());
                debug!("Simulated scan picked {}", device);
            }
            None => debug!("Simulated scan declined"),
        }
        Ok(outcome)
    }

    async fn subscribe_telemetry(&self, device: &DeviceId) -> Result<(), TransportError> {
        let mut links = self.links();
        if links.failing_setup.contains(device) {
            return Err(TransportError::Setup(format!(
                "telemetry characteristic missing on {}",
                device
            )));
        }
        if !links.connected.contains(device) {
            return Err(TransportError::Setup(format!("{} is not connected", device)));
        }
        links.subscribed.insert(device.clone());
        Ok(())
    }

    async fn prepare_indicator(&self, device: &DeviceId) -> Result<(), TransportError> {
        if self.links().connected.contains(device) {
            Ok(())
        } else {
            Err(TransportError::Setup(format!("{} is not connected", device)))
        }
    }

    fn set_indicator(&self, device: &DeviceId, color: IndicatorColor) -> Result<(), TransportError> {
        let mut links = self.links();
        if !links.connected.contains(device) {
            return Err(TransportError::Command(format!("{} is not connected", device)));
        }
        links.indicators.insert(device.clone(), color);
        Ok(())
    }

    async fn disconnect(&self, device: &DeviceId) -> Result<(), TransportError> {
        self.disconnect_requests.fetch_add(1, Ordering::SeqCst);
        if self.forget(device) {
            self.inject(TransportEvent::Disconnected {
                device_id: device.clone(),
            })
            .await;
        }
        Ok(())
    }
}
