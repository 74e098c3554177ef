//! Live status shared between the active session and the display
//!
//! The status is a single overwritten snapshot: every progress step replaces
//! the previous message and nothing is kept as history.

use std::sync::Arc;

use tokio::sync::watch;

use crate::bluetooth::PeripheralIdentity;

/// Current status snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Last progress message
    pub message: String,
    /// Last published signal strength
    pub rssi: i16,
    /// Current candidate device
    pub device: Option<PeripheralIdentity>,
}

impl Status {
    /// Lines shown by the passive display
    pub fn render(&self) -> Vec<String> {
        match &self.device {
            Some(device) => vec![
                format!("Local Name: {}", device.display_name()),
                format!("RSSI: {}", self.rssi),
                self.message.clone(),
            ],
            None => vec!["searching...".to_string(), self.message.clone()],
        }
    }
}

/// Partial update applied to a [`Status`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub message: Option<String>,
    pub rssi: Option<i16>,
    pub device: Option<PeripheralIdentity>,
}

impl StatusUpdate {
    /// Update only the message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Update only the signal strength
    pub fn rssi(rssi: i16) -> Self {
        Self {
            rssi: Some(rssi),
            ..Self::default()
        }
    }

    /// Update only the current device
    pub fn device(device: PeripheralIdentity) -> Self {
        Self {
            device: Some(device),
            ..Self::default()
        }
    }

    fn apply(self, status: &mut Status) {
        if let Some(message) = self.message {
            status.message = message;
        }
        if let Some(rssi) = self.rssi {
            status.rssi = rssi;
        }
        if let Some(device) = self.device {
            status.device = Some(device);
        }
    }
}

/// Receiver of status updates
///
/// Sinks never push back into the core: no acknowledgement, no backpressure.
pub trait StatusSink: Send + Sync {
    /// Publish an update
    fn publish(&self, update: StatusUpdate);
}

/// Shared sink handle
pub type SharedStatusSink = Arc<dyn StatusSink>;

/// Status sink backed by a watch channel
#[derive(Debug, Clone)]
pub struct StatusBoard {
    sender: Arc<watch::Sender<Status>>,
}

impl StatusBoard {
    /// Create an empty status board
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Status::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Status {
        self.sender.borrow().clone()
    }

    /// Subscribe to changes
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.sender.subscribe()
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBoard {
    fn publish(&self, update: StatusUpdate) {
        // send_modify delivers even with no receivers attached
        self.sender.send_modify(|status| update.apply(status));
    }
}
