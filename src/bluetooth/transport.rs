//! Transport seam between the session logic and a Bluetooth stack
//!
//! Every call suspends until the underlying stack resolves it. Timeouts are
//! the transport's business; callers add none of their own.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::bluetooth::{DeviceId, PeripheralIdentity};
use crate::error::BleError;

/// Event delivered by a running scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A peripheral was seen (first time or again)
    Discovered(PeripheralIdentity),
    /// The stack reported a scan error; scanning continues
    Error(BleError),
}

/// Callback invoked for every scan event
pub type ScanCallback = Arc<dyn Fn(ScanEvent) + Send + Sync>;

/// Callback invoked when a watched peripheral drops its connection
pub type DisconnectCallback = Box<dyn Fn() + Send + Sync>;

/// Options for [`Transport::connect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Requested transfer unit
    pub mtu: u16,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            mtu: crate::bluetooth::protocol::DEFAULT_MTU,
        }
    }
}

/// Handle for a disconnect watch
///
/// The release action runs exactly once, either through [`release`] or when
/// the handle is dropped.
///
/// [`release`]: DisconnectSubscription::release
pub struct DisconnectSubscription {
    on_release: Option<Box<dyn FnOnce() + Send>>,
}

impl DisconnectSubscription {
    /// Create a subscription running `on_release` when released
    pub fn new(on_release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_release: Some(Box::new(on_release)),
        }
    }

    /// A subscription with nothing to release
    pub fn noop() -> Self {
        Self { on_release: None }
    }

    /// Stop watching
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(on_release) = self.on_release.take() {
            on_release();
        }
    }
}

impl Drop for DisconnectSubscription {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for DisconnectSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectSubscription")
            .field("active", &self.on_release.is_some())
            .finish()
    }
}

/// Operations the core needs from a Bluetooth stack
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Acquire whatever host permission scanning needs
    async fn request_permission(&self) -> Result<bool, BleError> {
        Ok(true)
    }

    /// Start an unfiltered, continuous scan
    async fn start_scan(&self, on_event: ScanCallback) -> Result<(), BleError>;

    /// Stop the scan
    async fn stop_scan(&self) -> Result<(), BleError>;

    /// Connect to a peripheral
    async fn connect(&self, id: &DeviceId, options: ConnectOptions) -> Result<(), BleError>;

    /// Discover all services and characteristics
    async fn discover_all(&self, id: &DeviceId) -> Result<(), BleError>;

    /// Read the current signal strength in dBm
    async fn read_rssi(&self, id: &DeviceId) -> Result<i16, BleError>;

    /// Read a characteristic; `None` when it carries no value
    async fn read_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<Vec<u8>>, BleError>;

    /// Write a characteristic and wait for the acknowledgement
    async fn write_characteristic(
        &self,
        id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError>;

    /// Disconnect from a peripheral
    async fn disconnect(&self, id: &DeviceId) -> Result<(), BleError>;

    /// Watch for unexpected disconnects of a peripheral
    async fn on_disconnected(
        &self,
        id: &DeviceId,
        callback: DisconnectCallback,
    ) -> Result<DisconnectSubscription, BleError>;
}
