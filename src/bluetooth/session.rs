//! One full interaction with a Taggr peripheral
//!
//! A session runs connect, discovery, RSSI read, diagnostic read, the command
//! writes and a clean disconnect in strict order. Any failing step aborts the
//! rest. Cleanup always releases the disconnect watch and, if a connection was
//! made and not yet torn down, forces a best-effort disconnect.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::bluetooth::protocol::{
    self, CommandFrame, COMMAND_SERVICE, DIAGNOSTIC_CHARACTERISTIC, DIAGNOSTIC_SERVICE,
};
use crate::bluetooth::transport::{ConnectOptions, DisconnectSubscription, Transport};
use crate::bluetooth::{DeviceId, PeripheralIdentity};
use crate::error::SessionFailure;
use crate::status::{SharedStatusSink, StatusUpdate};

/// Terminal result of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every step succeeded
    Completed,
    /// A step failed
    Failed(SessionFailure),
}

impl SessionOutcome {
    /// Whether the session completed
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<Result<(), SessionFailure>> for SessionOutcome {
    fn from(result: Result<(), SessionFailure>) -> Self {
        match result {
            Ok(()) => Self::Completed,
            Err(failure) => Self::Failed(failure),
        }
    }
}

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Requested transfer unit
    pub mtu: u16,
    /// Frame written on the command service
    pub command: CommandFrame,
    /// How many times the frame is written back to back
    pub command_repetitions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mtu: protocol::DEFAULT_MTU,
            command: CommandFrame::standard(),
            command_repetitions: 2,
        }
    }
}

/// Tracks a live connection so it is torn down whatever happens
///
/// Call [`disarm`](Self::disarm) after an explicit disconnect succeeded and
/// [`release`](Self::release) on the way out. A guard dropped while still armed
/// (cancelled or panicking session) schedules the disconnect on the runtime.
struct ConnectionGuard<T: Transport> {
    transport: Arc<T>,
    id: DeviceId,
    armed: bool,
}

impl<T: Transport> ConnectionGuard<T> {
    fn new(transport: Arc<T>, id: DeviceId) -> Self {
        Self {
            transport,
            id,
            armed: false,
        }
    }

    fn arm(&mut self) {
        self.armed = true;
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        debug!("Finally disconnecting {}", self.id);
        if let Err(e) = self.transport.disconnect(&self.id).await {
            warn!("Ignoring disconnect error during cleanup of {}: {}", self.id, e);
        }
    }
}

impl<T: Transport> Drop for ConnectionGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to disconnect {} from", self.id);
            return;
        };
        let transport = self.transport.clone();
        let id = self.id.clone();
        handle.spawn(async move {
            if let Err(e) = transport.disconnect(&id).await {
                warn!("Ignoring disconnect error during cleanup of {}: {}", id, e);
            }
        });
    }
}

/// Drives a single session against one peripheral
pub struct SessionSequencer<T: Transport> {
    transport: Arc<T>,
    status: SharedStatusSink,
    config: SessionConfig,
}

impl<T: Transport> Clone for SessionSequencer<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            status: self.status.clone(),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport> SessionSequencer<T> {
    /// Create a new sequencer
    pub fn new(transport: Arc<T>, status: SharedStatusSink, config: SessionConfig) -> Self {
        Self {
            transport,
            status,
            config,
        }
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the full session once
    pub async fn run(&self, device: &PeripheralIdentity) -> SessionOutcome {
        self.try_run(device).await.into()
    }

    /// Run the full session once, returning the failure reason on error
    pub async fn try_run(&self, device: &PeripheralIdentity) -> Result<(), SessionFailure> {
        let id = &device.id;

        let subscription = self.watch_disconnects(device).await?;
        let mut connection = ConnectionGuard::new(self.transport.clone(), id.clone());

        let result = self.run_steps(device, &mut connection).await;

        subscription.release();
        connection.release().await;

        match &result {
            Ok(()) => info!("Session with {} completed", device),
            Err(e) => warn!("Session with {} failed: {}", device, e),
        }
        result
    }

    async fn watch_disconnects(
        &self,
        device: &PeripheralIdentity,
    ) -> Result<DisconnectSubscription, SessionFailure> {
        let status = self.status.clone();
        let name = device.display_name().to_string();
        self.transport
            .on_disconnected(
                &device.id,
                Box::new(move || {
                    info!("{} disconnected", name);
                    status.publish(StatusUpdate::message(format!("{} disconnected", name)));
                }),
            )
            .await
            .map_err(SessionFailure::SubscribeFailed)
    }

    async fn run_steps(
        &self,
        device: &PeripheralIdentity,
        connection: &mut ConnectionGuard<T>,
    ) -> Result<(), SessionFailure> {
        let id = &device.id;

        self.report("Connecting...");
        let options = ConnectOptions {
            mtu: self.config.mtu,
        };
        self.transport
            .connect(id, options)
            .await
            .map_err(SessionFailure::ConnectFailed)?;
        connection.arm();

        self.report("Discovering services...");
        self.transport
            .discover_all(id)
            .await
            .map_err(SessionFailure::DiscoveryFailed)?;

        self.report("Reading RSSI...");
        let rssi = self
            .transport
            .read_rssi(id)
            .await
            .map_err(SessionFailure::RssiReadFailed)?;
        self.status.publish(StatusUpdate {
            rssi: Some(rssi),
            device: Some(device.clone().with_rssi(rssi)),
            ..StatusUpdate::default()
        });
        info!("RSSI: {}", rssi);

        self.report("Reading firmware version...");
        let value = self
            .transport
            .read_characteristic(id, DIAGNOSTIC_SERVICE, DIAGNOSTIC_CHARACTERISTIC)
            .await
            .map_err(SessionFailure::CharacteristicReadFailed)?;
        let pcb_name = match value {
            Some(bytes) if !bytes.is_empty() => protocol::decode_diagnostic(&bytes),
            _ => return Err(SessionFailure::CharacteristicEmpty),
        };
        self.report(format!("PCB Name: {}", pcb_name));

        self.write_commands(id).await?;

        self.report("Disconnecting...");
        self.transport
            .disconnect(id)
            .await
            .map_err(SessionFailure::DisconnectFailed)?;
        connection.disarm();
        self.report("Done");

        Ok(())
    }

    async fn write_commands(&self, id: &DeviceId) -> Result<(), SessionFailure> {
        let mut step = 0;
        for round in 0..self.config.command_repetitions {
            self.report(if round == 0 {
                "Writing data..."
            } else {
                "Writing data again..."
            });
            for (characteristic, data) in self.config.command.writes() {
                step += 1;
                debug!("Write {}: {} bytes to {}", step, data.len(), characteristic);
                self.transport
                    .write_characteristic(id, COMMAND_SERVICE, characteristic, data)
                    .await
                    .map_err(|source| SessionFailure::WriteFailed { step, source })?;
            }
        }
        Ok(())
    }

    fn report(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.status.publish(StatusUpdate::message(message));
    }
}
