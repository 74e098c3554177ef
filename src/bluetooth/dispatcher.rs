//! Scan dispatcher
//!
//! Owns the long-lived scan, filters discoveries by name prefix and starts one
//! retried session per matching peripheral. A peripheral stays claimed while
//! its session runs; duplicate discoveries in that window are ignored.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use tokio::task::JoinHandle;

use crate::bluetooth::retry::RetryController;
use crate::bluetooth::session::{SessionOutcome, SessionSequencer};
use crate::bluetooth::transport::{ScanCallback, ScanEvent, Transport};
use crate::bluetooth::{DeviceId, PeripheralIdentity};
use crate::error::BleError;
use crate::status::{SharedStatusSink, StatusUpdate};

/// Name prefix of Taggr peripherals
pub const DEFAULT_NAME_PREFIX: &str = "Taggr";

type ActiveSessions = Arc<Mutex<HashSet<DeviceId>>>;

/// Releases a claimed peripheral when the session task ends, however it ends
struct SessionClaim {
    active: ActiveSessions,
    id: DeviceId,
}

impl SessionClaim {
    fn try_claim(active: &ActiveSessions, id: &DeviceId) -> Option<Self> {
        let mut sessions = active.lock().unwrap_or_else(|e| e.into_inner());
        if !sessions.insert(id.clone()) {
            return None;
        }
        Some(Self {
            active: active.clone(),
            id: id.clone(),
        })
    }
}

impl Drop for SessionClaim {
    fn drop(&mut self) {
        let mut sessions = self.active.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&self.id);
        debug!("Released {}", self.id);
    }
}

/// Starts sessions for matching peripherals seen by the scan
pub struct ScanDispatcher<T: Transport> {
    transport: Arc<T>,
    status: SharedStatusSink,
    sequencer: SessionSequencer<T>,
    retry: RetryController,
    name_prefix: String,
    active: ActiveSessions,
    scanning: AtomicBool,
}

impl<T: Transport> ScanDispatcher<T> {
    /// Create a new dispatcher
    pub fn new(
        transport: Arc<T>,
        status: SharedStatusSink,
        sequencer: SessionSequencer<T>,
        retry: RetryController,
    ) -> Self {
        Self {
            transport,
            status,
            sequencer,
            retry,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            active: Arc::new(Mutex::new(HashSet::new())),
            scanning: AtomicBool::new(false),
        }
    }

    /// Match a different name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Whether the scan is running
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Whether `id` currently has a running session
    pub fn is_in_session(&self, id: &DeviceId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(id)
    }

    /// Number of running sessions
    pub fn active_sessions(&self) -> usize {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Acquire permission and start the scan
    ///
    /// Returns once the scan is running; discoveries arrive through callbacks.
    pub async fn start(self: &Arc<Self>) -> Result<(), BleError> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            debug!("Scan already started");
            return Ok(());
        }

        match self.transport.request_permission().await {
            Ok(true) => {}
            Ok(false) => {
                error!("Bluetooth permission denied; not scanning");
                self.scanning.store(false, Ordering::SeqCst);
                return Err(BleError::PermissionDenied);
            }
            Err(e) => {
                error!("Failed to request Bluetooth permission: {}", e);
                self.scanning.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        let dispatcher = Arc::downgrade(self);
        let callback: ScanCallback = Arc::new(move |event| {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.handle_event(event);
            }
        });

        if let Err(e) = self.transport.start_scan(callback).await {
            error!("Error starting device scan: {}", e);
            self.scanning.store(false, Ordering::SeqCst);
            return Err(e);
        }
        info!("Scanning for devices named {}*", self.name_prefix);
        Ok(())
    }

    /// Stop the scan; running sessions finish on their own
    pub async fn stop(&self) -> Result<(), BleError> {
        if !self.scanning.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.stop_scan().await?;
        info!("Scan stopped");
        Ok(())
    }

    /// Handle one scan event
    ///
    /// Returns the spawned session task when the event started a session.
    pub fn handle_event(&self, event: ScanEvent) -> Option<JoinHandle<SessionOutcome>> {
        let device = match event {
            ScanEvent::Error(e) => {
                error!("Error scanning for devices: {}", e);
                return None;
            }
            ScanEvent::Discovered(device) => device,
        };

        if !device.name_starts_with(&self.name_prefix) {
            return None;
        }

        let claim = SessionClaim::try_claim(&self.active, &device.id)?;
        info!("Found device: {}", device.display_name());
        self.status.publish(StatusUpdate::device(device.clone()));
        Some(self.spawn_session(device, claim))
    }

    fn spawn_session(
        &self,
        device: PeripheralIdentity,
        claim: SessionClaim,
    ) -> JoinHandle<SessionOutcome> {
        let sequencer = self.sequencer.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            let _claim = claim;
            let outcome = retry.run_session(&sequencer, &device).await;
            if let SessionOutcome::Failed(failure) = &outcome {
                error!("Error doing bluetooth things with {}: {}", device, failure);
            }
            outcome
        })
    }
}
