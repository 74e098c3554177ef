//! Scripted transport and recording status sink for headless tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use taggr_link::bluetooth::{
    ConnectOptions, DeviceId, DisconnectCallback, DisconnectSubscription, PeripheralIdentity,
    ScanCallback, ScanEvent, Transport,
};
use taggr_link::status::{Status, StatusBoard, StatusSink, StatusUpdate};
use taggr_link::BleError;

/// One transport call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    StartScan,
    StopScan,
    Subscribe,
    Release,
    Connect(u16),
    Discover,
    ReadRssi,
    Read(Uuid, Uuid),
    Write(Uuid, Uuid, Vec<u8>),
    Disconnect,
}

/// How the fake peripheral behaves
#[derive(Debug, Clone)]
pub struct Behavior {
    pub permission: bool,
    pub fail_subscribe: bool,
    pub fail_connect: bool,
    pub fail_discover: bool,
    pub fail_rssi: bool,
    pub rssi: i16,
    pub read_value: Option<Vec<u8>>,
    pub fail_read: bool,
    /// 1-based index of the write that fails
    pub fail_write: Option<usize>,
    pub fail_disconnect: bool,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            permission: true,
            fail_subscribe: false,
            fail_connect: false,
            fail_discover: false,
            fail_rssi: false,
            rssi: -42,
            read_value: Some(b"PCB-1".to_vec()),
            fail_read: false,
            fail_write: None,
            fail_disconnect: false,
        }
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub behavior: Mutex<Behavior>,
    calls: Arc<Mutex<Vec<Call>>>,
    scan_callback: Mutex<Option<ScanCallback>>,
    disconnect_callback: Arc<Mutex<Option<Arc<DisconnectCallback>>>>,
    /// When set, every connect waits for a notification
    connect_gate: Mutex<Option<Arc<Notify>>>,
}

fn transport_error(op: &str) -> BleError {
    BleError::Other(format!("{} failed", op))
}

impl FakeTransport {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Write(_, characteristic, data) => Some((characteristic, data)),
                _ => None,
            })
            .collect()
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Make connects block until the returned notify fires
    pub fn gate_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Deliver a scan event through the registered callback
    pub fn emit(&self, event: ScanEvent) {
        let callback = self.scan_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    /// Simulate the peripheral dropping the link
    pub fn drop_link(&self) {
        let callback = self.disconnect_callback.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn behavior(&self) -> Behavior {
        self.behavior.lock().unwrap().clone()
    }

    fn write_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Write(..)))
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request_permission(&self) -> Result<bool, BleError> {
        Ok(self.behavior().permission)
    }

    async fn start_scan(&self, on_event: ScanCallback) -> Result<(), BleError> {
        self.record(Call::StartScan);
        *self.scan_callback.lock().unwrap() = Some(on_event);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), BleError> {
        self.record(Call::StopScan);
        *self.scan_callback.lock().unwrap() = None;
        Ok(())
    }

    async fn connect(&self, _id: &DeviceId, options: ConnectOptions) -> Result<(), BleError> {
        self.record(Call::Connect(options.mtu));
        let gate = self.connect_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.behavior().fail_connect {
            return Err(transport_error("connect"));
        }
        Ok(())
    }

    async fn discover_all(&self, _id: &DeviceId) -> Result<(), BleError> {
        self.record(Call::Discover);
        if self.behavior().fail_discover {
            return Err(transport_error("discover"));
        }
        Ok(())
    }

    async fn read_rssi(&self, _id: &DeviceId) -> Result<i16, BleError> {
        self.record(Call::ReadRssi);
        let behavior = self.behavior();
        if behavior.fail_rssi {
            return Err(transport_error("rssi"));
        }
        Ok(behavior.rssi)
    }

    async fn read_characteristic(
        &self,
        _id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Option<Vec<u8>>, BleError> {
        self.record(Call::Read(service, characteristic));
        let behavior = self.behavior();
        if behavior.fail_read {
            return Err(transport_error("read"));
        }
        Ok(behavior.read_value)
    }

    async fn write_characteristic(
        &self,
        _id: &DeviceId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
    ) -> Result<(), BleError> {
        self.record(Call::Write(service, characteristic, data.to_vec()));
        if self.behavior().fail_write == Some(self.write_count()) {
            return Err(transport_error("write"));
        }
        Ok(())
    }

    async fn disconnect(&self, _id: &DeviceId) -> Result<(), BleError> {
        self.record(Call::Disconnect);
        if self.behavior().fail_disconnect {
            return Err(transport_error("disconnect"));
        }
        Ok(())
    }

    async fn on_disconnected(
        &self,
        _id: &DeviceId,
        callback: DisconnectCallback,
    ) -> Result<DisconnectSubscription, BleError> {
        self.record(Call::Subscribe);
        if self.behavior().fail_subscribe {
            return Err(transport_error("subscribe"));
        }
        *self.disconnect_callback.lock().unwrap() = Some(Arc::new(callback));

        let calls = self.calls.clone();
        let watcher = self.disconnect_callback.clone();
        Ok(DisconnectSubscription::new(move || {
            watcher.lock().unwrap().take();
            calls.lock().unwrap().push(Call::Release);
        }))
    }
}

/// Status sink keeping every snapshot it produced
#[derive(Default)]
pub struct RecordingSink {
    board: StatusBoard,
    history: Mutex<Vec<Status>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn history(&self) -> Vec<Status> {
        self.history.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = Vec::new();
        for status in self.history() {
            if messages.last() != Some(&status.message) {
                messages.push(status.message);
            }
        }
        messages
    }

    pub fn snapshot(&self) -> Status {
        self.board.snapshot()
    }
}

impl StatusSink for RecordingSink {
    fn publish(&self, update: StatusUpdate) {
        self.board.publish(update);
        self.history.lock().unwrap().push(self.board.snapshot());
    }
}

pub fn taggr(id: &str) -> PeripheralIdentity {
    PeripheralIdentity::new(id, Some(format!("Taggr-{}", id)), Some(-55))
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
