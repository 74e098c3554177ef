//! BLE scanning and Taggr session handling

mod btleplug_transport;
mod peripheral;
pub mod dispatcher;
pub mod protocol;
pub mod retry;
pub mod session;
pub mod transport;

pub use btleplug_transport::BtleplugTransport;

pub use peripheral::{DeviceId, PeripheralIdentity};

pub use transport::{
    ConnectOptions, DisconnectCallback, DisconnectSubscription, ScanCallback, ScanEvent, Transport,
};

pub use session::{SessionConfig, SessionOutcome, SessionSequencer};

pub use retry::{Attempt, RetryController, RetryPolicy, SessionAttempt};

pub use dispatcher::ScanDispatcher;

pub use protocol::CommandFrame;
