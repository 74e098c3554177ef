// Root module exports
pub mod bluetooth;
pub mod config;
pub mod error;
pub mod logging;
pub mod status;

// Re-export common items for convenience
pub use bluetooth::{
    BtleplugTransport, PeripheralIdentity, RetryController, ScanDispatcher, SessionOutcome,
    SessionSequencer, Transport,
};
pub use config::AppConfig;
pub use error::{AppError, BleError, SessionFailure};
pub use logging::configure_logging;
pub use status::{Status, StatusBoard, StatusSink, StatusUpdate};
