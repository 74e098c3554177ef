//! Error types for taggr-link

use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a Bluetooth transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("Failed to find a suitable Bluetooth adapter")]
    AdapterNotFound,

    #[error("Bluetooth operation failed: {0}")]
    BtlePlugError(String),

    #[error("Bluetooth permission was not granted")]
    PermissionDenied,

    #[error("Scanning is already in progress")]
    ScanInProgress,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("Characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },

    #[error("{0}")]
    Other(String),
}

impl From<btleplug::Error> for BleError {
    fn from(error: btleplug::Error) -> Self {
        match error {
            btleplug::Error::PermissionDenied => BleError::PermissionDenied,
            btleplug::Error::DeviceNotFound => BleError::DeviceNotFound("unknown".to_string()),
            other => BleError::BtlePlugError(other.to_string()),
        }
    }
}

/// Reason a single session run failed
///
/// Every variant aborts the current attempt; the retry controller decides
/// whether another attempt follows.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error("Failed to watch for disconnects: {0}")]
    SubscribeFailed(BleError),

    #[error("Connect failed: {0}")]
    ConnectFailed(BleError),

    #[error("Service discovery failed: {0}")]
    DiscoveryFailed(BleError),

    #[error("RSSI read failed: {0}")]
    RssiReadFailed(BleError),

    #[error("No data found")]
    CharacteristicEmpty,

    #[error("Characteristic read failed: {0}")]
    CharacteristicReadFailed(BleError),

    #[error("Write {step} failed: {source}")]
    WriteFailed { step: usize, source: BleError },

    #[error("Disconnect failed: {0}")]
    DisconnectFailed(BleError),
}

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Bluetooth error
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] BleError),

    /// Session error
    #[error("Session error: {0}")]
    Session(#[from] SessionFailure),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
