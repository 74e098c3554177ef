//! Peripheral identity as seen by the scanner and the session sequencer

use std::fmt;

/// Opaque transport-assigned identifier of a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A discovered peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralIdentity {
    /// Unique id
    pub id: DeviceId,
    /// Advertised local name, if any
    pub local_name: Option<String>,
    /// Last known signal strength in dBm
    pub rssi: Option<i16>,
}

impl PeripheralIdentity {
    /// Create a new identity
    pub fn new(id: impl Into<DeviceId>, local_name: Option<String>, rssi: Option<i16>) -> Self {
        Self {
            id: id.into(),
            local_name,
            rssi,
        }
    }

    /// Name used in logs and status lines
    pub fn display_name(&self) -> &str {
        self.local_name.as_deref().unwrap_or("<unnamed>")
    }

    /// Whether the advertised name starts with `prefix`
    ///
    /// Peripherals without a name never match.
    pub fn name_starts_with(&self, prefix: &str) -> bool {
        self.local_name
            .as_deref()
            .map_or(false, |name| name.starts_with(prefix))
    }

    /// Return a copy with the given signal strength
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PeripheralIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.id)
    }
}
