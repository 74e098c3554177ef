//! Fixed GATT layout and command frames spoken by Taggr peripherals

use uuid::Uuid;

/// Service carrying the diagnostic characteristic
pub const DIAGNOSTIC_SERVICE: Uuid = Uuid::from_u128(0xaa000000_2dd5_4887_8a05_d6655fdc7da9);

/// Diagnostic (board name) characteristic
pub const DIAGNOSTIC_CHARACTERISTIC: Uuid = Uuid::from_u128(0xaa000099_2dd5_4887_8a05_d66556278545);

/// Service receiving command frames
pub const COMMAND_SERVICE: Uuid = Uuid::from_u128(0x29a3f8fa_51aa_49a6_9b6b_d936795326ec);

/// Payload characteristic (16-bit id 0x5002)
pub const PAYLOAD_CHARACTERISTIC: Uuid = short_uuid(0x5002);

/// Port selector characteristic (16-bit id 0x5003)
pub const SELECTOR_CHARACTERISTIC: Uuid = short_uuid(0x5003);

/// Command payload sent ahead of the selector
pub const COMMAND_PAYLOAD: [u8; 9] = [0x00, 0x04, 0xD2, 0x00, 0x0A, 0x02, 0x01, 0x02, 0x03];

/// Port selector byte
pub const PORT_SELECT: [u8; 1] = [0x14];

/// Default requested transfer unit
pub const DEFAULT_MTU: u16 = 512;

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb)
}

/// One logical command split across the payload and selector characteristics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    payload: Vec<u8>,
    selector: Vec<u8>,
}

impl CommandFrame {
    /// Build a frame from a raw payload and selector
    ///
    /// Returns `None` when the payload does not fit a single length byte.
    pub fn new(payload: &[u8], selector: &[u8]) -> Option<Self> {
        let len = u8::try_from(payload.len()).ok()?;
        let mut framed = Vec::with_capacity(payload.len() + 1);
        framed.push(len);
        framed.extend_from_slice(payload);
        Some(Self {
            payload: framed,
            selector: selector.to_vec(),
        })
    }

    /// The standard command frame
    pub fn standard() -> Self {
        let mut payload = Vec::with_capacity(COMMAND_PAYLOAD.len() + 1);
        payload.push(COMMAND_PAYLOAD.len() as u8);
        payload.extend_from_slice(&COMMAND_PAYLOAD);
        Self {
            payload,
            selector: PORT_SELECT.to_vec(),
        }
    }

    /// Length-prefixed payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Selector bytes
    pub fn selector(&self) -> &[u8] {
        &self.selector
    }

    /// The two writes making up this frame, in order
    pub fn writes(&self) -> [(Uuid, &[u8]); 2] {
        [
            (PAYLOAD_CHARACTERISTIC, self.payload()),
            (SELECTOR_CHARACTERISTIC, self.selector()),
        ]
    }
}

impl Default for CommandFrame {
    fn default() -> Self {
        Self::standard()
    }
}

/// Decode the diagnostic characteristic into text
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
pub fn decode_diagnostic(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}
