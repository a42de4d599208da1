//! # Link Protocol Constants and Types
//!
//! Frame layout:
//!
//! ```text
//! 0xAA 0x55 | len | device | timestamp (u64 LE) | payload (0-64) | crc16 (BE)
//! ```
//!
//! `len` counts `device + timestamp + payload`. The CRC covers `len` through the
//! end of the payload.

use bytes::Bytes;

/// First sync byte
pub const SYNC_BYTE_0: u8 = 0xAA;

/// Second sync byte
pub const SYNC_BYTE_1: u8 = 0x55;

/// Sync word + length byte
pub const HEADER_LEN: usize = 3;

/// Device id + timestamp
pub const FIXED_BODY_LEN: usize = 9;

/// Maximum payload size
pub const MAX_PAYLOAD_SIZE: usize = 64;

/// CRC16 trailer
pub const CRC_LEN: usize = 2;

/// Largest possible frame on the wire
pub const MAX_FRAME_LEN: usize = HEADER_LEN + FIXED_BODY_LEN + MAX_PAYLOAD_SIZE + CRC_LEN;

/// Device that produced a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceId {
    /// On-board computer status text
    System,
    /// Barometer (f32 Pa)
    PressureSensor,
    /// Thermometer (f32 °C)
    TemperatureSensor,
    /// Hygrometer (f32 %RH)
    HumiditySensor,
    /// GPS receiver (f64 latitude, longitude, altitude)
    Gps,
    /// Accelerometer (f32 x, y, z)
    Accelerometer,
    /// Explicitly unknown device
    Unknown,
    /// Id not in the device table
    Other(u8),
}

impl From<u8> for DeviceId {
    fn from(value: u8) -> Self {
        match value {
            0x00 => DeviceId::System,
            0x01 => DeviceId::PressureSensor,
            0x02 => DeviceId::TemperatureSensor,
            0x03 => DeviceId::HumiditySensor,
            0x04 => DeviceId::Gps,
            0x05 => DeviceId::Accelerometer,
            0xFF => DeviceId::Unknown,
            other => DeviceId::Other(other),
        }
    }
}

impl From<DeviceId> for u8 {
    fn from(value: DeviceId) -> Self {
        match value {
            DeviceId::System => 0x00,
            DeviceId::PressureSensor => 0x01,
            DeviceId::TemperatureSensor => 0x02,
            DeviceId::HumiditySensor => 0x03,
            DeviceId::Gps => 0x04,
            DeviceId::Accelerometer => 0x05,
            DeviceId::Unknown => 0xFF,
            DeviceId::Other(raw) => raw,
        }
    }
}

/// One decoded link packet
///
/// Timestamps are nanoseconds since an epoch chosen by the transmitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub device_id: DeviceId,
    pub timestamp_ns: u64,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(device_id: DeviceId, timestamp_ns: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            device_id,
            timestamp_ns,
            payload: payload.into(),
        }
    }
}
