//! # Channel Table
//!
//! Maps link devices to the semantic channels of a reading.
//!
//! ## Device Assignments
//!
//! | Device | Channel | Expanded into |
//! |--------|---------|---------------|
//! | System | System | - |
//! | PressureSensor | Pressure | - |
//! | TemperatureSensor | Temperature | - |
//! | HumiditySensor | Humidity | - |
//! | Gps | GpsBlock | Latitude, Longitude, Altitude (f64 LE at 0/8/16) |
//! | Accelerometer | AccelerationBlock | AccelerationX/Y/Z (f32 LE at 0/4/8) |
//! | Unknown / other ids | Unknown | - |

use bytes::Bytes;

use crate::codec::DeviceId;
use crate::error::{Result, TelemetryError};

/// Semantic label of a value inside a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    System,
    Pressure,
    Temperature,
    Humidity,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    Latitude,
    Longitude,
    Altitude,
    GpsBlock,
    AccelerationBlock,
    Unknown,
}

/// Sub-channel slices of a block payload: (channel, offset, width)
const GPS_LAYOUT: [(Channel, usize, usize); 3] = [
    (Channel::Latitude, 0, 8),
    (Channel::Longitude, 8, 8),
    (Channel::Altitude, 16, 8),
];

const ACCELERATION_LAYOUT: [(Channel, usize, usize); 3] = [
    (Channel::AccelerationX, 0, 4),
    (Channel::AccelerationY, 4, 4),
    (Channel::AccelerationZ, 8, 4),
];

impl Channel {
    /// Channel a device's packets land in
    pub fn from_device(device: DeviceId) -> Self {
        match device {
            DeviceId::System => Channel::System,
            DeviceId::PressureSensor => Channel::Pressure,
            DeviceId::TemperatureSensor => Channel::Temperature,
            DeviceId::HumiditySensor => Channel::Humidity,
            DeviceId::Gps => Channel::GpsBlock,
            DeviceId::Accelerometer => Channel::AccelerationBlock,
            DeviceId::Unknown | DeviceId::Other(_) => Channel::Unknown,
        }
    }

    /// Split a block payload into its sub-channels
    ///
    /// Sub-channels the payload is too short for are left out. Non-block
    /// channels expand to nothing.
    pub fn expand(self, payload: &Bytes) -> Vec<(Channel, Bytes)> {
        let layout: &[(Channel, usize, usize)] = match self {
            Channel::GpsBlock => &GPS_LAYOUT,
            Channel::AccelerationBlock => &ACCELERATION_LAYOUT,
            _ => return Vec::new(),
        };

        layout
            .iter()
            .filter(|(_, offset, width)| payload.len() >= offset + width)
            .map(|&(channel, offset, width)| (channel, payload.slice(offset..offset + width)))
            .collect()
    }
}

/// Decode a scalar channel payload
///
/// 4-byte payloads are f32 LE, 8-byte payloads are f64 LE (narrowed to f32).
pub fn decode_scalar(payload: &[u8]) -> Result<f32> {
    match payload.len() {
        4 => {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(payload);
            Ok(f32::from_le_bytes(raw))
        }
        8 => Ok(decode_f64(payload, 0)? as f32),
        n => Err(TelemetryError::Stage(format!(
            "Scalar payload must be 4 or 8 bytes, got {}",
            n
        ))),
    }
}

/// Read an f64 LE at `offset`
pub fn decode_f64(payload: &[u8], offset: usize) -> Result<f64> {
    payload
        .get(offset..offset + 8)
        .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
        .map(f64::from_le_bytes)
        .ok_or_else(|| {
            TelemetryError::Stage(format!(
                "Payload of {} bytes has no f64 at offset {}",
                payload.len(),
                offset
            ))
        })
}
