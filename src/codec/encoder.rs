//! # Frame Encoder
//!
//! Encodes packets for the uplink (and for simulated downlink traffic).

use super::crc::crc16_ccitt;
use super::protocol::*;
use crate::error::{Result, TelemetryError};

/// Encode a packet into a complete frame
///
/// # Errors
///
/// Returns error if the payload exceeds [`MAX_PAYLOAD_SIZE`].
///
/// # Examples
///
/// ```
/// use groundlink::codec::encoder::encode_packet;
/// use groundlink::codec::{DeviceId, Packet};
///
/// let packet = Packet::new(DeviceId::PressureSensor, 1_000, 101_325f32.to_le_bytes().to_vec());
/// let frame = encode_packet(&packet).unwrap();
/// assert_eq!(frame.len(), 3 + 9 + 4 + 2);
/// ```
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>> {
    if packet.payload.len() > MAX_PAYLOAD_SIZE {
        return Err(TelemetryError::Codec(format!(
            "Payload size {} exceeds maximum {}",
            packet.payload.len(),
            MAX_PAYLOAD_SIZE
        )));
    }

    let body_len = FIXED_BODY_LEN + packet.payload.len();
    let mut frame = Vec::with_capacity(HEADER_LEN + body_len + CRC_LEN);

    frame.push(SYNC_BYTE_0);
    frame.push(SYNC_BYTE_1);
    frame.push(body_len as u8);
    frame.push(u8::from(packet.device_id));
    frame.extend_from_slice(&packet.timestamp_ns.to_le_bytes());
    frame.extend_from_slice(&packet.payload);

    // CRC over len + body, sync word excluded
    let crc = crc16_ccitt(&frame[2..]);
    frame.extend_from_slice(&crc.to_be_bytes());

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let packet = Packet::new(DeviceId::TemperatureSensor, 0x0102_0304_0506_0708, vec![0xAB, 0xCD]);
        let frame = encode_packet(&packet).unwrap();

        assert_eq!(frame[0], SYNC_BYTE_0);
        assert_eq!(frame[1], SYNC_BYTE_1);
        assert_eq!(frame[2], 11, "len = device + timestamp + 2 payload bytes");
        assert_eq!(frame[3], 0x02);
        assert_eq!(&frame[4..12], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&frame[12..14], &[0xAB, 0xCD]);

        let crc = crc16_ccitt(&frame[2..14]);
        assert_eq!(&frame[14..16], &crc.to_be_bytes());
    }

    #[test]
    fn test_encode_empty_payload() {
        let packet = Packet::new(DeviceId::System, 5, Vec::new());
        let frame = encode_packet(&packet).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + FIXED_BODY_LEN + CRC_LEN);
    }

    #[test]
    fn test_encode_max_payload() {
        let packet = Packet::new(DeviceId::System, 5, vec![0u8; MAX_PAYLOAD_SIZE]);
        let frame = encode_packet(&packet).unwrap();
        assert_eq!(frame.len(), MAX_FRAME_LEN);
    }

    #[test]
    fn test_encode_payload_too_large() {
        let packet = Packet::new(DeviceId::System, 5, vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(encode_packet(&packet).is_err());
    }
}
