//! # Frame Decoder
//!
//! Pulls framed packets out of the persistent byte accumulator.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::crc::crc16_ccitt;
use super::protocol::*;
use crate::error::{Result, TelemetryError};

/// Extract the first framed packet from `buf`
///
/// Bytes before the first sync word are discarded. A trailing partial frame is
/// left in the buffer for the next read.
///
/// # Returns
///
/// * `None` - no complete frame candidate in the buffer
/// * `Some(Err(_))` - a candidate was rejected; its first sync byte was consumed
/// * `Some(Ok(packet))` - a valid frame was consumed
pub fn decode_next(buf: &mut BytesMut) -> Option<Result<Packet>> {
    match find_sync(buf) {
        Some(0) => {}
        Some(start) => {
            trace!("Discarding {} bytes before sync word", start);
            buf.advance(start);
        }
        None => {
            // A lone first sync byte at the tail may be the start of the next frame
            let keep = usize::from(buf.last() == Some(&SYNC_BYTE_0));
            let discard = buf.len() - keep;
            if discard > 0 {
                trace!("Discarding {} bytes without sync word", discard);
                buf.advance(discard);
            }
            return None;
        }
    }

    if buf.len() < HEADER_LEN {
        return None;
    }

    let body_len = buf[2] as usize;
    if !(FIXED_BODY_LEN..=FIXED_BODY_LEN + MAX_PAYLOAD_SIZE).contains(&body_len) {
        buf.advance(1);
        return Some(Err(TelemetryError::Codec(format!(
            "Invalid frame length: {}",
            body_len
        ))));
    }

    let frame_len = HEADER_LEN + body_len + CRC_LEN;
    if buf.len() < frame_len {
        return None;
    }

    let crc_offset = HEADER_LEN + body_len;
    let received_crc = u16::from_be_bytes([buf[crc_offset], buf[crc_offset + 1]]);
    let calculated_crc = crc16_ccitt(&buf[2..crc_offset]);

    if received_crc != calculated_crc {
        buf.advance(1);
        return Some(Err(TelemetryError::Codec(format!(
            "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
            calculated_crc, received_crc
        ))));
    }

    let mut frame = buf.split_to(frame_len);
    frame.advance(HEADER_LEN);

    let device_id = DeviceId::from(frame.get_u8());
    let timestamp_ns = frame.get_u64_le();
    frame.truncate(body_len - FIXED_BODY_LEN);

    Some(Ok(Packet {
        device_id,
        timestamp_ns,
        payload: frame.freeze(),
    }))
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(2)
        .position(|w| w[0] == SYNC_BYTE_0 && w[1] == SYNC_BYTE_1)
}
