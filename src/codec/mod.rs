//! # Link Codec Module
//!
//! Framing for the radio-serial downlink and uplink.
//!
//! This module handles:
//! - Locating frames in a noisy byte stream (sync word + length)
//! - CRC-16/CCITT-FALSE validation
//! - Decoding frames into [`Packet`]s and encoding packets for uplink
//!
//! The ingestion loop only depends on the [`PacketCodec`] trait, so a different
//! framing can be swapped in without touching the pipeline.

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;

use bytes::BytesMut;

use crate::error::Result;
pub use protocol::{DeviceId, Packet};

/// Decode/encode service for link frames
#[cfg_attr(test, mockall::automock)]
pub trait PacketCodec: Send + Sync {
    /// Extract the first framed packet from `buf`, consuming the matched prefix.
    ///
    /// Returns `None` when no complete frame candidate is left in the buffer,
    /// `Some(Err(_))` when a candidate frame was rejected (its sync byte is consumed
    /// so the next call resynchronizes), and `Some(Ok(_))` for a valid packet.
    fn decode_next(&self, buf: &mut BytesMut) -> Option<Result<Packet>>;

    /// Encode a packet into a complete frame.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>>;
}

/// Default codec for the payload's binary framing
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl PacketCodec for FrameCodec {
    fn decode_next(&self, buf: &mut BytesMut) -> Option<Result<Packet>> {
        decoder::decode_next(buf)
    }

    fn encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        encoder::encode_packet(packet)
    }
}
