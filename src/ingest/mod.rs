//! # Ingestion Module
//!
//! Everything between raw link bytes and published readings.
//!
//! This module handles:
//! - Frame decoding and time-window regrouping ([`FrameIngest`], [`resync`])
//! - Assembling groups into readings ([`assembler`])
//! - The periodic, drop-if-busy serial poll ([`poller`])
//! - Offline replay of recorded link bytes ([`replay`])
//! - The older text line protocol ([`legacy`])

pub mod assembler;
pub mod legacy;
pub mod poller;
pub mod replay;
pub mod resync;

use std::sync::Arc;

use bytes::BytesMut;
use tracing::{debug, info, trace, warn};

use crate::codec::PacketCodec;
use crate::config::{LinkProtocol, ResyncConfig};
use crate::pipeline::Provider;
use crate::telemetry::Reading;
use assembler::ReadingAssembler;
use legacy::LegacyIngest;
use resync::PacketResync;

/// Decode → resync → assemble, for the binary framed protocol
pub struct FrameIngest {
    codec: Arc<dyn PacketCodec>,
    accumulator: BytesMut,
    resync: PacketResync,
    assembler: ReadingAssembler,
    rejected_frames: u64,
}

impl std::fmt::Debug for FrameIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameIngest")
            .field("buffered_bytes", &self.accumulator.len())
            .field("resync", &self.resync)
            .field("rejected_frames", &self.rejected_frames)
            .finish_non_exhaustive()
    }
}

impl FrameIngest {
    pub fn new(
        codec: Arc<dyn PacketCodec>,
        resync: PacketResync,
        readings: Arc<Provider<Reading>>,
    ) -> Self {
        Self {
            codec,
            accumulator: BytesMut::new(),
            resync,
            assembler: ReadingAssembler::new(readings),
            rejected_frames: 0,
        }
    }

    /// Append link bytes and move every complete frame into the resync buffer
    ///
    /// Returns the number of packets accepted. Rejected frames are logged and
    /// skipped; a trailing partial frame stays buffered for the next call.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> usize {
        self.accumulator.extend_from_slice(bytes);

        let mut accepted = 0;
        while let Some(decoded) = self.codec.decode_next(&mut self.accumulator) {
            match decoded {
                Ok(packet) => {
                    trace!(
                        device = ?packet.device_id,
                        timestamp_ns = packet.timestamp_ns,
                        "Decoded packet"
                    );
                    self.resync.add_packet(packet);
                    accepted += 1;
                }
                Err(e) => {
                    self.rejected_frames += 1;
                    warn!("Invalid or corrupted frame: {}", e);
                }
            }
        }

        if accepted == 0 {
            debug!("No valid packets extracted from buffer");
        }
        accepted
    }

    /// Publish the head group, even if it could still grow
    pub fn emit_next(&mut self) -> bool {
        let group = self.resync.next_group();
        self.assembler.publish_group(&group)
    }

    /// Publish every group that can no longer grow
    pub fn emit_closed(&mut self) -> usize {
        let mut published = 0;
        while self.resync.has_closed_group() {
            if self.emit_next() {
                published += 1;
            }
        }
        published
    }

    /// Publish everything left in the resync buffer
    pub fn drain(&mut self) -> usize {
        let mut published = 0;
        while self.emit_next() {
            published += 1;
        }
        published
    }

    /// Live-link step: feed, then if anything arrived publish the head group
    /// and every closed group behind it
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        if self.feed_bytes(bytes) == 0 {
            return 0;
        }
        let head = usize::from(self.emit_next());
        head + self.emit_closed()
    }

    pub fn resync(&self) -> &PacketResync {
        &self.resync
    }

    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    pub fn buffered_bytes(&self) -> usize {
        self.accumulator.len()
    }
}

/// Protocol-specific byte handling behind the serial poll
#[derive(Debug)]
pub enum LinkDecoder {
    Framed(FrameIngest),
    Legacy(LegacyIngest),
}

impl LinkDecoder {
    /// Build the decoder for `protocol`, publishing into `readings`
    pub fn for_protocol(
        protocol: LinkProtocol,
        codec: Arc<dyn PacketCodec>,
        resync: &ResyncConfig,
        readings: Arc<Provider<Reading>>,
    ) -> Self {
        match protocol {
            LinkProtocol::Framed => {
                let resync = PacketResync::from_config(resync);
                info!("Framed link protocol, {} ms resync window", resync.window_ns() / 1_000_000);
                LinkDecoder::Framed(FrameIngest::new(codec, resync, readings))
            }
            LinkProtocol::Legacy => {
                info!("Legacy line protocol");
                LinkDecoder::Legacy(LegacyIngest::new(readings))
            }
        }
    }

    /// Handle freshly read bytes; returns the number of readings published
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        match self {
            LinkDecoder::Framed(framed) => framed.ingest(bytes),
            LinkDecoder::Legacy(legacy) => legacy.ingest(bytes),
        }
    }
}
