//! Packet resynchronizer.
//!
//! Packets from different sensors of one sample leave the payload close in
//! time but arrive scattered and possibly reordered. The resynchronizer buffers
//! them and hands out groups whose timestamps fall inside one window.

use std::fmt;

use tracing::{debug, warn};

use crate::codec::Packet;
use crate::config::ResyncConfig;

/// Default grouping window: 100 ms
pub const DEFAULT_WINDOW_NS: u64 = 100_000_000;

/// Default stale threshold: 500 ms
pub const DEFAULT_STALE_THRESHOLD_NS: u64 = 500_000_000;

/// Default maximum number of buffered packets
pub const DEFAULT_CAPACITY: usize = 4096;

/// Time-window grouping buffer
///
/// Not thread-safe on its own; the ingestion loop owns it behind its state
/// lock.
pub struct PacketResync {
    buffer: Vec<Packet>,
    window_ns: u64,
    stale_threshold_ns: u64,
    capacity: usize,
    last_seen_ns: Option<u64>,
    dropped_stale: u64,
    evicted: u64,
}

impl fmt::Debug for PacketResync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketResync")
            .field("len", &self.buffer.len())
            .field("window_ns", &self.window_ns)
            .field("stale_threshold_ns", &self.stale_threshold_ns)
            .field("dropped_stale", &self.dropped_stale)
            .finish()
    }
}

impl Default for PacketResync {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_NS, DEFAULT_STALE_THRESHOLD_NS, DEFAULT_CAPACITY)
    }
}

impl PacketResync {
    pub fn new(window_ns: u64, stale_threshold_ns: u64, capacity: usize) -> Self {
        Self {
            buffer: Vec::new(),
            window_ns,
            stale_threshold_ns,
            capacity: capacity.max(1),
            last_seen_ns: None,
            dropped_stale: 0,
            evicted: 0,
        }
    }

    pub fn from_config(config: &ResyncConfig) -> Self {
        Self::new(
            config.window_ms * 1_000_000,
            config.stale_threshold_ms * 1_000_000,
            config.capacity,
        )
    }

    /// Buffer a packet, or drop it if it is older than the stale threshold
    /// relative to the previously observed timestamp
    ///
    /// Every arrival moves the anchor, dropped ones included, so a single
    /// bogus future timestamp or a payload clock restart costs one packet.
    pub fn add_packet(&mut self, packet: Packet) {
        let ts = packet.timestamp_ns;
        let previous = self.last_seen_ns.replace(ts);

        if let Some(previous) = previous {
            let age = previous.saturating_sub(ts);
            if age > self.stale_threshold_ns {
                self.dropped_stale += 1;
                debug!(
                    device = ?packet.device_id,
                    age_ms = age / 1_000_000,
                    "Dropping stale packet"
                );
                return;
            }
        }
        if self.buffer.len() >= self.capacity {
            if let Some(oldest) = self
                .buffer
                .iter()
                .enumerate()
                .min_by_key(|(_, p)| p.timestamp_ns)
                .map(|(i, _)| i)
            {
                let evicted = self.buffer.remove(oldest);
                self.evicted += 1;
                warn!(
                    capacity = self.capacity,
                    timestamp_ns = evicted.timestamp_ns,
                    "Resync buffer full, evicting oldest packet"
                );
            }
        }

        self.buffer.push(packet);
    }

    /// Remove and return the earliest group of packets within one window
    ///
    /// The group is sorted by timestamp; packets with equal timestamps keep
    /// their arrival order. An empty buffer yields an empty group.
    pub fn next_group(&mut self) -> Vec<Packet> {
        if self.buffer.is_empty() {
            return Vec::new();
        }

        // Vec::sort_by_key is stable
        self.buffer.sort_by_key(|p| p.timestamp_ns);
        let first = self.buffer[0].timestamp_ns;
        let split = self
            .buffer
            .iter()
            .position(|p| p.timestamp_ns - first > self.window_ns)
            .unwrap_or(self.buffer.len());

        let rest = self.buffer.split_off(split);
        std::mem::replace(&mut self.buffer, rest)
    }

    /// Whether a packet beyond the head group's window is buffered, meaning
    /// the head group can no longer grow
    pub fn has_closed_group(&self) -> bool {
        match self.buffer.iter().map(|p| p.timestamp_ns).min() {
            Some(first) => self
                .buffer
                .iter()
                .any(|p| p.timestamp_ns - first > self.window_ns),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Packets dropped as stale since creation
    pub fn dropped_stale(&self) -> u64 {
        self.dropped_stale
    }

    /// Packets evicted because the buffer was full
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn window_ns(&self) -> u64 {
        self.window_ns
    }
}
