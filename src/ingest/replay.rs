//! Offline replay of a recorded link capture through the live decode path.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use super::FrameIngest;
use crate::error::{Result, TelemetryError};

/// Totals of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub bytes: usize,
    pub chunks: usize,
    pub packets: usize,
    pub readings: usize,
}

/// Feed `data` to `ingest` in `chunk_size` pieces, as a serial read would
/// deliver it
///
/// Closed groups are published after every chunk; whatever is still buffered
/// at the end is drained.
pub fn replay_bytes(data: &[u8], chunk_size: usize, ingest: &mut FrameIngest) -> ReplaySummary {
    let mut summary = ReplaySummary {
        bytes: data.len(),
        ..ReplaySummary::default()
    };

    for chunk in data.chunks(chunk_size.max(1)) {
        summary.chunks += 1;
        summary.packets += ingest.feed_bytes(chunk);
        summary.readings += ingest.emit_closed();
    }
    summary.readings += ingest.drain();

    debug!(
        rejected_frames = ingest.rejected_frames(),
        dropped_stale = ingest.resync().dropped_stale(),
        evicted = ingest.resync().evicted(),
        "Replay finished"
    );
    summary
}

/// Replay a capture file
///
/// # Errors
///
/// [`TelemetryError::FileNotFound`] if `path` does not exist, I/O errors
/// otherwise.
pub fn replay_file<P: AsRef<Path>>(
    path: P,
    chunk_size: usize,
    ingest: &mut FrameIngest,
) -> Result<ReplaySummary> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TelemetryError::FileNotFound(path.display().to_string()));
    }

    let data = fs::read(path)?;
    info!("Replaying {} ({} bytes)", path.display(), data.len());

    let summary = replay_bytes(&data, chunk_size, ingest);
    info!(
        "Replay of {} done: {} packets, {} readings",
        path.display(),
        summary.packets,
        summary.readings
    );
    Ok(summary)
}
