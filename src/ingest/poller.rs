//! # Serial Ingestion Loop
//!
//! Polls the serial port on a fixed tick. Each tick runs as its own task and
//! only proceeds if it can take the ingest state without waiting; a tick that
//! finds the previous one still running is skipped. Work never queues up
//! behind a slow read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::LinkDecoder;
use crate::serial::{SerialPortIO, UplinkQueue};
use crate::shutdown::ShutdownListener;

/// Upper bound for one read
const READ_CHUNK: usize = 4096;

/// Everything a tick needs exclusive access to
struct IngestState<P> {
    port: P,
    decoder: LinkDecoder,
    uplink: Option<UplinkQueue>,
    read_buf: Vec<u8>,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick still held the state
    Skipped,
    /// Tick ran; counts of bytes read and readings published
    Completed { bytes: usize, readings: usize },
}

/// Periodic poll of one serial device
pub struct SerialIngest<P> {
    state: Arc<Mutex<IngestState<P>>>,
    poll_interval: Duration,
}

impl<P> std::fmt::Debug for SerialIngest<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialIngest")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl<P: SerialPortIO + 'static> SerialIngest<P> {
    pub fn new(
        port: P,
        decoder: LinkDecoder,
        uplink: Option<UplinkQueue>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(IngestState {
                port,
                decoder,
                uplink,
                read_buf: vec![0u8; READ_CHUNK],
            })),
            poll_interval,
        }
    }

    /// Run one poll now, unless another one is in progress
    pub async fn tick(&self) -> TickOutcome {
        poll_once(&self.state).await
    }

    /// Tick until `shutdown` fires, then wait for the in-flight tick and
    /// release the device
    pub async fn run(self, mut shutdown: ShutdownListener) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<TickOutcome>> = Vec::new();

        info!("Serial ingestion started ({:?} tick)", self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    in_flight.retain(|handle| !handle.is_finished());
                    let state = Arc::clone(&self.state);
                    in_flight.push(tokio::spawn(async move { poll_once(&state).await }));
                }
                _ = shutdown.wait() => {
                    info!("Stopping serial ingestion");
                    break;
                }
            }
        }

        for handle in in_flight {
            if let Err(e) = handle.await {
                warn!("Poll task failed: {}", e);
            }
        }

        // Last reference: dropping it closes the port
        drop(self.state);
        info!("Serial port released");
    }
}

async fn poll_once<P: SerialPortIO>(state: &Mutex<IngestState<P>>) -> TickOutcome {
    let Ok(mut guard) = state.try_lock() else {
        debug!("Previous poll still running, skipping tick");
        return TickOutcome::Skipped;
    };
    let state = &mut *guard;

    if let Some(uplink) = state.uplink.as_mut() {
        while let Ok(frame) = uplink.try_recv() {
            match state.port.write_all(&frame).await {
                Ok(()) => {
                    if let Err(e) = state.port.flush().await {
                        warn!("Failed to flush serial port: {}", e);
                    }
                    debug!("Sent uplink frame ({} bytes)", frame.len());
                }
                Err(e) => warn!("Failed to send packet over serial port: {}", e),
            }
        }
    }

    let bytes = match state.port.read_available(&mut state.read_buf).await {
        Ok(n) => n,
        Err(e) => {
            warn!("Serial read failed: {}", e);
            0
        }
    };
    trace!("Read {} bytes", bytes);

    let readings = if bytes > 0 {
        let IngestState {
            decoder, read_buf, ..
        } = state;
        decoder.ingest(&read_buf[..bytes])
    } else {
        0
    };

    TickOutcome::Completed { bytes, readings }
}
