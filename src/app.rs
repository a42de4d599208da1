//! # Run Modes
//!
//! Wires the pipeline, sinks, ingestion and HTTP surface together for the
//! live/mock serial mode and the offline replay mode.

use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::codec::{FrameCodec, PacketCodec};
use crate::config::{Config, CsvConfig};
use crate::error::{Result, TelemetryError};
use crate::ingest::poller::SerialIngest;
use crate::ingest::replay::{replay_file, ReplaySummary};
use crate::ingest::resync::PacketResync;
use crate::ingest::{FrameIngest, LinkDecoder};
use crate::pipeline::TelemetryGraph;
use crate::serial::{SerialPortIO, SerialSender};
use crate::server::{self, AppState};
use crate::shutdown::{Shutdown, ShutdownListener};
use crate::sinks::{CsvSink, SseBroadcaster};

pub type FileCsvSink = CsvSink<BufWriter<File>>;

/// The standard graph plus its CSV log, if enabled
#[derive(Debug)]
pub struct Telemetry {
    pub graph: TelemetryGraph,
    pub csv: Option<(Arc<FileCsvSink>, PathBuf)>,
}

impl Telemetry {
    pub fn build(csv: &CsvConfig) -> Result<Self> {
        let graph = TelemetryGraph::build();

        let csv = if csv.enabled {
            let (sink, path) = CsvSink::create_in(&csv.output_dir)?;
            let sink = Arc::new(sink);
            sink.attach(graph.finalizers());
            Some((sink, path))
        } else {
            info!("CSV log disabled");
            None
        };

        Ok(Self { graph, csv })
    }

    /// Write out the pending CSV row
    pub fn finish(&self) {
        if let Some((sink, path)) = &self.csv {
            match sink.finish() {
                Ok(()) => info!("CSV log {} closed ({} rows)", path.display(), sink.rows_written()),
                Err(e) => warn!("Failed to flush CSV log {}: {}", path.display(), e),
            }
        }
    }

    pub fn csv_path(&self) -> Option<&Path> {
        self.csv.as_ref().map(|(_, path)| path.as_path())
    }
}

/// Replay result with the CSV log it produced
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub summary: ReplaySummary,
    pub csv_path: Option<PathBuf>,
}

/// Run a capture file through the pipeline into a CSV log
///
/// The CSV log is always written in this mode.
pub fn run_replay(config: &Config, path: &Path) -> Result<ReplayOutcome> {
    // Checked before the CSV log is created so a bad path leaves no empty log
    if !path.exists() {
        return Err(TelemetryError::FileNotFound(path.display().to_string()));
    }

    let csv_config = CsvConfig {
        enabled: true,
        ..config.csv.clone()
    };
    let telemetry = Telemetry::build(&csv_config)?;

    let mut ingest = FrameIngest::new(
        Arc::new(FrameCodec),
        PacketResync::from_config(&config.resync),
        Arc::clone(telemetry.graph.readings()),
    );
    let summary = replay_file(path, config.replay.chunk_size, &mut ingest)?;
    telemetry.finish();

    Ok(ReplayOutcome {
        summary,
        csv_path: telemetry.csv_path().map(Path::to_path_buf),
    })
}

/// Ingest from `port` and serve HTTP on `listener` until `shutdown` fires
pub async fn run_live<P: SerialPortIO + 'static>(
    config: &Config,
    port: P,
    listener: TcpListener,
    shutdown: ShutdownListener,
) -> Result<()> {
    let telemetry = Telemetry::build(&config.csv)?;
    let codec: Arc<dyn PacketCodec> = Arc::new(FrameCodec);

    let broadcaster = Arc::new(SseBroadcaster::new(
        telemetry.graph.finalizers().clone(),
        config.server.sse_buffer,
    ));
    let (sender, uplink) = SerialSender::channel(config.serial.uplink_queue);

    let decoder = LinkDecoder::for_protocol(
        config.serial.protocol,
        Arc::clone(&codec),
        &config.resync,
        Arc::clone(telemetry.graph.readings()),
    );
    let ingest = SerialIngest::new(
        port,
        decoder,
        Some(uplink),
        Duration::from_millis(config.serial.poll_interval_ms),
    );

    // Local stop signal: follows `shutdown`, and also fires if the server fails
    let stop = Arc::new(Shutdown::new());
    let relay = {
        let stop = Arc::clone(&stop);
        let mut shutdown = shutdown;
        tokio::spawn(async move {
            shutdown.wait().await;
            stop.trigger();
        })
    };

    let tasks = vec![
        ("ingestion", tokio::spawn(ingest.run(stop.listener()))),
        ("sse", tokio::spawn(Arc::clone(&broadcaster).close_on(stop.listener()))),
    ];

    let state = AppState {
        broadcaster,
        sender: Some(sender),
        codec,
    };
    let served = join_after_server(server::serve(listener, state, stop.listener()), &stop, tasks).await;
    relay.abort();

    // The CSV row is flushed only after the last in-flight tick has published
    telemetry.finish();

    served
}

/// Await `server`, then stop and join the background `tasks`
///
/// The server only returns on shutdown or on failure; either way the other
/// tasks must not outlive it.
async fn join_after_server<F>(
    server: F,
    stop: &Shutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let served = server.await;
    if let Err(e) = &served {
        error!("HTTP server failed: {}", e);
    }
    stop.trigger();

    for (name, task) in tasks {
        if let Err(e) = task.await {
            warn!("{} task failed: {}", name, e);
        }
    }
    served
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encoder::encode_packet, DeviceId, Packet};
    use std::io::Write;

    fn config_in(dir: &Path) -> Config {
        let mut config = Config::default();
        config.csv.output_dir = dir.join("Data").display().to_string();
        config
    }

    #[test]
    fn test_replay_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let capture = dir.path().join("flight.bin");
        let mut file = File::create(&capture).unwrap();
        for i in 0..4u64 {
            let ts = i * 300_000_000;
            file.write_all(
                &encode_packet(&Packet::new(DeviceId::PressureSensor, ts, 101_325f32.to_le_bytes().to_vec()))
                    .unwrap(),
            )
            .unwrap();
            file.write_all(
                &encode_packet(&Packet::new(DeviceId::TemperatureSensor, ts, 0f32.to_le_bytes().to_vec()))
                    .unwrap(),
            )
            .unwrap();
        }
        drop(file);

        let mut config = config_in(dir.path());
        config.csv.enabled = false;
        let outcome = run_replay(&config, &capture).unwrap();

        assert_eq!(outcome.summary.readings, 4);
        let csv = std::fs::read_to_string(outcome.csv_path.unwrap()).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 5);
        assert!(rows[1].starts_with("101325,0,"));
        assert!(rows[4].ends_with(",900000000"));
    }

    #[test]
    fn test_replay_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_replay(&config_in(dir.path()), &dir.path().join("missing.bin"));
        assert!(matches!(result, Err(TelemetryError::FileNotFound(_))));
    }

    #[test]
    fn test_replay_missing_file_creates_no_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        assert!(run_replay(&config, &dir.path().join("missing.bin")).is_err());
        assert!(!dir.path().join("Data").exists());
    }

    #[tokio::test]
    async fn test_server_failure_stops_tasks() {
        let stop = Shutdown::new();
        let mut listener = stop.listener();
        let worker = tokio::spawn(async move { listener.wait().await });

        let failing = async { Err(TelemetryError::Io(std::io::ErrorKind::AddrInUse.into())) };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            join_after_server(failing, &stop, vec![("worker", worker)]),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(TelemetryError::Io(_))));
        assert!(stop.is_triggered());
    }

    #[test]
    fn test_csv_disabled() {
        let telemetry = Telemetry::build(&CsvConfig {
            enabled: false,
            output_dir: String::new(),
        })
        .unwrap();
        assert!(telemetry.csv_path().is_none());
        telemetry.finish();
    }
}
