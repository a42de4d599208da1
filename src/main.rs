//! # Groundlink
//!
//! Ground-station telemetry collector.
//!
//! ## Run Modes
//!
//! - default: read the radio on the configured serial port
//! - `--mock`: use a simulated payload instead of a serial port
//! - `--read-file <path>`: replay a recorded capture into a CSV log and exit
//!
//! Exit codes: `0` on clean shutdown, `1` on startup failure, `2` if the
//! replay file does not exist.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use groundlink::app;
use groundlink::config::Config;
use groundlink::error::TelemetryError;
use groundlink::serial::simulated::SimulatedLink;
use groundlink::serial::TelemetrySerial;
use groundlink::shutdown::Shutdown;

/// Directory for the rolling log files
const LOG_DIR: &str = "Logs";

/// Exit status when the replay input is missing
const EXIT_FILE_NOT_FOUND: u8 = 2;

/// Ground-station telemetry collector
#[derive(Parser, Debug)]
#[command(name = "groundlink", author, version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "GROUNDLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration (`auto` to probe)
    #[arg(short, long, env = "GROUNDLINK_PORT")]
    port: Option<String>,

    /// Use a simulated payload instead of the serial port
    #[arg(long, conflicts_with = "read_file")]
    mock: bool,

    /// Replay a recorded capture into a CSV log, then exit
    #[arg(long, value_name = "PATH")]
    read_file: Option<PathBuf>,

    /// HTTP bind address, overrides the configuration
    #[arg(short, long, env = "GROUNDLINK_BIND")]
    bind: Option<String>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Console plus daily-rotated file logging
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_logging(verbose: u8) -> Result<WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_appender = tracing_appender::rolling::daily(LOG_DIR, "groundlink.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(port) = &cli.port {
        config.serial.port = port.clone();
    }
    if let Some(bind) = &cli.bind {
        config.server.bind_address = bind.clone();
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

async fn run_live(cli: &Cli, config: &Config) -> Result<()> {
    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;

    let shutdown = Shutdown::new();
    let mut live = {
        let config = config.clone();
        let listener_shutdown = shutdown.listener();
        if cli.mock {
            info!("Using simulated payload link");
            let link = SimulatedLink::new(Duration::from_millis(config.mock.interval_ms));
            tokio::spawn(async move { app::run_live(&config, link, listener, listener_shutdown).await })
        } else {
            let serial = TelemetrySerial::open(&config.serial).context("Failed to open serial port")?;
            info!("Radio serial port opened at: {}", serial.device_path());
            tokio::spawn(async move { app::run_live(&config, serial, listener, listener_shutdown).await })
        }
    };

    info!("Press Ctrl+C to exit");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down...");
            shutdown.trigger();
            live.await.context("Live task panicked")??;
        }
        finished = &mut live => {
            finished.context("Live task panicked")??;
        }
    }
    Ok(())
}

/// Main entry point for Groundlink
///
/// # Control Flow
///
/// 1. Parse the command line, set up logging, load configuration
/// 2. Replay mode: process the capture file and exit
/// 3. Live/mock mode: ingest, log and serve SSE until Ctrl+C
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Groundlink v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(path) = &cli.read_file {
        return match app::run_replay(&config, path) {
            Ok(outcome) => {
                if let Some(csv) = outcome.csv_path {
                    info!("Replay written to {}", csv.display());
                }
                ExitCode::SUCCESS
            }
            Err(TelemetryError::FileNotFound(path)) => {
                error!("Input file not found: {}", path);
                ExitCode::from(EXIT_FILE_NOT_FOUND)
            }
            Err(e) => {
                error!("Replay failed: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    match run_live(&cli, &config).await {
        Ok(()) => {
            info!("Groundlink stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["groundlink"]).unwrap();
        assert!(!cli.mock);
        assert!(cli.read_file.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_cli_replay_and_verbosity() {
        let cli = Cli::try_parse_from(["groundlink", "--read-file", "flight.bin", "-vv"]).unwrap();
        assert_eq!(cli.read_file, Some(PathBuf::from("flight.bin")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_mock_conflicts_with_replay() {
        assert!(Cli::try_parse_from(["groundlink", "--mock", "--read-file", "x.bin"]).is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::try_parse_from([
            "groundlink",
            "--port",
            "/dev/ttyUSB3",
            "--bind",
            "127.0.0.1:9000",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB3");
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
    }

    #[test]
    fn test_invalid_bind_override_rejected() {
        let cli = Cli::try_parse_from(["groundlink", "--bind", "nowhere"]).unwrap();
        assert!(load_config(&cli).is_err());
    }
}
