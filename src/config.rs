//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; a missing section or field takes the default
//! below, so an empty file (or no file at all) is a valid configuration.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub resync: ResyncConfig,
    pub server: ServerConfig,
    pub csv: CsvConfig,
    pub replay: ReplayConfig,
    pub mock: MockConfig,
}

/// Serial link parity
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParityMode {
    #[default]
    None,
    Odd,
    Even,
}

/// Wire protocol spoken on the serial link
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkProtocol {
    /// Binary frames (see `codec`)
    #[default]
    Framed,
    /// Newline-terminated text lines with a schema handshake
    Legacy,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    /// Device path, or `auto` to probe the usual paths
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub parity: ParityMode,

    /// Read/write timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ingestion tick period
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub protocol: LinkProtocol,

    /// Queued uplink frames before POSTs are rejected
    #[serde(default = "default_uplink_queue")]
    pub uplink_queue: usize,
}

/// Packet resynchronizer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ResyncConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,

    #[serde(default = "default_resync_capacity")]
    pub capacity: usize,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Per-client SSE queue length; events beyond it are dropped for that client
    #[serde(default = "default_sse_buffer")]
    pub sse_buffer: usize,
}

/// CSV log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CsvConfig {
    #[serde(default = "default_csv_enabled")]
    pub enabled: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

/// File replay configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Simulated link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MockConfig {
    #[serde(default = "default_mock_interval_ms")]
    pub interval_ms: u64,
}

// Default value functions
fn default_serial_port() -> String { "auto".to_string() }
fn default_baud_rate() -> u32 { 19200 }
fn default_timeout_ms() -> u64 { 400 }
fn default_poll_interval_ms() -> u64 { 200 }
fn default_uplink_queue() -> usize { 32 }

fn default_window_ms() -> u64 { 100 }
fn default_stale_threshold_ms() -> u64 { 500 }
fn default_resync_capacity() -> usize { 4096 }

fn default_bind_address() -> String { "0.0.0.0:5000".to_string() }
fn default_sse_buffer() -> usize { 256 }

fn default_csv_enabled() -> bool { true }
fn default_output_dir() -> String { "Data".to_string() }

fn default_chunk_size() -> usize { 175 }

fn default_mock_interval_ms() -> u64 { 250 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            parity: ParityMode::default(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            protocol: LinkProtocol::default(),
            uplink_queue: default_uplink_queue(),
        }
    }
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            capacity: default_resync_capacity(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            sse_buffer: default_sse_buffer(),
        }
    }
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            enabled: default_csv_enabled(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_mock_interval_ms(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use groundlink::config::Config;
    ///
    /// let config = Config::load("groundlink.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty (use \"auto\" to probe)"));
        }

        if ![1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200].contains(&self.serial.baud_rate) {
            return Err(invalid(
                "baud_rate must be one of: 1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200",
            ));
        }

        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.serial.poll_interval_ms == 0 || self.serial.poll_interval_ms > 60000 {
            return Err(invalid("poll_interval_ms must be between 1 and 60000"));
        }

        if self.serial.uplink_queue == 0 {
            return Err(invalid("uplink_queue must be greater than 0"));
        }

        // Resync
        if self.resync.window_ms == 0 || self.resync.window_ms > 10000 {
            return Err(invalid("window_ms must be between 1 and 10000"));
        }

        if self.resync.stale_threshold_ms < self.resync.window_ms {
            return Err(invalid("stale_threshold_ms must not be smaller than window_ms"));
        }

        if self.resync.capacity == 0 {
            return Err(invalid("resync capacity must be greater than 0"));
        }

        // Server
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(invalid(format!(
                "bind_address '{}' is not a valid socket address",
                self.server.bind_address
            )));
        }

        if self.server.sse_buffer == 0 {
            return Err(invalid("sse_buffer must be greater than 0"));
        }

        // CSV
        if self.csv.enabled && self.csv.output_dir.is_empty() {
            return Err(invalid("csv output_dir cannot be empty when enabled"));
        }

        // Replay
        if self.replay.chunk_size == 0 {
            return Err(invalid("chunk_size must be greater than 0"));
        }

        // Mock
        if self.mock.interval_ms == 0 || self.mock.interval_ms > 60000 {
            return Err(invalid("mock interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }
}
