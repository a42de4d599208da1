//! # Groundlink Library
//!
//! Ground-station collector for a radio-serial sensor payload.
//!
//! This library decodes the framed downlink, regroups packets scattered by the
//! link into time-consistent readings, derives altitude and velocity, and fans
//! the results out to Server-Sent Events clients and a CSV log.

pub mod app;
pub mod codec;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod serial;
pub mod server;
pub mod shutdown;
pub mod sinks;
pub mod telemetry;
