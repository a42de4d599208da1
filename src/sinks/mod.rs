//! # Fan-out Sinks
//!
//! Consumers subscribed to every finalizer of the pipeline.
//!
//! - [`sse`]: per-connection Server-Sent Events streams
//! - [`csv`]: one CSV row per reading timestamp

pub mod csv;
pub mod sse;

pub use self::csv::CsvSink;
pub use self::sse::{format_event, SseBroadcaster, SseSubscription};
