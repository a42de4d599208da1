//! # Standard Pipeline Graph
//!
//! Explicit wiring shared by the live, mock and replay modes.
//!
//! ```text
//! readings ─┬─ pressure ─────────────── primary/pressure
//!           ├─ temperature ──────────── primary/temperature
//!           ├─ humidity ─────────────── humidity
//!           ├─ acceleration x/y/z ───── accelerationx / accelerationy / accelerationz
//!           ├─ gps altitude ─────────── altitudegps
//!           ├─ altitude ─┬───────────── primary/altitude
//!           │            └─ velocity ── primary/velocity
//!           └─ altitude delta ───────── primary/altitudedelta
//! ```

use std::sync::Arc;

use tracing::debug;

use super::extractors::{AltitudeDeltaExtractor, AltitudeExtractor, ChannelExtractor};
use super::finalizer::{Finalizer, FinalizerSet};
use super::processors::VelocityProcessor;
use super::provider::Provider;
use super::stage::attach;
use crate::telemetry::{Channel, Reading};

/// Stable output tags
pub mod tags {
    pub const PRESSURE: &str = "primary/pressure";
    pub const TEMPERATURE: &str = "primary/temperature";
    pub const ALTITUDE: &str = "primary/altitude";
    pub const VELOCITY: &str = "primary/velocity";
    pub const ALTITUDE_DELTA: &str = "primary/altitudedelta";
    pub const HUMIDITY: &str = "humidity";
    pub const ALTITUDE_GPS: &str = "altitudegps";
    pub const ACCELERATION_X: &str = "accelerationx";
    pub const ACCELERATION_Y: &str = "accelerationy";
    pub const ACCELERATION_Z: &str = "accelerationz";

    /// Every tag the standard graph publishes, in wiring order
    pub const ALL: [&str; 10] = [
        PRESSURE,
        TEMPERATURE,
        HUMIDITY,
        ACCELERATION_X,
        ACCELERATION_Y,
        ACCELERATION_Z,
        ALTITUDE_GPS,
        ALTITUDE,
        VELOCITY,
        ALTITUDE_DELTA,
    ];
}

/// Root reading provider plus the finalizer outputs hanging off it
#[derive(Debug)]
pub struct TelemetryGraph {
    readings: Arc<Provider<Reading>>,
    finalizers: FinalizerSet,
}

impl TelemetryGraph {
    pub fn build() -> Self {
        let readings = Arc::new(Provider::new("readings"));
        let mut finalizers = FinalizerSet::new();

        let scalar_channels = [
            (tags::PRESSURE, "pressure", Channel::Pressure),
            (tags::TEMPERATURE, "temperature", Channel::Temperature),
            (tags::HUMIDITY, "humidity", Channel::Humidity),
            (tags::ACCELERATION_X, "accelerationx", Channel::AccelerationX),
            (tags::ACCELERATION_Y, "accelerationy", Channel::AccelerationY),
            (tags::ACCELERATION_Z, "accelerationz", Channel::AccelerationZ),
            (tags::ALTITUDE_GPS, "altitudegps", Channel::Altitude),
        ];
        for (tag, name, channel) in scalar_channels {
            let extracted = attach(&readings, ChannelExtractor::new(name, channel));
            finalizers.insert(tag, attach(&extracted, Finalizer::new(tag)));
        }

        let altitude = attach(&readings, AltitudeExtractor);
        finalizers.insert(tags::ALTITUDE, attach(&altitude, Finalizer::new(tags::ALTITUDE)));

        let velocity = attach(&altitude, VelocityProcessor::new());
        finalizers.insert(tags::VELOCITY, attach(&velocity, Finalizer::new(tags::VELOCITY)));

        let delta = attach(&readings, AltitudeDeltaExtractor);
        finalizers.insert(
            tags::ALTITUDE_DELTA,
            attach(&delta, Finalizer::new(tags::ALTITUDE_DELTA)),
        );

        debug!("Pipeline built with {} finalizers", finalizers.len());

        Self {
            readings,
            finalizers,
        }
    }

    /// Root provider the reading assembler publishes into
    pub fn readings(&self) -> &Arc<Provider<Reading>> {
        &self.readings
    }

    pub fn finalizers(&self) -> &FinalizerSet {
        &self.finalizers
    }
}
