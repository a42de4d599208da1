//! # Channel Extractors
//!
//! Stages that read one or more channels out of a [`Reading`] and turn the raw
//! payload into an `f32`.
//!
//! A channel missing from the reading, or a payload that does not decode, yields
//! `NaN`. Downstream arithmetic then propagates "unknown" instead of failing.

use tracing::{trace, warn};

use super::stage::Stage;
use crate::error::Result;
use crate::telemetry::channel::decode_scalar;
use crate::telemetry::{Channel, Event, Reading};

/// Sea-level reference pressure in Pa
pub const REFERENCE_PRESSURE_PA: f32 = 101_325.0;

/// Barometric exponent (g0 * M) / (R * L)
pub const BAROMETRIC_EXPONENT: f32 = 5.2558;

/// Temperature lapse rate in K/m
pub const LAPSE_RATE: f32 = 0.0065;

/// Offset between °C and K
pub const CELSIUS_TO_KELVIN: f32 = 273.15;

/// Read a scalar channel, substituting NaN when it is absent or malformed
pub fn read_channel(reading: &Reading, channel: Channel) -> f32 {
    match reading.get(channel) {
        None => {
            trace!(?channel, "Channel missing from reading");
            f32::NAN
        }
        Some(payload) => decode_scalar(payload).unwrap_or_else(|e| {
            warn!(?channel, "Undecodable channel payload: {}", e);
            f32::NAN
        }),
    }
}

/// Altitude above the reference level from pressure (Pa) and temperature (°C)
///
/// Returns NaN if either input is NaN or the pressure is not positive.
///
/// # Examples
///
/// ```
/// use groundlink::pipeline::extractors::barometric_altitude;
///
/// assert!(barometric_altitude(101_325.0, 0.0).abs() < 1e-3);
/// assert!(barometric_altitude(f32::NAN, 15.0).is_nan());
/// ```
pub fn barometric_altitude(pressure_pa: f32, temperature_c: f32) -> f32 {
    if pressure_pa.is_nan() || temperature_c.is_nan() || pressure_pa <= 0.0 {
        return f32::NAN;
    }

    let temperature_k = temperature_c + CELSIUS_TO_KELVIN;
    temperature_k * ((REFERENCE_PRESSURE_PA / pressure_pa).powf(1.0 / BAROMETRIC_EXPONENT) - 1.0)
        / LAPSE_RATE
}

/// Extracts a single scalar channel
#[derive(Debug, Clone)]
pub struct ChannelExtractor {
    name: String,
    channel: Channel,
}

impl ChannelExtractor {
    pub fn new(name: impl Into<String>, channel: Channel) -> Self {
        Self {
            name: name.into(),
            channel,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl Stage<Reading, f32> for ChannelExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, event: &Event<Reading>) -> Result<Event<f32>> {
        Ok(Event::new(event.stamp, read_channel(&event.data, self.channel)))
    }
}

/// Barometric altitude from the Pressure and Temperature channels
#[derive(Debug, Clone, Default)]
pub struct AltitudeExtractor;

impl Stage<Reading, f32> for AltitudeExtractor {
    fn name(&self) -> &str {
        "altitude"
    }

    fn process(&self, event: &Event<Reading>) -> Result<Event<f32>> {
        let pressure = read_channel(&event.data, Channel::Pressure);
        let temperature = read_channel(&event.data, Channel::Temperature);
        Ok(Event::new(event.stamp, barometric_altitude(pressure, temperature)))
    }
}

/// Barometric altitude minus GPS altitude of the same reading
#[derive(Debug, Clone, Default)]
pub struct AltitudeDeltaExtractor;

impl Stage<Reading, f32> for AltitudeDeltaExtractor {
    fn name(&self) -> &str {
        "altitudedelta"
    }

    fn process(&self, event: &Event<Reading>) -> Result<Event<f32>> {
        let barometric = barometric_altitude(
            read_channel(&event.data, Channel::Pressure),
            read_channel(&event.data, Channel::Temperature),
        );
        let gps = read_channel(&event.data, Channel::Altitude);
        Ok(Event::new(event.stamp, barometric - gps))
    }
}
