//! # Telemetry Data Model
//!
//! Types shared by every pipeline stage:
//! - [`Channel`]: semantic label of a value inside a reading
//! - [`DataStamp`]: timestamp + GPS fix attached to every event
//! - [`Event`]: the envelope flowing between stages
//! - [`Reading`]: one time-grouped set of raw channel payloads
//! - [`TaggedValue`] / [`TaggedEvent`]: finalizer output

pub mod channel;

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

pub use channel::Channel;

/// Latitude / longitude fix
///
/// Altitude is tracked as its own channel so it can go stale independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GpsCoords {
    /// Degrees, [-90, 90]
    pub latitude: f64,
    /// Degrees, [-180, 180]
    pub longitude: f64,
}

impl GpsCoords {
    /// Fix with no data
    pub const UNKNOWN: GpsCoords = GpsCoords {
        latitude: f64::NAN,
        longitude: f64::NAN,
    };

    /// Build a fix, replacing out-of-range components with NaN
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: if (-90.0..=90.0).contains(&latitude) { latitude } else { f64::NAN },
            longitude: if (-180.0..=180.0).contains(&longitude) { longitude } else { f64::NAN },
        }
    }

    pub fn is_known(&self) -> bool {
        !self.latitude.is_nan() && !self.longitude.is_nan()
    }
}

impl Default for GpsCoords {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

/// Reference data attached to every event
///
/// Timestamps are not guaranteed to increase across readings; the radio
/// link reorders.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataStamp {
    /// Transmitter nanoseconds
    pub timestamp: u64,
    pub coordinates: GpsCoords,
}

impl DataStamp {
    pub fn new(timestamp: u64, coordinates: GpsCoords) -> Self {
        Self {
            timestamp,
            coordinates,
        }
    }
}

/// Envelope for every value flowing through the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Event<T> {
    pub stamp: DataStamp,
    pub data: T,
}

impl<T> Event<T> {
    pub fn new(stamp: DataStamp, data: T) -> Self {
        Self { stamp, data }
    }
}

/// Raw channel payloads assembled from one resync group
///
/// Holds at most one payload per channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    channels: BTreeMap<Channel, Bytes>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a channel payload, replacing any previous one
    pub fn insert(&mut self, channel: Channel, payload: Bytes) -> Option<Bytes> {
        self.channels.insert(channel, payload)
    }

    pub fn get(&self, channel: Channel) -> Option<&Bytes> {
        self.channels.get(&channel)
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.channels.contains_key(&channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.channels.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

impl FromIterator<(Channel, Bytes)> for Reading {
    fn from_iter<I: IntoIterator<Item = (Channel, Bytes)>>(iter: I) -> Self {
        Self {
            channels: iter.into_iter().collect(),
        }
    }
}

/// Publishable value with a stable channel name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedValue {
    /// Dotted/slashed stable name, e.g. `primary/altitude`
    pub tag: &'static str,
    pub value: f32,
}

/// Finalizer output
pub type TaggedEvent = Event<TaggedValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_coords_out_of_range_is_nan() {
        let coords = GpsCoords::new(91.0, -181.0);
        assert!(coords.latitude.is_nan());
        assert!(coords.longitude.is_nan());
        assert!(!coords.is_known());

        let coords = GpsCoords::new(-90.0, 180.0);
        assert!(coords.is_known());
    }

    #[test]
    fn test_data_stamp_json_shape() {
        let stamp = DataStamp::new(1_000, GpsCoords::new(38.7, -9.1));
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"Timestamp":1000,"Coordinates":{"Latitude":38.7,"Longitude":-9.1}}"#);
    }

    #[test]
    fn test_unknown_coords_serialize_as_null() {
        let stamp = DataStamp::new(5, GpsCoords::UNKNOWN);
        let json = serde_json::to_string(&stamp).unwrap();
        assert_eq!(json, r#"{"Timestamp":5,"Coordinates":{"Latitude":null,"Longitude":null}}"#);
    }

    #[test]
    fn test_reading_last_write_wins() {
        let mut reading = Reading::new();
        reading.insert(Channel::Pressure, Bytes::from_static(&[1]));
        let previous = reading.insert(Channel::Pressure, Bytes::from_static(&[2]));

        assert_eq!(previous, Some(Bytes::from_static(&[1])));
        assert_eq!(reading.len(), 1);
        assert_eq!(reading.get(Channel::Pressure), Some(&Bytes::from_static(&[2])));
    }
}
