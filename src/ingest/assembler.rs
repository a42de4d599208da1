//! Turns a resync group into one `Event<Reading>` and publishes it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::codec::Packet;
use crate::pipeline::Provider;
use crate::telemetry::channel::decode_f64;
use crate::telemetry::{Channel, DataStamp, Event, GpsCoords, Reading};

/// Groups → readings
///
/// The channel map is rebuilt for each group: a reading never carries values
/// over from a previous group.
#[derive(Debug)]
pub struct ReadingAssembler {
    readings: Arc<Provider<Reading>>,
    current: Reading,
}

impl ReadingAssembler {
    pub fn new(readings: Arc<Provider<Reading>>) -> Self {
        Self {
            readings,
            current: Reading::new(),
        }
    }

    /// Build the reading for `group` without publishing it
    ///
    /// Returns `None` for an empty group. Within a group the last packet per
    /// channel wins.
    pub fn assemble(&mut self, group: &[Packet]) -> Option<Event<Reading>> {
        let first = group.first()?;
        let timestamp = first.timestamp_ns;

        for packet in group {
            let channel = Channel::from_device(packet.device_id);
            match channel {
                Channel::System => {
                    info!("System message: {}", String::from_utf8_lossy(&packet.payload));
                }
                Channel::Unknown => {
                    warn!(device = ?packet.device_id, "Packet from unknown device");
                }
                _ => debug!(?channel, len = packet.payload.len(), "Channel data"),
            }

            for (sub, payload) in channel.expand(&packet.payload) {
                self.current.insert(sub, payload);
            }
            self.current.insert(channel, packet.payload.clone());
        }

        let coords = self.gps_coords();
        debug!(
            latitude = coords.latitude,
            longitude = coords.longitude,
            "GPS fix"
        );

        let reading = std::mem::take(&mut self.current);
        Some(Event::new(DataStamp::new(timestamp, coords), reading))
    }

    /// Assemble `group` and publish the reading; returns false for an empty group
    pub fn publish_group(&mut self, group: &[Packet]) -> bool {
        match self.assemble(group) {
            Some(event) => {
                let delivered = self.readings.publish(&event);
                debug!(
                    timestamp_ns = event.stamp.timestamp,
                    channels = event.data.len(),
                    subscribers = delivered,
                    "Published reading"
                );
                true
            }
            None => false,
        }
    }

    fn gps_coords(&self) -> GpsCoords {
        match self.current.get(Channel::GpsBlock) {
            Some(block) => GpsCoords::new(
                decode_f64(block, 0).unwrap_or(f64::NAN),
                decode_f64(block, 8).unwrap_or(f64::NAN),
            ),
            None => GpsCoords::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DeviceId;
    use crate::telemetry::channel::decode_scalar;
    use std::sync::Mutex;

    fn gps_payload(lat: f64, lon: f64, alt: f64) -> Vec<u8> {
        [lat, lon, alt].iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn assembler() -> ReadingAssembler {
        ReadingAssembler::new(Arc::new(Provider::new("readings")))
    }

    #[test]
    fn test_empty_group_yields_nothing() {
        assert!(assembler().assemble(&[]).is_none());
    }

    #[test]
    fn test_stamped_with_first_packet() {
        let group = vec![
            Packet::new(DeviceId::PressureSensor, 1_000_000_000, 100_000f32.to_le_bytes().to_vec()),
            Packet::new(DeviceId::TemperatureSensor, 1_000_050_000, 15f32.to_le_bytes().to_vec()),
        ];
        let event = assembler().assemble(&group).unwrap();

        assert_eq!(event.stamp.timestamp, 1_000_000_000);
        assert_eq!(event.data.len(), 2);
        assert_eq!(decode_scalar(event.data.get(Channel::Pressure).unwrap()).unwrap(), 100_000.0);
    }

    #[test]
    fn test_last_write_wins() {
        let group = vec![
            Packet::new(DeviceId::PressureSensor, 1, 1f32.to_le_bytes().to_vec()),
            Packet::new(DeviceId::PressureSensor, 2, 2f32.to_le_bytes().to_vec()),
        ];
        let event = assembler().assemble(&group).unwrap();
        assert_eq!(decode_scalar(event.data.get(Channel::Pressure).unwrap()).unwrap(), 2.0);
    }

    #[test]
    fn test_gps_block_expanded_and_stamped() {
        let group = vec![Packet::new(DeviceId::Gps, 7, gps_payload(45.5, 9.25, 310.0))];
        let event = assembler().assemble(&group).unwrap();

        assert_eq!(event.stamp.coordinates.latitude, 45.5);
        assert_eq!(event.stamp.coordinates.longitude, 9.25);
        assert!(event.data.contains(Channel::GpsBlock));
        assert_eq!(decode_scalar(event.data.get(Channel::Altitude).unwrap()).unwrap(), 310.0);
    }

    #[test]
    fn test_missing_gps_is_nan() {
        let group = vec![Packet::new(DeviceId::PressureSensor, 7, 1f32.to_le_bytes().to_vec())];
        let event = assembler().assemble(&group).unwrap();
        assert!(event.stamp.coordinates.latitude.is_nan());
        assert!(event.stamp.coordinates.longitude.is_nan());
    }

    #[test]
    fn test_short_gps_block_is_nan() {
        let group = vec![Packet::new(DeviceId::Gps, 7, vec![0u8; 4])];
        let event = assembler().assemble(&group).unwrap();
        assert!(!event.stamp.coordinates.is_known());
    }

    #[test]
    fn test_map_cleared_between_groups() {
        let mut assembler = assembler();
        assembler
            .assemble(&[Packet::new(DeviceId::PressureSensor, 1, 1f32.to_le_bytes().to_vec())])
            .unwrap();
        let second = assembler
            .assemble(&[Packet::new(DeviceId::HumiditySensor, 2, 50f32.to_le_bytes().to_vec())])
            .unwrap();
        assert!(!second.data.contains(Channel::Pressure));
        assert!(second.data.contains(Channel::Humidity));
    }

    #[test]
    fn test_publish_group_reaches_subscribers() {
        let readings = Arc::new(Provider::new("readings"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        readings.subscribe(move |event: &Event<Reading>| {
            sink.lock().unwrap().push(event.stamp.timestamp)
        });

        let mut assembler = ReadingAssembler::new(readings);
        assert!(assembler.publish_group(&[Packet::new(DeviceId::System, 3, b"boot".to_vec())]));
        assert!(!assembler.publish_group(&[]));
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
