//! Simulated payload link for running without a radio.
//!
//! Emits one encoded frame per sensor every interval, with smooth
//! deterministic variation around ground-level values.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::time::Instant;
use tracing::{debug, info};

use super::port_trait::SerialPortIO;
use crate::codec::{encoder::encode_packet, DeviceId, Packet};

/// Base pressure in Pa
const BASE_PRESSURE_PA: f32 = 100_000.0;
/// Base temperature in °C
const BASE_TEMPERATURE_C: f32 = 15.0;
const BASE_HUMIDITY: f32 = 45.0;
const BASE_GPS_ALTITUDE_M: f64 = 1000.0;
const BASE_LATITUDE: f64 = 45.0703;
const BASE_LONGITUDE: f64 = 7.6869;
const STANDARD_GRAVITY: f32 = 9.806_65;

/// Serial port stand-in producing framed sensor packets
#[derive(Debug)]
pub struct SimulatedLink {
    interval: Duration,
    next_emit: Instant,
    sample: u64,
    pending: BytesMut,
}

impl SimulatedLink {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_emit: Instant::now(),
            sample: 0,
            pending: BytesMut::new(),
        }
    }

    /// Frames of sample `n`, one per sensor, all stamped `n * interval`
    pub fn sample_frames(&self, n: u64) -> Vec<Vec<u8>> {
        let ts = n.saturating_mul(self.interval.as_nanos() as u64);
        let phase = n as f32 * 0.1;

        let pressure = BASE_PRESSURE_PA - 120.0 * phase.sin();
        let temperature = BASE_TEMPERATURE_C + 0.5 * (phase * 0.5).cos();
        let humidity = BASE_HUMIDITY + 2.0 * (phase * 0.3).sin();

        let mut acceleration = Vec::with_capacity(12);
        for v in [0.2 * phase.cos(), 0.2 * phase.sin(), STANDARD_GRAVITY] {
            acceleration.extend_from_slice(&v.to_le_bytes());
        }

        let drift = n as f64 * 1e-5;
        let mut gps = Vec::with_capacity(24);
        for v in [
            BASE_LATITUDE + drift,
            BASE_LONGITUDE + drift,
            BASE_GPS_ALTITUDE_M + 10.0 * f64::from(phase.sin()),
        ] {
            gps.extend_from_slice(&v.to_le_bytes());
        }

        [
            Packet::new(DeviceId::PressureSensor, ts, pressure.to_le_bytes().to_vec()),
            Packet::new(DeviceId::TemperatureSensor, ts, temperature.to_le_bytes().to_vec()),
            Packet::new(DeviceId::HumiditySensor, ts, humidity.to_le_bytes().to_vec()),
            Packet::new(DeviceId::Accelerometer, ts, acceleration),
            Packet::new(DeviceId::Gps, ts, gps),
        ]
        .iter()
        .filter_map(|packet| encode_packet(packet).ok())
        .collect()
    }

    fn generate_due_samples(&mut self) {
        let now = Instant::now();
        while self.next_emit <= now {
            for frame in self.sample_frames(self.sample) {
                self.pending.extend_from_slice(&frame);
            }
            self.sample += 1;
            self.next_emit += self.interval;
        }
    }
}

#[async_trait]
impl SerialPortIO for SimulatedLink {
    async fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.generate_due_samples();

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        info!("Simulated uplink: {} bytes", data.len());
        debug!("Uplink frame: {:02X?}", data);
        Ok(())
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
