//! Stateful processors deriving new values from one upstream scalar.

use std::sync::{Mutex, PoisonError};

use super::stage::Stage;
use crate::error::Result;
use crate::telemetry::Event;

/// Per-reading altitude change
///
/// Emits `altitude[n] - altitude[n-1]`. The first sample, and any sample that
/// follows a NaN altitude, yields `0`.
#[derive(Debug, Default)]
pub struct VelocityProcessor {
    previous: Mutex<Option<f32>>,
}

impl VelocityProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage<f32, f32> for VelocityProcessor {
    fn name(&self) -> &str {
        "velocity"
    }

    fn process(&self, event: &Event<f32>) -> Result<Event<f32>> {
        let mut previous = self.previous.lock().unwrap_or_else(PoisonError::into_inner);

        let velocity = match *previous {
            Some(last) if !last.is_nan() => event.data - last,
            _ => 0.0,
        };
        *previous = Some(event.data);

        Ok(Event::new(event.stamp, velocity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{DataStamp, GpsCoords};
    use std::sync::Arc;

    fn altitude(ts: u64, value: f32) -> Event<f32> {
        Event::new(DataStamp::new(ts, GpsCoords::UNKNOWN), value)
    }

    #[test]
    fn test_first_sample_is_zero() {
        let velocity = VelocityProcessor::new();
        assert_eq!(velocity.process(&altitude(1, 100.0)).unwrap().data, 0.0);
    }

    #[test]
    fn test_second_sample_is_difference() {
        let velocity = VelocityProcessor::new();
        velocity.process(&altitude(1, 100.0)).unwrap();
        let out = velocity.process(&altitude(2, 105.0)).unwrap();
        assert_eq!(out.data, 5.0);
        assert_eq!(out.stamp.timestamp, 2);
    }

    #[test]
    fn test_nan_propagates_then_resets() {
        let velocity = VelocityProcessor::new();
        velocity.process(&altitude(1, 100.0)).unwrap();
        assert!(velocity.process(&altitude(2, f32::NAN)).unwrap().data.is_nan());
        // NaN baseline: treated like a first sample
        assert_eq!(velocity.process(&altitude(3, 90.0)).unwrap().data, 0.0);
        assert_eq!(velocity.process(&altitude(4, 85.0)).unwrap().data, -5.0);
    }

    #[test]
    fn test_shared_across_threads() {
        let velocity = Arc::new(VelocityProcessor::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let velocity = Arc::clone(&velocity);
                std::thread::spawn(move || {
                    for n in 0..100 {
                        velocity.process(&altitude(n, (i * 100 + n) as f32)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(velocity.previous.lock().unwrap().is_some());
    }
}
