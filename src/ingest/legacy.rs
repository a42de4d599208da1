//! Legacy text line protocol.
//!
//! Older payload firmware sends newline-terminated ASCII lines. A schema
//! line announces the field order once:
//!
//! ```text
//! schema:[timestamp]:[pressure]:[temperature]:[latitude]:[longitude]:[altitude]
//! ```
//!
//! and every data line carries the values in that order:
//!
//! ```text
//! [1712]:[100812.5]:[14.2]:[45.07]:[7.68]:[nan];
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::pipeline::Provider;
use crate::telemetry::{Channel, DataStamp, Event, GpsCoords, Reading};

/// Field names the schema line may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyField {
    Timestamp,
    Pressure,
    Temperature,
    AccelerationX,
    AccelerationY,
    AccelerationZ,
    Latitude,
    Longitude,
    Altitude,
}

impl LegacyField {
    fn parse(entry: &str) -> Result<Self> {
        Ok(match entry {
            "timestamp" => LegacyField::Timestamp,
            "pressure" => LegacyField::Pressure,
            "temperature" => LegacyField::Temperature,
            "acc_x" => LegacyField::AccelerationX,
            "acc_y" => LegacyField::AccelerationY,
            "acc_z" => LegacyField::AccelerationZ,
            "latitude" => LegacyField::Latitude,
            "longitude" => LegacyField::Longitude,
            "altitude" => LegacyField::Altitude,
            other => return Err(TelemetryError::UnknownSchemaEntry(other.to_string())),
        })
    }
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(':')
        .map(|f| f.trim().trim_matches(|c| c == '[' || c == ']' || c == ';'))
        .collect()
}

/// Schema-driven line parser
#[derive(Debug, Default)]
pub struct LegacyLineParser {
    schema: HashMap<LegacyField, usize>,
}

impl LegacyLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_schema(&self) -> bool {
        self.schema.contains_key(&LegacyField::Timestamp)
    }

    /// Parse one line
    ///
    /// Schema and blank lines yield `Ok(None)`.
    ///
    /// # Errors
    ///
    /// - [`TelemetryError::SchemaMissing`] for data before a usable schema;
    ///   the parser stays usable and the next line may succeed
    /// - [`TelemetryError::UnknownSchemaEntry`] for a schema naming an unknown
    ///   field; the previous schema is kept
    /// - [`TelemetryError::Codec`] for a data line that does not match the schema
    pub fn parse_line(&mut self, line: &str) -> Result<Option<Event<Reading>>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("schema") {
            self.parse_schema(rest.trim_start_matches(':'))?;
            return Ok(None);
        }

        self.parse_data(line).map(Some)
    }

    fn parse_schema(&mut self, schema: &str) -> Result<()> {
        let mut parsed = HashMap::new();
        for (index, entry) in split_fields(schema).into_iter().enumerate() {
            parsed.insert(LegacyField::parse(entry)?, index);
        }
        info!("Schema received: {} fields", parsed.len());
        self.schema = parsed;
        Ok(())
    }

    fn field<'a>(&self, values: &[&'a str], field: LegacyField) -> Result<Option<&'a str>> {
        match self.schema.get(&field) {
            None => Ok(None),
            Some(&index) => values.get(index).copied().map(Some).ok_or_else(|| {
                TelemetryError::Codec(format!(
                    "Line has {} fields, schema expects {:?} at {}",
                    values.len(),
                    field,
                    index
                ))
            }),
        }
    }

    fn number(&self, values: &[&str], field: LegacyField) -> Result<Option<f64>> {
        match self.field(values, field)? {
            None => Ok(None),
            Some(raw) if raw.eq_ignore_ascii_case("nan") => Ok(Some(f64::NAN)),
            Some(raw) => raw
                .parse::<f64>()
                .map(Some)
                .map_err(|e| TelemetryError::Codec(format!("Bad {:?} value '{}': {}", field, raw, e))),
        }
    }

    fn parse_data(&self, line: &str) -> Result<Event<Reading>> {
        if !self.has_schema() {
            warn!("Incomplete schema; waiting for schema message");
            return Err(TelemetryError::SchemaMissing(line.to_string()));
        }

        let values = split_fields(line);

        let timestamp = match self.field(&values, LegacyField::Timestamp)? {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|e| TelemetryError::Codec(format!("Bad timestamp '{}': {}", raw, e)))?,
            None => return Err(TelemetryError::SchemaMissing(line.to_string())),
        };

        let mut reading = Reading::new();
        let scalars = [
            (LegacyField::Pressure, Channel::Pressure),
            (LegacyField::Temperature, Channel::Temperature),
            (LegacyField::AccelerationX, Channel::AccelerationX),
            (LegacyField::AccelerationY, Channel::AccelerationY),
            (LegacyField::AccelerationZ, Channel::AccelerationZ),
        ];
        for (field, channel) in scalars {
            if let Some(value) = self.number(&values, field)? {
                reading.insert(channel, Bytes::copy_from_slice(&(value as f32).to_le_bytes()));
            }
        }

        let wide = [
            (LegacyField::Latitude, Channel::Latitude),
            (LegacyField::Longitude, Channel::Longitude),
            (LegacyField::Altitude, Channel::Altitude),
        ];
        for (field, channel) in wide {
            if let Some(value) = self.number(&values, field)? {
                reading.insert(channel, Bytes::copy_from_slice(&value.to_le_bytes()));
            }
        }

        let coords = GpsCoords::new(
            self.number(&values, LegacyField::Latitude)?.unwrap_or(f64::NAN),
            self.number(&values, LegacyField::Longitude)?.unwrap_or(f64::NAN),
        );

        Ok(Event::new(DataStamp::new(timestamp, coords), reading))
    }
}

/// Longest line kept while waiting for its newline
pub const MAX_LINE_LEN: usize = 1024;

/// Line buffering and publishing around [`LegacyLineParser`]
#[derive(Debug)]
pub struct LegacyIngest {
    parser: LegacyLineParser,
    buffer: BytesMut,
    /// Skipping the tail of an overlong line up to its newline
    discarding: bool,
    readings: Arc<Provider<Reading>>,
}

impl LegacyIngest {
    pub fn new(readings: Arc<Provider<Reading>>) -> Self {
        Self {
            parser: LegacyLineParser::new(),
            buffer: BytesMut::new(),
            discarding: false,
            readings,
        }
    }

    /// Append bytes and publish a reading per complete data line
    ///
    /// Lines are split on raw bytes before text conversion, so a character
    /// split across reads survives. A line longer than [`MAX_LINE_LEN`] is
    /// discarded up to its newline.
    pub fn ingest(&mut self, bytes: &[u8]) -> usize {
        self.buffer.extend_from_slice(bytes);

        let mut published = 0;
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > MAX_LINE_LEN {
                    warn!(
                        "No newline within {} bytes, discarding {} buffered bytes",
                        MAX_LINE_LEN,
                        self.buffer.len()
                    );
                    self.buffer.clear();
                    self.discarding = true;
                }
                break;
            };

            let raw = self.buffer.split_to(end + 1);
            if std::mem::take(&mut self.discarding) {
                debug!("Skipped tail of overlong line ({} bytes)", raw.len());
                continue;
            }
            if raw.len() > MAX_LINE_LEN + 1 {
                warn!("Dropping overlong line ({} bytes)", raw.len());
                continue;
            }

            let line = String::from_utf8_lossy(&raw);
            debug!("Line: {}", line.trim_end());

            match self.parser.parse_line(&line) {
                Ok(Some(event)) => {
                    self.readings.publish(&event);
                    published += 1;
                }
                Ok(None) => {}
                Err(e) => warn!("Dropping line: {}", e),
            }
        }
        published
    }

    /// Bytes of the current unterminated line
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn parser(&self) -> &LegacyLineParser {
        &self.parser
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::channel::decode_scalar;
    use std::sync::Mutex;

    const SCHEMA: &str = "schema:[timestamp]:[pressure]:[temperature]:[latitude]:[longitude]:[altitude]";

    #[test]
    fn test_data_before_schema_is_error() {
        let mut parser = LegacyLineParser::new();
        let result = parser.parse_line("[1]:[100000]:[15]:[45]:[7]:[1000];");
        assert!(matches!(result, Err(TelemetryError::SchemaMissing(_))));
        assert!(!parser.has_schema());
    }

    #[test]
    fn test_retry_after_schema_succeeds() {
        let mut parser = LegacyLineParser::new();
        assert!(parser.parse_line("[1]:[100000];").is_err());
        assert!(parser.parse_line(SCHEMA).unwrap().is_none());

        let event = parser
            .parse_line("[1712]:[100812.5]:[14.25]:[45.5]:[7.25]:[312];")
            .unwrap()
            .unwrap();

        assert_eq!(event.stamp.timestamp, 1712);
        assert_eq!(event.stamp.coordinates.latitude, 45.5);
        assert_eq!(event.stamp.coordinates.longitude, 7.25);
        assert_eq!(decode_scalar(event.data.get(Channel::Pressure).unwrap()).unwrap(), 100_812.5);
        assert_eq!(decode_scalar(event.data.get(Channel::Temperature).unwrap()).unwrap(), 14.25);
        assert_eq!(decode_scalar(event.data.get(Channel::Altitude).unwrap()).unwrap(), 312.0);
    }

    #[test]
    fn test_schema_is_case_insensitive() {
        let mut parser = LegacyLineParser::new();
        parser.parse_line("SCHEMA:[Timestamp]:[Pressure]").unwrap();
        assert!(parser.has_schema());
    }

    #[test]
    fn test_nan_values() {
        let mut parser = LegacyLineParser::new();
        parser.parse_line(SCHEMA).unwrap();
        let event = parser
            .parse_line("[5]:[nan]:[15]:[nan]:[nan]:[nan];")
            .unwrap()
            .unwrap();

        assert!(decode_scalar(event.data.get(Channel::Pressure).unwrap()).unwrap().is_nan());
        assert!(!event.stamp.coordinates.is_known());
    }

    #[test]
    fn test_unknown_schema_entry() {
        let mut parser = LegacyLineParser::new();
        parser.parse_line("schema:[timestamp]:[pressure]").unwrap();
        let result = parser.parse_line("schema:[timestamp]:[magnetometer]");

        assert!(matches!(result, Err(TelemetryError::UnknownSchemaEntry(ref e)) if e == "magnetometer"));
        // Previous schema still applies
        assert!(parser.parse_line("[9]:[1000];").unwrap().is_some());
    }

    #[test]
    fn test_short_line_is_error() {
        let mut parser = LegacyLineParser::new();
        parser.parse_line(SCHEMA).unwrap();
        assert!(matches!(
            parser.parse_line("[9]:[1000];"),
            Err(TelemetryError::Codec(_))
        ));
    }

    #[test]
    fn test_ingest_splits_lines_across_reads() {
        let provider = Arc::new(Provider::new("readings"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        provider.subscribe(move |event: &Event<Reading>| {
            sink.lock().unwrap().push(event.stamp.timestamp)
        });

        let mut ingest = LegacyIngest::new(provider);
        assert_eq!(ingest.ingest(b"[0]:[1]\nschema:[timestamp]:[pres"), 0);
        assert_eq!(ingest.ingest(b"sure]\n[10]:[1000];\n[11]:"), 1);
        assert_eq!(ingest.ingest(b"[1001];\n"), 1);

        assert!(ingest.parser().has_schema());
        assert_eq!(*seen.lock().unwrap(), vec![10, 11]);
    }

    #[test]
    fn test_ingest_bounds_unterminated_input() {
        let mut ingest = LegacyIngest::new(Arc::new(Provider::new("readings")));
        let noise = vec![b'x'; 64 * 1024];
        for _ in 0..16 {
            assert_eq!(ingest.ingest(&noise), 0);
            assert!(ingest.buffered_bytes() <= MAX_LINE_LEN);
        }

        // The tail of the overlong line is skipped, the next line is parsed
        ingest.ingest(b"xxxx\nschema:[timestamp]\n");
        assert!(ingest.parser().has_schema());
        assert_eq!(ingest.buffered_bytes(), 0);
    }

    #[test]
    fn test_ingest_keeps_multibyte_split_across_reads() {
        let mut ingest = LegacyIngest::new(Arc::new(Provider::new("readings")));
        // U+00A0 is whitespace only when both of its bytes stay together
        let line = "schema:[timestamp]:\u{a0}[pressure]\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC2).unwrap() + 1;

        ingest.ingest(&line[..split]);
        assert!(!ingest.parser().has_schema());
        ingest.ingest(&line[split..]);

        assert!(ingest.parser().has_schema());
        assert_eq!(ingest.buffered_bytes(), 0);
    }
}
