//! CSV log sink: one row per reading timestamp.
//!
//! Finalizer events for the same reading arrive one tag at a time. They are
//! collected into a single row buffer, and the row is written out when an
//! event with a different timestamp shows up (or on [`CsvSink::finish`]).

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::pipeline::{FinalizerSet, SubscriptionId};
use crate::telemetry::{GpsCoords, TaggedEvent};

/// Value columns, in file order; a trailing `Timestamp` column follows
pub const VALUE_COLUMNS: [&str; 12] = [
    "pressure",
    "temperature",
    "humidity",
    "altitude",
    "altitudegps",
    "altitudedelta",
    "velocity",
    "accelerationx",
    "accelerationy",
    "accelerationz",
    "latitude",
    "longitude",
];

/// Columns filled from finalizer values; latitude and longitude follow
const SCALAR_COLUMNS: usize = 10;

/// Header line (without newline)
pub fn header() -> String {
    let mut header = VALUE_COLUMNS.join(",");
    header.push_str(",Timestamp");
    header
}

/// Column a tag's values go into: matched on the segment after the last `/`
pub fn column_for_tag(tag: &str) -> Option<usize> {
    let slot = tag.rsplit('/').next().unwrap_or(tag);
    VALUE_COLUMNS[..SCALAR_COLUMNS].iter().position(|c| *c == slot)
}

/// Shortest text that reads back as the same value; NaN and missing are empty
fn field<T: ToString>(value: Option<T>, is_nan: impl Fn(&T) -> bool) -> String {
    match value {
        Some(v) if !is_nan(&v) => v.to_string(),
        _ => String::new(),
    }
}

struct RowState<W> {
    writer: W,
    values: [Option<f32>; SCALAR_COLUMNS],
    coordinates: Option<GpsCoords>,
    timestamp: Option<u64>,
    rows: u64,
}

impl<W: Write> RowState<W> {
    fn flush_row(&mut self) -> std::io::Result<()> {
        let Some(timestamp) = self.timestamp else {
            return Ok(());
        };

        let mut fields: Vec<String> = self.values.iter().map(|v| field(*v, |x| x.is_nan())).collect();
        fields.push(field(self.coordinates.map(|c| c.latitude), |x| x.is_nan()));
        fields.push(field(self.coordinates.map(|c| c.longitude), |x| x.is_nan()));

        let mut line = fields.join(",");
        line.push(',');
        line.push_str(&timestamp.to_string());

        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        self.rows += 1;

        self.values = [None; SCALAR_COLUMNS];
        self.coordinates = None;
        self.timestamp = None;
        Ok(())
    }
}

/// Row-merging CSV writer over any `Write`
pub struct CsvSink<W: Write + Send> {
    state: Mutex<RowState<W>>,
}

impl<W: Write + Send + 'static> std::fmt::Debug for CsvSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSink")
            .field("rows", &self.rows_written())
            .finish_non_exhaustive()
    }
}

impl CsvSink<BufWriter<File>> {
    /// Create `<dir>/<local time>.csv`, creating `dir` if needed
    pub fn create_in<P: AsRef<Path>>(dir: P) -> Result<(Self, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("{}.csv", Local::now().format("%Y-%m-%d-%H-%M-%S")));
        let file = File::create(&path)?;
        info!("Writing CSV log to {}", path.display());

        Ok((Self::new(BufWriter::new(file))?, path))
    }
}

impl<W: Write + Send + 'static> CsvSink<W> {
    /// Wrap `writer` and write the header row
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", header())?;
        writer.flush()?;
        Ok(Self {
            state: Mutex::new(RowState {
                writer,
                values: [None; SCALAR_COLUMNS],
                coordinates: None,
                timestamp: None,
                rows: 0,
            }),
        })
    }

    /// Merge one finalizer event into the current row
    ///
    /// An event with a new timestamp first writes out the pending row.
    pub fn record(&self, event: &TaggedEvent) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let timestamp = event.stamp.timestamp;

        if state.timestamp.is_some_and(|current| current != timestamp) {
            if let Err(e) = state.flush_row() {
                error!("Failed to write CSV row: {}", e);
            }
        }
        state.timestamp = Some(timestamp);

        state.coordinates = Some(event.stamp.coordinates);

        match column_for_tag(event.data.tag) {
            Some(column) => state.values[column] = Some(event.data.value),
            None => warn!(tag = event.data.tag, "No CSV column for tag"),
        }
    }

    /// Subscribe to every finalizer in `finalizers`
    pub fn attach(self: &Arc<Self>, finalizers: &FinalizerSet) -> Vec<SubscriptionId> {
        finalizers
            .iter()
            .map(|(tag, provider)| {
                if column_for_tag(tag).is_none() {
                    warn!(tag, "Finalizer has no CSV column; its values are not logged");
                }
                let sink = Arc::clone(self);
                provider.subscribe(move |event: &TaggedEvent| sink.record(event))
            })
            .collect()
    }

    /// Write out the pending row, if any
    pub fn finish(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.flush_row()?;
        debug!("CSV sink finished after {} rows", state.rows);
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).rows
    }

    /// Take the writer back
    pub fn into_inner(self) -> W {
        self.state.into_inner().unwrap_or_else(PoisonError::into_inner).writer
    }
}
