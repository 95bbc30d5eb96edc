//! Ingest record types.
//!
//! A record is one contiguous chunk of samples for one channel of one
//! instrument. Masked samples are carried as `None` (JSON `null`).

use crate::core::{AppendOutcome, PulseScheduler, WindowingError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One chunk of samples from the ingestion side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestRecord {
    pub instrument_id: String,
    pub channel_code: String,
    /// Start time in seconds since the Unix epoch.
    pub start_time: f64,
    pub sample_rate: f64,
    pub samples: Vec<Option<f64>>,
}

/// Wire form accepted on input: either explicit ids or a SEED-style id.
#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(default)]
    seed_id: Option<String>,
    #[serde(default)]
    instrument_id: Option<String>,
    #[serde(default)]
    channel_code: Option<String>,
    start_time: f64,
    sample_rate: f64,
    samples: Vec<Option<f64>>,
}

impl IngestRecord {
    pub fn new(
        instrument_id: impl Into<String>,
        channel_code: impl Into<String>,
        start_time: f64,
        sample_rate: f64,
        samples: Vec<Option<f64>>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            channel_code: channel_code.into(),
            start_time,
            sample_rate,
            samples,
        }
    }

    /// Build a record from a `NET.STA.LOC.CHA` id.
    ///
    /// The instrument is everything but the last channel character
    /// (`"UW.GNW..HH"`), the channel code is that last character (`"Z"`).
    pub fn from_seed_id(
        seed_id: &str,
        start_time: f64,
        sample_rate: f64,
        samples: Vec<Option<f64>>,
    ) -> Result<Self, IngestError> {
        let (instrument_id, channel_code) = split_seed_id(seed_id)?;
        Ok(Self::new(
            instrument_id,
            channel_code,
            start_time,
            sample_rate,
            samples,
        ))
    }

    /// Parse one line of newline-delimited JSON.
    pub fn from_json_line(line: &str) -> Result<Self, IngestError> {
        let wire: WireRecord =
            serde_json::from_str(line).map_err(|e| IngestError::Parse(e.to_string()))?;

        match (wire.instrument_id, wire.channel_code, wire.seed_id) {
            (Some(instrument_id), Some(channel_code), _) => Ok(Self::new(
                instrument_id,
                channel_code,
                wire.start_time,
                wire.sample_rate,
                wire.samples,
            )),
            (_, _, Some(seed_id)) => {
                Self::from_seed_id(&seed_id, wire.start_time, wire.sample_rate, wire.samples)
            }
            _ => Err(IngestError::Parse(
                "record needs instrument_id and channel_code, or seed_id".to_string(),
            )),
        }
    }

    /// Exclusive end time of the record.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.samples.len() as f64 / self.sample_rate
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.start_time.floor();
        let nanos = ((self.start_time - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::<Utc>::from_timestamp(secs as i64, nanos)
    }

    /// Hand this record to a scheduler.
    pub fn feed(&self, scheduler: &mut PulseScheduler) -> Result<AppendOutcome, WindowingError> {
        scheduler.ingest(
            &self.instrument_id,
            &self.channel_code,
            self.start_time,
            self.sample_rate,
            &self.samples,
        )
    }
}

fn split_seed_id(seed_id: &str) -> Result<(String, String), IngestError> {
    let parts: Vec<&str> = seed_id.split('.').collect();
    if parts.len() != 4 {
        return Err(IngestError::InvalidSeedId(seed_id.to_string()));
    }
    let channel = parts[3];
    let component = channel
        .chars()
        .last()
        .ok_or_else(|| IngestError::InvalidSeedId(seed_id.to_string()))?;
    let prefix = &channel[..channel.len() - component.len_utf8()];
    let instrument_id = format!("{}.{}.{}.{}", parts[0], parts[1], parts[2], prefix);
    Ok((instrument_id, component.to_string()))
}

/// Errors from the ingestion side.
#[derive(Debug)]
pub enum IngestError {
    AlreadyRunning,
    IoError(String),
    Parse(String),
    InvalidSeedId(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::AlreadyRunning => write!(f, "Replay source is already running"),
            IngestError::IoError(e) => write!(f, "IO error: {e}"),
            IngestError::Parse(e) => write!(f, "Parse error: {e}"),
            IngestError::InvalidSeedId(id) => write!(f, "Invalid SEED id '{id}'"),
        }
    }
}

impl std::error::Error for IngestError {}
