//! Fixed-shape multi-channel windows handed to the inference side.

use crate::core::branch::ChannelRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a channel's samples came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "from")]
pub enum ChannelSource {
    /// Trimmed from this role's own buffer.
    Observed,
    /// Copied from another role's trace.
    Cloned(ChannelRole),
    /// Synthesized zeros.
    ZeroFilled,
}

/// One channel of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTrace {
    pub role: ChannelRole,
    pub source: ChannelSource,
    /// Exactly `sample_count` values; masked gaps hold the fill value.
    pub data: Vec<f64>,
    /// Per-sample validity matching `data`.
    pub valid: Vec<bool>,
    /// Fraction of valid samples, in `[0, 1]`.
    pub fold: f64,
    /// Padding before the window start, for downstream edge handling.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub margin_before: Vec<f64>,
    /// Padding after the window end.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub margin_after: Vec<f64>,
}

/// An immutable analysis window for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub instrument_id: String,
    pub window_index: u64,
    /// Start time in seconds since the Unix epoch.
    pub start_time: f64,
    pub sample_rate: f64,
    pub sample_count: usize,
    /// Channels in the configured order.
    pub channels: Vec<ChannelTrace>,
}

impl Window {
    /// Exclusive end time of the window.
    pub fn end_time(&self) -> f64 {
        self.start_time + self.sample_count as f64 / self.sample_rate
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        let secs = self.start_time.floor();
        let nanos = ((self.start_time - secs) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::<Utc>::from_timestamp(secs as i64, nanos)
    }

    pub fn channel(&self, role: ChannelRole) -> Option<&ChannelTrace> {
        self.channels.iter().find(|c| c.role == role)
    }

    /// Number of channels that carry their own observed data.
    pub fn observed_channels(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| c.source == ChannelSource::Observed)
            .count()
    }

    /// Per-sample count of observed channels holding a valid sample.
    pub fn collapsed_fold(&self) -> Vec<f64> {
        let mut fold = vec![0.0; self.sample_count];
        for channel in self
            .channels
            .iter()
            .filter(|c| c.source == ChannelSource::Observed)
        {
            for (acc, valid) in fold.iter_mut().zip(&channel.valid) {
                if *valid {
                    *acc += 1.0;
                }
            }
        }
        fold
    }
}
