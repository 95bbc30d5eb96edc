//! Error taxonomy for the windowing core.
//!
//! Every variant here is recoverable at the instrument level. Configuration
//! problems (unknown fill rule, bad thresholds) live in
//! [`crate::config::ConfigError`] and are fatal at startup.

/// Errors raised while ingesting samples or extracting windows.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowingError {
    /// The raw channel code has no entry in the role alias table.
    InvalidChannelMapping {
        instrument_id: String,
        channel_code: String,
    },
    /// A record's sample rate differs from the configured window rate or
    /// from its buffer's.
    SampleRateMismatch {
        instrument_id: String,
        channel_code: String,
        expected: f64,
        actual: f64,
    },
    /// A record that cannot be placed into any buffer.
    InvalidRecord {
        instrument_id: String,
        reason: String,
    },
    /// The tracker's next start time ran away from the buffered data.
    TrackingAnomaly {
        instrument_id: String,
        next_start_time: f64,
        data_end: f64,
        gap_seconds: f64,
    },
}

impl WindowingError {
    /// Instrument the error refers to.
    pub fn instrument_id(&self) -> &str {
        match self {
            WindowingError::InvalidChannelMapping { instrument_id, .. }
            | WindowingError::SampleRateMismatch { instrument_id, .. }
            | WindowingError::InvalidRecord { instrument_id, .. }
            | WindowingError::TrackingAnomaly { instrument_id, .. } => instrument_id,
        }
    }
}

impl std::fmt::Display for WindowingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowingError::InvalidChannelMapping {
                instrument_id,
                channel_code,
            } => write!(
                f,
                "Invalid channel mapping: code '{channel_code}' on {instrument_id} has no role"
            ),
            WindowingError::SampleRateMismatch {
                instrument_id,
                channel_code,
                expected,
                actual,
            } => write!(
                f,
                "Sample rate mismatch on {instrument_id}.{channel_code}: expected {expected} Hz, record is {actual} Hz"
            ),
            WindowingError::InvalidRecord {
                instrument_id,
                reason,
            } => write!(f, "Invalid record for {instrument_id}: {reason}"),
            WindowingError::TrackingAnomaly {
                instrument_id,
                next_start_time,
                data_end,
                gap_seconds,
            } => write!(
                f,
                "Tracking anomaly on {instrument_id}: next start {next_start_time:.3} is {gap_seconds:.3}s past data end {data_end:.3}"
            ),
        }
    }
}

impl std::error::Error for WindowingError {}
