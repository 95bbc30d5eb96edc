//! Per-instrument window scheduling state.
//!
//! Each instrument is `Unseeded` until its vertical buffer holds data, then
//! `Seeded` at that buffer's start, then `Advancing` once it has emitted a
//! window. The next start time only ever moves forward, in whole multiples
//! of the advance step, so window indices stay aligned for consumers.

use crate::core::buffer::SampleBuffer;
use crate::core::error::WindowingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Slack used when comparing a start time against buffer bounds, as a
/// fraction of one sample period.
const SAMPLE_SLACK: f64 = 0.5;

/// Lifecycle of one instrument's tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerState {
    Unseeded,
    Seeded,
    Advancing,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Unseeded => write!(f, "unseeded"),
            TrackerState::Seeded => write!(f, "seeded"),
            TrackerState::Advancing => write!(f, "advancing"),
        }
    }
}

/// What to do when the vertical buffer has re-based past the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GapPolicy {
    /// Jump forward by a whole number of advances. Data between the old
    /// position and the jump target is never windowed.
    #[default]
    DiscardAndJump,
    /// Restart timing at the new data start. The index still moves by the
    /// same whole number of advances.
    Reseed,
}

/// Outcome of checking one instrument against its vertical buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    /// Try to assemble a window here.
    Attempt {
        window_start: f64,
        window_index: u64,
        /// Advances skipped to get here, non-zero after a gap jump.
        skipped: u64,
    },
    /// Not enough data yet; nothing changed.
    Wait,
}

/// Scheduling state for one seeded instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerEntry {
    /// Start time that `steps` advances are counted from.
    anchor: f64,
    steps: u64,
    next_window_index: u64,
    windows_emitted: u64,
}

impl TrackerEntry {
    fn seeded_at(anchor: f64) -> Self {
        Self {
            anchor,
            steps: 0,
            next_window_index: 0,
            windows_emitted: 0,
        }
    }

    pub fn next_window_index(&self) -> u64 {
        self.next_window_index
    }

    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }

    pub fn state(&self) -> TrackerState {
        if self.windows_emitted == 0 {
            TrackerState::Seeded
        } else {
            TrackerState::Advancing
        }
    }
}

/// Tracker entries for every seeded instrument.
#[derive(Debug, Clone)]
pub struct WindowTracker {
    entries: BTreeMap<String, TrackerEntry>,
    advance_seconds: f64,
    gap_policy: GapPolicy,
}

impl WindowTracker {
    pub fn new(advance_seconds: f64, gap_policy: GapPolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            advance_seconds,
            gap_policy,
        }
    }

    pub fn advance_seconds(&self) -> f64 {
        self.advance_seconds
    }

    pub fn gap_policy(&self) -> GapPolicy {
        self.gap_policy
    }

    /// Decide whether `instrument_id` should attempt a window this sweep.
    ///
    /// Seeds the tracker on first sight of vertical data and applies the
    /// gap policy when the buffer has moved past the tracker. Returns
    /// `TrackingAnomaly` when the tracker has run too far ahead of the data.
    pub fn evaluate(
        &mut self,
        instrument_id: &str,
        vertical: Option<&SampleBuffer>,
    ) -> Result<Readiness, WindowingError> {
        let buffer = match vertical {
            Some(buffer) if !buffer.is_empty() => buffer,
            _ => return Ok(Readiness::Wait),
        };

        let data_start = buffer.start_time();
        let data_end = buffer.data_end();
        let slack = SAMPLE_SLACK / buffer.sample_rate();
        let advance = self.advance_seconds;

        let entry = self
            .entries
            .entry(instrument_id.to_string())
            .or_insert_with(|| {
                tracing::debug!("Seeded tracker for {} at {:.3}", instrument_id, data_start);
                TrackerEntry::seeded_at(data_start)
            });
        let next = entry.anchor + entry.steps as f64 * advance;

        if next + slack >= data_end {
            let gap = next - data_end;
            if gap < 2.0 * advance {
                return Ok(Readiness::Wait);
            }
            return Err(WindowingError::TrackingAnomaly {
                instrument_id: instrument_id.to_string(),
                next_start_time: next,
                data_end,
                gap_seconds: gap,
            });
        }

        if next + slack < data_start {
            let gap = data_start - next;
            if gap + slack >= buffer.max_span() {
                // Tolerance keeps an exact multiple from flooring one short.
                let skipped = (gap / advance + 1e-9).floor() as u64;
                match self.gap_policy {
                    GapPolicy::DiscardAndJump => entry.steps += skipped,
                    GapPolicy::Reseed => {
                        entry.anchor = data_start;
                        entry.steps = 0;
                    }
                }
                entry.next_window_index += skipped;
                let window_start = entry.anchor + entry.steps as f64 * advance;
                tracing::info!(
                    "Gap of {:.3}s on {}: skipped {} advances to window {}",
                    gap,
                    instrument_id,
                    skipped,
                    entry.next_window_index
                );
                return Ok(Readiness::Attempt {
                    window_start,
                    window_index: entry.next_window_index,
                    skipped,
                });
            }
        }

        Ok(Readiness::Attempt {
            window_start: next,
            window_index: entry.next_window_index,
            skipped: 0,
        })
    }

    /// Record a successful emission: move one advance forward.
    pub fn advance(&mut self, instrument_id: &str) -> Option<u64> {
        let entry = self.entries.get_mut(instrument_id)?;
        entry.steps += 1;
        entry.next_window_index += 1;
        entry.windows_emitted += 1;
        Some(entry.next_window_index)
    }

    /// Forget an instrument; it becomes `Unseeded` again.
    pub fn remove(&mut self, instrument_id: &str) -> Option<TrackerEntry> {
        self.entries.remove(instrument_id)
    }

    pub fn entry(&self, instrument_id: &str) -> Option<&TrackerEntry> {
        self.entries.get(instrument_id)
    }

    pub fn state(&self, instrument_id: &str) -> TrackerState {
        self.entries
            .get(instrument_id)
            .map(TrackerEntry::state)
            .unwrap_or(TrackerState::Unseeded)
    }

    pub fn next_start_time(&self, instrument_id: &str) -> Option<f64> {
        self.entries
            .get(instrument_id)
            .map(|e| e.anchor + e.steps as f64 * self.advance_seconds)
    }

    pub fn next_window_index(&self, instrument_id: &str) -> Option<u64> {
        self.entries.get(instrument_id).map(|e| e.next_window_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
