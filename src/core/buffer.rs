//! Per-channel sample accumulator with a bounded span.
//!
//! A [`SampleBuffer`] holds one channel of one instrument as a run of
//! evenly spaced samples. Missing samples are stored as `None` so that
//! sample indices stay continuous across small gaps.

use std::collections::VecDeque;

/// Relative tolerance used when comparing sample rates.
const RATE_TOLERANCE: f64 = 1e-6;

/// Whether `actual` equals `expected` within [`RATE_TOLERANCE`].
pub(crate) fn rates_match(expected: f64, actual: f64) -> bool {
    ((expected - actual) / expected).abs() <= RATE_TOLERANCE
}

/// What an append did to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The buffer was empty and now starts at the record.
    Created,
    /// Samples were appended or merged into the existing series.
    Extended,
    /// The record followed a gap longer than the buffer span, so the old
    /// contents were dropped and the buffer restarted at the record.
    Rebased,
    /// Nothing new from the record could be placed.
    Discarded,
}

/// Ordered, time-stamped samples for one (instrument, channel) pair.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Time of grid index 0. Start time is derived from this plus
    /// `first_index` so that repeated front trimming never drifts.
    origin: f64,
    /// Grid index of the first retained sample.
    first_index: i64,
    sample_rate: f64,
    samples: VecDeque<Option<f64>>,
    /// Maximum retained span in seconds.
    max_span: f64,
}

impl SampleBuffer {
    /// Create an empty buffer.
    pub fn new(sample_rate: f64, max_span: f64) -> Self {
        Self {
            origin: 0.0,
            first_index: 0,
            sample_rate,
            samples: VecDeque::new(),
            max_span,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_span(&self) -> f64 {
        self.max_span
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of non-masked samples.
    pub fn present_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_some()).count()
    }

    /// Whether a record at `sample_rate` can be appended to this buffer.
    pub fn matches_rate(&self, sample_rate: f64) -> bool {
        rates_match(self.sample_rate, sample_rate)
    }

    /// Timestamp of the first retained sample.
    pub fn start_time(&self) -> f64 {
        self.origin + self.first_index as f64 / self.sample_rate
    }

    /// Timestamp of the last retained sample.
    pub fn end_time(&self) -> f64 {
        self.start_time() + self.samples.len().saturating_sub(1) as f64 / self.sample_rate
    }

    /// Exclusive end of the buffered interval (one sample past `end_time`).
    pub fn data_end(&self) -> f64 {
        self.start_time() + self.samples.len() as f64 / self.sample_rate
    }

    /// Span covered by the retained samples, in seconds.
    pub fn span_seconds(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// Append a chunk of samples starting at `start_time`.
    ///
    /// The caller is responsible for checking [`matches_rate`](Self::matches_rate).
    /// Non-finite values are stored as masked samples. Samples that would
    /// land before the buffer start are dropped.
    pub fn append(&mut self, start_time: f64, samples: &[Option<f64>]) -> AppendOutcome {
        let chunk = samples.iter().map(|s| s.filter(|v| v.is_finite()));

        if self.samples.is_empty() {
            self.reset_at(start_time);
            self.samples.extend(chunk);
            self.trim_to_span();
            return if self.samples.is_empty() {
                AppendOutcome::Discarded
            } else {
                AppendOutcome::Created
            };
        }

        let offset = self.grid_offset(start_time);
        let len = self.samples.len() as i64;

        let outcome = if offset > len {
            let gap_seconds = start_time - self.end_time();
            if gap_seconds > self.max_span {
                self.reset_at(start_time);
                self.samples.extend(chunk);
                AppendOutcome::Rebased
            } else {
                let missing = (offset - len) as usize;
                self.samples.extend(std::iter::repeat(None).take(missing));
                self.samples.extend(chunk);
                AppendOutcome::Extended
            }
        } else {
            let mut placed = false;
            for (i, value) in chunk.enumerate() {
                let idx = offset.saturating_add(i as i64);
                if idx < 0 {
                    continue;
                }
                let idx = idx as usize;
                if idx < self.samples.len() {
                    // First arrival wins; only masked slots are filled.
                    if self.samples[idx].is_none() && value.is_some() {
                        self.samples[idx] = value;
                        placed = true;
                    }
                } else {
                    self.samples.push_back(value);
                    placed = true;
                }
            }
            if placed {
                AppendOutcome::Extended
            } else {
                AppendOutcome::Discarded
            }
        };

        self.trim_to_span();
        outcome
    }

    /// Drop the oldest contiguous run of present samples (and any masked
    /// samples in front of it). Returns the number of samples removed.
    pub fn pop_oldest_segment(&mut self) -> usize {
        let mut removed = 0;
        while matches!(self.samples.front(), Some(None)) {
            self.samples.pop_front();
            removed += 1;
        }
        while matches!(self.samples.front(), Some(Some(_))) {
            self.samples.pop_front();
            removed += 1;
        }
        self.first_index += removed as i64;
        removed + self.strip_leading_masked()
    }

    /// Nearest-sample lookup. `None` when `t` is outside the buffer or the
    /// nearest sample is masked.
    pub fn value_at(&self, t: f64) -> Option<f64> {
        let idx = self.grid_offset(t);
        if idx < 0 {
            return None;
        }
        self.samples.get(idx as usize).copied().flatten()
    }

    /// Sample `count` points starting at `start` with spacing `1 / rate`.
    pub fn sample_window(&self, start: f64, count: usize, rate: f64) -> Vec<Option<f64>> {
        (0..count)
            .map(|i| self.value_at(start + i as f64 / rate))
            .collect()
    }

    /// Offset in samples of time `t` relative to the first retained sample.
    fn grid_offset(&self, t: f64) -> i64 {
        // The cast saturates for far-off times; keep the subtraction saturating too.
        (((t - self.origin) * self.sample_rate).round() as i64).saturating_sub(self.first_index)
    }

    fn reset_at(&mut self, start_time: f64) {
        self.samples.clear();
        self.origin = start_time;
        self.first_index = 0;
    }

    /// Drop samples older than `max_span` before the newest one, then strip
    /// leading masked samples so the buffer always starts on real data.
    fn trim_to_span(&mut self) {
        let capacity = (self.max_span * self.sample_rate).floor() as usize + 1;
        if self.samples.len() > capacity {
            let excess = self.samples.len() - capacity;
            self.samples.drain(..excess);
            self.first_index += excess as i64;
        }
        self.strip_leading_masked();
    }

    fn strip_leading_masked(&mut self) -> usize {
        let mut stripped = 0;
        while matches!(self.samples.front(), Some(None)) {
            self.samples.pop_front();
            stripped += 1;
        }
        self.first_index += stripped as i64;
        if self.samples.is_empty() {
            self.first_index = 0;
            self.origin = 0.0;
        }
        stripped
    }
}
