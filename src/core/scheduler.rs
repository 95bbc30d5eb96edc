//! Pulse-driven orchestration of ingestion, window sweeps and eviction.
//!
//! One pulse is: records ingested since the last pulse are already in the
//! store, then up to `max_sweeps_per_pulse` sweeps each attempt one window
//! per instrument, then staleness aging runs once. A sweep that yields no
//! window ends the pulse early.

use crate::core::assembler::{FillRule, WindowAssembler, WindowRequest};
use crate::core::branch::{ChannelRole, RoleAliases};
use crate::core::buffer::{rates_match, AppendOutcome};
use crate::core::completeness::{CompletenessEvaluator, TaperShape};
use crate::core::error::WindowingError;
use crate::core::store::{EvictionReport, TieredBufferStore};
use crate::core::tracker::{GapPolicy, Readiness, WindowTracker};
use crate::core::window::Window;
use std::collections::{HashSet, VecDeque};

/// Validated, typed settings for the windowing core.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowerSettings {
    pub aliases: RoleAliases,
    pub sample_rate: f64,
    pub sample_count: usize,
    pub advance_seconds: f64,
    pub vertical_threshold: f64,
    pub horizontal_threshold: f64,
    pub fill_rule: FillRule,
    pub fill_value: f64,
    pub edge_taper_seconds: f64,
    pub taper_shape: TaperShape,
    pub padding_seconds: f64,
    pub channel_order: Vec<ChannelRole>,
    pub max_span_seconds: f64,
    pub max_staleness_pulses: u32,
    pub max_sweeps_per_pulse: u32,
    pub gap_policy: GapPolicy,
    /// Halt the pulse on a tracking anomaly instead of skipping the instrument.
    pub diagnostic_mode: bool,
}

impl WindowerSettings {
    pub fn window_seconds(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate
    }
}

impl Default for WindowerSettings {
    fn default() -> Self {
        Self {
            aliases: RoleAliases::default(),
            sample_rate: 100.0,
            sample_count: 6000,
            advance_seconds: 42.0,
            vertical_threshold: 0.95,
            horizontal_threshold: 0.8,
            fill_rule: FillRule::Zeros,
            fill_value: 0.0,
            edge_taper_seconds: 5.0,
            taper_shape: TaperShape::Cosine,
            padding_seconds: 0.0,
            channel_order: ChannelRole::ALL.to_vec(),
            max_span_seconds: 150.0,
            max_staleness_pulses: 20,
            max_sweeps_per_pulse: 20,
            gap_policy: GapPolicy::DiscardAndJump,
            diagnostic_mode: false,
        }
    }
}

/// What one pulse did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PulseReport {
    /// Pulse number, starting at 0.
    pub pulse: u64,
    /// Records accepted since the previous pulse.
    pub ingested: usize,
    /// Records rejected since the previous pulse.
    pub rejected: usize,
    pub sweeps: u32,
    /// Windows appended to the output queue.
    pub emitted: usize,
    /// Instruments whose tracker jumped over a gap.
    pub gap_jumps: usize,
    /// Anomalies that caused an instrument to be skipped.
    pub anomalies: Vec<WindowingError>,
    pub eviction: EvictionReport,
}

#[derive(Debug, Default)]
struct SweepTally {
    emitted: usize,
    gap_jumps: usize,
    anomalies: Vec<WindowingError>,
}

/// Owns the store, tracker and assembler and drives them pulse by pulse.
#[derive(Debug)]
pub struct PulseScheduler {
    settings: WindowerSettings,
    store: TieredBufferStore,
    tracker: WindowTracker,
    assembler: WindowAssembler,
    /// Instruments that received data since the last pulse.
    seen: HashSet<String>,
    queue: VecDeque<Window>,
    ingested: usize,
    rejected: usize,
}

impl PulseScheduler {
    pub fn new(settings: WindowerSettings) -> Self {
        let store = TieredBufferStore::new(
            settings.aliases.clone(),
            settings.max_span_seconds,
            settings.max_staleness_pulses,
        );
        let tracker = WindowTracker::new(settings.advance_seconds, settings.gap_policy);
        let assembler = WindowAssembler {
            sample_rate: settings.sample_rate,
            sample_count: settings.sample_count,
            evaluator: CompletenessEvaluator::new(
                settings.edge_taper_seconds,
                settings.taper_shape,
            ),
            vertical_threshold: settings.vertical_threshold,
            horizontal_threshold: settings.horizontal_threshold,
            fill_rule: settings.fill_rule,
            fill_value: settings.fill_value,
            padding_seconds: settings.padding_seconds,
            channel_order: settings.channel_order.clone(),
        };

        Self {
            settings,
            store,
            tracker,
            assembler,
            seen: HashSet::new(),
            queue: VecDeque::new(),
            ingested: 0,
            rejected: 0,
        }
    }

    /// Feed one record into the store.
    ///
    /// Records must arrive at the configured window rate. Rejected records
    /// are logged and dropped; the error is returned so the caller can count
    /// it. Only records that place new samples count as activity for aging.
    pub fn ingest(
        &mut self,
        instrument_id: &str,
        channel_code: &str,
        start_time: f64,
        sample_rate: f64,
        samples: &[Option<f64>],
    ) -> Result<AppendOutcome, WindowingError> {
        let result = if rates_match(self.settings.sample_rate, sample_rate) {
            self.store
                .ingest(instrument_id, channel_code, start_time, sample_rate, samples)
        } else {
            Err(WindowingError::SampleRateMismatch {
                instrument_id: instrument_id.to_string(),
                channel_code: channel_code.to_string(),
                expected: self.settings.sample_rate,
                actual: sample_rate,
            })
        };

        match result {
            Ok(outcome) => {
                if outcome != AppendOutcome::Discarded {
                    self.seen.insert(instrument_id.to_string());
                }
                self.ingested += 1;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!("Dropped record: {}", e);
                self.rejected += 1;
                Err(e)
            }
        }
    }

    /// Run one pulse with the configured sweep limit.
    pub fn pulse(&mut self) -> Result<PulseReport, WindowingError> {
        self.pulse_with_limit(self.settings.max_sweeps_per_pulse)
    }

    /// Run one pulse with at most `max_sweeps` sweeps.
    ///
    /// In diagnostic mode a tracking anomaly stops the pulse before aging,
    /// leaving the store and tracker as they were for inspection.
    pub fn pulse_with_limit(&mut self, max_sweeps: u32) -> Result<PulseReport, WindowingError> {
        let mut report = PulseReport {
            pulse: self.store.pulse_count(),
            ..PulseReport::default()
        };
        let mut skipped: HashSet<String> = HashSet::new();

        while report.sweeps < max_sweeps {
            let tally = self.sweep(&mut skipped)?;
            report.sweeps += 1;
            report.emitted += tally.emitted;
            report.gap_jumps += tally.gap_jumps;
            report.anomalies.extend(tally.anomalies);
            if tally.emitted == 0 {
                break;
            }
        }

        report.eviction = self.store.age_and_evict(&self.seen);
        for id in &report.eviction.removed {
            self.tracker.remove(id);
        }
        self.seen.clear();

        report.ingested = std::mem::take(&mut self.ingested);
        report.rejected = std::mem::take(&mut self.rejected);

        if report.emitted > 0 || !report.eviction.is_empty() {
            tracing::debug!(
                "Pulse {}: {} windows in {} sweeps, {} removed",
                report.pulse,
                report.emitted,
                report.sweeps,
                report.eviction.removed.len()
            );
        }
        Ok(report)
    }

    /// One pass over every instrument, attempting at most one window each.
    fn sweep(&mut self, skipped: &mut HashSet<String>) -> Result<SweepTally, WindowingError> {
        let mut tally = SweepTally::default();

        for id in self.store.instrument_ids() {
            if skipped.contains(&id) {
                continue;
            }
            let branch = match self.store.branch(&id) {
                Some(branch) => branch,
                None => continue,
            };

            let readiness = match self.tracker.evaluate(&id, branch.vertical()) {
                Ok(readiness) => readiness,
                Err(e) if self.settings.diagnostic_mode => {
                    tracing::error!("Halting pulse for inspection: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Skipping {} for this pulse: {}", id, e);
                    skipped.insert(id);
                    tally.anomalies.push(e);
                    continue;
                }
            };

            let (window_start, window_index, jumped) = match readiness {
                Readiness::Wait => continue,
                Readiness::Attempt {
                    window_start,
                    window_index,
                    skipped,
                } => (window_start, window_index, skipped),
            };
            if jumped > 0 {
                tally.gap_jumps += 1;
            }

            let request = WindowRequest {
                instrument_id: &id,
                window_index,
                window_start,
            };
            if let Some(window) = self.assembler.assemble(branch, &request) {
                tracing::debug!("Window {} for {} at {:.3}", window_index, id, window_start);
                self.tracker.advance(&id);
                self.queue.push_back(window);
                tally.emitted += 1;
            }
        }

        Ok(tally)
    }

    /// Drain every queued window.
    pub fn take_windows(&mut self) -> Vec<Window> {
        self.queue.drain(..).collect()
    }

    /// Output queue, for consumers that drain in batches.
    pub fn queue_mut(&mut self) -> &mut VecDeque<Window> {
        &mut self.queue
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn settings(&self) -> &WindowerSettings {
        &self.settings
    }

    pub fn store(&self) -> &TieredBufferStore {
        &self.store
    }

    pub fn tracker(&self) -> &WindowTracker {
        &self.tracker
    }
}
