//! Instrument-keyed buffer store with pulse-driven staleness eviction.
//!
//! Staleness is counted in pulses, not wall-clock time. An instrument that
//! receives no data for `max_staleness` pulses first loses its buffered
//! segments one per pulse (oldest first) and is removed once every buffer
//! is empty.

use crate::core::branch::{ChannelRole, ChannelSlot, InstrumentBranch, RoleAliases};
use crate::core::buffer::{AppendOutcome, SampleBuffer};
use crate::core::error::WindowingError;
use std::collections::{BTreeMap, HashSet};

/// A tracked instrument and its staleness counter.
#[derive(Debug, Clone, Default)]
pub struct StoreEntry {
    pub branch: InstrumentBranch,
    /// Consecutive pulses without new data.
    pub staleness: u32,
}

/// A segment dropped from a stale instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedSegment {
    pub instrument_id: String,
    pub role: ChannelRole,
    pub samples: usize,
}

/// What one aging pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvictionReport {
    /// Instruments removed from the store entirely.
    pub removed: Vec<String>,
    /// Segments dropped from instruments past the staleness ceiling.
    pub dropped: Vec<DroppedSegment>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.dropped.is_empty()
    }
}

/// Mapping from instrument id to buffers, plus eviction policy.
#[derive(Debug, Clone)]
pub struct TieredBufferStore {
    entries: BTreeMap<String, StoreEntry>,
    aliases: RoleAliases,
    max_span: f64,
    max_staleness: u32,
    /// Number of completed aging passes.
    pulse_count: u64,
}

impl TieredBufferStore {
    pub fn new(aliases: RoleAliases, max_span: f64, max_staleness: u32) -> Self {
        Self {
            entries: BTreeMap::new(),
            aliases,
            max_span,
            max_staleness,
            pulse_count: 0,
        }
    }

    pub fn aliases(&self) -> &RoleAliases {
        &self.aliases
    }

    /// Append samples to the buffer for (instrument, channel role).
    ///
    /// Creates the instrument and its buffer on first sight. The staleness
    /// counter resets only when the record places new samples; a
    /// [`AppendOutcome::Discarded`] record leaves it untouched.
    pub fn ingest(
        &mut self,
        instrument_id: &str,
        channel_code: &str,
        start_time: f64,
        sample_rate: f64,
        samples: &[Option<f64>],
    ) -> Result<AppendOutcome, WindowingError> {
        let role = self
            .aliases
            .resolve(channel_code)
            .ok_or_else(|| WindowingError::InvalidChannelMapping {
                instrument_id: instrument_id.to_string(),
                channel_code: channel_code.to_string(),
            })?;

        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WindowingError::InvalidRecord {
                instrument_id: instrument_id.to_string(),
                reason: format!("sample rate must be positive, got {sample_rate}"),
            });
        }
        if !start_time.is_finite() {
            return Err(WindowingError::InvalidRecord {
                instrument_id: instrument_id.to_string(),
                reason: "start time is not finite".to_string(),
            });
        }

        if let Some(slot) = self
            .entries
            .get(instrument_id)
            .and_then(|entry| entry.branch.slot(role))
        {
            if slot.code != channel_code {
                return Err(WindowingError::InvalidRecord {
                    instrument_id: instrument_id.to_string(),
                    reason: format!(
                        "code '{channel_code}' maps to {role}, already bound to '{}'",
                        slot.code
                    ),
                });
            }
            if !slot.buffer.matches_rate(sample_rate) {
                return Err(WindowingError::SampleRateMismatch {
                    instrument_id: instrument_id.to_string(),
                    channel_code: channel_code.to_string(),
                    expected: slot.buffer.sample_rate(),
                    actual: sample_rate,
                });
            }
        }

        let pulse = self.pulse_count;
        let max_span = self.max_span;
        let entry = self.entries.entry(instrument_id.to_string()).or_default();

        if entry.branch.slot(role).is_none() {
            tracing::debug!("New {} buffer for {} ({})", role, instrument_id, channel_code);
            entry.branch.insert_slot(
                role,
                ChannelSlot {
                    code: channel_code.to_string(),
                    buffer: SampleBuffer::new(sample_rate, max_span),
                    last_update_pulse: pulse,
                },
            );
        }

        let slot = entry
            .branch
            .slot_mut(role)
            .ok_or_else(|| WindowingError::InvalidRecord {
                instrument_id: instrument_id.to_string(),
                reason: format!("no {role} slot after insert"),
            })?;
        let outcome = slot.buffer.append(start_time, samples);
        if outcome == AppendOutcome::Discarded {
            return Ok(outcome);
        }
        slot.last_update_pulse = pulse;
        entry.staleness = 0;

        if outcome == AppendOutcome::Rebased {
            tracing::info!(
                "Re-based {} {} buffer at {:.3} after a gap longer than {:.1}s",
                instrument_id,
                role,
                start_time,
                max_span
            );
        }
        Ok(outcome)
    }

    /// Age every instrument not in `seen` by one pulse and evict past the
    /// staleness ceiling. Runs once per pulse, after that pulse's ingestion.
    pub fn age_and_evict(&mut self, seen: &HashSet<String>) -> EvictionReport {
        let mut report = EvictionReport::default();

        for (id, entry) in self.entries.iter_mut() {
            if seen.contains(id) {
                continue;
            }
            entry.staleness = entry.staleness.saturating_add(1);
            if entry.staleness < self.max_staleness {
                continue;
            }
            match entry.branch.stalest_nonempty_slot_mut() {
                Some((role, slot)) => {
                    let samples = slot.buffer.pop_oldest_segment();
                    tracing::debug!(
                        "Dropped {} stale samples from {} {} (staleness {})",
                        samples,
                        id,
                        role,
                        entry.staleness
                    );
                    report.dropped.push(DroppedSegment {
                        instrument_id: id.clone(),
                        role,
                        samples,
                    });
                }
                None => report.removed.push(id.clone()),
            }
        }

        for id in &report.removed {
            self.entries.remove(id);
            tracing::info!("Evicted stale instrument {}", id);
        }

        self.pulse_count += 1;
        report
    }

    pub fn branch(&self, instrument_id: &str) -> Option<&InstrumentBranch> {
        self.entries.get(instrument_id).map(|entry| &entry.branch)
    }

    pub fn staleness(&self, instrument_id: &str) -> Option<u32> {
        self.entries.get(instrument_id).map(|entry| entry.staleness)
    }

    pub fn contains(&self, instrument_id: &str) -> bool {
        self.entries.contains_key(instrument_id)
    }

    /// Tracked instrument ids in iteration order.
    pub fn instrument_ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoreEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse_count
    }
}
