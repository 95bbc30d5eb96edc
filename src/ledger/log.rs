//! Operational pulse ledger.
//!
//! Counts what the scheduler did across a run so it can be inspected from
//! the CLI without replaying any data.

use crate::core::PulseReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for one ledger.
#[derive(Debug)]
pub struct PulseLedger {
    records_ingested: AtomicU64,
    records_rejected: AtomicU64,
    pulses: AtomicU64,
    sweeps: AtomicU64,
    windows_emitted: AtomicU64,
    gap_jumps: AtomicU64,
    tracking_anomalies: AtomicU64,
    segments_dropped: AtomicU64,
    instruments_evicted: AtomicU64,
    predictions: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl PulseLedger {
    pub fn new() -> Self {
        Self {
            records_ingested: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            pulses: AtomicU64::new(0),
            sweeps: AtomicU64::new(0),
            windows_emitted: AtomicU64::new(0),
            gap_jumps: AtomicU64::new(0),
            tracking_anomalies: AtomicU64::new(0),
            segments_dropped: AtomicU64::new(0),
            instruments_evicted: AtomicU64::new(0),
            predictions: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a ledger backed by a JSON file, loading previous totals.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut ledger = Self::new();
        ledger.persist_path = Some(path);

        if let Err(e) = ledger.load() {
            tracing::warn!("Could not load previous ledger: {}", e);
        }

        ledger
    }

    /// Fold one pulse report into the totals.
    pub fn record_pulse(&self, report: &PulseReport) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
        self.records_ingested
            .fetch_add(report.ingested as u64, Ordering::Relaxed);
        self.records_rejected
            .fetch_add(report.rejected as u64, Ordering::Relaxed);
        self.sweeps
            .fetch_add(u64::from(report.sweeps), Ordering::Relaxed);
        self.windows_emitted
            .fetch_add(report.emitted as u64, Ordering::Relaxed);
        self.gap_jumps
            .fetch_add(report.gap_jumps as u64, Ordering::Relaxed);
        self.tracking_anomalies
            .fetch_add(report.anomalies.len() as u64, Ordering::Relaxed);
        self.segments_dropped
            .fetch_add(report.eviction.dropped.len() as u64, Ordering::Relaxed);
        self.instruments_evicted
            .fetch_add(report.eviction.removed.len() as u64, Ordering::Relaxed);
    }

    /// Record a halted pulse (diagnostic mode).
    pub fn record_halt(&self) {
        self.tracking_anomalies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_predictions(&self, count: u64) {
        self.predictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            windows_emitted: self.windows_emitted.load(Ordering::Relaxed),
            gap_jumps: self.gap_jumps.load(Ordering::Relaxed),
            tracking_anomalies: self.tracking_anomalies.load(Ordering::Relaxed),
            segments_dropped: self.segments_dropped.load(Ordering::Relaxed),
            instruments_evicted: self.instruments_evicted.load(Ordering::Relaxed),
            predictions: self.predictions.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pulse Ledger:\n\
             - Records ingested: {}\n\
             - Records rejected: {}\n\
             - Pulses: {} ({} sweeps)\n\
             - Windows emitted: {}\n\
             - Gap jumps: {}\n\
             - Tracking anomalies: {}\n\
             - Stale segments dropped: {}\n\
             - Instruments evicted: {}\n\
             - Predictions: {}\n\
             - Session duration: {} seconds",
            stats.records_ingested,
            stats.records_rejected,
            stats.pulses,
            stats.sweeps,
            stats.windows_emitted,
            stats.gap_jumps,
            stats.tracking_anomalies,
            stats.segments_dropped,
            stats.instruments_evicted,
            stats.predictions,
            stats.session_duration_secs
        )
    }

    /// Save totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedLedger {
                records_ingested: stats.records_ingested,
                records_rejected: stats.records_rejected,
                pulses: stats.pulses,
                sweeps: stats.sweeps,
                windows_emitted: stats.windows_emitted,
                gap_jumps: stats.gap_jumps,
                tracking_anomalies: stats.tracking_anomalies,
                segments_dropped: stats.segments_dropped,
                instruments_evicted: stats.instruments_evicted,
                predictions: stats.predictions,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedLedger =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.records_ingested
                    .store(persisted.records_ingested, Ordering::Relaxed);
                self.records_rejected
                    .store(persisted.records_rejected, Ordering::Relaxed);
                self.pulses.store(persisted.pulses, Ordering::Relaxed);
                self.sweeps.store(persisted.sweeps, Ordering::Relaxed);
                self.windows_emitted
                    .store(persisted.windows_emitted, Ordering::Relaxed);
                self.gap_jumps.store(persisted.gap_jumps, Ordering::Relaxed);
                self.tracking_anomalies
                    .store(persisted.tracking_anomalies, Ordering::Relaxed);
                self.segments_dropped
                    .store(persisted.segments_dropped, Ordering::Relaxed);
                self.instruments_evicted
                    .store(persisted.instruments_evicted, Ordering::Relaxed);
                self.predictions
                    .store(persisted.predictions, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.records_ingested,
            &self.records_rejected,
            &self.pulses,
            &self.sweeps,
            &self.windows_emitted,
            &self.gap_jumps,
            &self.tracking_anomalies,
            &self.segments_dropped,
            &self.instruments_evicted,
            &self.predictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for PulseLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of ledger counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub records_ingested: u64,
    pub records_rejected: u64,
    pub pulses: u64,
    pub sweeps: u64,
    pub windows_emitted: u64,
    pub gap_jumps: u64,
    pub tracking_anomalies: u64,
    pub segments_dropped: u64,
    pub instruments_evicted: u64,
    pub predictions: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLedger {
    records_ingested: u64,
    records_rejected: u64,
    pulses: u64,
    sweeps: u64,
    windows_emitted: u64,
    gap_jumps: u64,
    tracking_anomalies: u64,
    segments_dropped: u64,
    instruments_evicted: u64,
    #[serde(default)]
    predictions: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared ledger.
pub type SharedPulseLedger = Arc<PulseLedger>;

pub fn create_shared_ledger() -> SharedPulseLedger {
    Arc::new(PulseLedger::new())
}

pub fn create_shared_ledger_with_persistence(path: PathBuf) -> SharedPulseLedger {
    Arc::new(PulseLedger::with_persistence(path))
}
