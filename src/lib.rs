//! Pulse Windower - pulse-driven multi-channel telemetry windowing.
//!
//! This library buffers streams of timestamped samples from many
//! multi-channel instruments and cuts them into fixed-length, overlapping
//! windows for batched inference.
//!
//! # Guarantees
//!
//! - **Fixed shape**: every window has the configured sample count and rate
//! - **Aligned indices**: per-instrument window indices only move forward,
//!   by whole advances
//! - **Bounded work**: each pulse runs a capped number of sweeps
//! - **Bounded memory**: buffers are capped in span and stale instruments
//!   decay and are evicted
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Pulse Windower                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │   Ingest    │──▶│   Buffer    │──▶│   Pulse     │        │
//! │  │  (replay)   │   │   Store     │   │  Scheduler  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │                           │            │         │           │
//! │                    staleness      Tracker   Assembler        │
//! │                    eviction      (readiness) (fill rules)    │
//! │                           │                      │           │
//! │                           ▼                      ▼           │
//! │                    ┌─────────────┐       ┌─────────────┐    │
//! │                    │   Pulse     │       │  Inference  │    │
//! │                    │   Ledger    │       │  Batching   │    │
//! │                    └─────────────┘       └─────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use pulse_windower::core::{PulseScheduler, WindowerSettings};
//!
//! let settings = WindowerSettings {
//!     sample_rate: 10.0,
//!     sample_count: 100,
//!     advance_seconds: 5.0,
//!     edge_taper_seconds: 0.5,
//!     max_span_seconds: 60.0,
//!     ..WindowerSettings::default()
//! };
//! let mut scheduler = PulseScheduler::new(settings);
//!
//! let samples = vec![Some(0.0); 100];
//! scheduler.ingest("UW.GNW..HH", "HHZ", 0.0, 10.0, &samples).unwrap();
//!
//! let report = scheduler.pulse().unwrap();
//! assert_eq!(report.emitted, 1);
//! assert_eq!(scheduler.take_windows()[0].channels.len(), 3);
//! ```

pub mod config;
pub mod core;
pub mod inference;
pub mod ingest;
pub mod ledger;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    ChannelRole, FillRule, PulseReport, PulseScheduler, Window, WindowerSettings, WindowingError,
};
pub use inference::{BatchDispatcher, InferenceEngine, InferenceError, PredictionTrace};
pub use ingest::{IngestError, IngestRecord, ReplaySource};
pub use ledger::{LedgerStats, PulseLedger, SharedPulseLedger};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
