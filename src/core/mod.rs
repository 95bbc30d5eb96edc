//! Core windowing engine.
//!
//! This module contains:
//! - Per-channel sample buffers and the instrument-keyed store with staleness eviction
//! - The per-instrument window tracker state machine
//! - Completeness scoring and window assembly with missing-channel fill rules
//! - The pulse scheduler that drives bounded sweeps

pub mod assembler;
pub mod branch;
pub mod buffer;
pub mod completeness;
pub mod error;
pub mod scheduler;
pub mod store;
pub mod tracker;
pub mod window;

// Re-export commonly used types
pub use assembler::{FillRule, WindowAssembler, WindowRequest};
pub use branch::{ChannelRole, InstrumentBranch, RoleAliases};
pub use buffer::{AppendOutcome, SampleBuffer};
pub use completeness::{taper_weights, CompletenessEvaluator, TaperShape};
pub use error::WindowingError;
pub use scheduler::{PulseReport, PulseScheduler, WindowerSettings};
pub use store::{DroppedSegment, EvictionReport, TieredBufferStore};
pub use tracker::{GapPolicy, Readiness, TrackerState, WindowTracker};
pub use window::{ChannelSource, ChannelTrace, Window};
