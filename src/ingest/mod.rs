//! Record ingestion for the pulse windower.
//!
//! This module defines the record type handed to the scheduler and a
//! file replay source that feeds records through a bounded channel.

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{ReplayConfig, ReplaySource};
pub use types::{IngestError, IngestRecord};
