//! Consumer side of the window queue.
//!
//! Windows leave the scheduler through a FIFO queue. The dispatcher stacks
//! them into batches for an [`InferenceEngine`] and reattaches provenance
//! and fold to each output trace.

pub mod batch;
pub mod sta_lta;

pub use batch::{
    BatchDispatcher, InferenceEngine, InferenceError, PredictionTrace, WindowBatch, WindowMeta,
};
pub use sta_lta::{classic_sta_lta, StaLtaEngine};
