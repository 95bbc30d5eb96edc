//! Batching of queued windows for an inference engine.
//!
//! Windows are drained in FIFO order, stacked into a `[window][channel][sample]`
//! tensor, run through the engine once, and split back into one
//! [`PredictionTrace`] per window and output label.

use crate::core::Window;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Window provenance carried alongside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowMeta {
    pub instrument_id: String,
    pub window_index: u64,
    pub start_time: f64,
    pub sample_rate: f64,
    pub sample_count: usize,
}

impl From<&Window> for WindowMeta {
    fn from(window: &Window) -> Self {
        Self {
            instrument_id: window.instrument_id.clone(),
            window_index: window.window_index,
            start_time: window.start_time,
            sample_rate: window.sample_rate,
            sample_count: window.sample_count,
        }
    }
}

/// Stacked input for one engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowBatch {
    pub meta: Vec<WindowMeta>,
    /// `[window][channel][sample]`
    pub data: Vec<Vec<Vec<f32>>>,
    /// Per-window collapsed fold.
    pub fold: Vec<Vec<f64>>,
    pub channel_count: usize,
    pub sample_count: usize,
}

impl WindowBatch {
    /// Stack windows that share one shape.
    pub fn from_windows(windows: &[Window]) -> Result<Self, InferenceError> {
        let (channel_count, sample_count) = match windows.first() {
            Some(w) => (w.channels.len(), w.sample_count),
            None => (0, 0),
        };

        let mut batch = Self {
            meta: Vec::with_capacity(windows.len()),
            data: Vec::with_capacity(windows.len()),
            fold: Vec::with_capacity(windows.len()),
            channel_count,
            sample_count,
        };

        for window in windows {
            if window.channels.len() != channel_count
                || window.channels.iter().any(|c| c.data.len() != sample_count)
            {
                return Err(InferenceError::ShapeMismatch(format!(
                    "window {} of {} does not match [{} x {}]",
                    window.window_index, window.instrument_id, channel_count, sample_count
                )));
            }
            batch.meta.push(WindowMeta::from(window));
            batch.data.push(
                window
                    .channels
                    .iter()
                    .map(|c| c.data.iter().map(|v| *v as f32).collect())
                    .collect(),
            );
            batch.fold.push(window.collapsed_fold());
        }
        Ok(batch)
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }
}

/// Something that turns a batch of windows into labelled output traces.
pub trait InferenceEngine {
    /// Engine name, recorded on every prediction.
    fn name(&self) -> &str;

    /// Output labels, in the order `predict` returns them.
    fn labels(&self) -> &[String];

    /// Predict `[window][label][sample]` for a batch.
    fn predict(&mut self, batch: &WindowBatch) -> Result<Vec<Vec<Vec<f32>>>, InferenceError>;
}

/// One label's output for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionTrace {
    pub instrument_id: String,
    pub window_index: u64,
    pub start_time: f64,
    pub sample_rate: f64,
    pub engine: String,
    pub label: String,
    pub values: Vec<f32>,
    /// Collapsed fold of the input window.
    pub fold: Vec<f64>,
}

/// Drains the window queue into engine-sized batches.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    batch_size: usize,
}

impl BatchDispatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Run one batch from the front of `queue`.
    ///
    /// Windows are only removed from the queue when the engine succeeds.
    pub fn pulse(
        &self,
        queue: &mut VecDeque<Window>,
        engine: &mut dyn InferenceEngine,
    ) -> Result<Vec<PredictionTrace>, InferenceError> {
        let take = self.batch_size.min(queue.len());
        if take == 0 {
            return Ok(Vec::new());
        }

        let windows: Vec<Window> = queue.iter().take(take).cloned().collect();
        let batch = WindowBatch::from_windows(&windows)?;
        let output = engine.predict(&batch)?;
        let labels = engine.labels().to_vec();
        check_output_shape(&batch, &output, labels.len())?;

        queue.drain(..take);

        let mut traces = Vec::with_capacity(take * labels.len());
        for ((meta, fold), per_label) in batch.meta.iter().zip(&batch.fold).zip(output) {
            for (label, values) in labels.iter().zip(per_label) {
                traces.push(PredictionTrace {
                    instrument_id: meta.instrument_id.clone(),
                    window_index: meta.window_index,
                    start_time: meta.start_time,
                    sample_rate: meta.sample_rate,
                    engine: engine.name().to_string(),
                    label: label.clone(),
                    values,
                    fold: fold.clone(),
                });
            }
        }
        Ok(traces)
    }
}

fn check_output_shape(
    batch: &WindowBatch,
    output: &[Vec<Vec<f32>>],
    label_count: usize,
) -> Result<(), InferenceError> {
    if output.len() != batch.len() {
        return Err(InferenceError::ShapeMismatch(format!(
            "expected {} windows, got {}",
            batch.len(),
            output.len()
        )));
    }
    for per_label in output {
        if per_label.len() != label_count {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected {} labels, got {}",
                label_count,
                per_label.len()
            )));
        }
        if let Some(bad) = per_label.iter().find(|v| v.len() != batch.sample_count) {
            return Err(InferenceError::ShapeMismatch(format!(
                "expected {} samples, got {}",
                batch.sample_count,
                bad.len()
            )));
        }
    }
    Ok(())
}

/// Errors from the inference side.
#[derive(Debug)]
pub enum InferenceError {
    ShapeMismatch(String),
    Engine(String),
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::ShapeMismatch(e) => write!(f, "Shape mismatch: {e}"),
            InferenceError::Engine(e) => write!(f, "Engine error: {e}"),
        }
    }
}

impl std::error::Error for InferenceError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChannelRole, ChannelSource, ChannelTrace};

    struct MeanEngine {
        labels: Vec<String>,
        truncate: bool,
    }

    impl InferenceEngine for MeanEngine {
        fn name(&self) -> &str {
            "mean"
        }

        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict(&mut self, batch: &WindowBatch) -> Result<Vec<Vec<Vec<f32>>>, InferenceError> {
            Ok(batch
                .data
                .iter()
                .map(|channels| {
                    let n = if self.truncate { 1 } else { batch.sample_count };
                    let mean: Vec<f32> = (0..n)
                        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / channels.len() as f32)
                        .collect();
                    vec![mean; self.labels.len()]
                })
                .collect())
        }
    }

    fn window(index: u64, value: f64) -> Window {
        let trace = |role| ChannelTrace {
            role,
            source: ChannelSource::Observed,
            data: vec![value; 4],
            valid: vec![true; 4],
            fold: 1.0,
            margin_before: Vec::new(),
            margin_after: Vec::new(),
        };
        Window {
            instrument_id: "A".into(),
            window_index: index,
            start_time: index as f64,
            sample_rate: 1.0,
            sample_count: 4,
            channels: vec![trace(ChannelRole::Vertical), trace(ChannelRole::Horizontal1)],
        }
    }

    fn engine(truncate: bool) -> MeanEngine {
        MeanEngine {
            labels: vec!["P".to_string(), "S".to_string()],
            truncate,
        }
    }

    #[test]
    fn test_dispatch_takes_fifo_batch() {
        let mut queue: VecDeque<Window> = (0..5).map(|i| window(i, i as f64)).collect();
        let dispatcher = BatchDispatcher::new(2);

        let traces = dispatcher.pulse(&mut queue, &mut engine(false)).unwrap();
        assert_eq!(traces.len(), 4);
        assert_eq!(traces[0].window_index, 0);
        assert_eq!(traces[0].label, "P");
        assert_eq!(traces[3].window_index, 1);
        assert_eq!(traces[3].values, vec![1.0; 4]);
        assert_eq!(traces[0].fold, vec![2.0; 4]);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.front().map(|w| w.window_index), Some(2));
    }

    #[test]
    fn test_bad_output_keeps_queue() {
        let mut queue: VecDeque<Window> = (0..2).map(|i| window(i, 0.0)).collect();
        let err = BatchDispatcher::new(8)
            .pulse(&mut queue, &mut engine(true))
            .unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch(_)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_mixed_shapes_are_rejected() {
        let mut short = window(1, 0.0);
        short.channels.pop();
        let err = WindowBatch::from_windows(&[window(0, 0.0), short]).unwrap_err();
        assert!(matches!(err, InferenceError::ShapeMismatch(_)));
    }

    #[test]
    fn test_empty_queue_is_a_no_op() {
        let mut queue = VecDeque::new();
        let traces = BatchDispatcher::new(4).pulse(&mut queue, &mut engine(false)).unwrap();
        assert!(traces.is_empty());
    }
}
