//! Tapered valid-data fraction for a candidate window.
//!
//! Each sample in `[window_start, window_end)` gets validity 1.0 when the
//! buffer holds a value for it and 0.0 otherwise. The first and last
//! `edge_taper_seconds` are down-weighted, so gaps at the window edges
//! count for less than gaps in the middle.

use crate::core::buffer::SampleBuffer;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Shape of the edge down-weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaperShape {
    /// Half-cosine ramp from 0 to 1 across the taper zone.
    Cosine,
    /// Zero weight inside the taper zone.
    Step,
}

impl TaperShape {
    /// Parse a taper name, accepting the usual aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cosine" | "cos" | "tukey" => Some(TaperShape::Cosine),
            "step" | "heaviside" | "h" => Some(TaperShape::Step),
            _ => None,
        }
    }
}

impl fmt::Display for TaperShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaperShape::Cosine => write!(f, "cosine"),
            TaperShape::Step => write!(f, "step"),
        }
    }
}

/// Scores how complete a buffer is over a candidate window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletenessEvaluator {
    pub edge_taper_seconds: f64,
    pub taper_shape: TaperShape,
}

impl CompletenessEvaluator {
    pub fn new(edge_taper_seconds: f64, taper_shape: TaperShape) -> Self {
        Self {
            edge_taper_seconds,
            taper_shape,
        }
    }

    /// Weighted valid fraction of `buffer` over `[window_start, window_end)`,
    /// in `[0, 1]`.
    pub fn score(&self, buffer: &SampleBuffer, window_start: f64, window_end: f64) -> f64 {
        let rate = buffer.sample_rate();
        let count = ((window_end - window_start) * rate).round().max(0.0) as usize;
        if count == 0 || buffer.is_empty() {
            return 0.0;
        }

        let validity: Vec<f64> = buffer
            .sample_window(window_start, count, rate)
            .iter()
            .map(|s| if s.is_some() { 1.0 } else { 0.0 })
            .collect();
        let taper_samples = (self.edge_taper_seconds * rate).round().max(0.0) as usize;
        let weights = taper_weights(count, taper_samples, self.taper_shape);

        weighted_fraction(&validity, &weights)
    }
}

/// Weight vector of length `count` with `taper_samples` tapered on each end.
pub fn taper_weights(count: usize, taper_samples: usize, shape: TaperShape) -> Vec<f64> {
    let taper = taper_samples.min(count / 2);
    (0..count)
        .map(|i| {
            let from_edge = i.min(count - 1 - i);
            if from_edge >= taper {
                return 1.0;
            }
            match shape {
                TaperShape::Cosine => 0.5 * (1.0 - (PI * from_edge as f64 / taper as f64).cos()),
                TaperShape::Step => 0.0,
            }
        })
        .collect()
}

/// Weighted mean of `validity`. Falls back to the plain mean when the
/// weights sum to zero.
fn weighted_fraction(validity: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= f64::EPSILON {
        return validity.iter().sum::<f64>() / validity.len() as f64;
    }
    let valid: f64 = validity.iter().zip(weights).map(|(v, w)| v * w).sum();
    (valid / total).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(samples: &[Option<f64>]) -> SampleBuffer {
        let mut buf = SampleBuffer::new(100.0, 600.0);
        buf.append(0.0, samples);
        buf
    }

    fn full(n: usize) -> Vec<Option<f64>> {
        vec![Some(0.5); n]
    }

    #[test]
    fn test_complete_window_scores_one() {
        let buf = buffer_with(&full(1000));
        let eval = CompletenessEvaluator::new(1.0, TaperShape::Cosine);
        assert!((eval.score(&buf, 0.0, 10.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_tail_lowers_score() {
        let buf = buffer_with(&full(500));
        let eval = CompletenessEvaluator::new(0.0, TaperShape::Cosine);
        let score = eval.score(&buf, 0.0, 10.0);
        assert!((score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_edge_gap_costs_less_than_middle_gap() {
        let mut edge = full(1000);
        let mut middle = full(1000);
        for i in 0..50 {
            edge[i] = None;
            middle[475 + i] = None;
        }
        // Keep the first sample so both buffers start at t=0.
        edge[0] = Some(0.5);

        let eval = CompletenessEvaluator::new(1.0, TaperShape::Cosine);
        let edge_score = eval.score(&buffer_with(&edge), 0.0, 10.0);
        let middle_score = eval.score(&buffer_with(&middle), 0.0, 10.0);
        assert!(edge_score > middle_score);
    }

    #[test]
    fn test_step_taper_ignores_edge_zone() {
        let mut samples = full(1000);
        for s in samples.iter_mut().skip(1).take(99) {
            *s = None;
        }
        let eval = CompletenessEvaluator::new(1.0, TaperShape::Step);
        let score = eval.score(&buffer_with(&samples), 0.0, 10.0);
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_more_missing_edge_samples_never_raise_score() {
        let eval = CompletenessEvaluator::new(1.0, TaperShape::Cosine);
        let mut samples = full(1000);
        let mut previous = eval.score(&buffer_with(&samples), 0.0, 10.0);
        for k in (900..999).rev() {
            samples[k] = None;
            let score = eval.score(&buffer_with(&samples), 0.0, 10.0);
            assert!(score <= previous + 1e-12, "score rose at sample {k}");
            previous = score;
        }
    }

    #[test]
    fn test_taper_weights_shape() {
        let w = taper_weights(10, 3, TaperShape::Cosine);
        assert_eq!(w.len(), 10);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[9], 0.0);
        assert!(w[1] > 0.0 && w[1] < w[2]);
        assert_eq!(w[5], 1.0);

        let s = taper_weights(10, 3, TaperShape::Step);
        assert_eq!(&s[..4], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_taper_aliases() {
        assert_eq!(TaperShape::from_name("Tukey"), Some(TaperShape::Cosine));
        assert_eq!(TaperShape::from_name("h"), Some(TaperShape::Step));
        assert_eq!(TaperShape::from_name("hann"), None);
    }

    #[test]
    fn test_empty_buffer_scores_zero() {
        let buf = SampleBuffer::new(100.0, 60.0);
        let eval = CompletenessEvaluator::new(0.5, TaperShape::Cosine);
        assert_eq!(eval.score(&buf, 0.0, 10.0), 0.0);
    }
}
