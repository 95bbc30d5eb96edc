//! Short-term over long-term average energy ratio.
//!
//! A dependency-free engine for the batch dispatcher. Channel energies are
//! summed per sample, so every window gets a single `sta_lta` trace.

use crate::inference::batch::{InferenceEngine, InferenceError, WindowBatch};

/// Classic STA/LTA trigger function.
#[derive(Debug, Clone)]
pub struct StaLtaEngine {
    sta_seconds: f64,
    lta_seconds: f64,
    labels: Vec<String>,
}

impl StaLtaEngine {
    pub fn new(sta_seconds: f64, lta_seconds: f64) -> Result<Self, InferenceError> {
        if !(sta_seconds > 0.0 && lta_seconds > sta_seconds) {
            return Err(InferenceError::Engine(format!(
                "STA ({sta_seconds}s) must be positive and shorter than LTA ({lta_seconds}s)"
            )));
        }
        Ok(Self {
            sta_seconds,
            lta_seconds,
            labels: vec!["sta_lta".to_string()],
        })
    }
}

impl Default for StaLtaEngine {
    fn default() -> Self {
        Self {
            sta_seconds: 1.0,
            lta_seconds: 10.0,
            labels: vec!["sta_lta".to_string()],
        }
    }
}

impl InferenceEngine for StaLtaEngine {
    fn name(&self) -> &str {
        "sta-lta"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&mut self, batch: &WindowBatch) -> Result<Vec<Vec<Vec<f32>>>, InferenceError> {
        batch
            .meta
            .iter()
            .zip(&batch.data)
            .map(|(meta, channels)| {
                let nsta = ((self.sta_seconds * meta.sample_rate).round() as usize).max(1);
                let nlta = ((self.lta_seconds * meta.sample_rate).round() as usize).max(nsta + 1);
                let energy: Vec<f64> = (0..batch.sample_count)
                    .map(|i| {
                        channels
                            .iter()
                            .map(|c| {
                                let v = f64::from(c[i]);
                                v * v
                            })
                            .sum()
                    })
                    .collect();
                Ok(vec![classic_sta_lta(&energy, nsta, nlta)])
            })
            .collect()
    }
}

/// Ratio of trailing `nsta`-sample to trailing `nlta`-sample mean energy.
/// Zero until a full long-term window is available.
pub fn classic_sta_lta(energy: &[f64], nsta: usize, nlta: usize) -> Vec<f32> {
    let mut cumulative = Vec::with_capacity(energy.len() + 1);
    cumulative.push(0.0);
    for e in energy {
        let last = cumulative[cumulative.len() - 1];
        cumulative.push(last + e);
    }

    (0..energy.len())
        .map(|i| {
            let end = i + 1;
            if end < nlta || nsta == 0 {
                return 0.0;
            }
            let sta = (cumulative[end] - cumulative[end - nsta]) / nsta as f64;
            let lta = (cumulative[end] - cumulative[end - nlta]) / nlta as f64;
            if lta > 0.0 {
                (sta / lta) as f32
            } else {
                0.0
            }
        })
        .collect()
}
