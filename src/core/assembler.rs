//! Turns a buffered instrument branch into a fixed-shape [`Window`].
//!
//! The vertical channel gates everything: if it is not complete enough the
//! attempt yields nothing and the caller retries on a later pulse.
//! Horizontals that are missing or too gappy are replaced according to the
//! configured [`FillRule`].

use crate::core::branch::{ChannelRole, InstrumentBranch};
use crate::core::buffer::SampleBuffer;
use crate::core::completeness::CompletenessEvaluator;
use crate::core::window::{ChannelSource, ChannelTrace, Window};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How to populate a horizontal slot that has no usable data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillRule {
    /// Zero-filled trace of matching shape.
    Zeros,
    /// Copy of the vertical trace.
    CloneVertical,
    /// Copy of the one valid horizontal, or of the vertical if neither is valid.
    CloneHorizontal,
}

impl FillRule {
    /// Parse a rule name. Accepts the short legacy spellings as well.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "zeros" => Some(FillRule::Zeros),
            "clone-vertical" | "clone_vertical" | "clonez" => Some(FillRule::CloneVertical),
            "clone-horizontal" | "clone_horizontal" | "clonehz" => Some(FillRule::CloneHorizontal),
            _ => None,
        }
    }
}

impl fmt::Display for FillRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillRule::Zeros => write!(f, "zeros"),
            FillRule::CloneVertical => write!(f, "clone-vertical"),
            FillRule::CloneHorizontal => write!(f, "clone-horizontal"),
        }
    }
}

/// Identity of the window being attempted.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest<'a> {
    pub instrument_id: &'a str,
    pub window_index: u64,
    pub window_start: f64,
}

/// Applies completeness thresholds and fill rules to build windows.
#[derive(Debug, Clone)]
pub struct WindowAssembler {
    pub sample_rate: f64,
    pub sample_count: usize,
    pub evaluator: CompletenessEvaluator,
    pub vertical_threshold: f64,
    pub horizontal_threshold: f64,
    pub fill_rule: FillRule,
    /// Value written into masked gaps.
    pub fill_value: f64,
    /// Symmetric padding around the window, in seconds.
    pub padding_seconds: f64,
    /// Roles to emit, in output order. Must include the vertical.
    pub channel_order: Vec<ChannelRole>,
}

impl WindowAssembler {
    /// Length of one window in seconds.
    pub fn window_seconds(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate
    }

    fn padding_samples(&self) -> usize {
        (self.padding_seconds * self.sample_rate).round().max(0.0) as usize
    }

    /// Attempt to build a window starting at `request.window_start`.
    ///
    /// Returns `None` when the vertical channel is absent or below its
    /// completeness threshold. That is the normal "not ready yet" outcome.
    pub fn assemble(
        &self,
        branch: &InstrumentBranch,
        request: &WindowRequest<'_>,
    ) -> Option<Window> {
        let start = request.window_start;
        let end = start + self.window_seconds();

        let vertical = branch.vertical()?;
        let vertical_score = self.evaluator.score(vertical, start, end);
        if vertical_score < self.vertical_threshold {
            return None;
        }

        let mut traces: BTreeMap<ChannelRole, ChannelTrace> = BTreeMap::new();
        traces.insert(ChannelRole::Vertical, self.trim(ChannelRole::Vertical, vertical, start));

        for role in [ChannelRole::Horizontal1, ChannelRole::Horizontal2] {
            if !self.channel_order.contains(&role) {
                continue;
            }
            if let Some(buffer) = branch.buffer(role) {
                if self.evaluator.score(buffer, start, end) >= self.horizontal_threshold {
                    traces.insert(role, self.trim(role, buffer, start));
                }
            }
        }

        self.fill_missing(&mut traces);

        let channels = self
            .channel_order
            .iter()
            .filter_map(|role| traces.remove(role))
            .collect();

        Some(Window {
            instrument_id: request.instrument_id.to_string(),
            window_index: request.window_index,
            start_time: start,
            sample_rate: self.sample_rate,
            sample_count: self.sample_count,
            channels,
        })
    }

    /// Fill every expected horizontal slot that has no observed trace.
    fn fill_missing(&self, traces: &mut BTreeMap<ChannelRole, ChannelTrace>) {
        let missing: Vec<ChannelRole> = self
            .channel_order
            .iter()
            .copied()
            .filter(|role| role.is_horizontal() && !traces.contains_key(role))
            .collect();

        for role in missing {
            let donor = match self.fill_rule {
                FillRule::Zeros => None,
                FillRule::CloneVertical => Some(ChannelRole::Vertical),
                FillRule::CloneHorizontal => match role.sibling() {
                    Some(sibling) if Self::is_observed(traces, sibling) => Some(sibling),
                    _ => Some(ChannelRole::Vertical),
                },
            };

            let filled = match donor.and_then(|d| traces.get(&d).map(|t| (d, t))) {
                Some((donor_role, donor_trace)) => ChannelTrace {
                    role,
                    source: ChannelSource::Cloned(donor_role),
                    ..donor_trace.clone()
                },
                None => self.zeros(role),
            };
            traces.insert(role, filled);
        }
    }

    fn is_observed(traces: &BTreeMap<ChannelRole, ChannelTrace>, role: ChannelRole) -> bool {
        traces
            .get(&role)
            .map(|t| t.source == ChannelSource::Observed)
            .unwrap_or(false)
    }

    /// Cut `[start, start + window)` out of a buffer, replacing masked
    /// samples with the fill value.
    fn trim(&self, role: ChannelRole, buffer: &SampleBuffer, start: f64) -> ChannelTrace {
        let raw = buffer.sample_window(start, self.sample_count, self.sample_rate);
        let valid: Vec<bool> = raw.iter().map(Option::is_some).collect();
        let data: Vec<f64> = raw.iter().map(|s| s.unwrap_or(self.fill_value)).collect();
        let fold = if self.sample_count == 0 {
            0.0
        } else {
            valid.iter().filter(|v| **v).count() as f64 / self.sample_count as f64
        };

        let pad = self.padding_samples();
        let (margin_before, margin_after) = if pad == 0 {
            (Vec::new(), Vec::new())
        } else {
            let before_start = start - pad as f64 / self.sample_rate;
            let after_start = start + self.window_seconds();
            let fill = |s: Option<f64>| s.unwrap_or(self.fill_value);
            (
                buffer
                    .sample_window(before_start, pad, self.sample_rate)
                    .into_iter()
                    .map(fill)
                    .collect(),
                buffer
                    .sample_window(after_start, pad, self.sample_rate)
                    .into_iter()
                    .map(fill)
                    .collect(),
            )
        };

        ChannelTrace {
            role,
            source: ChannelSource::Observed,
            data,
            valid,
            fold,
            margin_before,
            margin_after,
        }
    }

    fn zeros(&self, role: ChannelRole) -> ChannelTrace {
        let pad = self.padding_samples();
        ChannelTrace {
            role,
            source: ChannelSource::ZeroFilled,
            data: vec![0.0; self.sample_count],
            valid: vec![false; self.sample_count],
            fold: 0.0,
            margin_before: vec![0.0; pad],
            margin_after: vec![0.0; pad],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::branch::RoleAliases;
    use crate::core::completeness::TaperShape;
    use crate::core::store::TieredBufferStore;

    const RATE: f64 = 10.0;

    fn assembler(fill_rule: FillRule) -> WindowAssembler {
        WindowAssembler {
            sample_rate: RATE,
            sample_count: 50,
            evaluator: CompletenessEvaluator::new(0.5, TaperShape::Cosine),
            vertical_threshold: 0.95,
            horizontal_threshold: 0.8,
            fill_rule,
            fill_value: 0.0,
            padding_seconds: 0.0,
            channel_order: ChannelRole::ALL.to_vec(),
        }
    }

    fn ramp(n: usize, offset: f64) -> Vec<Option<f64>> {
        (0..n).map(|i| Some(offset + i as f64)).collect()
    }

    fn store_with(codes: &[(&str, Vec<Option<f64>>)]) -> TieredBufferStore {
        let mut store = TieredBufferStore::new(RoleAliases::default(), 60.0, 10);
        for (code, samples) in codes {
            store.ingest("A", code, 0.0, RATE, samples).unwrap();
        }
        store
    }

    fn request() -> WindowRequest<'static> {
        WindowRequest {
            instrument_id: "A",
            window_index: 7,
            window_start: 0.0,
        }
    }

    #[test]
    fn test_insufficient_vertical_defers() {
        let store = store_with(&[("Z", ramp(30, 0.0))]);
        let window = assembler(FillRule::Zeros).assemble(store.branch("A").unwrap(), &request());
        assert!(window.is_none());
    }

    #[test]
    fn test_three_observed_channels() {
        let store = store_with(&[
            ("Z", ramp(50, 0.0)),
            ("N", ramp(50, 100.0)),
            ("E", ramp(50, 200.0)),
        ]);
        let window = assembler(FillRule::Zeros)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        assert_eq!(window.window_index, 7);
        assert_eq!(window.channels.len(), 3);
        assert_eq!(window.observed_channels(), 3);
        let east = window.channel(ChannelRole::Horizontal2).unwrap();
        assert_eq!(east.data[0], 200.0);
        assert_eq!(east.data.len(), 50);
        assert_eq!(east.fold, 1.0);
    }

    #[test]
    fn test_zeros_rule_fills_missing_horizontal() {
        let store = store_with(&[("Z", ramp(50, 0.0)), ("N", ramp(50, 100.0))]);
        let window = assembler(FillRule::Zeros)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        let east = window.channel(ChannelRole::Horizontal2).unwrap();
        assert_eq!(east.source, ChannelSource::ZeroFilled);
        assert!(east.data.iter().all(|v| *v == 0.0));
        assert_eq!(east.fold, 0.0);
        assert_eq!(
            window.channel(ChannelRole::Horizontal1).unwrap().source,
            ChannelSource::Observed
        );
    }

    #[test]
    fn test_clone_vertical_rule() {
        let store = store_with(&[("Z", ramp(50, 0.0))]);
        let window = assembler(FillRule::CloneVertical)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        let vertical = window.channel(ChannelRole::Vertical).unwrap();
        for role in [ChannelRole::Horizontal1, ChannelRole::Horizontal2] {
            let trace = window.channel(role).unwrap();
            assert_eq!(trace.source, ChannelSource::Cloned(ChannelRole::Vertical));
            assert_eq!(trace.data, vertical.data);
        }
        assert_eq!(window.collapsed_fold()[0], 1.0);
    }

    #[test]
    fn test_clone_horizontal_uses_valid_sibling() {
        let store = store_with(&[("Z", ramp(50, 0.0)), ("E", ramp(50, 200.0))]);
        let window = assembler(FillRule::CloneHorizontal)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        let north = window.channel(ChannelRole::Horizontal1).unwrap();
        assert_eq!(north.source, ChannelSource::Cloned(ChannelRole::Horizontal2));
        assert_eq!(north.data[0], 200.0);
    }

    #[test]
    fn test_clone_horizontal_falls_back_to_vertical() {
        let store = store_with(&[("Z", ramp(50, 0.0))]);
        let window = assembler(FillRule::CloneHorizontal)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        for role in [ChannelRole::Horizontal1, ChannelRole::Horizontal2] {
            assert_eq!(
                window.channel(role).unwrap().source,
                ChannelSource::Cloned(ChannelRole::Vertical)
            );
        }
    }

    #[test]
    fn test_gappy_horizontal_is_treated_as_absent() {
        let mut north = ramp(50, 100.0);
        for s in north.iter_mut().skip(10).take(30) {
            *s = None;
        }
        let store = store_with(&[("Z", ramp(50, 0.0)), ("N", north)]);
        let window = assembler(FillRule::Zeros)
            .assemble(store.branch("A").unwrap(), &request())
            .unwrap();

        assert_eq!(
            window.channel(ChannelRole::Horizontal1).unwrap().source,
            ChannelSource::ZeroFilled
        );
    }

    #[test]
    fn test_masked_samples_take_fill_value() {
        let mut vertical = ramp(50, 1.0);
        vertical[25] = None;
        let store = store_with(&[("Z", vertical)]);
        let mut asm = assembler(FillRule::Zeros);
        asm.fill_value = -1.0;
        let window = asm.assemble(store.branch("A").unwrap(), &request()).unwrap();

        let z = window.channel(ChannelRole::Vertical).unwrap();
        assert_eq!(z.data[25], -1.0);
        assert!(!z.valid[25]);
        assert!((z.fold - 49.0 / 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_padding_goes_to_margins() {
        let store = store_with(&[("Z", ramp(70, 0.0))]);
        let mut asm = assembler(FillRule::Zeros);
        asm.padding_seconds = 1.0;
        let window = asm.assemble(store.branch("A").unwrap(), &request()).unwrap();

        let z = window.channel(ChannelRole::Vertical).unwrap();
        assert_eq!(z.data.len(), 50);
        assert_eq!(z.margin_before, vec![0.0; 10]);
        assert_eq!(z.margin_after[0], 50.0);
        assert_eq!(z.margin_after.len(), 10);
    }

    #[test]
    fn test_channel_order_is_respected() {
        let store = store_with(&[("Z", ramp(50, 0.0))]);
        let mut asm = assembler(FillRule::Zeros);
        asm.channel_order = vec![
            ChannelRole::Horizontal2,
            ChannelRole::Horizontal1,
            ChannelRole::Vertical,
        ];
        let window = asm.assemble(store.branch("A").unwrap(), &request()).unwrap();
        let roles: Vec<ChannelRole> = window.channels.iter().map(|c| c.role).collect();
        assert_eq!(roles, asm.channel_order);
    }

    #[test]
    fn test_clone_vertical_is_deterministic() {
        let store = store_with(&[("Z", ramp(50, 0.25))]);
        let asm = assembler(FillRule::CloneVertical);
        let branch = store.branch("A").unwrap();
        let first = asm.assemble(branch, &request()).unwrap();
        let second = asm.assemble(branch, &request()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fill_rule_names() {
        assert_eq!(FillRule::from_name("CloneZ"), Some(FillRule::CloneVertical));
        assert_eq!(FillRule::from_name("clone-horizontal"), Some(FillRule::CloneHorizontal));
        assert_eq!(FillRule::from_name("interpolate"), None);
        assert_eq!(FillRule::CloneVertical.to_string(), "clone-vertical");
    }
}
