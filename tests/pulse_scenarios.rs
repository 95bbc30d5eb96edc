//! End-to-end pulse scenarios against the public API.

use pulse_windower::config::Config;
use pulse_windower::core::{
    ChannelRole, ChannelSource, CompletenessEvaluator, FillRule, PulseScheduler, SampleBuffer,
    TaperShape, TrackerState, Window, WindowerSettings,
};
use pulse_windower::ingest::IngestRecord;

const RATE: f64 = 100.0;
const T0: f64 = 1_700_000_000.0;

/// 10 s windows advancing by 5 s at 100 Hz.
fn settings(fill_rule: FillRule) -> WindowerSettings {
    WindowerSettings {
        sample_rate: RATE,
        sample_count: 1000,
        advance_seconds: 5.0,
        vertical_threshold: 0.95,
        horizontal_threshold: 0.8,
        fill_rule,
        edge_taper_seconds: 1.0,
        max_span_seconds: 10.0,
        max_staleness_pulses: 3,
        max_sweeps_per_pulse: 20,
        ..WindowerSettings::default()
    }
}

fn wave(start: f64, seconds: f64) -> Vec<Option<f64>> {
    let n = (seconds * RATE).round() as usize;
    (0..n)
        .map(|i| Some((start + i as f64 / RATE).sin()))
        .collect()
}

fn feed(scheduler: &mut PulseScheduler, id: &str, code: &str, start: f64, seconds: f64) {
    scheduler
        .ingest(id, code, start, RATE, &wave(start, seconds))
        .unwrap();
}

#[test]
fn test_window_shape_matches_settings_for_every_fill_rule() {
    for rule in [FillRule::Zeros, FillRule::CloneVertical, FillRule::CloneHorizontal] {
        let mut scheduler = PulseScheduler::new(settings(rule));
        feed(&mut scheduler, "THREE", "HHZ", T0, 10.0);
        feed(&mut scheduler, "THREE", "HHN", T0, 10.0);
        feed(&mut scheduler, "THREE", "HHE", T0, 10.0);
        feed(&mut scheduler, "ONE", "EHZ", T0, 10.0);
        feed(&mut scheduler, "TWO", "BHZ", T0, 10.0);
        feed(&mut scheduler, "TWO", "BH1", T0, 10.0);

        let report = scheduler.pulse().unwrap();
        assert_eq!(report.emitted, 3, "rule {rule}");

        for window in scheduler.take_windows() {
            assert_eq!(window.sample_count, 1000);
            assert_eq!(window.sample_rate, RATE);
            assert_eq!(window.channels.len(), 3);
            for channel in &window.channels {
                assert_eq!(channel.data.len(), 1000);
                assert_eq!(channel.valid.len(), 1000);
            }
            let vertical = window.channel(ChannelRole::Vertical).unwrap();
            assert_eq!(vertical.source, ChannelSource::Observed);
        }
    }
}

#[test]
fn test_window_indices_strictly_increase() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    let mut indices = Vec::new();

    for k in 0..12 {
        feed(&mut scheduler, "A", "Z", T0 + k as f64 * 2.5, 2.5);
        scheduler.pulse().unwrap();
        indices.extend(scheduler.take_windows().iter().map(|w| w.window_index));
    }

    assert!(!indices.is_empty());
    assert_eq!(indices[0], 0);
    for pair in indices.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
}

#[test]
fn test_second_window_defers_until_data_arrives() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    feed(&mut scheduler, "A", "Z", T0, 10.0);

    let report = scheduler.pulse().unwrap();
    assert_eq!(report.emitted, 1);
    let first = scheduler.take_windows().remove(0);
    assert_eq!(first.start_time, T0);
    assert_eq!(first.window_index, 0);

    // The attempt at t0+5 needs data through t0+15.
    let report = scheduler.pulse().unwrap();
    assert_eq!(report.emitted, 0);
    assert_eq!(scheduler.tracker().next_window_index("A"), Some(1));
    assert_eq!(scheduler.tracker().next_start_time("A"), Some(T0 + 5.0));

    feed(&mut scheduler, "A", "Z", T0 + 10.0, 5.0);
    scheduler.pulse().unwrap();
    let second = scheduler.take_windows().remove(0);
    assert_eq!(second.window_index, 1);
    assert!((second.start_time - (T0 + 5.0)).abs() < 1e-9);
}

#[test]
fn test_empty_instrument_removed_after_max_staleness() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    // A fully masked record registers the instrument with empty buffers.
    let _ = scheduler.ingest("A", "Z", T0, RATE, &vec![None; 50]);

    scheduler.pulse().unwrap();
    scheduler.pulse().unwrap();
    assert!(scheduler.store().contains("A"));
    let report = scheduler.pulse().unwrap();
    assert_eq!(report.eviction.removed, vec!["A".to_string()]);
    assert!(!scheduler.store().contains("A"));
}

#[test]
fn test_touch_restarts_staleness_count() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    feed(&mut scheduler, "A", "Z", T0, 1.0);
    scheduler.pulse().unwrap();
    scheduler.pulse().unwrap();
    scheduler.pulse().unwrap();
    assert_eq!(scheduler.store().staleness("A"), Some(2));

    feed(&mut scheduler, "A", "Z", T0 + 1.0, 1.0);
    scheduler.pulse().unwrap();
    assert_eq!(scheduler.store().staleness("A"), Some(0));

    scheduler.pulse().unwrap();
    scheduler.pulse().unwrap();
    // Staleness reaches the ceiling: the one contiguous segment drops first.
    let report = scheduler.pulse().unwrap();
    assert_eq!(report.eviction.dropped.len(), 1);
    assert!(scheduler.store().contains("A"));
    let report = scheduler.pulse().unwrap();
    assert_eq!(report.eviction.removed, vec!["A".to_string()]);
}

#[test]
fn test_record_at_foreign_rate_never_reaches_a_window() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    let ramp: Vec<Option<f64>> = (0..400).map(|i| Some(i as f64)).collect();
    assert!(scheduler.ingest("A", "Z", T0, 40.0, &ramp).is_err());
    feed(&mut scheduler, "B", "Z", T0, 10.0);

    let report = scheduler.pulse().unwrap();
    assert_eq!(report.rejected, 1);
    assert_eq!(report.emitted, 1);
    let windows = scheduler.take_windows();
    assert_eq!(windows[0].instrument_id, "B");
    assert!(!scheduler.store().contains("A"));
}

#[test]
fn test_silent_instrument_is_evicted_and_restarts_unseeded() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));

    for (offset, seconds) in [(0.0, 4.0), (4.0, 4.0), (8.0, 2.0)] {
        feed(&mut scheduler, "A", "Z", T0 + offset, seconds);
        scheduler.pulse().unwrap();
    }
    assert_eq!(scheduler.take_windows().len(), 1);
    assert_eq!(scheduler.tracker().state("A"), TrackerState::Advancing);

    // One contiguous segment: dropped at the ceiling, instrument removed on
    // the next silent pulse.
    let mut removed_at = None;
    for silent in 1..=4 {
        let report = scheduler.pulse().unwrap();
        if !report.eviction.removed.is_empty() {
            removed_at = Some(silent);
            break;
        }
    }
    assert_eq!(removed_at, Some(4));
    assert!(!scheduler.store().contains("A"));
    assert_eq!(scheduler.tracker().state("A"), TrackerState::Unseeded);

    let later = T0 + 3600.0;
    feed(&mut scheduler, "A", "Z", later, 10.0);
    scheduler.pulse().unwrap();
    let window = scheduler.take_windows().remove(0);
    assert_eq!(window.window_index, 0);
    assert_eq!(window.start_time, later);
}

#[test]
fn test_gap_of_three_advances_jumps_index_by_three() {
    let mut scheduler = PulseScheduler::new(settings(FillRule::Zeros));
    feed(&mut scheduler, "A", "Z", T0, 10.0);
    scheduler.pulse().unwrap();
    assert_eq!(scheduler.take_windows()[0].window_index, 0);

    // Tracker sits at t0+5; new data starts 3 advances later.
    feed(&mut scheduler, "A", "Z", T0 + 20.0, 10.0);
    let report = scheduler.pulse().unwrap();
    assert_eq!(report.gap_jumps, 1);

    let windows = scheduler.take_windows();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].window_index, 4);
    assert!((windows[0].start_time - (T0 + 20.0)).abs() < 1e-9);
}

#[test]
fn test_clone_vertical_is_bit_identical_across_runs() {
    let run = || -> Vec<Window> {
        let mut scheduler = PulseScheduler::new(settings(FillRule::CloneVertical));
        feed(&mut scheduler, "A", "Z", T0, 10.0);
        scheduler.pulse().unwrap();
        scheduler.take_windows()
    };

    let first = run();
    let second = run();
    assert_eq!(first.len(), 1);

    for role in [ChannelRole::Horizontal1, ChannelRole::Horizontal2] {
        let a = first[0].channel(role).unwrap();
        let b = second[0].channel(role).unwrap();
        let bits_a: Vec<u64> = a.data.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.data.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
        assert_eq!(a.source, ChannelSource::Cloned(ChannelRole::Vertical));
    }
}

#[test]
fn test_edge_gaps_never_raise_completeness() {
    let evaluator = CompletenessEvaluator::new(1.0, TaperShape::Cosine);
    let mut samples = wave(0.0, 10.0);
    let score = |samples: &[Option<f64>]| {
        let mut buffer = SampleBuffer::new(RATE, 60.0);
        buffer.append(0.0, samples);
        evaluator.score(&buffer, 0.0, 10.0)
    };

    let mut previous = score(&samples);
    for k in (900..999).rev() {
        samples[k] = None;
        let current = score(&samples);
        assert!(current <= previous + 1e-12);
        previous = current;
    }
}

#[test]
fn test_records_from_config_and_seed_ids() {
    let config = Config {
        sample_count: 1000,
        overlap_samples: 500,
        edge_taper_seconds: 1.0,
        buffer_max_span_seconds: 30.0,
        fill_rule: "clonez".to_string(),
        ..Config::default()
    };
    let mut scheduler = PulseScheduler::new(config.validate().unwrap());

    for code in ["HHZ", "HHN"] {
        let record =
            IngestRecord::from_seed_id(&format!("UW.GNW..{code}"), T0, RATE, wave(T0, 10.0))
                .unwrap();
        record.feed(&mut scheduler).unwrap();
    }
    let bad = IngestRecord::new("UW.GNW..HH", "HHX", T0, RATE, wave(T0, 1.0));
    assert!(bad.feed(&mut scheduler).is_err());

    let report = scheduler.pulse().unwrap();
    assert_eq!(report.ingested, 2);
    assert_eq!(report.rejected, 1);

    let window = scheduler.take_windows().remove(0);
    assert_eq!(window.instrument_id, "UW.GNW..HH");
    assert_eq!(
        window.channel(ChannelRole::Horizontal1).unwrap().source,
        ChannelSource::Observed
    );
    assert_eq!(
        window.channel(ChannelRole::Horizontal2).unwrap().source,
        ChannelSource::Cloned(ChannelRole::Vertical)
    );
}
