//! Demonstration of the pulse windower on synthetic data.
//!
//! This example shows how to:
//! 1. Build scheduler settings from a configuration
//! 2. Feed chunked records for several instruments, including a dropout
//! 3. Run pulses and collect windows
//! 4. Batch windows through the STA/LTA engine
//!
//! Run with: cargo run --example synthetic_pulse

use pulse_windower::{
    config::Config,
    core::PulseScheduler,
    inference::{BatchDispatcher, StaLtaEngine},
    ingest::IngestRecord,
    ledger::PulseLedger,
};

const RATE: f64 = 50.0;
const CHUNK_SECONDS: f64 = 2.0;

fn main() {
    println!("Pulse Windower - Synthetic Demo");
    println!("===============================");
    println!();

    let config = Config {
        sample_rate: RATE,
        sample_count: 1000,
        overlap_samples: 500,
        edge_taper_seconds: 2.0,
        buffer_max_span_seconds: 60.0,
        max_staleness_pulses: 5,
        fill_rule: "clone-horizontal".to_string(),
        ..Config::default()
    };
    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "Windows: {:.0}s, advance {:.0}s, fill rule {}",
        settings.window_seconds(),
        settings.advance_seconds,
        settings.fill_rule
    );
    println!();

    let mut scheduler = PulseScheduler::new(settings);
    let ledger = PulseLedger::new();
    let dispatcher = BatchDispatcher::new(config.batch_size);
    let mut engine = StaLtaEngine::default();

    // Three instruments: a full three-component site, a vertical-only
    // sensor, and a site that goes silent halfway through.
    let instruments = [
        ("XX.FULL..HH", vec!["Z", "N", "E"]),
        ("XX.VERT..EH", vec!["Z"]),
        ("XX.DROP..BH", vec!["Z", "1"]),
    ];

    for pulse in 0..40 {
        let start = pulse as f64 * CHUNK_SECONDS;
        for (id, codes) in &instruments {
            if id.starts_with("XX.DROP") && pulse >= 20 {
                continue;
            }
            for code in codes {
                let record = IngestRecord::new(*id, *code, start, RATE, synthetic(start, pulse));
                if let Err(e) = record.feed(&mut scheduler) {
                    eprintln!("Rejected record: {e}");
                }
            }
        }

        let report = match scheduler.pulse() {
            Ok(report) => report,
            Err(e) => {
                eprintln!("Pulse halted: {e}");
                break;
            }
        };
        ledger.record_pulse(&report);

        for window in scheduler.queue_mut().iter() {
            println!(
                "[pulse {:2}] {} window {} at {:5.1}s ({} observed)",
                pulse,
                window.instrument_id,
                window.window_index,
                window.start_time,
                window.observed_channels()
            );
        }
        for id in &report.eviction.removed {
            println!("[pulse {pulse:2}] evicted {id}");
        }

        while scheduler.queued() > 0 {
            match dispatcher.pulse(scheduler.queue_mut(), &mut engine) {
                Ok(traces) => {
                    ledger.record_predictions(traces.len() as u64);
                    for trace in traces {
                        let peak = trace.values.iter().cloned().fold(0.0f32, f32::max);
                        if peak > 3.0 {
                            println!(
                                "           trigger on {} window {} (peak {:.1})",
                                trace.instrument_id, trace.window_index, peak
                            );
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Inference failed: {e}");
                    break;
                }
            }
        }
    }

    println!();
    println!("{}", ledger.summary());
}

/// Low-level noise with a burst every tenth chunk.
fn synthetic(start: f64, pulse: u64) -> Vec<Option<f64>> {
    let n = (CHUNK_SECONDS * RATE) as usize;
    (0..n)
        .map(|i| {
            let t = start + i as f64 / RATE;
            let noise = 0.1 * (t * 7.3).sin() + 0.05 * (t * 31.1).cos();
            let burst = if pulse % 10 == 5 && i > n / 2 {
                5.0 * (t * 12.0).sin()
            } else {
                0.0
            };
            Some(noise + burst)
        })
        .collect()
}
