//! Pulse Windower CLI
//!
//! Replays telemetry records through the pulse scheduler and exports the
//! resulting windows.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pulse_windower::{
    config::Config,
    core::{PulseScheduler, Window},
    inference::{BatchDispatcher, InferenceEngine, PredictionTrace, StaLtaEngine},
    ingest::{ReplayConfig, ReplaySource},
    ledger::{create_shared_ledger_with_persistence, PulseLedger},
    VERSION,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pulse-windower")]
#[command(version = VERSION)]
#[command(about = "Pulse-driven multi-channel windowing for batched inference", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay records and emit windows
    Run {
        /// Newline-delimited JSON records
        #[arg(long, short)]
        input: PathBuf,

        /// Output directory (defaults to the configured export path)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Keep reading as the input file grows
        #[arg(long)]
        follow: bool,

        /// Run the STA/LTA engine on emitted windows
        #[arg(long)]
        sta_lta: bool,
    },

    /// Show ledger totals from previous runs
    Status,

    /// Show configuration
    Config,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = cli.config.unwrap_or_else(Config::config_path);

    let result = match cli.command {
        Commands::Run {
            input,
            output,
            follow,
            sta_lta,
        } => cmd_run(&config_path, &input, output, follow, sta_lta),
        Commands::Status => cmd_status(&config_path),
        Commands::Config => cmd_config(&config_path),
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// One exported line.
#[derive(Serialize)]
struct Exported<'a, T> {
    run_id: Uuid,
    exported_at: DateTime<Utc>,
    #[serde(flatten)]
    item: &'a T,
}

struct JsonlWriter {
    run_id: Uuid,
    out: BufWriter<File>,
    lines: u64,
}

impl JsonlWriter {
    fn create(path: &Path, run_id: Uuid) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            run_id,
            out: BufWriter::new(file),
            lines: 0,
        })
    }

    fn write<T: Serialize>(&mut self, item: &T) -> Result<()> {
        let line = Exported {
            run_id: self.run_id,
            exported_at: Utc::now(),
            item,
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn finish(mut self) -> Result<u64> {
        self.out.flush()?;
        Ok(self.lines)
    }
}

fn cmd_run(
    config_path: &Path,
    input: &Path,
    output: Option<PathBuf>,
    follow: bool,
    sta_lta: bool,
) -> Result<()> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let settings = config.validate().context("invalid configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let export_dir = output.unwrap_or_else(|| config.export_path.clone());
    std::fs::create_dir_all(&export_dir)
        .with_context(|| format!("failed to create {}", export_dir.display()))?;

    let run_id = Uuid::new_v4();
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");

    println!("Pulse Windower v{VERSION}");
    println!();
    println!("Run ID: {run_id}");
    println!("  Input: {}", input.display());
    println!(
        "  Window: {} samples @ {} Hz, advance {:.3}s",
        settings.sample_count, settings.sample_rate, settings.advance_seconds
    );
    println!(
        "  Thresholds: vertical {:.2}, horizontal {:.2}",
        settings.vertical_threshold, settings.horizontal_threshold
    );
    println!("  Fill rule: {}", settings.fill_rule);
    println!("  Gap policy: {:?}", settings.gap_policy);
    println!("  Output: {}", export_dir.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let ledger = create_shared_ledger_with_persistence(config.ledger_path());
    let mut scheduler = PulseScheduler::new(settings);

    let mut source = ReplaySource::new(ReplayConfig {
        path: input.to_path_buf(),
        follow,
        channel_capacity: config.max_records_per_pulse.max(1) * 4,
    });
    source.start().context("failed to start replay")?;

    let mut window_writer =
        JsonlWriter::create(&export_dir.join(format!("windows_{stamp}.jsonl")), run_id)?;
    let mut engine = if sta_lta {
        Some(StaLtaEngine::default())
    } else {
        None
    };
    let mut prediction_writer = match engine {
        Some(_) => Some(JsonlWriter::create(
            &export_dir.join(format!("predictions_{stamp}.jsonl")),
            run_id,
        )?),
        None => None,
    };
    let dispatcher = BatchDispatcher::new(config.batch_size);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    while running.load(Ordering::SeqCst) {
        let exhausted = source.is_exhausted();

        for _ in 0..config.max_records_per_pulse {
            match source.try_recv() {
                // Rejections are logged and counted by the scheduler.
                Some(record) => {
                    let _ = record.feed(&mut scheduler);
                }
                None => break,
            }
        }

        let report = match scheduler.pulse() {
            Ok(report) => report,
            Err(e) => {
                ledger.record_halt();
                // Windows from sweeps before the halt are still queued.
                export_queued(&mut scheduler, &mut window_writer)?;
                eprintln!();
                eprintln!("Pulse halted: {e}");
                if let Some(entry) = scheduler.tracker().entry(e.instrument_id()) {
                    eprintln!(
                        "  Tracker: state {}, next window {}, next start {:?}",
                        entry.state(),
                        entry.next_window_index(),
                        scheduler.tracker().next_start_time(e.instrument_id())
                    );
                }
                break;
            }
        };
        ledger.record_pulse(&report);
        export_queued(&mut scheduler, &mut window_writer)?;

        match (engine.as_mut(), prediction_writer.as_mut()) {
            (Some(engine), Some(writer)) => {
                let count = dispatch_all(&dispatcher, &mut scheduler, engine, writer)?;
                ledger.record_predictions(count);
            }
            _ => {
                scheduler.take_windows();
            }
        }

        if exhausted && report.emitted == 0 {
            break;
        }
        thread::sleep(config.pulse_interval);
    }

    println!();
    println!("Stopping replay...");
    source.stop();
    if source.malformed_lines() > 0 {
        eprintln!("Warning: skipped {} malformed lines", source.malformed_lines());
    }

    let windows = window_writer.finish()?;
    println!("Exported {windows} windows");
    if let Some(writer) = prediction_writer {
        let predictions = writer.finish()?;
        println!("Exported {predictions} prediction traces");
    }

    if let Err(e) = ledger.save() {
        eprintln!("Warning: Could not save ledger: {e}");
    }

    println!();
    println!("{}", ledger.summary());
    Ok(())
}

/// Print and export every queued window, leaving the queue for dispatch.
fn export_queued(scheduler: &mut PulseScheduler, writer: &mut JsonlWriter) -> Result<usize> {
    for window in scheduler.queue_mut().iter() {
        print_window(window);
        writer.write(window)?;
    }
    Ok(scheduler.queued())
}

fn dispatch_all(
    dispatcher: &BatchDispatcher,
    scheduler: &mut PulseScheduler,
    engine: &mut dyn InferenceEngine,
    writer: &mut JsonlWriter,
) -> Result<u64> {
    let mut count = 0;
    while scheduler.queued() > 0 {
        let traces: Vec<PredictionTrace> = dispatcher
            .pulse(scheduler.queue_mut(), engine)
            .map_err(|e| anyhow!("inference failed: {e}"))?;
        for trace in &traces {
            writer.write(trace)?;
        }
        count += traces.len() as u64;
    }
    Ok(count)
}

fn print_window(window: &Window) {
    let when = window
        .start_datetime()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| format!("{:.3}", window.start_time));
    println!(
        "[{}] Window {} for {}: {}/{} channels observed",
        when,
        window.window_index,
        window.instrument_id,
        window.observed_channels(),
        window.channels.len()
    );
}

fn cmd_status(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    println!("Pulse Windower Status");
    println!("=====================");
    println!();

    println!("Configuration:");
    match config.validate() {
        Ok(settings) => {
            println!(
                "  Window: {} samples @ {} Hz ({:.1}s), advance {:.3}s",
                settings.sample_count,
                settings.sample_rate,
                settings.window_seconds(),
                settings.advance_seconds
            );
            println!("  Fill rule: {}", settings.fill_rule);
            println!("  Max staleness: {} pulses", settings.max_staleness_pulses);
            println!("  Max sweeps: {} per pulse", settings.max_sweeps_per_pulse);
        }
        Err(e) => println!("  Invalid: {e}"),
    }
    println!();

    let ledger_path = config.ledger_path();
    if ledger_path.exists() {
        let ledger = PulseLedger::with_persistence(ledger_path);
        println!("{}", ledger.summary());
    } else {
        println!("No previous run data found.");
    }
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let config = Config::load_from(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    println!();
    match config.validate() {
        Ok(_) => println!("Configuration is valid."),
        Err(e) => println!("Configuration error: {e}"),
    }
    Ok(())
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    Config::default()
        .save_to(config_path)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Wrote default configuration to {config_path:?}");
    Ok(())
}
