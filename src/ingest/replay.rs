//! Replays newline-delimited JSON records from a file.
//!
//! Lines are parsed on a background thread and delivered through a bounded
//! channel, so the pulse loop never blocks on file I/O.

use crate::ingest::types::{IngestError, IngestRecord};
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a replay source.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub path: PathBuf,
    /// Keep reading as the file grows instead of stopping at EOF.
    pub follow: bool,
    pub channel_capacity: usize,
}

impl ReplayConfig {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            follow: false,
            channel_capacity: 10_000,
        }
    }
}

/// File-backed record source.
pub struct ReplaySource {
    config: ReplayConfig,
    sender: Sender<IngestRecord>,
    receiver: Receiver<IngestRecord>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    malformed: Arc<AtomicU64>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(config: ReplayConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity.max(1));
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            malformed: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Open the file and start reading it in a background thread.
    pub fn start(&mut self) -> Result<(), IngestError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(IngestError::AlreadyRunning);
        }
        let file = File::open(&self.config.path).map_err(|e| {
            IngestError::IoError(format!("{}: {}", self.config.path.display(), e))
        })?;

        self.running.store(true, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);

        let sender = self.sender.clone();
        let running = self.running.clone();
        let finished = self.finished.clone();
        let malformed = self.malformed.clone();
        let follow = self.config.follow;

        let handle = thread::spawn(move || {
            if let Err(e) = read_lines(BufReader::new(file), &sender, &running, &malformed, follow)
            {
                tracing::warn!("Replay stopped: {}", e);
            }
            running.store(false, Ordering::SeqCst);
            finished.store(true, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop reading. Records already queued stay available.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// True once the reader has stopped and every record has been received.
    pub fn is_exhausted(&self) -> bool {
        self.finished.load(Ordering::SeqCst) && self.receiver.is_empty()
    }

    pub fn receiver(&self) -> &Receiver<IngestRecord> {
        &self.receiver
    }

    /// Try to receive a record without blocking.
    pub fn try_recv(&self) -> Option<IngestRecord> {
        self.receiver.try_recv().ok()
    }

    /// Lines that could not be parsed so far.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_lines<R: BufRead>(
    mut reader: R,
    sender: &Sender<IngestRecord>,
    running: &AtomicBool,
    malformed: &AtomicU64,
    follow: bool,
) -> Result<(), IngestError> {
    let mut line = String::new();
    let mut line_number = 0u64;

    while running.load(Ordering::SeqCst) {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| IngestError::IoError(e.to_string()))?;
        if read == 0 {
            if follow {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            break;
        }
        line_number += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = match IngestRecord::from_json_line(trimmed) {
            Ok(record) => record,
            Err(e) => {
                malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Skipping line {}: {}", line_number, e);
                continue;
            }
        };

        if !send_while_running(sender, record, running) {
            break;
        }
    }
    Ok(())
}

/// Blocking send that gives up once `running` is cleared.
fn send_while_running(
    sender: &Sender<IngestRecord>,
    mut record: IngestRecord,
    running: &AtomicBool,
) -> bool {
    loop {
        match sender.send_timeout(record, POLL_INTERVAL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(r)) => {
                if !running.load(Ordering::SeqCst) {
                    return false;
                }
                record = r;
            }
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}
