//! Operational ledger for the pulse windower.
//!
//! Tracks pulse-level counters across a run and persists them so the
//! `status` command can report on past runs.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_ledger, create_shared_ledger_with_persistence, LedgerStats, PulseLedger,
    SharedPulseLedger,
};
