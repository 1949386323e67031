//! Best-effort persistence of the price history and engine state.
//!
//! Nothing here is needed for correctness. Sinks must never block the event
//! handler and never fail it: a broken journal loses records, not ticks.

use serde::{Deserialize, Serialize};

use crate::engine::EngineSnapshot;
use crate::types::SecurityId;

pub mod file;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum JournalRecord {
    /// Column order for subsequent history rows.
    Universe { securities: Vec<SecurityId> },
    HistoryRow { time: f64, prices: Vec<f64> },
    Snapshot(Box<EngineSnapshot>),
}

pub trait JournalSink: Send + Sync {
    fn emit(&self, record: JournalRecord) -> anyhow::Result<()>;
}

/// No-op journal (default for tests and dry runs).
#[derive(Clone, Debug, Default)]
pub struct NoopJournal;

impl JournalSink for NoopJournal {
    fn emit(&self, _record: JournalRecord) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Keeps records in memory; handy for inspecting a replay.
#[derive(Default)]
pub struct MemoryJournal {
    records: parking_lot::Mutex<Vec<JournalRecord>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<JournalRecord> {
        self.records.lock().clone()
    }
}

impl JournalSink for MemoryJournal {
    fn emit(&self, record: JournalRecord) -> anyhow::Result<()> {
        self.records.lock().push(record);
        Ok(())
    }
}
