use anyhow::Context;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::journal::{JournalRecord, JournalSink};

/// Writes the history table as CSV and the latest state snapshot as JSON.
///
/// Records are queued on an unbounded channel and written by a dedicated
/// thread, so `emit` is a non-blocking send.
pub struct FileJournal {
    tx: Mutex<Option<UnboundedSender<JournalRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileJournal {
    pub fn spawn(history_csv: Option<PathBuf>, snapshot_json: Option<PathBuf>) -> anyhow::Result<Self> {
        let history = match history_csv {
            Some(path) => Some(BufWriter::new(
                File::create(&path).with_context(|| format!("create {}", path.display()))?,
            )),
            None => None,
        };
        let (tx, rx) = unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("journal".into())
            .spawn(move || run_writer(rx, history, snapshot_json))
            .context("spawn journal writer")?;
        Ok(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stops accepting records and waits for the queue to drain.
    pub fn close(&self) {
        self.tx.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("journal writer panicked");
            }
        }
    }
}

impl Drop for FileJournal {
    fn drop(&mut self) {
        self.close();
    }
}

impl JournalSink for FileJournal {
    fn emit(&self, record: JournalRecord) -> anyhow::Result<()> {
        if let Some(tx) = self.tx.lock().as_ref() {
            if tx.send(record).is_err() {
                debug!("journal writer gone, record dropped");
            }
        }
        Ok(())
    }
}

fn run_writer(
    mut rx: UnboundedReceiver<JournalRecord>,
    mut history: Option<BufWriter<File>>,
    snapshot_path: Option<PathBuf>,
) {
    while let Some(record) = rx.blocking_recv() {
        let result = match record {
            JournalRecord::Universe { securities } => history.as_mut().map_or(Ok(()), |w| {
                let header: Vec<&str> = securities.iter().map(|s| s.0.as_str()).collect();
                writeln!(w, "time,{}", header.join(",")).and_then(|_| w.flush())
            }),
            JournalRecord::HistoryRow { time, prices } => history.as_mut().map_or(Ok(()), |w| {
                let cells: Vec<String> = prices.iter().map(|p| p.to_string()).collect();
                writeln!(w, "{time},{}", cells.join(",")).and_then(|_| w.flush())
            }),
            JournalRecord::Snapshot(snapshot) => match &snapshot_path {
                Some(path) => write_snapshot(path, &snapshot),
                None => Ok(()),
            },
        };
        if let Err(err) = result {
            warn!(error = %err, "journal write failed");
        }
    }
}

fn write_snapshot(path: &Path, snapshot: &crate::engine::EngineSnapshot) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}
