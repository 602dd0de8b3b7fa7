use serde::{Deserialize, Serialize};
use serde_json::json;
use std::error::Error;
use std::fs::File;
use std::path::Path;

/// One audit row per coordinator decision. The `detail` column carries a
/// JSON blob (holders snapshot, deadlock cycle path) so the CSV keeps a
/// fixed shape while still capturing structured state.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventRecord {
    pub sim_time: String,
    pub timestamp: u64,
    pub train_id: u32,
    pub intersection_id: String,
    pub action: String,
    pub status: String,
    pub detail: String,
}

/// Append-only CSV sink for coordinator decisions.
pub struct CsvEventLogger {
    writer: csv::Writer<File>,
}

impl CsvEventLogger {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        Ok(Self { writer })
    }

    /// Writes and flushes one record. Logging must never take the
    /// coordinator down, so failures are reported and swallowed.
    pub fn log(&mut self, record: &EventRecord) {
        if let Err(e) = self.write(record) {
            eprintln!("Error writing event record: {}", e);
        }
    }

    fn write(&mut self, record: &EventRecord) -> Result<(), Box<dyn Error>> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// JSON detail for grant/release decisions: current holders and queue depth.
pub fn holders_detail(holders: &[u32], waiting: usize) -> String {
    json!({ "holders": holders, "waiting": waiting }).to_string()
}

/// JSON detail for a detected deadlock: the cycle path and graph size.
pub fn deadlock_detail(cycle_path: &str, node_count: usize) -> String {
    json!({ "cycle_path": cycle_path, "node_count": node_count }).to_string()
}

/// JSON detail for a preemption: which request forced the revocation.
pub fn preemption_detail(requester: u32, forced: bool) -> String {
    json!({ "requester": requester, "forced": forced }).to_string()
}
