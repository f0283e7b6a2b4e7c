//! Building traces programmatically, for fixtures and for recorders that
//! feed the replayer from another process.

use crate::errors::ReplayError;
use crate::host::FileSystem;
use crate::logging::append_run_log;
use crate::trace::loader::Trace;
use crate::trace::recording::{
    source_digest, BatchRecord, CallPathRecord, ReplayStep, TraceEndRecord, TraceEntry,
    TraceStartRecord,
};
use serde_json::json;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const RECORDER_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Accumulates steps into batches and renders the JSONL trace.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    name: String,
    call_path: Vec<String>,
    batches: Vec<BatchRecord>,
    pending: Vec<ReplayStep>,
    next_seq: u64,
}

impl TraceWriter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            call_path: Vec::new(),
            batches: Vec::new(),
            pending: Vec::new(),
            next_seq: 1,
        }
    }

    pub fn call_path<I, S>(&mut self, ids: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.call_path.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn step(&mut self, step: ReplayStep) -> &mut Self {
        self.pending.push(step);
        self
    }

    /// Closes the current batch. Empty batches are kept: each one is still
    /// a benchmark iteration.
    pub fn end_batch(&mut self) -> &mut Self {
        let steps = std::mem::take(&mut self.pending);
        self.batches.push(BatchRecord {
            seq: self.next_seq,
            steps,
        });
        self.next_seq += 1;
        self
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        let mut batches = self.batches.clone();
        if !self.pending.is_empty() {
            batches.push(BatchRecord {
                seq: self.next_seq,
                steps: self.pending.clone(),
            });
        }
        let digest = source_digest(batches.iter().flat_map(|batch| {
            batch.steps.iter().filter_map(|step| match step {
                ReplayStep::Eval { source, .. } => Some(source.as_str()),
                _ => None,
            })
        }));
        let step_count = batches.iter().map(|batch| batch.steps.len()).sum();
        let batch_count = batches.len();

        let mut entries = vec![TraceEntry::TraceStart(TraceStartRecord {
            name: self.name.clone(),
            recorded_at_unix_ns: timestamp_ns(),
            recorder_version: RECORDER_VERSION.to_string(),
            source_digest: Some(digest),
        })];
        if !self.call_path.is_empty() {
            entries.push(TraceEntry::CallPath(CallPathRecord {
                ids: self.call_path.clone(),
            }));
        }
        entries.extend(batches.into_iter().map(TraceEntry::Batch));
        entries.push(TraceEntry::TraceEnd(TraceEndRecord {
            batch_count,
            step_count,
        }));
        entries
    }

    pub fn to_jsonl(&self) -> Result<String, ReplayError> {
        let mut out = String::new();
        for entry in self.entries() {
            let line =
                serde_json::to_string(&entry).map_err(|e| ReplayError::Io(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write(&self, fs: &dyn FileSystem, path: &Path) -> Result<(), ReplayError> {
        fs.write_string(path, &self.to_jsonl()?)?;
        append_run_log(
            "info",
            "trace.written",
            json!({
                "path": path.display().to_string(),
                "name": self.name,
                "batches": self.batches.len()
            }),
        );
        Ok(())
    }

    pub fn into_trace(self) -> Result<Trace, ReplayError> {
        Trace::from_entries(self.entries())
    }
}
