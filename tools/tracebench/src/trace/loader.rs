//! Loading a JSONL trace into memory.

use crate::errors::ReplayError;
use crate::host::FileSystem;
use crate::logging::append_run_log;
use crate::trace::recording::{
    source_digest, BatchRecord, ReplayStep, TraceEndRecord, TraceEntry, TraceStartRecord,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;

/// A parsed trace, ready for replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub header: TraceStartRecord,
    pub call_path: Vec<String>,
    pub batches: Vec<BatchRecord>,
    pub footer: Option<TraceEndRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceSummary {
    pub name: String,
    pub batches: usize,
    pub steps: usize,
    pub evals: usize,
    pub stubs: usize,
    pub call_path: usize,
    pub digest: String,
}

impl Trace {
    pub fn load(fs: &dyn FileSystem, path: &Path) -> Result<Self, ReplayError> {
        let raw = fs.read_to_string(path)?;
        let trace = Self::parse(&raw)?;
        append_run_log(
            "info",
            "trace.loaded",
            json!({
                "path": path.display().to_string(),
                "name": trace.header.name,
                "batches": trace.batches.len(),
                "steps": trace.step_count()
            }),
        );
        Ok(trace)
    }

    pub fn parse(raw: &str) -> Result<Self, ReplayError> {
        let mut entries = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: TraceEntry = serde_json::from_str(line)
                .map_err(|e| ReplayError::TraceParse(format!("line {}: {e}", idx + 1)))?;
            entries.push(entry);
        }
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<TraceEntry>) -> Result<Self, ReplayError> {
        let mut header = None;
        let mut call_path = Vec::new();
        let mut batches = Vec::new();
        let mut footer = None;
        for entry in entries {
            match entry {
                TraceEntry::TraceStart(start) => {
                    if header.is_some() {
                        return Err(ReplayError::TraceParse(
                            "trace has more than one trace_start entry".to_string(),
                        ));
                    }
                    header = Some(start);
                }
                TraceEntry::CallPath(path) => call_path.extend(path.ids),
                TraceEntry::Batch(batch) => batches.push(batch),
                TraceEntry::TraceEnd(end) => footer = Some(end),
            }
        }
        let header = header.ok_or_else(|| {
            ReplayError::TraceParse("trace has no trace_start entry".to_string())
        })?;
        let trace = Self {
            header,
            call_path,
            batches,
            footer,
        };
        trace.check_integrity()?;
        Ok(trace)
    }

    fn check_integrity(&self) -> Result<(), ReplayError> {
        if let Some(expected) = &self.header.source_digest {
            let actual = self.digest();
            if *expected != actual {
                return Err(ReplayError::TraceParse(format!(
                    "source digest mismatch: header says {expected}, sources hash to {actual}"
                )));
            }
        }
        if let Some(footer) = &self.footer {
            if footer.batch_count != self.batches.len() || footer.step_count != self.step_count() {
                return Err(ReplayError::TraceParse(format!(
                    "trace_end expects {} batches / {} steps, found {} / {}",
                    footer.batch_count,
                    footer.step_count,
                    self.batches.len(),
                    self.step_count()
                )));
            }
        }
        Ok(())
    }

    pub fn steps(&self) -> impl Iterator<Item = &ReplayStep> {
        self.batches.iter().flat_map(|batch| batch.steps.iter())
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn step_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.steps.len()).sum()
    }

    pub fn eval_sources(&self) -> impl Iterator<Item = &str> {
        self.steps().filter_map(|step| match step {
            ReplayStep::Eval { source, .. } => Some(source.as_str()),
            _ => None,
        })
    }

    pub fn digest(&self) -> String {
        source_digest(self.eval_sources())
    }

    pub fn stub_names(&self) -> BTreeSet<&str> {
        self.steps().flat_map(ReplayStep::stub_names).collect()
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            name: self.header.name.clone(),
            batches: self.batches.len(),
            steps: self.step_count(),
            evals: self.eval_sources().count(),
            stubs: self.stub_names().len(),
            call_path: self.call_path.len(),
            digest: self.digest(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Trace;
    use crate::errors::ReplayError;
    use crate::trace::recording::{
        BatchRecord, ReplayStep, TraceEndRecord, TraceEntry, TraceStartRecord,
    };
    use serde_json::json;

    fn header(digest: Option<&str>) -> TraceEntry {
        TraceEntry::TraceStart(TraceStartRecord {
            name: "t".to_string(),
            recorded_at_unix_ns: 0,
            recorder_version: "test".to_string(),
            source_digest: digest.map(str::to_string),
        })
    }

    fn eval_batch(seq: u64, source: &str) -> TraceEntry {
        TraceEntry::Batch(BatchRecord {
            seq,
            steps: vec![ReplayStep::Eval {
                source: source.to_string(),
                scope: None,
            }],
        })
    }

    #[test]
    fn parse_requires_trace_start() {
        let line = serde_json::to_string(&eval_batch(1, "get x")).expect("serialize");
        let err = Trace::parse(&line).expect_err("missing header");
        assert_eq!(
            err.to_string(),
            "trace parse error: trace has no trace_start entry"
        );
    }

    #[test]
    fn parse_reports_the_bad_line() {
        let first = serde_json::to_string(&header(None)).expect("serialize");
        let raw = format!("{first}\n\n{{\"type\":\"nope\"}}\n");
        let err = Trace::parse(&raw).expect_err("bad line");
        assert!(matches!(err, ReplayError::TraceParse(msg) if msg.starts_with("line 3:")));
    }

    #[test]
    fn digest_mismatch_is_rejected() {
        let err = Trace::from_entries(vec![
            header(Some("sha256:0000000000000000")),
            eval_batch(1, "get x"),
        ])
        .expect_err("mismatch");
        assert!(err.to_string().contains("source digest mismatch"));

        let digest = crate::trace::recording::source_digest(["get x"]);
        let ok = Trace::from_entries(vec![header(Some(&digest)), eval_batch(1, "get x")])
            .expect("matching digest");
        assert_eq!(ok.digest(), digest);
    }

    #[test]
    fn footer_counts_must_match() {
        let err = Trace::from_entries(vec![
            header(None),
            eval_batch(1, "get x"),
            TraceEntry::TraceEnd(TraceEndRecord {
                batch_count: 2,
                step_count: 1,
            }),
        ])
        .expect_err("count mismatch");
        assert!(err.to_string().contains("trace_end expects 2 batches"));
    }

    #[test]
    fn summary_counts_steps_stubs_and_evals() {
        let trace = Trace::from_entries(vec![
            header(None),
            TraceEntry::Batch(BatchRecord {
                seq: 7,
                steps: vec![
                    ReplayStep::PushReturn {
                        stub: "f1".to_string(),
                        value: json!(1),
                    },
                    ReplayStep::PushReturn {
                        stub: "f1".to_string(),
                        value: json!(2),
                    },
                    ReplayStep::DefineGetter {
                        target: "document.body".to_string(),
                        getter: "g1".to_string(),
                        setter: Some("s1".to_string()),
                        claim_on_write: true,
                    },
                ],
            }),
            eval_batch(8, "call f1()"),
        ])
        .expect("trace");
        let summary = trace.summary();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.steps, 4);
        assert_eq!(summary.evals, 1);
        assert_eq!(summary.stubs, 3);
    }
}
