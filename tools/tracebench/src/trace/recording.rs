//! Serializable types for recorded traces.
//!
//! A trace is a JSONL file where each line is a `TraceEntry` JSON object.
//! Values inside steps are plain JSON plus a handful of `$`-escapes for
//! things JSON cannot say: `{"$undefined":true}`, `{"$nan":true}`,
//! `{"$ref":"path"}`, `{"$stub":"name"}` and `{"$unknown":"type"}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ── ReplayStep ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayStep {
    /// `target = value`, where `target` is a dotted path from `window`.
    Assign { target: String, value: Value },
    /// `target = {}`
    CreateObject { target: String },
    /// Queues `value` as the next return of the named stub.
    PushReturn { stub: String, value: Value },
    /// Queues a return together with the call it answers.
    PushCall {
        stub: String,
        #[serde(default = "undefined_json")]
        this: Value,
        #[serde(default)]
        args: Vec<Value>,
        value: Value,
    },
    /// Installs a stub-backed accessor at `target`.
    DefineGetter {
        target: String,
        getter: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        setter: Option<String>,
        #[serde(default = "default_true")]
        claim_on_write: bool,
    },
    /// Runs captured source text, in `scope` when given, else in `window`.
    Eval {
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

impl ReplayStep {
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Assign { .. } => "assign",
            Self::CreateObject { .. } => "create_object",
            Self::PushReturn { .. } => "push_return",
            Self::PushCall { .. } => "push_call",
            Self::DefineGetter { .. } => "define_getter",
            Self::Eval { .. } => "eval",
        }
    }

    /// Stubs this step names, for trace summaries.
    pub fn stub_names(&self) -> Vec<&str> {
        match self {
            Self::PushReturn { stub, .. } | Self::PushCall { stub, .. } => vec![stub.as_str()],
            Self::DefineGetter { getter, setter, .. } => {
                let mut names = vec![getter.as_str()];
                if let Some(setter) = setter {
                    names.push(setter.as_str());
                }
                names
            }
            _ => Vec::new(),
        }
    }
}

pub fn undefined_json() -> Value {
    json!({ "$undefined": true })
}

fn default_true() -> bool {
    true
}

// ── TraceEntry ────────────────────────────────────────────────────────────────

/// The top-level tagged enum that is serialized as a single JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEntry {
    TraceStart(TraceStartRecord),
    CallPath(CallPathRecord),
    Batch(BatchRecord),
    TraceEnd(TraceEndRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceStartRecord {
    pub name: String,
    pub recorded_at_unix_ns: u64,
    pub recorder_version: String,
    /// `sha256:` prefix of the digest over every eval source, in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallPathRecord {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Capture order. Provenance only; batches run in file order.
    pub seq: u64,
    pub steps: Vec<ReplayStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEndRecord {
    pub batch_count: usize,
    pub step_count: usize,
}

// ── source digest ─────────────────────────────────────────────────────────────

pub fn source_digest<'a>(sources: impl IntoIterator<Item = &'a str>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(source.as_bytes());
        hasher.update([0u8]);
    }
    let hash = hasher.finalize();
    // First 8 bytes (16 hex chars) are plenty to tell traces apart.
    format!("sha256:{}", hex_bytes(&hash[..8]))
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_use_op_tags() {
        let step: ReplayStep =
            serde_json::from_str(r#"{"op":"push_return","stub":"f1","value":42}"#).expect("parse");
        assert_eq!(
            step,
            ReplayStep::PushReturn {
                stub: "f1".to_string(),
                value: json!(42)
            }
        );
        assert_eq!(step.op_name(), "push_return");
    }

    #[test]
    fn push_call_defaults_this_to_undefined() {
        let step: ReplayStep =
            serde_json::from_str(r#"{"op":"push_call","stub":"f","value":null}"#).expect("parse");
        match step {
            ReplayStep::PushCall { this, args, .. } => {
                assert_eq!(this, undefined_json());
                assert!(args.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn define_getter_claims_on_write_unless_told_otherwise() {
        let step: ReplayStep = serde_json::from_str(
            r#"{"op":"define_getter","target":"document.cookie","getter":"g1"}"#,
        )
        .expect("parse");
        assert!(matches!(
            step,
            ReplayStep::DefineGetter { claim_on_write: true, setter: None, .. }
        ));
        assert_eq!(step.stub_names(), vec!["g1"]);
    }

    #[test]
    fn entries_are_tagged_by_type() {
        let entry = TraceEntry::CallPath(CallPathRecord {
            ids: vec!["a".to_string()],
        });
        let line = serde_json::to_string(&entry).expect("serialize");
        assert_eq!(line, r#"{"type":"call_path","ids":["a"]}"#);
    }

    #[test]
    fn digest_depends_on_source_boundaries() {
        let joined = source_digest(["ab"]);
        let split = source_digest(["a", "b"]);
        assert_ne!(joined, split);
        assert!(joined.starts_with("sha256:"));
        assert_eq!(joined.len(), "sha256:".len() + 16);
    }
}
