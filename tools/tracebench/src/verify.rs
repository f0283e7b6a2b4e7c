//! Comparison of replayed values against recorded ones.

use crate::heap::Heap;
use crate::stub::CallRecord;
use crate::value::Value;
use std::collections::VecDeque;

/// Recorded objects carrying `__JSBNG_unknown_<type>` stand for values the
/// recorder could not capture; any replayed value of that type matches.
pub const UNKNOWN_SENTINEL_PREFIX: &str = "__JSBNG_unknown_";

pub fn unknown_sentinel(type_name: &str) -> String {
    format!("{UNKNOWN_SENTINEL_PREFIX}{type_name}")
}

pub fn verify(heap: &Heap, replayed: &Value, recorded: &Value) -> bool {
    if replayed.strict_equals(recorded) {
        return true;
    }
    if replayed.is_nan() && recorded.is_nan() {
        return true;
    }
    // Function identity differs between record and replay.
    if replayed.is_function() && recorded.is_function() {
        return true;
    }
    match recorded {
        Value::Object(id) => heap.has_property(*id, &unknown_sentinel(replayed.type_of())),
        _ => false,
    }
}

/// Compares a live call against its recording. Returns `None` when it
/// matches, else a description of every difference.
pub fn check_call(
    heap: &Heap,
    name: &str,
    record: &CallRecord,
    is_call: bool,
    this: &Value,
    args: &[Value],
) -> Option<String> {
    if args.len() != record.args.len() {
        return Some(format!(
            "call {name}: expected {} arguments, found {}",
            record.args.len(),
            args.len()
        ));
    }
    let mut problems = Vec::new();
    if is_call {
        let recorded_this = record.this.clone().unwrap_or_default();
        if !verify(heap, this, &recorded_this) {
            problems.push(format!("this: expected {recorded_this}, found {this}"));
        }
    }
    for (idx, (replayed, recorded)) in args.iter().zip(&record.args).enumerate() {
        if !verify(heap, replayed, recorded) {
            problems.push(format!("argument {idx}: expected {recorded}, found {replayed}"));
        }
    }
    if problems.is_empty() {
        None
    } else {
        Some(format!("call {name}: {}", problems.join("; ")))
    }
}

/// Property names whose values are not compared; event handlers are
/// instrumented differently at record time.
pub fn is_unverified_property(prop: &str) -> bool {
    prop.starts_with("on")
}

/// The recorded order of tracked call ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPath {
    expected: VecDeque<String>,
}

impl CallPath {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            expected: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected.extend(ids.into_iter().map(Into::into));
    }

    pub fn remaining(&self) -> usize {
        self.expected.len()
    }

    /// Consumes the next expected id.
    pub fn check(&mut self, found: &str) -> Result<(), String> {
        match self.expected.pop_front() {
            Some(expected) if expected == found => Ok(()),
            Some(expected) => Err(format!(
                "call path mismatch: expected {expected}, found {found}"
            )),
            None => Err(format!(
                "call path mismatch: expected end of path, found {found}"
            )),
        }
    }
}
