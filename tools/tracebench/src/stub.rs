//! Recorded stubs: functions that hand back pre-recorded values in order.

use crate::errors::ReplayError;
use crate::value::{StubId, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StubExhausted {
    pub recorded: usize,
}

/// An ordered queue of recorded values plus a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStub<T> {
    returns: Vec<T>,
    inst: usize,
}

impl<T> Default for RecordedStub<T> {
    fn default() -> Self {
        Self {
            returns: Vec::new(),
            inst: 0,
        }
    }
}

impl<T: Clone> RecordedStub<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, value: T) {
        self.returns.push(value);
    }

    pub fn invoke(&mut self) -> Result<T, StubExhausted> {
        let value = self.returns.get(self.inst).cloned().ok_or(StubExhausted {
            recorded: self.returns.len(),
        })?;
        self.inst += 1;
        Ok(value)
    }

    pub fn cursor(&self) -> usize {
        self.inst
    }

    pub fn recorded(&self) -> usize {
        self.returns.len()
    }

    pub fn remaining(&self) -> usize {
        self.returns.len().saturating_sub(self.inst)
    }

    pub fn rewind(&mut self) {
        self.inst = 0;
    }
}

/// Arguments a call was recorded with. Slot `n` of a stub's call records
/// belongs to its `n`th recorded return.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub this: Option<Value>,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct ReplayStub {
    pub name: String,
    pub returns: RecordedStub<Value>,
    calls: Vec<Option<CallRecord>>,
}

impl ReplayStub {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            returns: RecordedStub::new(),
            calls: Vec::new(),
        }
    }

    pub fn invoke(&mut self) -> Result<Value, ReplayError> {
        self.returns
            .invoke()
            .map_err(|exhausted| ReplayError::StubExhausted {
                name: self.name.clone(),
                calls: exhausted.recorded,
            })
    }

    pub fn record(&mut self, value: Value, call: Option<CallRecord>) {
        self.returns.record(value);
        self.calls.push(call);
    }

    /// The call record paired with the return the next invocation yields.
    pub fn next_call_record(&self) -> Option<&CallRecord> {
        self.calls.get(self.returns.cursor())?.as_ref()
    }

    pub fn has_call_records(&self) -> bool {
        self.calls.iter().any(Option::is_some)
    }
}

/// Stub factory: every intercepted function in a session is created here.
#[derive(Debug, Clone, Default)]
pub struct StubTable {
    stubs: Vec<ReplayStub>,
    by_name: HashMap<String, StubId>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, name: &str) -> StubId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        self.stubs.push(ReplayStub::new(name));
        let id = StubId(self.stubs.len() - 1);
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<StubId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: StubId) -> Option<&ReplayStub> {
        self.stubs.get(id.0)
    }

    pub fn get_mut(&mut self, id: StubId) -> Option<&mut ReplayStub> {
        self.stubs.get_mut(id.0)
    }

    pub fn push_return(&mut self, name: &str, value: Value) -> StubId {
        let id = self.get_or_create(name);
        if let Some(stub) = self.stubs.get_mut(id.0) {
            stub.record(value, None);
        }
        id
    }

    pub fn push_call(&mut self, name: &str, record: CallRecord, value: Value) -> StubId {
        let id = self.get_or_create(name);
        if let Some(stub) = self.stubs.get_mut(id.0) {
            stub.record(value, Some(record));
        }
        id
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplayStub> {
        self.stubs.iter()
    }

    pub fn pending_returns(&self) -> usize {
        self.stubs.iter().map(|stub| stub.returns.remaining()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::{CallRecord, RecordedStub, StubTable};
    use crate::errors::ReplayError;
    use crate::value::Value;

    #[test]
    fn recorded_stub_yields_in_order_then_errors() {
        let mut stub = RecordedStub::new();
        stub.record(1);
        stub.record(2);
        assert_eq!(stub.invoke(), Ok(1));
        assert_eq!(stub.invoke(), Ok(2));
        let err = stub.invoke().expect_err("exhausted");
        assert_eq!(err.recorded, 2);
        assert_eq!(stub.cursor(), 2);
    }

    #[test]
    fn rewind_replays_from_the_start() {
        let mut stub = RecordedStub::new();
        stub.record("a");
        assert_eq!(stub.invoke(), Ok("a"));
        assert_eq!(stub.remaining(), 0);
        stub.rewind();
        assert_eq!(stub.remaining(), 1);
        assert_eq!(stub.invoke(), Ok("a"));
    }

    #[test]
    fn table_reuses_ids_by_name() {
        let mut table = StubTable::new();
        let a = table.get_or_create("f1");
        let b = table.push_return("f1", Value::Number(3.0));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
        assert_eq!(table.pending_returns(), 1);
    }

    #[test]
    fn exhausted_replay_stub_names_itself() {
        let mut table = StubTable::new();
        let id = table.push_call(
            "xhr_open",
            CallRecord {
                this: None,
                args: vec![Value::string("GET")],
            },
            Value::Undefined,
        );
        let stub = table.get_mut(id).expect("stub");
        assert!(stub.has_call_records());
        assert_eq!(stub.invoke(), Ok(Value::Undefined));
        let err = stub.invoke().expect_err("exhausted");
        assert!(matches!(err, ReplayError::StubExhausted { name, calls: 1 } if name == "xhr_open"));
    }

    #[test]
    fn call_records_follow_the_return_cursor() {
        let mut table = StubTable::new();
        table.push_return("f", Value::Number(1.0));
        let id = table.push_call(
            "f",
            CallRecord {
                this: None,
                args: vec![Value::string("x")],
            },
            Value::Number(2.0),
        );
        let stub = table.get_mut(id).expect("stub");
        assert!(stub.has_call_records());

        assert_eq!(stub.next_call_record(), None);
        assert_eq!(stub.invoke(), Ok(Value::Number(1.0)));
        assert_eq!(
            stub.next_call_record().map(|record| record.args.clone()),
            Some(vec![Value::string("x")])
        );
        assert_eq!(stub.invoke(), Ok(Value::Number(2.0)));
        assert_eq!(stub.next_call_record(), None);
    }
}
