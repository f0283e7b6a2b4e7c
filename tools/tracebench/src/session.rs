//! The replay session: every piece of mutable replay state for one run.

use crate::accessors::{select_installer, AccessorSpec, PropertyAccessorInstaller};
use crate::config::AppConfig;
use crate::environment::{detect_host, install_window, select_clock};
use crate::errors::ReplayError;
use crate::heap::{Heap, Property};
use crate::host::{Clock, HostEnvironment};
use crate::logging::append_run_log;
use crate::report::{ReportChannel, Reporter};
use crate::stub::{CallRecord, StubTable};
use crate::types::{ClockKind, ExhaustionPolicy, HostKind, VerificationPolicy};
use crate::value::{ObjectId, StubId, Value};
use crate::verify::{check_call, is_unverified_property, unknown_sentinel, verify, CallPath};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub policy: VerificationPolicy,
    pub verify_calls: bool,
    pub on_exhausted: ExhaustionPolicy,
    /// Pins the clock instead of taking the best one available.
    pub clock: Option<ClockKind>,
    /// Overrides host detection.
    pub host_kind: Option<HostKind>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: VerificationPolicy::Report,
            verify_calls: true,
            on_exhausted: ExhaustionPolicy::Error,
            clock: None,
            host_kind: None,
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            policy: config.verification.policy,
            verify_calls: config.verification.verify_calls,
            on_exhausted: config.stubs.on_exhausted,
            clock: config.host.clock,
            host_kind: config.host.kind,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub calls: usize,
    pub constructs: usize,
    pub getter_reads: usize,
    pub setter_writes: usize,
    pub claims: usize,
    pub evals: usize,
    pub path_checks: usize,
    pub mismatches: usize,
}

pub struct ReplaySession {
    heap: Heap,
    stubs: StubTable,
    call_path: CallPath,
    reporter: Reporter,
    installer: Box<dyn PropertyAccessorInstaller>,
    clock: Arc<dyn Clock>,
    clock_kind: ClockKind,
    host_kind: HostKind,
    window: ObjectId,
    options: SessionOptions,
    stats: SessionStats,
}

impl ReplaySession {
    pub fn new(host: &HostEnvironment, options: SessionOptions) -> Result<Self, ReplayError> {
        let host_kind = options
            .host_kind
            .unwrap_or_else(|| detect_host(&host.capabilities()));
        let sources = match options.clock {
            Some(kind) => host.clocks.only(kind),
            None => host.clocks.clone(),
        };
        let (clock_kind, clock) = select_clock(&sources)?;
        let installer = select_installer(host.accessors);

        let mut heap = Heap::new();
        let mut stubs = StubTable::new();
        let window = install_window(&mut heap, &mut stubs, host_kind, host.global.as_ref());

        append_run_log(
            "info",
            "replay.session.created",
            json!({
                "host": host_kind.as_str(),
                "clock": clock_kind.as_str(),
                "accessors": installer.support().as_str(),
                "policy": options.policy.as_str(),
                "on_exhausted": options.on_exhausted.as_str()
            }),
        );

        Ok(Self {
            heap,
            stubs,
            call_path: CallPath::default(),
            reporter: Reporter::from_host(host),
            installer,
            clock,
            clock_kind,
            host_kind,
            window,
            options,
            stats: SessionStats::default(),
        })
    }

    pub fn window(&self) -> ObjectId {
        self.window
    }

    pub fn host_kind(&self) -> HostKind {
        self.host_kind
    }

    pub fn clock_kind(&self) -> ClockKind {
        self.clock_kind
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn stubs(&self) -> &StubTable {
        &self.stubs
    }

    pub fn current_time_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn record_eval(&mut self) {
        self.stats.evals += 1;
    }

    // ── lifecycle and reporting ──────────────────────────────────────────────

    pub fn is_finished(&self) -> bool {
        self.reporter.is_finished()
    }

    pub fn finish(&mut self) {
        self.reporter.finish();
    }

    pub fn report_time(&mut self, time_ms: f64) -> Result<ReportChannel, ReplayError> {
        self.reporter.report_time(time_ms)
    }

    pub fn report_error(&mut self, msg: &str) -> Result<ReportChannel, ReplayError> {
        self.reporter.report_error(msg)
    }

    // ── paths and properties ─────────────────────────────────────────────────

    /// Resolves every segment but the last and returns the owning object
    /// with the final property name. The first segment is looked up in
    /// `scope`, then in `window`.
    pub fn resolve_owner<'p>(
        &mut self,
        scope: ObjectId,
        path: &'p str,
    ) -> Result<(ObjectId, &'p str), ReplayError> {
        let segments: Vec<&'p str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(ReplayError::UnknownPath(path.to_string()));
        }
        let Some((last, parents)) = segments.split_last() else {
            return Err(ReplayError::UnknownPath(path.to_string()));
        };
        let first = parents.first().copied().unwrap_or(*last);
        let mut owner = if self.heap.has_property(scope, first) || scope == self.window {
            scope
        } else {
            self.window
        };
        for (idx, segment) in parents.iter().enumerate() {
            if !self.heap.has_property(owner, segment) {
                return Err(ReplayError::UnknownPath(segments[..=idx].join(".")));
            }
            let value = self.get_property(owner, segment)?;
            owner = value
                .as_object()
                .ok_or_else(|| ReplayError::NotAnObject(segments[..=idx].join(".")))?;
        }
        Ok((owner, *last))
    }

    pub fn get_path(&mut self, scope: ObjectId, path: &str) -> Result<Value, ReplayError> {
        let (owner, prop) = self.resolve_owner(scope, path)?;
        self.get_property(owner, prop)
    }

    pub fn set_path(&mut self, scope: ObjectId, path: &str, value: Value) -> Result<(), ReplayError> {
        let (owner, prop) = self.resolve_owner(scope, path)?;
        self.set_property(owner, prop, value)
    }

    /// Property read. Accessors call their getter stub with `(prop)`.
    pub fn get_property(&mut self, object: ObjectId, prop: &str) -> Result<Value, ReplayError> {
        match self.heap.property(object, prop).cloned() {
            None => Ok(Value::Undefined),
            Some(Property::Data { value, .. }) => Ok(value),
            Some(Property::Accessor(binding)) => {
                self.stats.getter_reads += 1;
                self.invoke_stub(
                    binding.getter,
                    Value::Object(object),
                    vec![Value::string(prop)],
                    true,
                )
            }
        }
    }

    /// Property write. A claim-on-write accessor calls its setter once and
    /// then becomes a plain writable, enumerable data property.
    pub fn set_property(
        &mut self,
        object: ObjectId,
        prop: &str,
        value: Value,
    ) -> Result<(), ReplayError> {
        match self.heap.property(object, prop).cloned() {
            Some(Property::Accessor(binding)) => {
                if let Some(setter) = binding.setter {
                    self.stats.setter_writes += 1;
                    self.invoke_setter(setter, object, prop, &value)?;
                }
                if binding.claim_on_write {
                    self.stats.claims += 1;
                    self.heap.define(object, prop, Property::data(value));
                }
                Ok(())
            }
            // Non-writable data properties ignore writes, as in sloppy-mode JS.
            Some(Property::Data {
                writable: false, ..
            }) => Ok(()),
            Some(Property::Data { enumerable, .. }) => {
                self.heap.define(
                    object,
                    prop,
                    Property::Data {
                        value,
                        writable: true,
                        enumerable,
                    },
                );
                Ok(())
            }
            None => {
                self.heap.set_data(object, prop, value);
                Ok(())
            }
        }
    }

    // ── stubs ────────────────────────────────────────────────────────────────

    pub fn stub(&mut self, name: &str) -> StubId {
        self.stubs.get_or_create(name)
    }

    pub fn push_return(&mut self, name: &str, value: Value) -> StubId {
        self.stubs.push_return(name, value)
    }

    pub fn push_call(&mut self, name: &str, record: CallRecord, value: Value) -> StubId {
        self.stubs.push_call(name, record, value)
    }

    /// Calls a stub: verifies the call against its recording when one
    /// exists, then yields the next recorded return.
    pub fn invoke_stub(
        &mut self,
        id: StubId,
        this: Value,
        args: Vec<Value>,
        is_call: bool,
    ) -> Result<Value, ReplayError> {
        if is_call {
            self.stats.calls += 1;
        } else {
            self.stats.constructs += 1;
        }
        if self.options.verify_calls {
            self.verify_call(id, is_call, &this, &args)?;
        }
        let on_exhausted = self.options.on_exhausted;
        let stub = self
            .stubs
            .get_mut(id)
            .ok_or_else(|| ReplayError::NotCallable(format!("stub #{}", id.index())))?;
        match stub.invoke() {
            Err(ReplayError::StubExhausted { .. }) if on_exhausted == ExhaustionPolicy::Undefined => {
                Ok(Value::Undefined)
            }
            other => other,
        }
    }

    /// Setter returns are discarded, so a setter stub with nothing left to
    /// return is not an error.
    fn invoke_setter(
        &mut self,
        setter: StubId,
        object: ObjectId,
        prop: &str,
        value: &Value,
    ) -> Result<(), ReplayError> {
        let args = vec![Value::string(prop), value.clone()];
        if self.options.verify_calls {
            self.verify_call(setter, true, &Value::Object(object), &args)?;
        }
        if let Some(stub) = self.stubs.get_mut(setter) {
            if stub.returns.remaining() > 0 {
                stub.invoke()?;
            }
        }
        Ok(())
    }

    // ── verification ─────────────────────────────────────────────────────────

    /// Checks a live call against the record paired with the stub's next
    /// return, if that return was recorded with one.
    pub fn verify_call(
        &mut self,
        id: StubId,
        is_call: bool,
        this: &Value,
        args: &[Value],
    ) -> Result<(), ReplayError> {
        let Some(stub) = self.stubs.get(id) else {
            return Ok(());
        };
        let Some(record) = stub.next_call_record() else {
            return Ok(());
        };
        let Some(msg) = check_call(&self.heap, &stub.name, record, is_call, this, args) else {
            return Ok(());
        };
        match self.options.policy {
            VerificationPolicy::Report => {
                self.deliver_verification(&msg)?;
                Ok(())
            }
            VerificationPolicy::Strict => self.verification_error(&msg),
        }
    }

    /// Compares `obj[prop]` with the recorded value. Event handler
    /// properties (`on*`) are never compared.
    pub fn verify_set(
        &mut self,
        obj_name: &str,
        object: ObjectId,
        prop: &str,
        expected_str: &str,
        expected: &Value,
    ) -> Result<(), ReplayError> {
        if is_unverified_property(prop) {
            return Ok(());
        }
        let actual = self.get_property(object, prop)?;
        if verify(&self.heap, &actual, expected) {
            return Ok(());
        }
        self.verification_error(&format!(
            "{obj_name}.{prop}: expected {expected_str}, found {actual}"
        ))
    }

    pub fn extend_call_path<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.call_path.extend(ids);
    }

    pub fn pending_call_path(&self) -> usize {
        self.call_path.remaining()
    }

    pub fn verify_path(&mut self, id: &str) -> Result<(), ReplayError> {
        self.stats.path_checks += 1;
        match self.call_path.check(id) {
            Ok(()) => Ok(()),
            Err(msg) => self.verification_error(&msg),
        }
    }

    /// Reports `msg` and aborts the current step. Once the benchmark has
    /// finished this does nothing.
    pub fn verification_error(&mut self, msg: &str) -> Result<(), ReplayError> {
        if self.deliver_verification(msg)? {
            return Err(ReplayError::Verification(msg.to_string()));
        }
        Ok(())
    }

    fn deliver_verification(&mut self, msg: &str) -> Result<bool, ReplayError> {
        if self.reporter.is_finished() {
            return Ok(false);
        }
        self.stats.mismatches += 1;
        append_run_log(
            "warn",
            "replay.verification.failed",
            json!({ "message": msg, "policy": self.options.policy.as_str() }),
        );
        self.reporter.report_error(msg)?;
        Ok(true)
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn define_getter(
        &mut self,
        object: ObjectId,
        prop: &str,
        getter: &str,
        setter: Option<&str>,
    ) -> Result<(), ReplayError> {
        self.install_accessor(object, prop, getter, setter, false)
    }

    /// Installs an accessor that turns into a data property on first write.
    pub fn define_regetter(
        &mut self,
        object: ObjectId,
        prop: &str,
        getter: &str,
        setter: Option<&str>,
    ) -> Result<(), ReplayError> {
        self.install_accessor(object, prop, getter, setter, true)
    }

    fn install_accessor(
        &mut self,
        object: ObjectId,
        prop: &str,
        getter: &str,
        setter: Option<&str>,
        claim_on_write: bool,
    ) -> Result<(), ReplayError> {
        let getter = self.stubs.get_or_create(getter);
        let setter = setter.map(|name| self.stubs.get_or_create(name));
        let spec = AccessorSpec {
            getter,
            setter,
            claim_on_write,
        };
        match self.installer.install(&mut self.heap, object, prop, spec) {
            Ok(()) => Ok(()),
            Err(msg) => self.verification_error(&msg),
        }
    }

    // ── trace values ─────────────────────────────────────────────────────────

    /// Turns a trace JSON value into a live one, allocating objects for
    /// JSON objects and arrays and expanding `$`-escapes.
    pub fn materialize(&mut self, value: &serde_json::Value) -> Result<Value, ReplayError> {
        use serde_json::Value as Json;
        match value {
            Json::Array(items) => {
                let object = self.heap.alloc();
                for (idx, item) in items.iter().enumerate() {
                    let item = self.materialize(item)?;
                    self.heap.set_data(object, &idx.to_string(), item);
                }
                self.heap
                    .set_data(object, "length", Value::Number(items.len() as f64));
                Ok(Value::Object(object))
            }
            Json::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        if let Some(value) = self.materialize_escape(key, inner)? {
                            return Ok(value);
                        }
                    }
                }
                let object = self.heap.alloc();
                for (key, item) in map {
                    let item = self.materialize(item)?;
                    self.heap.set_data(object, key, item);
                }
                Ok(Value::Object(object))
            }
            literal => Value::from_json_literal(literal)
                .ok_or_else(|| ReplayError::TraceParse(format!("unsupported value {literal}"))),
        }
    }

    fn materialize_escape(
        &mut self,
        key: &str,
        inner: &serde_json::Value,
    ) -> Result<Option<Value>, ReplayError> {
        let text = || {
            inner
                .as_str()
                .ok_or_else(|| ReplayError::TraceParse(format!("{key} expects a string")))
        };
        let value = match key {
            "$undefined" => Value::Undefined,
            "$nan" => Value::Number(f64::NAN),
            "$ref" => {
                let path = text()?;
                self.get_path(self.window, path)?
            }
            "$stub" => Value::Function(self.stubs.get_or_create(text()?)),
            "$unknown" => {
                let object = self.heap.alloc();
                self.heap
                    .set_data(object, &unknown_sentinel(text()?), Value::Bool(true));
                Value::Object(object)
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}
