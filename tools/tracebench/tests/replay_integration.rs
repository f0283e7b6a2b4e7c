use serde_json::json;
use std::sync::Arc;
use tracebench::driver::ReplayDriver;
use tracebench::errors::ReplayError;
use tracebench::host::{
    ClockSources, DocumentEvent, FakeClock, FakeHost, HostEnvironment, HostGlobal, HostGlobals,
    ProductionFileSystem,
};
use tracebench::report::{HarnessResult, ReportChannel};
use tracebench::runner::{run_benchmark, BenchmarkReport, RunnerOptions};
use tracebench::script::CallScriptExecutor;
use tracebench::session::{ReplaySession, SessionOptions};
use tracebench::trace::recording::ReplayStep;
use tracebench::trace::{Trace, TraceWriter};
use tracebench::types::{AccessorSupport, ClockKind, ExhaustionPolicy, HostKind};
use tracebench::value::Value;

// ── helpers ───────────────────────────────────────────────────────────────────

fn assign(target: &str, value: serde_json::Value) -> ReplayStep {
    ReplayStep::Assign {
        target: target.to_string(),
        value,
    }
}

fn push_return(stub: &str, value: serde_json::Value) -> ReplayStep {
    ReplayStep::PushReturn {
        stub: stub.to_string(),
        value,
    }
}

fn eval(source: &str) -> ReplayStep {
    ReplayStep::Eval {
        source: source.to_string(),
        scope: None,
    }
}

fn replay(
    host: &HostEnvironment,
    options: SessionOptions,
    writer: TraceWriter,
) -> (ReplaySession, Result<BenchmarkReport, ReplayError>) {
    let trace = writer.into_trace().expect("trace");
    let mut session = ReplaySession::new(host, options).expect("session");
    session.extend_call_path(trace.call_path.iter().cloned());
    let mut driver = ReplayDriver::from_trace(&trace);
    let result = run_benchmark(
        &mut session,
        &mut driver,
        &mut CallScriptExecutor,
        RunnerOptions::default(),
    );
    (session, result)
}

fn foo_and_bar() -> TraceWriter {
    let mut writer = TraceWriter::new("foo-bar");
    writer
        .step(assign("FOO", json!(1)))
        .step(push_return("bar", json!(42)))
        .step(assign("bar", json!({"$stub": "bar"})))
        .end_batch()
        .step(eval("expect FOO == 1; call bar()"))
        .end_batch();
    writer
}

// ── scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn assigned_globals_and_stub_returns_are_visible_to_replayed_code() {
    let fake = FakeHost::default();
    let (session, result) = replay(&fake.harnessed(), SessionOptions::default(), foo_and_bar());

    let report = result.expect("run");
    assert_eq!(report.batches, 2);
    assert_eq!(report.stats.calls, 1);
    assert_eq!(report.stats.mismatches, 0);
    let window = session.window();
    assert_eq!(
        session.heap().data_value(window, "FOO"),
        Some(&Value::Number(1.0))
    );
    assert_eq!(fake.harness.results().len(), 1);
    assert!(!fake.harness.results()[0].error);
}

#[test]
fn second_call_past_the_recording_is_an_error_by_default() {
    let fake = FakeHost::default();
    let mut writer = foo_and_bar();
    writer.step(eval("call bar()")).end_batch();

    let (session, result) = replay(&fake.harnessed(), SessionOptions::default(), writer);
    let err = result.expect_err("exhausted");
    assert_eq!(
        err,
        ReplayError::StubExhausted {
            name: "bar".to_string(),
            calls: 1
        }
    );
    assert!(session.is_finished());
    assert_eq!(
        fake.harness.results(),
        vec![HarnessResult::error(
            "stub bar exhausted after 1 recorded returns"
        )]
    );
}

#[test]
fn second_call_past_the_recording_is_undefined_when_configured() {
    let fake = FakeHost::default();
    let mut writer = foo_and_bar();
    writer
        .step(eval("call bar()"))
        .step(assign("after", json!(true)))
        .end_batch();
    let options = SessionOptions {
        on_exhausted: ExhaustionPolicy::Undefined,
        ..SessionOptions::default()
    };

    let (_, result) = replay(&fake.harnessed(), options, writer);
    assert_eq!(result.expect("run").stats.calls, 2);
}

#[test]
fn headless_host_global_becomes_window() {
    let fake = FakeHost::default();
    let mut globals = HostGlobals::new();
    globals.insert("print".to_string(), HostGlobal::Callable);
    globals.insert("engine".to_string(), HostGlobal::String("d8".to_string()));
    let host = HostEnvironment {
        global: Some(globals),
        ..fake.headless()
    };

    let mut session = ReplaySession::new(&host, SessionOptions::default()).expect("session");
    assert_eq!(session.host_kind(), HostKind::Headless);
    let window = session.window();
    assert_eq!(session.get_path(window, "top"), Ok(Value::Object(window)));
    assert_eq!(session.get_path(window, "window.self"), Ok(Value::Object(window)));
    assert_eq!(session.get_path(window, "engine"), Ok(Value::string("d8")));
    assert!(matches!(
        session.get_path(window, "JSBNG__Date"),
        Ok(Value::Function(_))
    ));
}

#[test]
fn date_now_is_used_when_it_is_the_only_clock() {
    let fake = FakeHost {
        clock: FakeClock::stepping(1_000.0, 2.0),
        ..FakeHost::default()
    };
    let host = fake.headless();
    assert!(host.clocks.performance_now.is_none());

    let (session, result) = replay(&host, SessionOptions::default(), foo_and_bar());
    let report = result.expect("run");
    assert_eq!(session.clock_kind(), ClockKind::DateNow);
    assert_eq!(report.clock, ClockKind::DateNow);
    assert_eq!(report.elapsed_ms, 2.0);
    assert_eq!(fake.console.lines(), vec!["Time: 2ms".to_string()]);
}

#[test]
fn harness_clock_wins_over_everything_else() {
    let fake = FakeHost::default();
    let harness_clock = FakeClock::new(5.0);
    let host = HostEnvironment {
        clocks: ClockSources {
            harness: Some(Arc::new(harness_clock.clone())),
            ..fake.browser().clocks
        },
        ..fake.browser()
    };

    let (session, result) = replay(&host, SessionOptions::default(), TraceWriter::new("empty"));
    result.expect("run");
    assert_eq!(session.clock_kind(), ClockKind::Harness);
    assert_eq!(harness_clock.reads(), 2);
    assert_eq!(fake.clock.reads(), 0);
}

#[test]
fn empty_trace_reports_a_non_negative_time_to_the_document() {
    let fake = FakeHost::default();
    let (_, result) = replay(&fake.browser(), SessionOptions::default(), TraceWriter::new("empty"));
    let report = result.expect("run");

    assert!(report.elapsed_ms >= 0.0);
    assert_eq!(report.batches, 0);
    assert_eq!(report.channel, ReportChannel::Document);
    assert_eq!(
        fake.document.events(),
        vec![DocumentEvent::Banner("Time: 0ms".to_string())]
    );
}

#[test]
fn claim_on_write_accessor_replays_reads_then_keeps_the_written_value() {
    let fake = FakeHost::default();
    let mut writer = TraceWriter::new("cookie");
    writer
        .step(push_return("cookie_get", json!("a=1")))
        .step(push_return("cookie_get", json!("a=1; b=2")))
        .step(ReplayStep::DefineGetter {
            target: "JSBNG__document.cookie".to_string(),
            getter: "cookie_get".to_string(),
            setter: None,
            claim_on_write: true,
        })
        .end_batch()
        .step(eval(
            "expect JSBNG__document.cookie == \"a=1\"\n\
             expect JSBNG__document.cookie == \"a=1; b=2\"\n\
             set JSBNG__document.cookie = \"mine\"\n\
             expect JSBNG__document.cookie == \"mine\"\n\
             expect JSBNG__document.cookie == \"mine\"",
        ))
        .end_batch();

    let (_, result) = replay(&fake.harnessed(), SessionOptions::default(), writer);
    let report = result.expect("run");
    assert_eq!(report.stats.getter_reads, 2);
    assert_eq!(report.stats.claims, 1);
}

#[test]
fn legacy_accessor_hosts_still_support_getters() {
    let fake = FakeHost::default();
    let host = HostEnvironment {
        accessors: AccessorSupport::Legacy,
        ..fake.headless()
    };
    let mut writer = TraceWriter::new("legacy");
    writer
        .step(push_return("w", json!(800)))
        .step(ReplayStep::DefineGetter {
            target: "JSBNG__screen.width".to_string(),
            getter: "w".to_string(),
            setter: None,
            claim_on_write: false,
        })
        .end_batch()
        .step(eval("expect JSBNG__screen.width == 800"))
        .end_batch();

    let (_, result) = replay(&host, SessionOptions::default(), writer);
    assert_eq!(result.expect("run").stats.getter_reads, 1);
}

#[test]
fn getters_on_hosts_without_accessor_support_fail_with_a_reported_error() {
    let fake = FakeHost::default();
    let host = HostEnvironment {
        accessors: AccessorSupport::Unavailable,
        ..fake.harnessed()
    };
    let mut writer = TraceWriter::new("no-getters");
    writer
        .step(ReplayStep::DefineGetter {
            target: "JSBNG__document.body".to_string(),
            getter: "body".to_string(),
            setter: None,
            claim_on_write: true,
        })
        .end_batch();

    let (_, result) = replay(&host, SessionOptions::default(), writer);
    assert!(result.expect_err("no getters").is_reported());
    let results = fake.harness.results();
    assert_eq!(results.len(), 1);
    assert!(results[0]
        .msg
        .as_deref()
        .unwrap_or_default()
        .contains("cannot define them"));
}

#[test]
fn call_path_mismatch_names_both_ids() {
    let fake = FakeHost::default();
    let mut writer = TraceWriter::new("path");
    writer
        .call_path(["a", "b", "c"])
        .step(eval("path a; path b; path x"))
        .end_batch();

    let (_, result) = replay(&fake.harnessed(), SessionOptions::default(), writer);
    let err = result.expect_err("mismatch");
    assert_eq!(
        err,
        ReplayError::Verification("call path mismatch: expected c, found x".to_string())
    );
    assert_eq!(fake.harness.results().len(), 1);
}

#[test]
fn trace_files_round_trip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("traces/foo-bar.jsonl");
    let fs = ProductionFileSystem;
    foo_and_bar().write(&fs, &path).expect("write");

    let trace = Trace::load(&fs, &path).expect("load");
    assert_eq!(trace.header.name, "foo-bar");
    assert_eq!(trace.batch_count(), 2);
    assert_eq!(trace.summary().evals, 1);

    let fake = FakeHost::default();
    let mut session =
        ReplaySession::new(&fake.headless(), SessionOptions::default()).expect("session");
    let mut driver = ReplayDriver::from_trace(&trace);
    run_benchmark(
        &mut session,
        &mut driver,
        &mut CallScriptExecutor,
        RunnerOptions { warmup: false },
    )
    .expect("run");
    assert_eq!(fake.console.lines(), vec!["Time: 0ms".to_string()]);
}
