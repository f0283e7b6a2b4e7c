use crate::driver::{DriverStep, ReplayDriver};
use crate::errors::ReplayError;
use crate::logging::append_run_log;
use crate::report::ReportChannel;
use crate::script::ScriptExecutor;
use crate::session::{ReplaySession, SessionStats};
use crate::types::ClockKind;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    pub warmup: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self { warmup: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    pub elapsed_ms: f64,
    pub batches: usize,
    pub steps: usize,
    #[serde(skip)]
    pub channel: ReportChannel,
    pub clock: ClockKind,
    pub stats: SessionStats,
}

/// Warm-up, then the timed loop, then result reporting.
///
/// Errors are reported through the host's result chain before they are
/// returned, unless `verification_error` already delivered them.
pub fn run_benchmark(
    session: &mut ReplaySession,
    driver: &mut ReplayDriver,
    executor: &mut dyn ScriptExecutor,
    options: RunnerOptions,
) -> Result<BenchmarkReport, ReplayError> {
    append_run_log(
        "info",
        "replay.run.started",
        json!({
            "batches": driver.batch_count(),
            "warmup": options.warmup,
            "clock": session.clock_kind().as_str()
        }),
    );
    match timed_run(session, driver, executor, options) {
        Ok(elapsed_ms) => {
            session.finish();
            let channel = session.report_time(elapsed_ms)?;
            let report = BenchmarkReport {
                elapsed_ms,
                batches: driver.cursor(),
                steps: driver.steps_executed(),
                channel,
                clock: session.clock_kind(),
                stats: session.stats(),
            };
            append_run_log(
                "info",
                "replay.run.completed",
                json!({
                    "elapsed_ms": elapsed_ms,
                    "batches": report.batches,
                    "steps": report.steps,
                    "stats": report.stats
                }),
            );
            Ok(report)
        }
        Err(err) => {
            session.finish();
            let report_failure = if err.is_reported() {
                None
            } else {
                session.report_error(&err.to_string()).err()
            };
            append_run_log(
                "error",
                "replay.run.failed",
                json!({
                    "error": err.to_string(),
                    "batch": driver.cursor(),
                    "phase": driver.phase().as_str(),
                    "report_error": report_failure.map(|e| e.to_string())
                }),
            );
            Err(err)
        }
    }
}

fn timed_run(
    session: &mut ReplaySession,
    driver: &mut ReplayDriver,
    executor: &mut dyn ScriptExecutor,
    options: RunnerOptions,
) -> Result<f64, ReplayError> {
    if options.warmup {
        driver.invoke(session, executor, false)?;
        append_run_log("debug", "replay.warmup.completed", json!({}));
    }
    let start = session.current_time_ms();
    while driver.invoke(session, executor, true)? == DriverStep::Continue {}
    let end = session.current_time_ms();
    Ok((end - start).max(0.0))
}
