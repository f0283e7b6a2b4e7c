pub mod accessors;
pub mod config;
pub mod driver;
pub mod environment;
pub mod errors;
pub mod heap;
pub mod host;
pub mod log_retention;
pub mod logging;
pub mod report;
pub mod runner;
pub mod script;
pub mod session;
pub mod stub;
pub mod trace;
pub mod types;
pub mod value;
pub mod verify;

use clap::{error::ErrorKind, CommandFactory, Parser, ValueEnum};
use config::{load_config, CliOverrides};
use driver::ReplayDriver;
use errors::ReplayError;
use host::{Console, HostEnvironment, JsonLineHarness, StdoutConsole};
use logging::{clear_run_logger, init_run_logger, structured_fallback_line, JsonlLogger};
use runner::{run_benchmark, RunnerOptions};
use script::CallScriptExecutor;
use session::{ReplaySession, SessionOptions};
use std::sync::Arc;
use trace::Trace;
use types::{ExhaustionPolicy, VerificationPolicy};

#[derive(Debug, Clone, Parser)]
#[command(name = "tracebench")]
#[command(about = "Replays a recorded web benchmark trace and times it")]
#[command(version)]
pub struct Cli {
    #[arg(long)]
    pub trace: Option<std::path::PathBuf>,
    #[arg(long)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long, value_enum)]
    pub policy: Option<CliPolicy>,
    #[arg(long, value_enum)]
    pub on_exhausted: Option<CliExhaustion>,
    #[arg(long)]
    pub run_log: Option<std::path::PathBuf>,
    #[arg(long, default_value_t = false)]
    pub summary_only: bool,
    #[arg(long, default_value_t = false)]
    pub harness_json: bool,
    #[arg(long, default_value_t = false)]
    pub no_warmup: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliPolicy {
    Report,
    Strict,
}

impl From<CliPolicy> for VerificationPolicy {
    fn from(value: CliPolicy) -> Self {
        match value {
            CliPolicy::Report => VerificationPolicy::Report,
            CliPolicy::Strict => VerificationPolicy::Strict,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliExhaustion {
    Error,
    Undefined,
}

impl From<CliExhaustion> for ExhaustionPolicy {
    fn from(value: CliExhaustion) -> Self {
        match value {
            CliExhaustion::Error => ExhaustionPolicy::Error,
            CliExhaustion::Undefined => ExhaustionPolicy::Undefined,
        }
    }
}

pub fn run() -> Result<i32, ReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ReplayError::Io(e.to_string()))?;
    let host = HostEnvironment::production();
    run_with_host(&args, &cwd, &host)
}

pub fn run_with_host(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    host: &HostEnvironment,
) -> Result<i32, ReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(ReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        trace: cli.trace.clone(),
        policy: cli.policy.map(Into::into),
        on_exhausted: cli.on_exhausted.map(Into::into),
        run_log: cli.run_log.clone(),
        no_warmup: cli.no_warmup,
    };
    let cfg = load_config(&overrides, cwd, host.file_system.as_ref())?;

    if let Some(path) = &cfg.logging.run_log {
        init_run_logger(JsonlLogger {
            path: path.clone(),
            max_payload_bytes: cfg.logging.max_payload_bytes,
            budget_bytes: cfg.logging.budget_bytes,
        })?;
    }

    let result = replay(&cli, &cfg, host);
    clear_run_logger();
    result
}

fn replay(
    cli: &Cli,
    cfg: &config::AppConfig,
    host: &HostEnvironment,
) -> Result<i32, ReplayError> {
    let trace_path = cfg.replay.trace.clone().ok_or_else(|| {
        ReplayError::Cli("a trace is required: pass --trace or set [replay] trace".to_string())
    })?;
    if !host.file_system.exists(&trace_path) {
        return Err(ReplayError::Io(format!(
            "trace not found: {}",
            trace_path.display()
        )));
    }
    let trace = Trace::load(host.file_system.as_ref(), &trace_path)?;
    let out = output_sink(host);

    if cli.summary_only {
        let summary = trace.summary();
        let line = serde_json::to_string(&summary).map_err(|e| ReplayError::Io(e.to_string()))?;
        out.log(&line)?;
        return Ok(0);
    }

    let mut host = host.clone();
    if cli.harness_json {
        host.harness = Some(Arc::new(JsonLineHarness::new(Arc::clone(&out))));
    }
    if let Some(accessors) = cfg.host.accessors {
        host.accessors = accessors;
    }

    let mut session = ReplaySession::new(&host, SessionOptions::from_config(cfg))?;
    session.extend_call_path(trace.call_path.iter().cloned());
    let mut driver = ReplayDriver::from_trace(&trace);
    let report = run_benchmark(
        &mut session,
        &mut driver,
        &mut CallScriptExecutor,
        RunnerOptions {
            warmup: cfg.runner.warmup,
        },
    )?;

    if session.pending_call_path() > 0 {
        out.log(&structured_fallback_line(
            &trace.header.name,
            "done",
            &format!(
                "{} call path ids were never reached",
                session.pending_call_path()
            ),
        ))?;
    }
    if !cli.harness_json {
        let stats = serde_json::to_string(&report).map_err(|e| ReplayError::Io(e.to_string()))?;
        out.log(&structured_fallback_line(&trace.header.name, "done", &stats))?;
    }
    Ok(0)
}

/// Where CLI-level lines go: the host's print, then its console, then stdout.
fn output_sink(host: &HostEnvironment) -> Arc<dyn Console> {
    host.print
        .clone()
        .or_else(|| host.console.clone())
        .unwrap_or_else(|| Arc::new(StdoutConsole))
}

pub fn render_help() -> String {
    let mut cmd = Cli::command();
    cmd.render_long_help().to_string()
}
