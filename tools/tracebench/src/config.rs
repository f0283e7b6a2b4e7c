use crate::errors::ReplayError;
use crate::host::FileSystem;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::types::{AccessorSupport, ClockKind, ExhaustionPolicy, HostKind, VerificationPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub trace: Option<PathBuf>,
    pub policy: Option<VerificationPolicy>,
    pub on_exhausted: Option<ExhaustionPolicy>,
    pub run_log: Option<PathBuf>,
    pub no_warmup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub replay: ReplayConfig,
    pub verification: VerificationConfig,
    pub stubs: StubsConfig,
    pub runner: RunnerConfig,
    pub host: HostConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    pub trace: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationConfig {
    pub policy: VerificationPolicy,
    pub verify_calls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StubsConfig {
    pub on_exhausted: ExhaustionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunnerConfig {
    pub warmup: bool,
}

/// Overrides for what the host would otherwise report about itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostConfig {
    pub kind: Option<HostKind>,
    pub accessors: Option<AccessorSupport>,
    pub clock: Option<ClockKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            replay: ReplayConfig { trace: None },
            verification: VerificationConfig {
                policy: VerificationPolicy::Report,
                verify_calls: true,
            },
            stubs: StubsConfig {
                on_exhausted: ExhaustionPolicy::Error,
            },
            runner: RunnerConfig { warmup: true },
            host: HostConfig {
                kind: None,
                accessors: None,
                clock: None,
            },
            logging: LoggingConfig {
                run_log: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    replay: Option<PartialReplayConfig>,
    verification: Option<PartialVerificationConfig>,
    stubs: Option<PartialStubsConfig>,
    runner: Option<PartialRunnerConfig>,
    host: Option<PartialHostConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReplayConfig {
    trace: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialVerificationConfig {
    policy: Option<VerificationPolicy>,
    verify_calls: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialStubsConfig {
    on_exhausted: Option<ExhaustionPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRunnerConfig {
    warmup: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialHostConfig {
    kind: Option<HostKind>,
    accessors: Option<AccessorSupport>,
    clock: Option<ClockKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    run_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, ReplayError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = fs.read_to_string(path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| ReplayError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    cfg.replay.trace = cfg
        .replay
        .trace
        .map(|path| absolutize_path(process_cwd, &path));
    cfg.logging.run_log = cfg
        .logging
        .run_log
        .map(|path| absolutize_path(process_cwd, &path));

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(replay) = partial.replay {
        if let Some(trace) = replay.trace {
            cfg.replay.trace = Some(trace);
        }
    }

    if let Some(verification) = partial.verification {
        if let Some(policy) = verification.policy {
            cfg.verification.policy = policy;
        }
        if let Some(verify_calls) = verification.verify_calls {
            cfg.verification.verify_calls = verify_calls;
        }
    }

    if let Some(stubs) = partial.stubs {
        if let Some(on_exhausted) = stubs.on_exhausted {
            cfg.stubs.on_exhausted = on_exhausted;
        }
    }

    if let Some(runner) = partial.runner {
        if let Some(warmup) = runner.warmup {
            cfg.runner.warmup = warmup;
        }
    }

    if let Some(host) = partial.host {
        if host.kind.is_some() {
            cfg.host.kind = host.kind;
        }
        if host.accessors.is_some() {
            cfg.host.accessors = host.accessors;
        }
        if host.clock.is_some() {
            cfg.host.clock = host.clock;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(run_log) = logging.run_log {
            cfg.logging.run_log = Some(run_log);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(trace) = &overrides.trace {
        cfg.replay.trace = Some(trace.clone());
    }
    if let Some(policy) = overrides.policy {
        cfg.verification.policy = policy;
    }
    if let Some(on_exhausted) = overrides.on_exhausted {
        cfg.stubs.on_exhausted = on_exhausted;
    }
    if let Some(run_log) = &overrides.run_log {
        cfg.logging.run_log = Some(run_log.clone());
    }
    if overrides.no_warmup {
        cfg.runner.warmup = false;
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

fn validate_config(cfg: &AppConfig) -> Result<(), ReplayError> {
    if cfg.logging.max_payload_bytes == 0 {
        return Err(ReplayError::InvalidConfig(
            "logging.max_payload_bytes must be greater than zero".to_string(),
        ));
    }

    if cfg.logging.budget_bytes == 0 {
        return Err(ReplayError::InvalidConfig(
            "logging.budget_bytes must be greater than zero".to_string(),
        ));
    }

    if cfg.host.kind == Some(HostKind::Bare) && cfg.host.clock == Some(ClockKind::Harness) {
        return Err(ReplayError::InvalidConfig(
            "host.clock = \"harness\" needs a host with a harness, not a bare engine".to_string(),
        ));
    }

    Ok(())
}
