use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    Browser,
    Headless,
    Bare,
}

impl HostKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Headless => "headless",
            Self::Bare => "bare",
        }
    }
}

/// What `verify_call` does after reporting a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationPolicy {
    /// Report the mismatch, then hand back the recorded value anyway.
    #[default]
    Report,
    /// Report the mismatch and abort the call.
    Strict,
}

impl VerificationPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Report => "report",
            Self::Strict => "strict",
        }
    }
}

/// What a stub yields once its recorded returns run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExhaustionPolicy {
    #[default]
    Error,
    Undefined,
}

impl ExhaustionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Undefined => "undefined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorSupport {
    DefineProperty,
    Legacy,
    Unavailable,
}

impl AccessorSupport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DefineProperty => "define_property",
            Self::Legacy => "legacy",
            Self::Unavailable => "unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockKind {
    Harness,
    PerformanceNow,
    PreciseTime,
    DateNow,
}

impl ClockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Harness => "harness",
            Self::PerformanceNow => "performance_now",
            Self::PreciseTime => "precise_time",
            Self::DateNow => "date_now",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverPhase {
    Warmup,
    Running,
    Done,
}

impl DriverPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}
