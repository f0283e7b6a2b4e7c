use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("trace parse error: {0}")]
    TraceParse(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("stub {name} exhausted after {calls} recorded returns")]
    StubExhausted { name: String, calls: usize },
    #[error("unknown path: {0}")]
    UnknownPath(String),
    #[error("not an object: {0}")]
    NotAnObject(String),
    #[error("not callable: {0}")]
    NotCallable(String),
    #[error("illegal transition: {0}")]
    IllegalTransition(String),
    #[error("script error: {0}")]
    Script(String),
    #[error("no clock source available on this host")]
    NoClock,
}

impl ReplayError {
    /// Verification failures are delivered to the host before they are
    /// returned, so the runner must not report them a second time.
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::Verification(_))
    }
}
