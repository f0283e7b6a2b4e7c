//! Capabilities the replay core needs from whatever is hosting it.
//!
//! Nothing in the core touches real globals: clocks, output sinks, the
//! controlling harness and the host's global object are injected through
//! `HostEnvironment`. Production implementations and fakes live side by side.

use crate::errors::ReplayError;
use crate::report::HarnessResult;
use crate::types::{AccessorSupport, ClockKind};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Milliseconds on this clock's own timeline.
    fn now_ms(&self) -> f64;
}

pub trait Console: Send + Sync {
    fn log(&self, line: &str) -> Result<(), ReplayError>;
}

/// The page the benchmark runs in, when there is one.
pub trait Document: Send + Sync {
    /// Discards whatever the document showed before.
    fn open(&self) -> Result<(), ReplayError>;
    fn write(&self, text: &str) -> Result<(), ReplayError>;
    /// Shows a fixed-position result banner.
    fn show_banner(&self, text: &str) -> Result<(), ReplayError>;
}

/// An external controlling harness (`window.parent.JSBNG_handleResult`).
pub trait Harness: Send + Sync {
    fn handle_result(&self, result: &HarnessResult) -> Result<(), ReplayError>;
}

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ReplayError>;
    fn exists(&self, path: &Path) -> bool;
}

/// A value the host's own global object already carries before the shim runs.
#[derive(Debug, Clone, PartialEq)]
pub enum HostGlobal {
    Callable,
    Object,
    Number(f64),
    String(String),
}

pub type HostGlobals = BTreeMap<String, HostGlobal>;

/// Clock sources in the order the environment shim prefers them.
#[derive(Clone, Default)]
pub struct ClockSources {
    pub harness: Option<Arc<dyn Clock>>,
    pub performance_now: Option<Arc<dyn Clock>>,
    pub precise_time: Option<Arc<dyn Clock>>,
    pub date_now: Option<Arc<dyn Clock>>,
}

impl ClockSources {
    pub fn best(&self) -> Option<(ClockKind, Arc<dyn Clock>)> {
        [
            (ClockKind::Harness, &self.harness),
            (ClockKind::PerformanceNow, &self.performance_now),
            (ClockKind::PreciseTime, &self.precise_time),
            (ClockKind::DateNow, &self.date_now),
        ]
        .into_iter()
        .find_map(|(kind, clock)| clock.as_ref().map(|clock| (kind, Arc::clone(clock))))
    }

    /// Keeps only the named source. Used when configuration pins a clock.
    pub fn only(&self, kind: ClockKind) -> Self {
        let pick = |wanted: ClockKind, clock: &Option<Arc<dyn Clock>>| {
            if wanted == kind {
                clock.clone()
            } else {
                None
            }
        };
        Self {
            harness: pick(ClockKind::Harness, &self.harness),
            performance_now: pick(ClockKind::PerformanceNow, &self.performance_now),
            precise_time: pick(ClockKind::PreciseTime, &self.precise_time),
            date_now: pick(ClockKind::DateNow, &self.date_now),
        }
    }
}

/// Which optional host features are present. Derived from a
/// `HostEnvironment`; the shim only ever looks at this summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub has_document: bool,
    pub has_global: bool,
    pub has_harness: bool,
    pub has_performance_now: bool,
    pub has_precise_time: bool,
    pub has_console: bool,
    pub has_print: bool,
    pub accessors: AccessorSupport,
}

#[derive(Clone)]
pub struct HostEnvironment {
    pub global: Option<HostGlobals>,
    pub clocks: ClockSources,
    pub console: Option<Arc<dyn Console>>,
    pub print: Option<Arc<dyn Console>>,
    pub document: Option<Arc<dyn Document>>,
    pub harness: Option<Arc<dyn Harness>>,
    pub accessors: AccessorSupport,
    pub file_system: Arc<dyn FileSystem>,
}

impl HostEnvironment {
    /// A headless command-line host: a global object, a monotonic
    /// `performance.now`, `Date.now`, and stdout for both console and print.
    pub fn production() -> Self {
        Self {
            global: Some(HostGlobals::new()),
            clocks: ClockSources {
                harness: None,
                performance_now: Some(Arc::new(MonotonicClock::new())),
                precise_time: None,
                date_now: Some(Arc::new(SystemClock)),
            },
            console: Some(Arc::new(StdoutConsole)),
            print: Some(Arc::new(StdoutConsole)),
            document: None,
            harness: None,
            accessors: AccessorSupport::DefineProperty,
            file_system: Arc::new(ProductionFileSystem),
        }
    }

    pub fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            has_document: self.document.is_some(),
            has_global: self.global.is_some(),
            has_harness: self.harness.is_some(),
            has_performance_now: self.clocks.performance_now.is_some(),
            has_precise_time: self.clocks.precise_time.is_some(),
            has_console: self.console.is_some(),
            has_print: self.print.is_some(),
            accessors: self.accessors,
        }
    }
}

impl Default for HostEnvironment {
    fn default() -> Self {
        Self::production()
    }
}

/// `performance.now`: milliseconds since this clock was created.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// `Date.now`: whole milliseconds since the Unix epoch.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0)
    }
}

pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn log(&self, line: &str) -> Result<(), ReplayError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| ReplayError::Io(e.to_string()))
    }
}

/// Harness that prints each result as one JSON line on a console.
pub struct JsonLineHarness {
    sink: Arc<dyn Console>,
}

impl JsonLineHarness {
    pub fn new(sink: Arc<dyn Console>) -> Self {
        Self { sink }
    }
}

impl Harness for JsonLineHarness {
    fn handle_result(&self, result: &HarnessResult) -> Result<(), ReplayError> {
        let line = serde_json::to_string(result).map_err(|e| ReplayError::Io(e.to_string()))?;
        self.sink.log(&line)
    }
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError> {
        std::fs::read_to_string(path)
            .map_err(|e| ReplayError::Io(format!("{}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ReplayError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ReplayError::Io(e.to_string()))?;
            }
        }
        std::fs::write(path, contents).map_err(|e| ReplayError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Settable clock. Each read advances it by `step_ms`, which lets tests
/// observe a deterministic elapsed time across a run.
#[derive(Clone)]
pub struct FakeClock {
    now: Arc<Mutex<f64>>,
    step_ms: f64,
    reads: Arc<Mutex<usize>>,
}

impl FakeClock {
    pub fn new(now: f64) -> Self {
        Self::stepping(now, 0.0)
    }

    pub fn stepping(now: f64, step_ms: f64) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            step_ms,
            reads: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock().expect("clock lock") = now;
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().expect("reads lock")
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> f64 {
        *self.reads.lock().expect("reads lock") += 1;
        let mut now = self.now.lock().expect("clock lock");
        let current = *now;
        *now += self.step_ms;
        current
    }
}

#[derive(Default, Clone)]
pub struct FakeConsole {
    lines: Arc<Mutex<Vec<String>>>,
}

impl FakeConsole {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("console lock").clone()
    }
}

impl Console for FakeConsole {
    fn log(&self, line: &str) -> Result<(), ReplayError> {
        self.lines.lock().expect("console lock").push(line.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    Open,
    Write(String),
    Banner(String),
}

#[derive(Default, Clone)]
pub struct FakeDocument {
    events: Arc<Mutex<Vec<DocumentEvent>>>,
}

impl FakeDocument {
    pub fn events(&self) -> Vec<DocumentEvent> {
        self.events.lock().expect("document lock").clone()
    }
}

impl Document for FakeDocument {
    fn open(&self) -> Result<(), ReplayError> {
        self.events
            .lock()
            .expect("document lock")
            .push(DocumentEvent::Open);
        Ok(())
    }

    fn write(&self, text: &str) -> Result<(), ReplayError> {
        self.events
            .lock()
            .expect("document lock")
            .push(DocumentEvent::Write(text.to_string()));
        Ok(())
    }

    fn show_banner(&self, text: &str) -> Result<(), ReplayError> {
        self.events
            .lock()
            .expect("document lock")
            .push(DocumentEvent::Banner(text.to_string()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeHarness {
    results: Arc<Mutex<Vec<HarnessResult>>>,
    fail_next: Arc<Mutex<Option<ReplayError>>>,
}

impl FakeHarness {
    pub fn results(&self) -> Vec<HarnessResult> {
        self.results.lock().expect("harness lock").clone()
    }

    /// The next result handed over is dropped and `error` returned instead.
    pub fn set_fail_next(&self, error: ReplayError) {
        *self.fail_next.lock().expect("harness lock") = Some(error);
    }
}

impl Harness for FakeHarness {
    fn handle_result(&self, result: &HarnessResult) -> Result<(), ReplayError> {
        if let Some(error) = self.fail_next.lock().expect("harness lock").take() {
            return Err(error);
        }
        self.results
            .lock()
            .expect("harness lock")
            .push(result.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, ReplayError> {
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| ReplayError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), ReplayError> {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().expect("files lock").contains_key(path)
    }
}

/// Handles to every fake a test host is built from.
#[derive(Default, Clone)]
pub struct FakeHost {
    pub clock: FakeClock,
    pub console: FakeConsole,
    pub document: FakeDocument,
    pub harness: FakeHarness,
    pub file_system: FakeFileSystem,
}

impl FakeHost {
    /// Headless host: global object, `Date.now` only, console output.
    pub fn headless(&self) -> HostEnvironment {
        HostEnvironment {
            global: Some(HostGlobals::new()),
            clocks: ClockSources {
                date_now: Some(Arc::new(self.clock.clone())),
                ..ClockSources::default()
            },
            console: Some(Arc::new(self.console.clone())),
            print: None,
            document: None,
            harness: None,
            accessors: AccessorSupport::DefineProperty,
            file_system: Arc::new(self.file_system.clone()),
        }
    }

    /// Browser host: a document and `performance.now`.
    pub fn browser(&self) -> HostEnvironment {
        HostEnvironment {
            global: None,
            clocks: ClockSources {
                performance_now: Some(Arc::new(self.clock.clone())),
                ..ClockSources::default()
            },
            document: Some(Arc::new(self.document.clone())),
            ..self.headless()
        }
    }

    /// Browser host running under a controlling harness.
    pub fn harnessed(&self) -> HostEnvironment {
        HostEnvironment {
            harness: Some(Arc::new(self.harness.clone())),
            ..self.browser()
        }
    }
}
