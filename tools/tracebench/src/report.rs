use crate::errors::ReplayError;
use crate::host::{Console, Document, Harness, HostEnvironment};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The whole contract with a controlling harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessResult {
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl HarnessResult {
    pub fn time(time: f64) -> Self {
        Self {
            error: false,
            time: Some(time),
            msg: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            error: true,
            time: None,
            msg: Some(msg.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportChannel {
    Harness,
    Document,
    Console,
    Print,
    Nowhere,
}

/// Delivers results and diagnostics to the first sink the host offers.
pub struct Reporter {
    harness: Option<Arc<dyn Harness>>,
    document: Option<Arc<dyn Document>>,
    console: Option<Arc<dyn Console>>,
    print: Option<Arc<dyn Console>>,
    first_message: bool,
    finished: bool,
}

impl Reporter {
    pub fn from_host(host: &HostEnvironment) -> Self {
        Self {
            harness: host.harness.clone(),
            document: host.document.clone(),
            console: host.console.clone(),
            print: host.print.clone(),
            first_message: true,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Writes a diagnostic to the page, opening it fresh on the first
    /// message, or to the console when there is no page.
    pub fn message(&mut self, msg: &str) -> Result<ReportChannel, ReplayError> {
        if let Some(document) = &self.document {
            if self.first_message {
                document.open()?;
                self.first_message = false;
            }
            document.write(msg)?;
            return Ok(ReportChannel::Document);
        }
        if let Some(console) = &self.console {
            console.log(msg)?;
            return Ok(ReportChannel::Console);
        }
        if let Some(print) = &self.print {
            print.log(msg)?;
            return Ok(ReportChannel::Print);
        }
        Ok(ReportChannel::Nowhere)
    }

    pub fn report_error(&mut self, msg: &str) -> Result<ReportChannel, ReplayError> {
        if let Some(harness) = &self.harness {
            harness.handle_result(&HarnessResult::error(msg))?;
            return Ok(ReportChannel::Harness);
        }
        self.message(msg)
    }

    pub fn report_time(&mut self, time_ms: f64) -> Result<ReportChannel, ReplayError> {
        if let Some(harness) = &self.harness {
            harness.handle_result(&HarnessResult::time(time_ms))?;
            return Ok(ReportChannel::Harness);
        }
        let line = format!("Time: {time_ms}ms");
        if let Some(document) = &self.document {
            document.show_banner(&line)?;
            return Ok(ReportChannel::Document);
        }
        if let Some(console) = &self.console {
            console.log(&line)?;
            return Ok(ReportChannel::Console);
        }
        if let Some(print) = &self.print {
            print.log(&line)?;
            return Ok(ReportChannel::Print);
        }
        Ok(ReportChannel::Nowhere)
    }
}

#[cfg(test)]
mod tests {
    use super::{HarnessResult, ReportChannel, Reporter};
    use crate::host::{DocumentEvent, FakeHost};

    #[test]
    fn harness_result_serializes_like_the_protocol() {
        let ok = serde_json::to_string(&HarnessResult::time(12.5)).expect("json");
        assert_eq!(ok, r#"{"error":false,"time":12.5}"#);
        let err = serde_json::to_string(&HarnessResult::error("boom")).expect("json");
        assert_eq!(err, r#"{"error":true,"msg":"boom"}"#);
    }

    #[test]
    fn document_is_opened_only_for_the_first_message() {
        let fakes = FakeHost::default();
        let mut reporter = Reporter::from_host(&fakes.browser());
        reporter.message("one").expect("first");
        reporter.message("two").expect("second");
        assert_eq!(
            fakes.document.events(),
            vec![
                DocumentEvent::Open,
                DocumentEvent::Write("one".to_string()),
                DocumentEvent::Write("two".to_string()),
            ]
        );
    }

    #[test]
    fn time_goes_to_the_first_available_sink() {
        let fakes = FakeHost::default();

        let mut harnessed = Reporter::from_host(&fakes.harnessed());
        assert_eq!(harnessed.report_time(3.0).expect("report"), ReportChannel::Harness);
        assert_eq!(fakes.harness.results(), vec![HarnessResult::time(3.0)]);

        let mut browser = Reporter::from_host(&fakes.browser());
        assert_eq!(browser.report_time(3.0).expect("report"), ReportChannel::Document);
        assert!(fakes
            .document
            .events()
            .contains(&DocumentEvent::Banner("Time: 3ms".to_string())));

        let mut headless = Reporter::from_host(&fakes.headless());
        assert_eq!(headless.report_time(1.5).expect("report"), ReportChannel::Console);
        assert_eq!(fakes.console.lines(), vec!["Time: 1.5ms".to_string()]);
    }

    #[test]
    fn errors_prefer_the_harness() {
        let fakes = FakeHost::default();
        let mut reporter = Reporter::from_host(&fakes.harnessed());
        reporter.report_error("mismatch").expect("report");
        assert_eq!(fakes.harness.results(), vec![HarnessResult::error("mismatch")]);
        assert!(fakes.document.events().is_empty());
    }
}
