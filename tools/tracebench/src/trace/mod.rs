//! Recorded traces: the on-disk format, loading, and writing.

pub mod loader;
pub mod recorder;
pub mod recording;

pub use loader::{Trace, TraceSummary};
pub use recorder::TraceWriter;
pub use recording::{ReplayStep, TraceEntry};
