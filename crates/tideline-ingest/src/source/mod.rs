//! Log record sources.
//!
//! Sources feed [`LogRecord`]s into a handler, typically one that forwards
//! them to an [`EventPipeline`](crate::pipeline::EventPipeline).
//!
//! # Available Sources
//!
//! - [`JsonlSource`] - Reads JSONL files, directories of them, or stdin

mod jsonl;

pub use jsonl::{JsonlConfig, JsonlInput, JsonlSource};

use crate::Result;
use crate::record::LogRecord;

/// A source of log records.
pub trait RecordSource {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Process records from this source, calling the handler for each one.
    ///
    /// The handler returns `Ok(true)` to continue, `Ok(false)` to stop
    /// gracefully, or `Err` to abort (unless the source is configured to
    /// continue on error).
    fn process<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(LogRecord) -> Result<bool>;
}

/// Statistics from processing a record source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Non-blank lines seen.
    pub total_records: usize,

    /// Records handed to the handler.
    pub valid_records: usize,

    /// Lines that failed to parse.
    pub parse_errors: usize,

    /// Records the handler returned an error for.
    pub handler_errors: usize,

    /// Input files read (0 for stdin).
    pub files_processed: usize,

    /// Whether the handler asked to stop early.
    pub stopped: bool,
}
