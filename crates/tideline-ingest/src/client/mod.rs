//! The ingest client call contract.
//!
//! An [`IngestClient`] is the engine that actually talks to the ingestion
//! service. Two implementations exist:
//!
//! - [`NativeClient`] - binds `libmodality` over the C ABI (feature `native`)
//! - [`RecordingClient`] - records every call in memory, used for dry runs
//!   and tests
//!
//! Every fallible call maps a non-zero native status onto
//! [`tideline_core::Error::NativeCall`]. Nothing is retried.

#[cfg(feature = "native")]
mod native;
mod recording;

#[cfg(feature = "native")]
pub use native::NativeClient;
pub use recording::{Call, CallKind, CallLog, RecordingClient};

use tideline_core::{AttrKey, Result, TimelineId, WireBatch};

/// Calls the session makes against an ingest client.
///
/// Clients are driven from one thread at a time (the session serializes all
/// access behind its lock) but may move between threads.
pub trait IngestClient: Send {
    /// Connect to the ingestion endpoint.
    fn connect(&mut self, url: &str, allow_insecure_tls: bool) -> Result<()>;

    fn authenticate(&mut self, token: &str) -> Result<()>;

    /// Intern an attribute key name.
    fn declare_attr_key(&mut self, name: &str) -> Result<AttrKey>;

    /// Generate a fresh, service-unique timeline id.
    fn allocate_timeline_id(&mut self) -> Result<TimelineId>;

    /// Make `id` the target of subsequent metadata and events.
    fn open_timeline(&mut self, id: TimelineId) -> Result<()>;

    fn close_timeline(&mut self) -> Result<()>;

    /// Attach metadata to the open timeline.
    fn timeline_metadata(&mut self, attrs: &WireBatch<'_>) -> Result<()>;

    /// Submit one event on the open timeline.
    fn event(&mut self, ordering_lower: u64, ordering_upper: u64, attrs: &WireBatch<'_>)
    -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Release the client and then the runtime. Safe to call more than once.
    fn dispose(&mut self);
}
