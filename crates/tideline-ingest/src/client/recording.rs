//! An in-memory ingest client.
//!
//! [`RecordingClient`] keeps an ordered log of every call it receives,
//! decoding attribute batches back into owned pairs. The log lives behind a
//! shared [`CallLog`] handle so it stays readable after the client has been
//! moved into a session. With `verbose` set, each call is also logged through
//! `tracing`, which is what `--dry-run` uses.
//!
//! Failures can be injected per call kind to exercise error paths, either on
//! every call of that kind or on a single numbered attempt.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tideline_core::{AttrKey, AttrVal, Error, Result, TimelineId, WireBatch};

use super::IngestClient;

/// Discriminant of a [`Call`], used for counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Connect,
    Authenticate,
    DeclareAttrKey,
    AllocateTimelineId,
    OpenTimeline,
    CloseTimeline,
    TimelineMetadata,
    Event,
    Flush,
    Dispose,
}

/// One recorded client call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect {
        url: String,
        allow_insecure_tls: bool,
    },
    Authenticate,
    DeclareAttrKey {
        name: String,
        key: AttrKey,
    },
    AllocateTimelineId(TimelineId),
    OpenTimeline(TimelineId),
    CloseTimeline,
    TimelineMetadata {
        /// Timeline open when the call was made.
        timeline: Option<TimelineId>,
        attrs: Vec<(AttrKey, AttrVal)>,
    },
    Event {
        timeline: Option<TimelineId>,
        ordering: (u64, u64),
        attrs: Vec<(AttrKey, AttrVal)>,
    },
    Flush,
    Dispose,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::Connect { .. } => CallKind::Connect,
            Call::Authenticate => CallKind::Authenticate,
            Call::DeclareAttrKey { .. } => CallKind::DeclareAttrKey,
            Call::AllocateTimelineId(_) => CallKind::AllocateTimelineId,
            Call::OpenTimeline(_) => CallKind::OpenTimeline,
            Call::CloseTimeline => CallKind::CloseTimeline,
            Call::TimelineMetadata { .. } => CallKind::TimelineMetadata,
            Call::Event { .. } => CallKind::Event,
            Call::Flush => CallKind::Flush,
            Call::Dispose => CallKind::Dispose,
        }
    }
}

/// Shared, cloneable view of a recording client's call log.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallLog {
    fn push(&self, call: Call) {
        self.calls.lock().push(call);
    }

    /// Copy of every call so far, in order.
    pub fn snapshot(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().iter().filter(|c| c.kind() == kind).count()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Recorded calls of one kind.
    pub fn of_kind(&self, kind: CallKind) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }
}

/// When an injected failure fires.
#[derive(Debug, Clone, Copy)]
enum Failure {
    Always(i32),
    /// Only the nth attempt of the kind, counting from 1.
    Nth { nth: usize, code: i32 },
}

/// Ingest client that records calls instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct RecordingClient {
    log: CallLog,
    failures: HashMap<CallKind, Failure>,
    attempts: HashMap<CallKind, usize>,
    verbose: bool,
    next_key: u32,
    next_timeline: u128,
    open: Option<TimelineId>,
    disposed: bool,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every call at `info` as it is recorded.
    pub fn verbose(mut self) -> Self {
        self.verbose = true;
        self
    }

    /// Make every call of `kind` fail with status `code`.
    pub fn fail_on(mut self, kind: CallKind, code: i32) -> Self {
        self.failures.insert(kind, Failure::Always(code));
        self
    }

    /// Fail only the `nth` call of `kind` (1-based) with status `code`.
    pub fn fail_nth(mut self, kind: CallKind, nth: usize, code: i32) -> Self {
        self.failures.insert(kind, Failure::Nth { nth, code });
        self
    }

    /// Fail the first call of `kind`; later calls succeed.
    pub fn fail_once(self, kind: CallKind, code: i32) -> Self {
        self.fail_nth(kind, 1, code)
    }

    /// Handle to the call log, valid after the client is moved.
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// The timeline the client currently has open.
    pub fn open_timeline_id(&self) -> Option<TimelineId> {
        self.open
    }

    fn check(&mut self, kind: CallKind) -> Result<()> {
        let attempt = self.attempts.entry(kind).or_insert(0);
        *attempt += 1;
        let code = match self.failures.get(&kind) {
            Some(Failure::Always(code)) => *code,
            Some(Failure::Nth { nth, code }) if *nth == *attempt => *code,
            _ => return Ok(()),
        };
        if self.verbose {
            tracing::warn!(call = ?kind, code, "injected failure");
        }
        Err(Error::NativeCall { code })
    }

    fn record(&self, call: Call) {
        if self.verbose {
            tracing::info!(call = ?call, "ingest call");
        }
        self.log.push(call);
    }
}

impl IngestClient for RecordingClient {
    fn connect(&mut self, url: &str, allow_insecure_tls: bool) -> Result<()> {
        self.check(CallKind::Connect)?;
        self.record(Call::Connect {
            url: url.to_string(),
            allow_insecure_tls,
        });
        Ok(())
    }

    fn authenticate(&mut self, _token: &str) -> Result<()> {
        self.check(CallKind::Authenticate)?;
        self.record(Call::Authenticate);
        Ok(())
    }

    fn declare_attr_key(&mut self, name: &str) -> Result<AttrKey> {
        self.check(CallKind::DeclareAttrKey)?;
        self.next_key += 1;
        let key = AttrKey(self.next_key);
        self.record(Call::DeclareAttrKey {
            name: name.to_string(),
            key,
        });
        Ok(key)
    }

    fn allocate_timeline_id(&mut self) -> Result<TimelineId> {
        self.check(CallKind::AllocateTimelineId)?;
        self.next_timeline += 1;
        let id = TimelineId::from(self.next_timeline);
        self.record(Call::AllocateTimelineId(id));
        Ok(id)
    }

    fn open_timeline(&mut self, id: TimelineId) -> Result<()> {
        self.check(CallKind::OpenTimeline)?;
        self.open = Some(id);
        self.record(Call::OpenTimeline(id));
        Ok(())
    }

    fn close_timeline(&mut self) -> Result<()> {
        self.check(CallKind::CloseTimeline)?;
        self.open = None;
        self.record(Call::CloseTimeline);
        Ok(())
    }

    fn timeline_metadata(&mut self, attrs: &WireBatch<'_>) -> Result<()> {
        self.check(CallKind::TimelineMetadata)?;
        self.record(Call::TimelineMetadata {
            timeline: self.open,
            attrs: attrs.decode(),
        });
        Ok(())
    }

    fn event(
        &mut self,
        ordering_lower: u64,
        ordering_upper: u64,
        attrs: &WireBatch<'_>,
    ) -> Result<()> {
        self.check(CallKind::Event)?;
        self.record(Call::Event {
            timeline: self.open,
            ordering: (ordering_lower, ordering_upper),
            attrs: attrs.decode(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.check(CallKind::Flush)?;
        self.record(Call::Flush);
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.open = None;
        self.record(Call::Dispose);
    }
}
