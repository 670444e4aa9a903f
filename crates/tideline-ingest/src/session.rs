//! The ingest session.
//!
//! An [`IngestSession`] owns the client, the attribute key registry and the
//! timeline registry behind a single lock. Callers take the lock with
//! [`IngestSession::lock`] and hold it across the timeline switch and the
//! event submission, so an event is always submitted against the timeline
//! that was opened for it, even with many producer threads.
//!
//! Construction connects, authenticates, declares every fixed key, and opens
//! and describes the global timeline. If any step fails the client is
//! disposed before the error is returned.

use parking_lot::{Mutex, MutexGuard};
use tideline_core::metrics::set_gauge;
use tideline_core::{Arena, AttrBatch, AttrKey, TimelineId};

use crate::client::IngestClient;
use crate::config::Config;
use crate::keys::{EventKeys, KeyRegistry, TimelineKeys};
use crate::timeline::{MetadataTemplate, Switch, Timeline, TimelineRegistry};
use crate::{Error, Result};

/// Parameters for opening a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub url: String,
    pub auth_token: String,
    pub allow_insecure_tls: bool,
    pub run_id: String,
    pub global_timeline_name: String,
    pub internal_source: String,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            url: config.ingest_url.clone(),
            auth_token: config.auth_token.clone(),
            allow_insecure_tls: config.allow_insecure_tls,
            run_id: config.run_id.clone(),
            global_timeline_name: config.global_timeline_name.clone(),
            internal_source: config.internal_source.clone(),
        }
    }
}

struct SessionState<C> {
    client: C,
    keys: KeyRegistry,
    event_keys: EventKeys,
    timelines: TimelineRegistry,
    disposed: bool,
}

/// A connected session against one ingest client.
pub struct IngestSession<C: IngestClient> {
    state: Mutex<SessionState<C>>,
    run_id: String,
}

impl<C: IngestClient> IngestSession<C> {
    /// Connect and prepare a session. The client is disposed on failure.
    pub fn open(mut client: C, options: &SessionOptions) -> Result<Self> {
        match Self::establish(&mut client, options) {
            Ok((keys, event_keys, timelines)) => {
                tracing::info!(
                    url = %options.url,
                    run_id = %options.run_id,
                    global_timeline = %timelines.global().id,
                    keys = keys.len(),
                    "ingest session open"
                );
                set_gauge("ingest_attr_keys", keys.len() as f64);
                set_gauge("ingest_timelines", timelines.count() as f64);
                Ok(Self {
                    state: Mutex::new(SessionState {
                        client,
                        keys,
                        event_keys,
                        timelines,
                        disposed: false,
                    }),
                    run_id: options.run_id.clone(),
                })
            }
            Err(e) => {
                tracing::error!(error = %e, url = %options.url, "failed to open ingest session");
                client.dispose();
                Err(e.into())
            }
        }
    }

    fn establish(
        client: &mut C,
        options: &SessionOptions,
    ) -> tideline_core::Result<(KeyRegistry, EventKeys, TimelineRegistry)> {
        client.connect(&options.url, options.allow_insecure_tls)?;
        client.authenticate(&options.auth_token)?;

        let mut keys = KeyRegistry::new();
        let timeline_keys = TimelineKeys::declare(&mut keys, client)?;
        let event_keys = EventKeys::declare(&mut keys, client)?;

        let global = client.allocate_timeline_id()?;
        let template = MetadataTemplate {
            keys: timeline_keys,
            run_id: options.run_id.clone(),
            internal_source: options.internal_source.clone(),
        };
        let mut timelines =
            TimelineRegistry::new(global, options.global_timeline_name.clone(), template);
        timelines.activate_global(client)?;

        Ok((keys, event_keys, timelines))
    }

    /// Take the session lock.
    pub fn lock(&self) -> Result<SessionGuard<'_, C>> {
        let state = self.state.lock();
        if state.disposed {
            return Err(Error::SessionDisposed);
        }
        Ok(SessionGuard { state })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Every timeline created so far, global first.
    pub fn timelines(&self) -> Vec<Timeline> {
        self.state.lock().timelines.timelines()
    }

    /// The timeline currently open on the client.
    pub fn current_timeline(&self) -> Option<Timeline> {
        self.state.lock().timelines.current().cloned()
    }

    /// Close the open timeline, flush, and dispose.
    ///
    /// The client is disposed even if closing or flushing fails.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Ok(());
        }
        let result = state
            .client
            .close_timeline()
            .and_then(|()| state.client.flush());
        state.timelines.clear_current();
        state.client.dispose();
        state.disposed = true;
        tracing::info!(run_id = %self.run_id, "ingest session closed");
        result.map_err(Error::from)
    }

    /// Release the client. Safe to call any number of times.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.client.dispose();
        state.disposed = true;
        tracing::debug!(run_id = %self.run_id, "ingest session disposed");
    }
}

impl<C: IngestClient> Drop for IngestSession<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Exclusive access to a live session.
pub struct SessionGuard<'a, C: IngestClient> {
    state: MutexGuard<'a, SessionState<C>>,
}

impl<C: IngestClient> SessionGuard<'_, C> {
    /// Open the timeline for `entity`, returning its id.
    pub fn switch_to(
        &mut self,
        entity: Option<&str>,
    ) -> tideline_core::Result<(Switch, TimelineId)> {
        let state = &mut *self.state;
        let switched = state.timelines.switch_to(&mut state.client, entity)?;
        if switched.0 == Switch::Created {
            set_gauge("ingest_timelines", state.timelines.count() as f64);
        }
        Ok(switched)
    }

    pub fn event_keys(&self) -> EventKeys {
        self.state.event_keys
    }

    /// Resolve an extra record field key. `None` if the field collides with a
    /// fixed event attribute.
    pub fn field_key(&mut self, field: &str) -> tideline_core::Result<Option<AttrKey>> {
        let state = &mut *self.state;
        let before = state.keys.len();
        let key = state.keys.declare_field(&mut state.client, field)?;
        if state.keys.len() != before {
            set_gauge("ingest_attr_keys", state.keys.len() as f64);
        }
        Ok(key)
    }

    /// Submit one event on the open timeline.
    ///
    /// The batch's buffers are released when this returns, whatever the outcome.
    pub fn submit(
        &mut self,
        ordering_lower: u64,
        ordering_upper: u64,
        batch: &AttrBatch,
    ) -> tideline_core::Result<()> {
        let mut arena = Arena::new();
        let wire = arena.prepare(batch)?;
        self.state.client.event(ordering_lower, ordering_upper, &wire)
    }

    /// The open timeline.
    pub fn current(&self) -> Option<&Timeline> {
        self.state.timelines.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Call, CallKind, RecordingClient};

    fn options() -> SessionOptions {
        SessionOptions {
            url: "modality-ingest://127.0.0.1:14182".to_string(),
            auth_token: "deadbeef".to_string(),
            allow_insecure_tls: true,
            run_id: "run-42".to_string(),
            global_timeline_name: "global".to_string(),
            internal_source: "tideline".to_string(),
        }
    }

    #[test]
    fn test_open_sequence() {
        let client = RecordingClient::new();
        let log = client.log();
        let session = IngestSession::open(client, &options()).unwrap();

        let calls = log.snapshot();
        assert_eq!(
            calls[0],
            Call::Connect {
                url: "modality-ingest://127.0.0.1:14182".to_string(),
                allow_insecure_tls: true,
            }
        );
        assert_eq!(calls[1], Call::Authenticate);
        assert_eq!(log.count(CallKind::DeclareAttrKey), 10);
        assert_eq!(log.count(CallKind::OpenTimeline), 1);
        assert_eq!(log.count(CallKind::TimelineMetadata), 1);

        let global = session.timelines()[0].clone();
        assert_eq!(global.entity, None);
        assert_eq!(session.current_timeline(), Some(global));
        assert_eq!(session.run_id(), "run-42");
    }

    #[test]
    fn test_open_failure_disposes_client() {
        for kind in [
            CallKind::Connect,
            CallKind::Authenticate,
            CallKind::DeclareAttrKey,
            CallKind::AllocateTimelineId,
            CallKind::OpenTimeline,
            CallKind::TimelineMetadata,
        ] {
            let client = RecordingClient::new().fail_on(kind, 3);
            let log = client.log();
            let err = IngestSession::open(client, &options()).err().unwrap();
            assert_eq!(err.native_code(), Some(3), "{kind:?}");
            assert_eq!(log.count(CallKind::Dispose), 1, "{kind:?}");
        }
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let client = RecordingClient::new();
        let log = client.log();
        let session = IngestSession::open(client, &options()).unwrap();
        session.dispose();
        session.dispose();
        drop(session);
        assert_eq!(log.count(CallKind::Dispose), 1);
    }

    #[test]
    fn test_lock_after_dispose_fails() {
        let session = IngestSession::open(RecordingClient::new(), &options()).unwrap();
        session.dispose();
        assert!(session.is_disposed());
        assert!(matches!(session.lock(), Err(Error::SessionDisposed)));
    }

    #[test]
    fn test_close_flushes_then_disposes() {
        let client = RecordingClient::new();
        let log = client.log();
        let session = IngestSession::open(client, &options()).unwrap();
        session.close().unwrap();
        session.close().unwrap();

        let calls = log.snapshot();
        let tail = &calls[calls.len() - 3..];
        assert_eq!(tail, &[Call::CloseTimeline, Call::Flush, Call::Dispose]);
        assert_eq!(session.current_timeline(), None);
    }

    #[test]
    fn test_close_failure_still_disposes() {
        let client = RecordingClient::new().fail_on(CallKind::Flush, 8);
        let log = client.log();
        let session = IngestSession::open(client, &options()).unwrap();
        assert_eq!(session.close().unwrap_err().native_code(), Some(8));
        assert_eq!(log.count(CallKind::Dispose), 1);
        assert!(session.is_disposed());
    }

    #[test]
    fn test_field_keys_are_declared_once() {
        let client = RecordingClient::new();
        let log = client.log();
        let session = IngestSession::open(client, &options()).unwrap();
        let mut guard = session.lock().unwrap();
        let a = guard.field_key("pc").unwrap();
        let b = guard.field_key("pc").unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(guard.field_key("object_name").unwrap(), None);
        drop(guard);
        assert_eq!(log.count(CallKind::DeclareAttrKey), 11);
    }
}
