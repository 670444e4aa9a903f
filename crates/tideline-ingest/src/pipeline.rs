//! Event emission pipeline.
//!
//! Turns each [`LogRecord`] into one event on the timeline of its entity:
//!
//! ```text
//! LogRecord ──▶ RecordFilter ──▶ session lock ──▶ switch timeline
//!                    │                                  │
//!                 Filtered                    build AttrBatch, lower
//!                                                       │
//!                                             client.event(id, 0, batch)
//!                                                       │
//!                                        arena dropped, lock released
//! ```
//!
//! The session lock is held from the switch to the submit, so concurrent
//! callers can't interleave their timeline switches with each other's events.

use std::time::Instant;

use tideline_core::metrics::{increment, increment_outcome, record_duration};
use tideline_core::{AttrBatch, TimelineId, Value};

use crate::client::IngestClient;
use crate::record::{LogLevel, LogRecord};
use crate::session::{IngestSession, SessionGuard};
use crate::timeline::Switch;
use crate::Result;

/// Decides which records are sent.
pub trait RecordFilter: Send + Sync {
    fn accept(&self, record: &LogRecord) -> bool;
}

/// Accept records at or above a level.
#[derive(Debug, Clone, Copy)]
pub struct MinLevel(pub LogLevel);

impl RecordFilter for MinLevel {
    fn accept(&self, record: &LogRecord) -> bool {
        record.level >= self.0
    }
}

impl<F> RecordFilter for F
where
    F: Fn(&LogRecord) -> bool + Send + Sync,
{
    fn accept(&self, record: &LogRecord) -> bool {
        self(record)
    }
}

/// Outcome of [`EventPipeline::emit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Rejected by the filter; nothing was sent.
    Filtered,
    /// Submitted on the given timeline.
    Submitted { timeline: TimelineId },
}

/// Log record to event pipeline over one session.
pub struct EventPipeline<C: IngestClient> {
    session: IngestSession<C>,
    filter: Box<dyn RecordFilter>,
}

impl<C: IngestClient> EventPipeline<C> {
    pub fn new(session: IngestSession<C>, filter: impl RecordFilter + 'static) -> Self {
        Self {
            session,
            filter: Box::new(filter),
        }
    }

    pub fn session(&self) -> &IngestSession<C> {
        &self.session
    }

    /// Send one record. Safe to call from any number of threads.
    pub fn emit(&self, record: &LogRecord) -> Result<Emission> {
        increment("ingest_records_total", 1);
        if !self.filter.accept(record) {
            increment("ingest_records_filtered_total", 1);
            return Ok(Emission::Filtered);
        }

        let start = Instant::now();
        let result = self.submit(record);
        record_duration("ingest_submit_duration_seconds", start.elapsed());

        match result {
            Ok(timeline) => {
                increment("ingest_events_submitted_total", 1);
                Ok(Emission::Submitted { timeline })
            }
            Err(e) => {
                increment("ingest_events_failed_total", 1);
                tracing::warn!(
                    record_id = record.id,
                    entity = record.entity().unwrap_or("<global>"),
                    error = %e,
                    "failed to emit event"
                );
                Err(e)
            }
        }
    }

    fn submit(&self, record: &LogRecord) -> Result<TimelineId> {
        let mut session = self.session.lock()?;

        let (switch, timeline) = session.switch_to(record.entity())?;
        if switch != Switch::Unchanged {
            increment_outcome("ingest_timeline_switches_total", switch.as_str());
        }

        let batch = event_batch(&mut session, record)?;
        session.submit(record.id, 0, &batch)?;

        tracing::trace!(record_id = record.id, timeline = %timeline, attrs = batch.len(), "event submitted");
        Ok(timeline)
    }

    /// Close the session's open timeline, flush and dispose.
    pub fn close(&self) -> Result<()> {
        self.session.close()
    }
}

fn event_batch<C: IngestClient>(
    session: &mut SessionGuard<'_, C>,
    record: &LogRecord,
) -> tideline_core::Result<AttrBatch> {
    let keys = session.event_keys();
    let mut batch = AttrBatch::with_capacity(7 + record.fields.len());
    batch
        .push(keys.name, &record.message)
        .push(keys.log_level, record.level.as_str())
        .push(keys.source_id, record.source_id)
        .push(keys.timestamp, tideline_core::Nanoseconds::from_datetime(&record.time))
        .push(keys.machine_name, record.machine_name.as_deref())
        .push(keys.thread_id, record.thread_id)
        .push(keys.object_name, record.object_name.as_deref());

    for (field, value) in &record.fields {
        match session.field_key(field)? {
            Some(key) => {
                batch.push(key, Value::from(value));
            }
            None => {
                tracing::warn!(record_id = record.id, field = %field, "field shadows a fixed event attribute, dropped");
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Call, CallKind, RecordingClient};
    use crate::keys;
    use crate::session::SessionOptions;
    use crate::Error;
    use tideline_core::{AttrKey, AttrVal, Nanoseconds};

    fn options() -> SessionOptions {
        SessionOptions {
            url: "modality-ingest://localhost".to_string(),
            auth_token: "t".to_string(),
            allow_insecure_tls: false,
            run_id: "r".to_string(),
            global_timeline_name: "global".to_string(),
            internal_source: "tideline".to_string(),
        }
    }

    fn pipeline(client: RecordingClient) -> EventPipeline<RecordingClient> {
        let session = IngestSession::open(client, &options()).unwrap();
        EventPipeline::new(session, MinLevel(LogLevel::Info))
    }

    /// Map declared key numbers back to names.
    fn key_names(log: &crate::client::CallLog) -> std::collections::HashMap<AttrKey, String> {
        log.of_kind(CallKind::DeclareAttrKey)
            .into_iter()
            .filter_map(|c| match c {
                Call::DeclareAttrKey { name, key } => Some((key, name)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_filtered_record_has_no_side_effects() {
        let client = RecordingClient::new();
        let log = client.log();
        let pipeline = pipeline(client);
        let before = log.len();

        let record = LogRecord::new(1, "noise").with_level(LogLevel::Debug);
        assert_eq!(pipeline.emit(&record).unwrap(), Emission::Filtered);
        assert_eq!(log.len(), before);
    }

    #[test]
    fn test_event_attributes() {
        let client = RecordingClient::new();
        let log = client.log();
        let pipeline = pipeline(client);

        let mut record = LogRecord::new(17, "uart ready")
            .with_level(LogLevel::Warning)
            .with_machine("m1")
            .with_object("sysbus.uart0")
            .with_field("baud", serde_json::json!(115200));
        record.source_id = Some(4);

        let Emission::Submitted { timeline } = pipeline.emit(&record).unwrap() else {
            panic!("record should be submitted");
        };

        let names = key_names(&log);
        let events = log.of_kind(CallKind::Event);
        let Call::Event {
            timeline: open,
            ordering,
            attrs,
        } = &events[0]
        else {
            unreachable!()
        };
        assert_eq!(*open, Some(timeline));
        assert_eq!(*ordering, (17, 0));

        let by_name: std::collections::HashMap<_, _> = attrs
            .iter()
            .map(|(k, v)| (names[k].as_str(), v.clone()))
            .collect();
        assert_eq!(by_name[keys::event::NAME], AttrVal::String("uart ready".into()));
        assert_eq!(by_name[keys::event::LOG_LEVEL], AttrVal::String("Warning".into()));
        assert_eq!(by_name[keys::event::SOURCE_ID], AttrVal::Integer(4));
        assert_eq!(by_name[keys::event::MACHINE_NAME], AttrVal::String("m1".into()));
        assert_eq!(
            by_name[keys::event::OBJECT_NAME],
            AttrVal::String("sysbus.uart0".into())
        );
        assert_eq!(
            by_name[keys::event::TIMESTAMP],
            AttrVal::Timestamp(Nanoseconds::from_datetime(&record.time))
        );
        assert_eq!(by_name["event.baud"], AttrVal::Integer(115200));
        // thread_id was absent
        assert!(!by_name.contains_key(keys::event::THREAD_ID));
    }

    #[test]
    fn test_global_record_omits_machine_name() {
        let client = RecordingClient::new();
        let log = client.log();
        let pipeline = pipeline(client);

        let emission = pipeline.emit(&LogRecord::new(1, "hello")).unwrap();
        let global = pipeline.session().timelines()[0].id;
        assert_eq!(emission, Emission::Submitted { timeline: global });

        let Call::Event { attrs, .. } = &log.of_kind(CallKind::Event)[0] else {
            unreachable!()
        };
        // name, log level, timestamp
        assert_eq!(attrs.len(), 3);
    }

    #[test]
    fn test_field_named_like_fixed_attribute_is_dropped() {
        let client = RecordingClient::new();
        let log = client.log();
        let pipeline = pipeline(client);

        let record = LogRecord::new(1, "real message")
            .with_field("name", serde_json::json!("spoofed"))
            .with_field("log_level", serde_json::json!("Error"))
            .with_field("pc", serde_json::json!(4096));
        pipeline.emit(&record).unwrap();

        let names = key_names(&log);
        let Call::Event { attrs, .. } = &log.of_kind(CallKind::Event)[0] else {
            unreachable!()
        };
        let named: Vec<_> = attrs
            .iter()
            .filter(|(k, _)| names[k] == keys::event::NAME)
            .map(|(_, v)| v.clone())
            .collect();
        assert_eq!(named, vec![AttrVal::String("real message".into())]);
        let levels = attrs
            .iter()
            .filter(|(k, _)| names[k] == keys::event::LOG_LEVEL)
            .count();
        assert_eq!(levels, 1);
        assert!(names.values().any(|n| n == "event.pc"));
        // name, log level, timestamp, pc
        assert_eq!(attrs.len(), 4);
    }

    #[test]
    fn test_unsupported_field_fails_without_submitting() {
        let client = RecordingClient::new();
        let log = client.log();
        let pipeline = pipeline(client);

        let record = LogRecord::new(1, "x").with_field("list", serde_json::json!([1, 2]));
        let err = pipeline.emit(&record).unwrap_err();
        assert!(matches!(
            err,
            Error::Core(tideline_core::Error::UnsupportedAttributeType { .. })
        ));
        assert_eq!(log.count(CallKind::Event), 0);
    }

    #[test]
    fn test_submit_failure_propagates() {
        let client = RecordingClient::new().fail_on(CallKind::Event, 12);
        let pipeline = pipeline(client);
        let err = pipeline.emit(&LogRecord::new(1, "x")).unwrap_err();
        assert_eq!(err.native_code(), Some(12));
    }

    #[test]
    fn test_closure_filter() {
        let client = RecordingClient::new();
        let session = IngestSession::open(client, &options()).unwrap();
        let pipeline = EventPipeline::new(session, |r: &LogRecord| r.message.starts_with("keep"));

        assert_eq!(
            pipeline.emit(&LogRecord::new(1, "drop me")).unwrap(),
            Emission::Filtered
        );
        assert!(matches!(
            pipeline.emit(&LogRecord::new(2, "keep me")).unwrap(),
            Emission::Submitted { .. }
        ));
    }

    #[test]
    fn test_emit_after_close_fails() {
        let pipeline = pipeline(RecordingClient::new());
        pipeline.close().unwrap();
        assert!(matches!(
            pipeline.emit(&LogRecord::new(1, "late")),
            Err(Error::SessionDisposed)
        ));
    }
}
