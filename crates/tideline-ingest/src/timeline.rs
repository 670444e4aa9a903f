//! Timeline registry and switcher.
//!
//! Every entity key gets its own timeline, created lazily the first time a
//! record for it arrives and described once with metadata. Records without an
//! entity go to the global timeline, which exists from session start.
//!
//! ```text
//!                 switch_to(e)
//!   NoneActive ─────────────────▶ Active(e)
//!                                   │   ▲
//!                 switch_to(e)      │   │  switch_to(f), f != e
//!                 (no client call)  └───┘  open_timeline(f), plus
//!                                          metadata if f is new
//! ```
//!
//! Mappings are never removed. A timeline id, once assigned to an entity,
//! is reused for every later record of that entity. An entity whose metadata
//! was never published, because the open or the publish failed, stays pending
//! and is described on its next successful switch.

use std::collections::{HashMap, HashSet};

use tideline_core::{Arena, AttrBatch, Result, TimelineId};

use crate::client::IngestClient;
use crate::keys::TimelineKeys;

/// A timeline and the entity it belongs to. `entity == None` is the global timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeline {
    pub id: TimelineId,
    pub entity: Option<String>,
}

/// What a switch had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    /// The requested timeline was already open.
    Unchanged,
    /// An existing timeline was reopened.
    Reopened,
    /// A new timeline was allocated, opened and described.
    Created,
}

impl Switch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Switch::Unchanged => "unchanged",
            Switch::Reopened => "reopened",
            Switch::Created => "created",
        }
    }
}

/// Values published with every timeline's metadata.
#[derive(Debug, Clone)]
pub struct MetadataTemplate {
    pub keys: TimelineKeys,
    pub run_id: String,
    pub internal_source: String,
}

/// Entity to timeline mapping plus the currently open timeline.
#[derive(Debug)]
pub struct TimelineRegistry {
    global: Timeline,
    global_name: String,
    by_entity: HashMap<String, TimelineId>,
    /// Mapped entities whose metadata has not been published yet.
    undescribed: HashSet<String>,
    current: Option<Timeline>,
    template: MetadataTemplate,
}

impl TimelineRegistry {
    /// A registry around an already-allocated global timeline. Nothing is open yet.
    pub fn new(global_id: TimelineId, global_name: impl Into<String>, template: MetadataTemplate) -> Self {
        Self {
            global: Timeline {
                id: global_id,
                entity: None,
            },
            global_name: global_name.into(),
            by_entity: HashMap::new(),
            undescribed: HashSet::new(),
            current: None,
            template,
        }
    }

    /// Open the global timeline and publish its metadata.
    ///
    /// Called once, at session start.
    pub fn activate_global<C: IngestClient + ?Sized>(&mut self, client: &mut C) -> Result<()> {
        client.open_timeline(self.global.id)?;
        self.current = Some(self.global.clone());
        let name = self.global_name.clone();
        self.publish_metadata(client, &name)?;
        tracing::debug!(timeline = %self.global.id, name = %name, "global timeline active");
        Ok(())
    }

    /// Make the timeline for `entity` the open one, returning its id.
    ///
    /// On failure a newly created mapping is kept, so a later record for the
    /// same entity reuses the id rather than allocating another. Its metadata
    /// is published on the first later switch that gets the timeline open.
    pub fn switch_to<C: IngestClient + ?Sized>(
        &mut self,
        client: &mut C,
        entity: Option<&str>,
    ) -> Result<(Switch, TimelineId)> {
        if let Some(current) = &self.current
            && current.entity.as_deref() == entity
        {
            let id = current.id;
            if let Some(entity) = entity {
                self.describe_pending(client, entity)?;
            }
            return Ok((Switch::Unchanged, id));
        }

        let Some(entity) = entity else {
            client.open_timeline(self.global.id)?;
            self.current = Some(self.global.clone());
            tracing::debug!(timeline = %self.global.id, "switched to global timeline");
            return Ok((Switch::Reopened, self.global.id));
        };

        if let Some(&id) = self.by_entity.get(entity) {
            client.open_timeline(id)?;
            self.current = Some(Timeline {
                id,
                entity: Some(entity.to_string()),
            });
            tracing::debug!(timeline = %id, entity, "reopened timeline");
            self.describe_pending(client, entity)?;
            return Ok((Switch::Reopened, id));
        }

        let id = client.allocate_timeline_id()?;
        self.by_entity.insert(entity.to_string(), id);
        self.undescribed.insert(entity.to_string());
        client.open_timeline(id)?;
        self.current = Some(Timeline {
            id,
            entity: Some(entity.to_string()),
        });
        self.describe_pending(client, entity)?;
        tracing::info!(timeline = %id, entity, "created timeline");
        Ok((Switch::Created, id))
    }

    /// Publish metadata for `entity` if an earlier attempt never got it out.
    /// Its timeline must be the open one.
    fn describe_pending<C: IngestClient + ?Sized>(
        &mut self,
        client: &mut C,
        entity: &str,
    ) -> Result<()> {
        if !self.undescribed.contains(entity) {
            return Ok(());
        }
        self.publish_metadata(client, entity)?;
        self.undescribed.remove(entity);
        Ok(())
    }

    /// Whether `entity` is mapped but still lacks published metadata.
    pub fn is_undescribed(&self, entity: &str) -> bool {
        self.undescribed.contains(entity)
    }

    fn publish_metadata<C: IngestClient + ?Sized>(&self, client: &mut C, name: &str) -> Result<()> {
        let keys = &self.template.keys;
        let mut batch = AttrBatch::with_capacity(3);
        batch
            .push(keys.name, name)
            .push(keys.run_id, &self.template.run_id)
            .push(keys.internal_source, &self.template.internal_source);

        let mut arena = Arena::new();
        let wire = arena.prepare(&batch)?;
        client.timeline_metadata(&wire)
    }

    /// The open timeline, if any.
    pub fn current(&self) -> Option<&Timeline> {
        self.current.as_ref()
    }

    pub fn global(&self) -> &Timeline {
        &self.global
    }

    /// Timeline id assigned to `entity`, if one exists.
    pub fn lookup(&self, entity: &str) -> Option<TimelineId> {
        self.by_entity.get(entity).copied()
    }

    /// Every timeline in the session, global first, then entities by name.
    pub fn timelines(&self) -> Vec<Timeline> {
        let mut entities: Vec<_> = self
            .by_entity
            .iter()
            .map(|(entity, id)| Timeline {
                id: *id,
                entity: Some(entity.clone()),
            })
            .collect();
        entities.sort_by(|a, b| a.entity.cmp(&b.entity));

        let mut all = Vec::with_capacity(entities.len() + 1);
        all.push(self.global.clone());
        all.extend(entities);
        all
    }

    /// Number of timelines, including the global one.
    pub fn count(&self) -> usize {
        self.by_entity.len() + 1
    }

    /// Forget the open timeline after the client closed it.
    pub fn clear_current(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Call, CallKind, RecordingClient};
    use crate::keys::KeyRegistry;
    use tideline_core::AttrVal;

    fn registry(client: &mut RecordingClient) -> TimelineRegistry {
        let mut keys = KeyRegistry::new();
        let template = MetadataTemplate {
            keys: TimelineKeys::declare(&mut keys, client).unwrap(),
            run_id: "run-1".to_string(),
            internal_source: "tideline".to_string(),
        };
        let global = client.allocate_timeline_id().unwrap();
        TimelineRegistry::new(global, "global", template)
    }

    // =========================================================================
    // Switching
    // =========================================================================

    #[test]
    fn test_starts_with_nothing_open() {
        let mut client = RecordingClient::new();
        let registry = registry(&mut client);
        assert!(registry.current().is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_activate_global_publishes_metadata() {
        let mut client = RecordingClient::new();
        let log = client.log();
        let mut registry = registry(&mut client);
        registry.activate_global(&mut client).unwrap();

        let global = registry.global().id;
        assert_eq!(registry.current().map(|t| t.id), Some(global));
        let meta = log.of_kind(CallKind::TimelineMetadata);
        assert_eq!(meta.len(), 1);
        let Call::TimelineMetadata { timeline, attrs } = &meta[0] else {
            unreachable!()
        };
        assert_eq!(*timeline, Some(global));
        assert_eq!(attrs[0].1, AttrVal::String("global".to_string()));
        assert_eq!(attrs[1].1, AttrVal::String("run-1".to_string()));
        assert_eq!(attrs[2].1, AttrVal::String("tideline".to_string()));
    }

    #[test]
    fn test_same_entity_is_unchanged() {
        let mut client = RecordingClient::new();
        let log = client.log();
        let mut registry = registry(&mut client);

        assert_eq!(
            registry.switch_to(&mut client, Some("m1")).unwrap().0,
            Switch::Created
        );
        let opens = log.count(CallKind::OpenTimeline);
        assert_eq!(
            registry.switch_to(&mut client, Some("m1")).unwrap().0,
            Switch::Unchanged
        );
        assert_eq!(log.count(CallKind::OpenTimeline), opens);
    }

    #[test]
    fn test_return_to_entity_reuses_id() {
        let mut client = RecordingClient::new();
        let log = client.log();
        let mut registry = registry(&mut client);
        registry.activate_global(&mut client).unwrap();

        let (_, a) = registry.switch_to(&mut client, Some("a")).unwrap();
        assert_eq!(registry.lookup("a"), Some(a));
        assert_eq!(
            registry.switch_to(&mut client, None).unwrap(),
            (Switch::Reopened, registry.global().id)
        );
        assert_eq!(
            registry.switch_to(&mut client, Some("a")).unwrap(),
            (Switch::Reopened, a)
        );
        assert_eq!(registry.current().map(|t| t.id), Some(a));
        // global + a
        assert_eq!(log.count(CallKind::AllocateTimelineId), 2);
        assert_eq!(log.count(CallKind::TimelineMetadata), 2);
    }

    #[test]
    fn test_created_timeline_is_opened_before_metadata() {
        let mut client = RecordingClient::new();
        let log = client.log();
        let mut registry = registry(&mut client);
        registry.switch_to(&mut client, Some("m2")).unwrap();

        let id = registry.lookup("m2").unwrap();
        let tail: Vec<_> = log.snapshot().into_iter().rev().take(3).rev().collect();
        assert_eq!(tail[0], Call::AllocateTimelineId(id));
        assert_eq!(tail[1], Call::OpenTimeline(id));
        assert!(matches!(
            &tail[2],
            Call::TimelineMetadata { timeline: Some(t), attrs } if *t == id
                && attrs[0].1 == AttrVal::String("m2".to_string())
        ));
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn test_metadata_failure_keeps_mapping() {
        let mut client = RecordingClient::new().fail_on(CallKind::TimelineMetadata, 9);
        let mut registry = registry(&mut client);

        let err = registry.switch_to(&mut client, Some("m1")).unwrap_err();
        assert_eq!(err, tideline_core::Error::NativeCall { code: 9 });
        assert!(registry.lookup("m1").is_some());
        assert_eq!(registry.count(), 2);
    }

    fn metadata_for(log: &crate::client::CallLog, id: TimelineId) -> usize {
        log.of_kind(CallKind::TimelineMetadata)
            .iter()
            .filter(|c| matches!(c, Call::TimelineMetadata { timeline: Some(t), .. } if *t == id))
            .count()
    }

    #[test]
    fn test_failed_open_describes_timeline_on_next_switch() {
        let mut client = RecordingClient::new().fail_once(CallKind::OpenTimeline, 5);
        let log = client.log();
        let mut registry = registry(&mut client);

        assert!(registry.switch_to(&mut client, Some("m1")).is_err());
        let id = registry.lookup("m1").unwrap();
        assert!(registry.is_undescribed("m1"));
        assert_eq!(metadata_for(&log, id), 0);

        assert_eq!(
            registry.switch_to(&mut client, Some("m1")).unwrap(),
            (Switch::Reopened, id)
        );
        assert!(!registry.is_undescribed("m1"));
        for _ in 0..3 {
            registry.switch_to(&mut client, Some("m1")).unwrap();
        }
        assert_eq!(metadata_for(&log, id), 1);
        assert_eq!(log.count(CallKind::AllocateTimelineId), 2);
    }

    #[test]
    fn test_failed_metadata_is_retried_while_open() {
        let mut client = RecordingClient::new().fail_once(CallKind::TimelineMetadata, 6);
        let log = client.log();
        let mut registry = registry(&mut client);

        assert!(registry.switch_to(&mut client, Some("m1")).is_err());
        let id = registry.lookup("m1").unwrap();
        assert_eq!(registry.current().map(|t| t.id), Some(id));
        assert!(registry.is_undescribed("m1"));

        assert_eq!(
            registry.switch_to(&mut client, Some("m1")).unwrap(),
            (Switch::Unchanged, id)
        );
        registry.switch_to(&mut client, Some("m1")).unwrap();
        assert_eq!(metadata_for(&log, id), 1);
        assert!(!registry.is_undescribed("m1"));
    }

    #[test]
    fn test_open_failure_leaves_current_untouched() {
        let mut client = RecordingClient::new().fail_on(CallKind::OpenTimeline, 1);
        let mut registry = registry(&mut client);
        assert!(registry.switch_to(&mut client, None).is_err());
        assert!(registry.current().is_none());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    #[test]
    fn test_timelines_lists_global_first() {
        let mut client = RecordingClient::new();
        let mut registry = registry(&mut client);
        registry.switch_to(&mut client, Some("zeta")).unwrap();
        registry.switch_to(&mut client, Some("alpha")).unwrap();

        let entities: Vec<_> = registry
            .timelines()
            .into_iter()
            .map(|t| t.entity)
            .collect();
        assert_eq!(
            entities,
            vec![None, Some("alpha".to_string()), Some("zeta".to_string())]
        );
    }
}
