//! Attribute key interning.
//!
//! Every attribute name is declared with the client once per session; the
//! returned [`AttrKey`] is cached and reused for the life of the session.

use std::collections::HashMap;

use tideline_core::{AttrKey, Result};

use crate::client::IngestClient;

/// Timeline metadata attribute names.
pub mod timeline {
    pub const NAME: &str = "timeline.name";
    pub const RUN_ID: &str = "timeline.run_id";
    pub const INTERNAL_SOURCE: &str = "timeline.internal.source";
}

/// Event attribute names.
pub mod event {
    pub const NAME: &str = "event.name";
    pub const TIMESTAMP: &str = "event.timestamp";
    pub const SOURCE_ID: &str = "event.source_id";
    pub const THREAD_ID: &str = "event.thread_id";
    pub const MACHINE_NAME: &str = "event.machine_name";
    pub const OBJECT_NAME: &str = "event.object_name";
    pub const LOG_LEVEL: &str = "event.log_level";

    /// Prefix for record fields beyond the fixed set.
    pub const FIELD_PREFIX: &str = "event.";

    /// Every name carried by the fixed event attributes.
    pub const FIXED: [&str; 7] = [
        NAME,
        TIMESTAMP,
        SOURCE_ID,
        THREAD_ID,
        MACHINE_NAME,
        OBJECT_NAME,
        LOG_LEVEL,
    ];

    pub fn is_fixed(name: &str) -> bool {
        FIXED.contains(&name)
    }
}

/// Name to key cache for one session.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: HashMap<String, AttrKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `name`, declaring it with the client on first use.
    pub fn declare<C: IngestClient + ?Sized>(&mut self, client: &mut C, name: &str) -> Result<AttrKey> {
        if let Some(key) = self.keys.get(name) {
            return Ok(*key);
        }
        let key = client.declare_attr_key(name)?;
        tracing::trace!(name, key = key.0, "declared attribute key");
        self.keys.insert(name.to_string(), key);
        Ok(key)
    }

    /// Resolve an extra record field as `event.<field>`.
    ///
    /// Returns `None` for a field whose name would land on one of the fixed
    /// event attributes; nothing is declared for it.
    pub fn declare_field<C: IngestClient + ?Sized>(
        &mut self,
        client: &mut C,
        field: &str,
    ) -> Result<Option<AttrKey>> {
        let name = format!("{}{field}", event::FIELD_PREFIX);
        if event::is_fixed(&name) {
            return Ok(None);
        }
        self.declare(client, &name).map(Some)
    }

    pub fn get(&self, name: &str) -> Option<AttrKey> {
        self.keys.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Keys used for timeline metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineKeys {
    pub name: AttrKey,
    pub run_id: AttrKey,
    pub internal_source: AttrKey,
}

impl TimelineKeys {
    pub fn declare<C: IngestClient + ?Sized>(registry: &mut KeyRegistry, client: &mut C) -> Result<Self> {
        Ok(Self {
            name: registry.declare(client, timeline::NAME)?,
            run_id: registry.declare(client, timeline::RUN_ID)?,
            internal_source: registry.declare(client, timeline::INTERNAL_SOURCE)?,
        })
    }
}

/// Keys used for every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKeys {
    pub name: AttrKey,
    pub timestamp: AttrKey,
    pub source_id: AttrKey,
    pub thread_id: AttrKey,
    pub machine_name: AttrKey,
    pub object_name: AttrKey,
    pub log_level: AttrKey,
}

impl EventKeys {
    pub fn declare<C: IngestClient + ?Sized>(registry: &mut KeyRegistry, client: &mut C) -> Result<Self> {
        Ok(Self {
            name: registry.declare(client, event::NAME)?,
            timestamp: registry.declare(client, event::TIMESTAMP)?,
            source_id: registry.declare(client, event::SOURCE_ID)?,
            thread_id: registry.declare(client, event::THREAD_ID)?,
            machine_name: registry.declare(client, event::MACHINE_NAME)?,
            object_name: registry.declare(client, event::OBJECT_NAME)?,
            log_level: registry.declare(client, event::LOG_LEVEL)?,
        })
    }
}
