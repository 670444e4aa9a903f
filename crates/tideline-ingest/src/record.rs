//! Log records as delivered by the host.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a log record, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Noisy,
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    /// Name published as the `event.log_level` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Noisy => "Noisy",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "noisy" | "trace" => Ok(LogLevel::Noisy),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

/// One structured log record.
///
/// `machine_name` is the entity key: records from the same machine share a
/// timeline, and records without one go to the global timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Monotonic record id, used as the lower ordering component. Sources
    /// assign one when the input has none.
    #[serde(default)]
    pub id: u64,

    pub message: String,

    #[serde(default = "default_level")]
    pub level: LogLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,

    #[serde(default = "Utc::now")]
    pub time: DateTime<Utc>,

    /// Extra attributes, published as `event.<name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

fn default_level() -> LogLevel {
    LogLevel::Info
}

impl LogRecord {
    /// A record with the given message at `Info`, stamped now.
    pub fn new(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            level: LogLevel::Info,
            source_id: None,
            thread_id: None,
            machine_name: None,
            object_name: None,
            time: Utc::now(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_machine(mut self, machine_name: impl Into<String>) -> Self {
        self.machine_name = Some(machine_name.into());
        self
    }

    pub fn with_object(mut self, object_name: impl Into<String>) -> Self {
        self.object_name = Some(object_name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// The entity key selecting this record's timeline.
    pub fn entity(&self) -> Option<&str> {
        self.machine_name.as_deref()
    }
}
