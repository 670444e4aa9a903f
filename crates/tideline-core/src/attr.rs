//! Attribute keys, tagged attribute values and the value encoder.
//!
//! Source values arrive as [`Value`], a closed set of dynamically-typed
//! inputs. [`AttrVal::encode`] maps each of them onto exactly one of the
//! well-known attribute kinds the ingestion service understands, or rejects
//! it with [`Error::UnsupportedAttributeType`].
//!
//! # Kind mapping
//!
//! ```text
//! Value::Null             -> (omitted)
//! Value::Text             -> AttrVal::String
//! Value::Int              -> AttrVal::Integer
//! Value::UInt  <= i64::MAX -> AttrVal::Integer
//! Value::UInt  >  i64::MAX -> AttrVal::BigInt
//! Value::Float            -> AttrVal::Float
//! Value::Bool             -> AttrVal::Bool
//! Value::Timestamp        -> AttrVal::Timestamp
//! Value::Timeline         -> AttrVal::TimelineId
//! Value::Unsupported      -> Err(UnsupportedAttributeType)
//! ```

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::timeline::TimelineId;

/// Interned attribute key handed out by the ingest client.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrKey(pub u32);

impl From<u32> for AttrKey {
    fn from(key: u32) -> Self {
        Self(key)
    }
}

/// Nanoseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nanoseconds(pub u64);

impl Nanoseconds {
    /// Convert a wall-clock time, clamping pre-epoch times to zero and
    /// times past the `u64` nanosecond range (mid 2554) to `u64::MAX`.
    pub fn from_datetime(time: &DateTime<Utc>) -> Self {
        let Ok(secs) = u64::try_from(time.timestamp()) else {
            return Self(0);
        };
        secs.checked_mul(1_000_000_000)
            .and_then(|nanos| nanos.checked_add(u64::from(time.timestamp_subsec_nanos())))
            .map_or(Self(u64::MAX), Self)
    }
}

impl From<DateTime<Utc>> for Nanoseconds {
    fn from(time: DateTime<Utc>) -> Self {
        Self::from_datetime(&time)
    }
}

/// Wire discriminant of a tagged attribute value.
///
/// The numeric values are fixed by the native ABI.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrTag {
    TimelineId = 0,
    String = 1,
    Integer = 2,
    BigInt = 3,
    Float = 4,
    Bool = 5,
    Timestamp = 6,
    LogicalTime = 7,
}

/// A dynamically-typed source value, before encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Timestamp(Nanoseconds),
    Timeline(TimelineId),
    /// A value with no attribute representation (arrays, maps, ...).
    Unsupported { type_name: String },
}

impl Value {
    /// Short name of the value's kind, used in errors and logs.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Int(_) => "i64",
            Value::UInt(_) => "u64",
            Value::Float(_) => "f64",
            Value::Bool(_) => "bool",
            Value::Timestamp(_) => "timestamp",
            Value::Timeline(_) => "timeline_id",
            Value::Unsupported { type_name } => type_name,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Nanoseconds> for Value {
    fn from(v: Nanoseconds) -> Self {
        Value::Timestamp(v)
    }
}

impl From<TimelineId> for Value {
    fn from(v: TimelineId) -> Self {
        Value::Timeline(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(v: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    // Every non-integral JSON number is representable as f64.
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::Text(s.clone()),
            Json::Array(_) => Value::Unsupported {
                type_name: "array".to_string(),
            },
            Json::Object(_) => Value::Unsupported {
                type_name: "object".to_string(),
            },
        }
    }
}

/// A tagged attribute value. Exactly one kind is active.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrVal {
    TimelineId(TimelineId),
    String(String),
    Integer(i64),
    /// Reserved by the wire format; only produced for `u64` values above `i64::MAX`.
    BigInt(i128),
    Float(f64),
    Bool(bool),
    Timestamp(Nanoseconds),
    /// Reserved by the wire format; never produced by the encoder.
    LogicalTime(u64, u64),
}

impl AttrVal {
    /// Encode a source value.
    ///
    /// Returns `Ok(None)` for [`Value::Null`]; absent values never reach the wire.
    pub fn encode(value: Value) -> Result<Option<AttrVal>> {
        let encoded = match value {
            Value::Null => return Ok(None),
            Value::Text(s) => AttrVal::String(s),
            Value::Int(i) => AttrVal::Integer(i),
            Value::UInt(u) => match i64::try_from(u) {
                Ok(i) => AttrVal::Integer(i),
                Err(_) => AttrVal::BigInt(i128::from(u)),
            },
            Value::Float(f) => AttrVal::Float(f),
            Value::Bool(b) => AttrVal::Bool(b),
            Value::Timestamp(ns) => AttrVal::Timestamp(ns),
            Value::Timeline(id) => AttrVal::TimelineId(id),
            Value::Unsupported { type_name } => {
                return Err(Error::UnsupportedAttributeType { type_name });
            }
        };
        Ok(Some(encoded))
    }

    pub fn tag(&self) -> AttrTag {
        match self {
            AttrVal::TimelineId(_) => AttrTag::TimelineId,
            AttrVal::String(_) => AttrTag::String,
            AttrVal::Integer(_) => AttrTag::Integer,
            AttrVal::BigInt(_) => AttrTag::BigInt,
            AttrVal::Float(_) => AttrTag::Float,
            AttrVal::Bool(_) => AttrTag::Bool,
            AttrVal::Timestamp(_) => AttrTag::Timestamp,
            AttrVal::LogicalTime(..) => AttrTag::LogicalTime,
        }
    }
}

/// Ordered key/value pairs for one metadata publication or one event.
///
/// Duplicate keys are kept in insertion order; the receiver decides which wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrBatch {
    kvs: Vec<(AttrKey, Value)>,
}

impl AttrBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            kvs: Vec::with_capacity(capacity),
        }
    }

    /// Append a pair. Null values are kept here and dropped at encoding time.
    pub fn push(&mut self, key: AttrKey, value: impl Into<Value>) -> &mut Self {
        self.kvs.push((key, value.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.kvs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kvs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AttrKey, Value)> {
        self.kvs.iter()
    }

    /// Encode every non-null value, failing on the first unsupported one.
    pub fn encode(&self) -> Result<Vec<(AttrKey, AttrVal)>> {
        let mut out = Vec::with_capacity(self.kvs.len());
        for (key, value) in &self.kvs {
            if let Some(val) = AttrVal::encode(value.clone())? {
                out.push((*key, val));
            }
        }
        Ok(out)
    }
}
