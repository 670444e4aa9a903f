//! Native wire records and the scoped allocation arena that backs them.
//!
//! Each attribute crosses the native boundary as a fixed-size [`RawAttr`]:
//!
//! ```text
//! offset 0   u32         key
//! offset 8   i32         tag      (AttrTag)
//! offset 16  8 bytes     payload  (inline scalar or pointer)
//! ```
//!
//! Pointer payloads (text, timeline ids, the reserved wide kinds) point into
//! buffers owned by an [`Arena`]. A lowered [`WireBatch`] borrows its arena,
//! so the buffers are guaranteed to outlive every native call that reads the
//! batch, and are freed exactly once when the arena goes out of scope, on the
//! success path and the error path alike.

use std::ffi::{CStr, CString, c_char};
use std::marker::PhantomData;

use crate::attr::{AttrBatch, AttrKey, AttrTag, AttrVal, Nanoseconds};
use crate::error::Result;
use crate::timeline::TimelineId;

/// Payload of a tagged value. The active member is selected by [`AttrTag`].
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawPayload {
    pub timeline_id: *const TimelineId,
    pub string: *const c_char,
    pub integer: i64,
    /// Little-endian `i128` bytes.
    pub bigint: *const [u8; 16],
    pub float: f64,
    pub boolean: bool,
    pub timestamp: u64,
    /// `[lower, upper]`.
    pub logical_time: *const [u64; 2],
}

/// Fixed-size tagged value as seen by the native client.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawAttrVal {
    pub tag: AttrTag,
    pub payload: RawPayload,
}

impl RawAttrVal {
    /// Read the value back out.
    ///
    /// # Safety
    ///
    /// Pointer payloads must still point at live buffers, i.e. the arena that
    /// produced this value must not have been dropped.
    unsafe fn decode(&self) -> AttrVal {
        // SAFETY: the tag selects the member that was written in `Arena::lower`,
        // and the caller guarantees pointees are alive.
        unsafe {
            match self.tag {
                AttrTag::TimelineId => AttrVal::TimelineId(*self.payload.timeline_id),
                AttrTag::String => AttrVal::String(
                    CStr::from_ptr(self.payload.string)
                        .to_string_lossy()
                        .into_owned(),
                ),
                AttrTag::Integer => AttrVal::Integer(self.payload.integer),
                AttrTag::BigInt => AttrVal::BigInt(i128::from_le_bytes(*self.payload.bigint)),
                AttrTag::Float => AttrVal::Float(self.payload.float),
                AttrTag::Bool => AttrVal::Bool(self.payload.boolean),
                AttrTag::Timestamp => AttrVal::Timestamp(Nanoseconds(self.payload.timestamp)),
                AttrTag::LogicalTime => {
                    let [lower, upper] = *self.payload.logical_time;
                    AttrVal::LogicalTime(lower, upper)
                }
            }
        }
    }
}

/// One `{key, tagged value}` record.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct RawAttr {
    pub key: u32,
    pub val: RawAttrVal,
}

/// Owner of the temporary buffers created while lowering one batch.
///
/// Every buffer lives in a heap allocation whose address does not move when
/// the owning `Vec` grows, so handed-out pointers stay valid until drop.
#[derive(Debug, Default)]
pub struct Arena {
    texts: Vec<CString>,
    timeline_ids: Vec<Box<TimelineId>>,
    bigints: Vec<Box<[u8; 16]>>,
    logical_times: Vec<Box<[u64; 2]>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `s` into a NUL-terminated buffer owned by the arena.
    ///
    /// Interior NUL bytes can't be represented in a C string; they are
    /// replaced with U+FFFD.
    pub fn intern_text(&mut self, s: &str) -> *const c_char {
        let text = if s.contains('\0') {
            CString::new(s.replace('\0', "\u{FFFD}")).unwrap_or_default()
        } else {
            CString::new(s).unwrap_or_default()
        };
        let ptr = text.as_ptr();
        self.texts.push(text);
        ptr
    }

    /// Number of live allocations owned by the arena.
    pub fn len(&self) -> usize {
        self.texts.len() + self.timeline_ids.len() + self.bigints.len() + self.logical_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lower a tagged value, allocating backing storage for pointer payloads.
    pub fn lower(&mut self, val: &AttrVal) -> RawAttrVal {
        let payload = match val {
            AttrVal::TimelineId(id) => {
                let boxed = Box::new(*id);
                let ptr: *const TimelineId = &*boxed;
                self.timeline_ids.push(boxed);
                RawPayload { timeline_id: ptr }
            }
            AttrVal::String(s) => RawPayload {
                string: self.intern_text(s),
            },
            AttrVal::Integer(i) => RawPayload { integer: *i },
            AttrVal::BigInt(i) => {
                let boxed = Box::new(i.to_le_bytes());
                let ptr: *const [u8; 16] = &*boxed;
                self.bigints.push(boxed);
                RawPayload { bigint: ptr }
            }
            AttrVal::Float(f) => RawPayload { float: *f },
            AttrVal::Bool(b) => RawPayload { boolean: *b },
            AttrVal::Timestamp(ns) => RawPayload { timestamp: ns.0 },
            AttrVal::LogicalTime(lower, upper) => {
                let boxed = Box::new([*lower, *upper]);
                let ptr: *const [u64; 2] = &*boxed;
                self.logical_times.push(boxed);
                RawPayload { logical_time: ptr }
            }
        };
        RawAttrVal {
            tag: val.tag(),
            payload,
        }
    }

    /// Encode and lower a whole batch. Null values are skipped.
    pub fn prepare<'a>(&'a mut self, batch: &AttrBatch) -> Result<WireBatch<'a>> {
        let encoded = batch.encode()?;
        Ok(self.lower_all(&encoded))
    }

    /// Lower already-encoded pairs.
    pub fn lower_all<'a>(&'a mut self, pairs: &[(AttrKey, AttrVal)]) -> WireBatch<'a> {
        let attrs = pairs
            .iter()
            .map(|(key, val)| RawAttr {
                key: key.0,
                val: self.lower(val),
            })
            .collect();
        WireBatch {
            attrs,
            _arena: PhantomData,
        }
    }
}

/// A lowered attribute batch, valid for as long as its arena is borrowed.
pub struct WireBatch<'a> {
    attrs: Vec<RawAttr>,
    _arena: PhantomData<&'a Arena>,
}

impl WireBatch<'_> {
    /// The records, ready to be handed to a native call.
    pub fn as_slice(&self) -> &[RawAttr] {
        &self.attrs
    }

    pub fn as_ptr(&self) -> *const RawAttr {
        self.attrs.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Read the batch back into owned key/value pairs.
    pub fn decode(&self) -> Vec<(AttrKey, AttrVal)> {
        self.attrs
            .iter()
            // SAFETY: `self` borrows the arena that owns every pointee.
            .map(|raw| (AttrKey(raw.key), unsafe { raw.val.decode() }))
            .collect()
    }
}
