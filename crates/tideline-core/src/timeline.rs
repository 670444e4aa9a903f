//! Timeline identifiers.
//!
//! A [`TimelineId`] is an opaque 128-bit value. The core never invents one on
//! its own: ids are always handed out by the ingest client's generator, which
//! guarantees uniqueness across the ingestion service.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Opaque 128-bit timeline identifier.
///
/// Laid out as 16 raw bytes so it can be passed by reference across the
/// native call boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimelineId {
    bytes: [u8; 16],
}

impl TimelineId {
    /// The all-zero id, used as an out-parameter before the client fills it in.
    pub const ZERO: TimelineId = TimelineId { bytes: [0; 16] };

    /// Wrap raw bytes produced by an ingest client's id generator.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// The id as a big-endian `u128`.
    pub fn to_u128(&self) -> u128 {
        u128::from_be_bytes(self.bytes)
    }
}

impl From<u128> for TimelineId {
    fn from(value: u128) -> Self {
        Self::from_bytes(value.to_be_bytes())
    }
}

/// Hyphenated 8-4-4-4-12 hex, the same shape as a UUID.
impl fmt::Display for TimelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(self.bytes);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

impl FromStr for TimelineId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| *c != '-').collect();
        let bytes = hex::decode(&compact).map_err(|e| Error::InvalidTimelineId(e.to_string()))?;
        let bytes: [u8; 16] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| Error::InvalidTimelineId(format!("expected 16 bytes, got {}", b.len())))?;
        Ok(Self::from_bytes(bytes))
    }
}
