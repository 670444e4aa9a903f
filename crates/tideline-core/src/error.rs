//! Error types shared by the Tideline crates.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while encoding attributes or talking to the ingest client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A call into the ingest client returned a non-zero status.
    #[error("ingest call failed with status code {code}")]
    NativeCall {
        /// The status code returned by the client.
        code: i32,
    },

    /// A value could not be mapped onto any attribute kind.
    ///
    /// This indicates a bug in the caller, not a transient condition.
    #[error("value of type '{type_name}' can't be converted to an attribute value")]
    UnsupportedAttributeType {
        /// Name of the offending source type.
        type_name: String,
    },

    /// A textual timeline id could not be parsed.
    #[error("invalid timeline id: {0}")]
    InvalidTimelineId(String),
}

impl Error {
    /// Map a native status code to `Ok(())` or [`Error::NativeCall`].
    pub fn check_status(code: i32) -> Result<()> {
        if code == 0 {
            Ok(())
        } else {
            Err(Error::NativeCall { code })
        }
    }
}
