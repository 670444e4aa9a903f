//! Error types for the ingest session and its host adapter.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting log records.
#[derive(Error, Debug)]
pub enum Error {
    /// Encoding or ingest client failure.
    #[error(transparent)]
    Core(#[from] tideline_core::Error),

    /// A required environment variable is not set.
    #[error("missing required configuration: {0}")]
    MissingConfiguration(&'static str),

    /// A configuration value could not be parsed.
    #[error("invalid value for {name}: {reason}")]
    InvalidConfiguration {
        name: &'static str,
        reason: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session was used after it was disposed.
    #[error("ingest session has been disposed")]
    SessionDisposed,
}

impl Error {
    /// Status code of a failed native call, if that is what this error is.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Core(tideline_core::Error::NativeCall { code }) => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_error_is_transparent() {
        let err: Error = tideline_core::Error::NativeCall { code: 5 }.into();
        assert_eq!(err.to_string(), "ingest call failed with status code 5");
        assert_eq!(err.native_code(), Some(5));
    }

    #[test]
    fn test_missing_configuration_names_variable() {
        let err = Error::MissingConfiguration("MODALITY_AUTH_TOKEN");
        assert!(err.to_string().contains("MODALITY_AUTH_TOKEN"));
        assert_eq!(err.native_code(), None);
    }

    #[test]
    fn test_invalid_configuration_display() {
        let err = Error::InvalidConfiguration {
            name: "TIDELINE_MIN_LEVEL",
            reason: "unknown level 'loud'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for TIDELINE_MIN_LEVEL: unknown level 'loud'"
        );
    }
}
