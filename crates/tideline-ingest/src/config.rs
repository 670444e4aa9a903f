//! Configuration loaded from environment variables.

use crate::record::LogLevel;
use crate::{Error, Result};

pub const INGEST_URL: &str = "MODALITY_INGEST_URL";
pub const AUTH_TOKEN: &str = "MODALITY_AUTH_TOKEN";
pub const RUN_ID: &str = "MODALITY_RUN_ID";
pub const ALLOW_INSECURE_TLS: &str = "MODALITY_ALLOW_INSECURE_TLS";
pub const MIN_LEVEL: &str = "TIDELINE_MIN_LEVEL";
pub const GLOBAL_TIMELINE: &str = "TIDELINE_GLOBAL_TIMELINE";
pub const INTERNAL_SOURCE: &str = "TIDELINE_INTERNAL_SOURCE";

/// Ingest configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ingestion endpoint URL.
    pub ingest_url: String,

    /// Auth token, passed through to the client untouched.
    pub auth_token: String,

    /// Value of `timeline.run_id` on every timeline.
    pub run_id: String,

    /// Accept self-signed certificates on the ingest connection.
    pub allow_insecure_tls: bool,

    /// Records below this level are not sent.
    pub min_level: LogLevel,

    /// `timeline.name` of the global timeline.
    pub global_timeline_name: String,

    /// Value of `timeline.internal.source` on every timeline.
    pub internal_source: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `MODALITY_INGEST_URL`: Ingestion endpoint
    /// - `MODALITY_AUTH_TOKEN`: Auth token
    ///
    /// Optional:
    /// - `MODALITY_RUN_ID`: Run id (default: fresh UUID v4)
    /// - `MODALITY_ALLOW_INSECURE_TLS`: `true`/`false`/`1`/`0` (default: false)
    /// - `TIDELINE_MIN_LEVEL`: Minimum record level (default: "info")
    /// - `TIDELINE_GLOBAL_TIMELINE`: Global timeline name (default: "global")
    /// - `TIDELINE_INTERNAL_SOURCE`: Internal source tag (default: "tideline")
    pub fn from_env() -> Result<Self> {
        let ingest_url = required(INGEST_URL)?;
        let auth_token = required(AUTH_TOKEN)?;
        Self::with_endpoint(ingest_url, auth_token)
    }

    /// Like [`from_env`](Self::from_env), but the endpoint variables are
    /// optional. Used when no connection will be made.
    pub fn from_env_dry_run() -> Result<Self> {
        let ingest_url = optional(INGEST_URL).unwrap_or_else(|| "dry-run://".to_string());
        let auth_token = optional(AUTH_TOKEN).unwrap_or_default();
        Self::with_endpoint(ingest_url, auth_token)
    }

    fn with_endpoint(ingest_url: String, auth_token: String) -> Result<Self> {
        let run_id = optional(RUN_ID).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let allow_insecure_tls = match optional(ALLOW_INSECURE_TLS) {
            Some(v) => parse_bool(ALLOW_INSECURE_TLS, &v)?,
            None => false,
        };

        let min_level = match optional(MIN_LEVEL) {
            Some(v) => v.parse::<LogLevel>().map_err(|reason| Error::InvalidConfiguration {
                name: MIN_LEVEL,
                reason,
            })?,
            None => LogLevel::Info,
        };

        let global_timeline_name =
            optional(GLOBAL_TIMELINE).unwrap_or_else(|| "global".to_string());
        let internal_source = optional(INTERNAL_SOURCE).unwrap_or_else(|| "tideline".to_string());

        tracing::info!(
            ingest_url = %ingest_url,
            run_id = %run_id,
            allow_insecure_tls,
            min_level = %min_level,
            global_timeline = %global_timeline_name,
            "ingest configuration loaded"
        );

        Ok(Self {
            ingest_url,
            auth_token,
            run_id,
            allow_insecure_tls,
            min_level,
            global_timeline_name,
            internal_source,
        })
    }
}

/// A set, non-blank variable.
fn optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &'static str) -> Result<String> {
    optional(name).ok_or(Error::MissingConfiguration(name))
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfiguration {
            name,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}
