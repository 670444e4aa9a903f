//! Host-facing telemetry backend.
//!
//! The backend never takes the host down. If configuration is missing or the
//! session can't be opened, the failure is logged once and the backend stays
//! disabled for the rest of the process: every later [`TelemetryBackend::log`]
//! is a no-op.

use tideline_core::metrics::set_gauge;

use crate::client::IngestClient;
use crate::config::Config;
use crate::pipeline::{Emission, EventPipeline, MinLevel};
use crate::record::LogRecord;
use crate::session::{IngestSession, SessionOptions};
use crate::{Error, Result};

/// A live pipeline, or nothing.
pub enum TelemetryBackend<C: IngestClient> {
    Active(EventPipeline<C>),
    Disabled,
}

impl<C: IngestClient> TelemetryBackend<C> {
    /// Load configuration from the environment, then [`start`](Self::start).
    pub fn from_env<F>(make_client: F) -> Self
    where
        F: FnOnce() -> tideline_core::Result<C>,
    {
        match Config::from_env() {
            Ok(config) => Self::start(&config, make_client),
            Err(e) => Self::disable(e),
        }
    }

    /// Build the client, open a session and wrap it in a pipeline.
    pub fn start<F>(config: &Config, make_client: F) -> Self
    where
        F: FnOnce() -> tideline_core::Result<C>,
    {
        match Self::try_start(config, make_client) {
            Ok(pipeline) => {
                set_gauge("ingest_backend_enabled", 1.0);
                TelemetryBackend::Active(pipeline)
            }
            Err(e) => Self::disable(e),
        }
    }

    fn try_start<F>(config: &Config, make_client: F) -> Result<EventPipeline<C>>
    where
        F: FnOnce() -> tideline_core::Result<C>,
    {
        let client = make_client()?;
        let session = IngestSession::open(client, &SessionOptions::from(config))?;
        Ok(EventPipeline::new(session, MinLevel(config.min_level)))
    }

    fn disable(error: Error) -> Self {
        tracing::error!(error = %error, "telemetry backend disabled");
        set_gauge("ingest_backend_enabled", 0.0);
        TelemetryBackend::Disabled
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TelemetryBackend::Active(_))
    }

    pub fn pipeline(&self) -> Option<&EventPipeline<C>> {
        match self {
            TelemetryBackend::Active(pipeline) => Some(pipeline),
            TelemetryBackend::Disabled => None,
        }
    }

    /// Forward one record. Failures are logged by the pipeline and swallowed here.
    pub fn log(&self, record: &LogRecord) -> Option<Emission> {
        self.pipeline()?.emit(record).ok()
    }

    /// Close the session. Later calls to [`log`](Self::log) do nothing.
    pub fn shutdown(&self) {
        if let Some(pipeline) = self.pipeline()
            && let Err(e) = pipeline.close()
        {
            tracing::warn!(error = %e, "error while closing ingest session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CallKind, RecordingClient};
    use crate::record::LogLevel;

    fn config() -> Config {
        Config {
            ingest_url: "modality-ingest://localhost".to_string(),
            auth_token: "t".to_string(),
            run_id: "r".to_string(),
            allow_insecure_tls: false,
            min_level: LogLevel::Info,
            global_timeline_name: "global".to_string(),
            internal_source: "tideline".to_string(),
        }
    }

    #[test]
    fn test_start_success() {
        let backend = TelemetryBackend::start(&config(), || Ok(RecordingClient::new()));
        assert!(backend.is_enabled());
        assert!(matches!(
            backend.log(&LogRecord::new(1, "hi")),
            Some(Emission::Submitted { .. })
        ));
    }

    #[test]
    fn test_client_construction_failure_disables() {
        let backend: TelemetryBackend<RecordingClient> =
            TelemetryBackend::start(&config(), || Err(tideline_core::Error::NativeCall { code: 1 }));
        assert!(!backend.is_enabled());
        assert_eq!(backend.log(&LogRecord::new(1, "dropped")), None);
        backend.shutdown();
    }

    #[test]
    fn test_connect_failure_disables_and_disposes() {
        let client = RecordingClient::new().fail_on(CallKind::Connect, 2);
        let log = client.log();
        let backend = TelemetryBackend::start(&config(), || Ok(client));
        assert!(!backend.is_enabled());
        assert_eq!(log.count(CallKind::Dispose), 1);
        assert_eq!(backend.log(&LogRecord::new(1, "dropped")), None);
        assert_eq!(log.count(CallKind::Event), 0);
    }

    #[test]
    fn test_emit_failure_keeps_backend_enabled() {
        let client = RecordingClient::new().fail_on(CallKind::Event, 6);
        let backend = TelemetryBackend::start(&config(), || Ok(client));
        assert_eq!(backend.log(&LogRecord::new(1, "lost")), None);
        assert!(backend.is_enabled());
    }

    #[test]
    fn test_shutdown_then_log_is_noop() {
        let client = RecordingClient::new();
        let log = client.log();
        let backend = TelemetryBackend::start(&config(), || Ok(client));
        backend.shutdown();
        backend.shutdown();
        assert_eq!(backend.log(&LogRecord::new(1, "late")), None);
        assert_eq!(log.count(CallKind::Dispose), 1);
        assert_eq!(log.count(CallKind::Event), 0);
    }
}
