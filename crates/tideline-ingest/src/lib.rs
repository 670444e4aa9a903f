//! Timeline-multiplexing log ingestion for Tideline.
//!
//! This crate turns structured log records into events on per-entity
//! timelines of a Modality-style ingestion service.
//!
//! # Modules
//!
//! - [`session`] - Ingest session: client, key registry and timeline registry behind one lock
//! - [`timeline`] - Lazily created per-entity timelines and the switcher
//! - [`pipeline`] - Record filter and event emission
//! - [`backend`] - Host adapter that disables itself on failure
//! - [`client`] - Ingest client contract, native binding and recording client
//! - [`source`] - Record sources (JSONL files, stdin)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Record Source  │  (JSONL files, stdin, host logger)
//! └────────┬────────┘
//!          │ LogRecord
//!          ▼
//! ┌─────────────────┐
//! │  EventPipeline  │  RecordFilter, attribute batch
//! └────────┬────────┘
//!          │ session lock
//!          ▼
//! ┌─────────────────┐
//! │  IngestSession  │  KeyRegistry + TimelineRegistry
//! └────────┬────────┘
//!          │ open_timeline / timeline_metadata / event
//!          ▼
//! ┌─────────────────┐
//! │  IngestClient   │  libmodality, or the recording client
//! └─────────────────┘
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod record;
pub mod session;
pub mod source;
pub mod timeline;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use backend::TelemetryBackend;
#[cfg(feature = "native")]
pub use client::NativeClient;
pub use client::{Call, CallKind, CallLog, IngestClient, RecordingClient};
pub use config::Config;
pub use keys::{EventKeys, KeyRegistry, TimelineKeys};
pub use pipeline::{Emission, EventPipeline, MinLevel, RecordFilter};
pub use record::{LogLevel, LogRecord};
pub use session::{IngestSession, SessionGuard, SessionOptions};
pub use source::{JsonlConfig, JsonlInput, JsonlSource, RecordSource, SourceStats};
pub use timeline::{Switch, Timeline, TimelineRegistry};
