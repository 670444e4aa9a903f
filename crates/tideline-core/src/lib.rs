//! Core types for the Tideline ingest plugin.
//!
//! This crate provides:
//! - The dynamic [`Value`] model and the encoder onto tagged [`AttrVal`]s
//! - [`TimelineId`], the opaque 128-bit timeline identifier
//! - The `#[repr(C)]` wire records and the [`Arena`] that owns their buffers
//! - Prometheus metrics helpers
//! - Shared error types

pub mod attr;
mod error;
pub mod metrics;
pub mod timeline;
pub mod wire;

pub use attr::{AttrBatch, AttrKey, AttrTag, AttrVal, Nanoseconds, Value};
pub use error::{Error, Result};
pub use timeline::TimelineId;
pub use wire::{Arena, RawAttr, RawAttrVal, RawPayload, WireBatch};
