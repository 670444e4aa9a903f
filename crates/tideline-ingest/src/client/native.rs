//! `libmodality` bindings.
//!
//! The runtime and client handles are owned by [`NativeClient`] and released
//! client-first, then runtime, exactly once, whether construction finished or
//! not. Every pointer handed to the library is either a handle we own or
//! points into a [`WireBatch`] whose arena outlives the call.

use std::ffi::{CString, c_char, c_int};
use std::ptr;

use tideline_core::{AttrKey, Error, RawAttr, Result, TimelineId, WireBatch};

use super::IngestClient;

#[repr(C)]
struct ModalityRuntime {
    _private: [u8; 0],
}

#[repr(C)]
struct ModalityIngestClient {
    _private: [u8; 0],
}

#[link(name = "modality")]
unsafe extern "C" {
    fn modality_runtime_new(out: *mut *mut ModalityRuntime) -> c_int;
    fn modality_runtime_free(runtime: *mut ModalityRuntime);

    fn modality_ingest_client_new(
        runtime: *mut ModalityRuntime,
        out: *mut *mut ModalityIngestClient,
    ) -> c_int;
    fn modality_ingest_client_free(client: *mut ModalityIngestClient);
    fn modality_ingest_client_connect(
        client: *mut ModalityIngestClient,
        url: *const c_char,
        allow_insecure_tls: c_int,
    ) -> c_int;
    fn modality_ingest_client_flush(client: *mut ModalityIngestClient);
    fn modality_ingest_client_authenticate(
        client: *mut ModalityIngestClient,
        auth_token: *const c_char,
    ) -> c_int;
    fn modality_ingest_client_declare_attr_key(
        client: *mut ModalityIngestClient,
        key_name: *const c_char,
        interned_attr_key: *mut u32,
    ) -> c_int;
    fn modality_ingest_client_open_timeline(
        client: *mut ModalityIngestClient,
        id: *const TimelineId,
    ) -> c_int;
    fn modality_ingest_client_close_timeline(client: *mut ModalityIngestClient) -> c_int;
    fn modality_ingest_client_timeline_metadata(
        client: *mut ModalityIngestClient,
        attrs: *const RawAttr,
        attrs_len: usize,
    ) -> c_int;
    fn modality_ingest_client_event(
        client: *mut ModalityIngestClient,
        ordering_lower: u64,
        ordering_upper: u64,
        attrs: *const RawAttr,
        attrs_len: usize,
    ) -> c_int;

    fn modality_timeline_id_init(id: *mut TimelineId) -> c_int;
}

/// Ingest client backed by `libmodality`.
pub struct NativeClient {
    runtime: *mut ModalityRuntime,
    client: *mut ModalityIngestClient,
}

// SAFETY: the handles are only used through `&mut self`, and the session
// serializes every call behind its lock.
unsafe impl Send for NativeClient {}

impl NativeClient {
    /// Create the runtime and an unconnected client.
    pub fn new() -> Result<Self> {
        let mut this = Self {
            runtime: ptr::null_mut(),
            client: ptr::null_mut(),
        };
        // SAFETY: out-parameters point at our own fields. On failure `this`
        // is dropped and releases whatever was created.
        unsafe {
            Error::check_status(modality_runtime_new(&mut this.runtime))?;
            Error::check_status(modality_ingest_client_new(this.runtime, &mut this.client))?;
        }
        tracing::debug!("native ingest client created");
        Ok(this)
    }

    fn handle(&self) -> Result<*mut ModalityIngestClient> {
        if self.client.is_null() {
            // Mirrors the library's status for calls on a released client.
            Err(Error::NativeCall { code: -1 })
        } else {
            Ok(self.client)
        }
    }
}

fn c_string(s: &str) -> CString {
    CString::new(s.replace('\0', "\u{FFFD}")).unwrap_or_default()
}

impl IngestClient for NativeClient {
    fn connect(&mut self, url: &str, allow_insecure_tls: bool) -> Result<()> {
        let handle = self.handle()?;
        let url = c_string(url);
        // SAFETY: live handle; `url` outlives the call.
        Error::check_status(unsafe {
            modality_ingest_client_connect(handle, url.as_ptr(), c_int::from(allow_insecure_tls))
        })
    }

    fn authenticate(&mut self, token: &str) -> Result<()> {
        let handle = self.handle()?;
        let token = c_string(token);
        // SAFETY: live handle; `token` outlives the call.
        Error::check_status(unsafe { modality_ingest_client_authenticate(handle, token.as_ptr()) })
    }

    fn declare_attr_key(&mut self, name: &str) -> Result<AttrKey> {
        let handle = self.handle()?;
        let name = c_string(name);
        let mut key = 0u32;
        // SAFETY: live handle; `name` and `key` outlive the call.
        Error::check_status(unsafe {
            modality_ingest_client_declare_attr_key(handle, name.as_ptr(), &mut key)
        })?;
        Ok(AttrKey(key))
    }

    fn allocate_timeline_id(&mut self) -> Result<TimelineId> {
        let mut id = TimelineId::ZERO;
        // SAFETY: `id` is a 16-byte repr(C) out-parameter.
        Error::check_status(unsafe { modality_timeline_id_init(&mut id) })?;
        Ok(id)
    }

    fn open_timeline(&mut self, id: TimelineId) -> Result<()> {
        let handle = self.handle()?;
        // SAFETY: live handle; `id` lives on our stack for the call.
        Error::check_status(unsafe { modality_ingest_client_open_timeline(handle, &id) })
    }

    fn close_timeline(&mut self) -> Result<()> {
        let handle = self.handle()?;
        // SAFETY: live handle.
        Error::check_status(unsafe { modality_ingest_client_close_timeline(handle) })
    }

    fn timeline_metadata(&mut self, attrs: &WireBatch<'_>) -> Result<()> {
        let handle = self.handle()?;
        // SAFETY: the batch borrows the arena owning every pointee.
        Error::check_status(unsafe {
            modality_ingest_client_timeline_metadata(handle, attrs.as_ptr(), attrs.len())
        })
    }

    fn event(
        &mut self,
        ordering_lower: u64,
        ordering_upper: u64,
        attrs: &WireBatch<'_>,
    ) -> Result<()> {
        let handle = self.handle()?;
        // SAFETY: the batch borrows the arena owning every pointee.
        Error::check_status(unsafe {
            modality_ingest_client_event(
                handle,
                ordering_lower,
                ordering_upper,
                attrs.as_ptr(),
                attrs.len(),
            )
        })
    }

    fn flush(&mut self) -> Result<()> {
        let handle = self.handle()?;
        // SAFETY: live handle.
        unsafe { modality_ingest_client_flush(handle) };
        Ok(())
    }

    fn dispose(&mut self) {
        if !self.client.is_null() {
            // SAFETY: created by `modality_ingest_client_new`, freed once.
            unsafe { modality_ingest_client_free(self.client) };
            self.client = ptr::null_mut();
        }
        if !self.runtime.is_null() {
            // SAFETY: created by `modality_runtime_new`, freed once, after the client.
            unsafe { modality_runtime_free(self.runtime) };
            self.runtime = ptr::null_mut();
        }
    }
}

impl Drop for NativeClient {
    fn drop(&mut self) {
        self.dispose();
    }
}
