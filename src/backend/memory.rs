//! In-memory backend with call counters and fault injection.
//!
//! Every [`MemoryIdentity`] created from one [`MemoryBackend`] sees the same
//! objects, the same exported authorizations, and the same counters.

use super::{
    object_fingerprint, BackendError, BackendIdentity, ExportedAuthorization, MediaPayload,
    MediaSession, SessionAuth, StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamgate_common::{DcId, FileLocation, ReferenceTuple};

/// How often an injected import fault fires.
#[derive(Debug, Clone)]
enum ImportFault {
    Always(BackendError),
    Times(BackendError, usize),
}

#[derive(Default)]
struct MemoryState {
    objects: DashMap<(i64, i64), Option<(MediaPayload, Bytes)>>,
    tokens: DashMap<i64, (DcId, Bytes)>,
    next_token: AtomicI64,
    import_fault: Mutex<Option<ImportFault>>,
    fetch_faults: Mutex<HashMap<u64, BackendError>>,
    fetch_delay: Mutex<Option<Duration>>,
    get_object_calls: AtomicUsize,
    import_attempts: AtomicUsize,
    sessions_opened: AtomicUsize,
    sessions_stopped: AtomicUsize,
    fetch_calls: AtomicUsize,
}

/// Shared in-memory object store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object and return the reference tuple that links to it.
    pub fn insert_object(
        &self,
        store_id: i64,
        message_id: i64,
        dc_id: DcId,
        name: Option<&str>,
        mime: Option<&str>,
        data: impl Into<Bytes>,
    ) -> ReferenceTuple {
        let data = data.into();
        let unique_id = object_fingerprint(store_id, message_id, name.unwrap_or_default());
        let payload = MediaPayload {
            location: FileLocation::new(format!("mem:{store_id}:{message_id}")),
            dc_id,
            size: data.len() as u64,
            mime: mime.map(str::to_string),
            name: name.map(str::to_string),
            unique_id: unique_id.clone(),
        };
        self.state
            .objects
            .insert((store_id, message_id), Some((payload, data)));
        ReferenceTuple::from_unique_id(store_id, message_id, &unique_id)
    }

    /// Store a message that carries no media.
    pub fn insert_text_message(&self, store_id: i64, message_id: i64) {
        self.state.objects.insert((store_id, message_id), None);
    }

    /// Create an identity whose credential lives in `home_dc`.
    pub fn identity(&self, name: impl Into<String>, home_dc: DcId) -> MemoryIdentity {
        MemoryIdentity {
            name: name.into(),
            home_dc,
            state: Arc::clone(&self.state),
        }
    }

    /// Make every authorization import fail with `error`.
    pub fn fail_imports(&self, error: BackendError) {
        *self.state.import_fault.lock() = Some(ImportFault::Always(error));
    }

    /// Make the next `times` authorization imports fail with `error`.
    pub fn fail_imports_times(&self, error: BackendError, times: usize) {
        *self.state.import_fault.lock() = Some(ImportFault::Times(error, times));
    }

    /// Fail the fetch at exactly `offset` with `error`.
    pub fn fail_fetch_at(&self, offset: u64, error: BackendError) {
        self.state.fetch_faults.lock().insert(offset, error);
    }

    /// Remove every injected fetch fault.
    pub fn clear_fetch_faults(&self) {
        self.state.fetch_faults.lock().clear();
    }

    /// Delay every fetch by `delay`.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.state.fetch_delay.lock() = Some(delay);
    }

    pub fn get_object_calls(&self) -> usize {
        self.state.get_object_calls.load(Ordering::SeqCst)
    }

    pub fn import_attempts(&self) -> usize {
        self.state.import_attempts.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_stopped(&self) -> usize {
        self.state.sessions_stopped.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.fetch_calls.load(Ordering::SeqCst)
    }
}

/// An identity on a [`MemoryBackend`].
pub struct MemoryIdentity {
    name: String,
    home_dc: DcId,
    state: Arc<MemoryState>,
}

#[async_trait]
impl BackendIdentity for MemoryIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn home_dc(&self) -> DcId {
        self.home_dc
    }

    async fn get_object(
        &self,
        store_id: i64,
        message_id: i64,
    ) -> Result<Option<StoredObject>, BackendError> {
        self.state.get_object_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .objects
            .get(&(store_id, message_id))
            .map(|entry| StoredObject {
                store_id,
                message_id,
                media: entry.value().as_ref().map(|(payload, _)| payload.clone()),
            }))
    }

    async fn export_authorization(
        &self,
        dc_id: DcId,
    ) -> Result<ExportedAuthorization, BackendError> {
        let id = self.state.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = Bytes::from(rand::random::<[u8; 16]>().to_vec());
        self.state.tokens.insert(id, (dc_id, bytes.clone()));
        Ok(ExportedAuthorization { id, bytes })
    }

    async fn open_session(
        &self,
        dc_id: DcId,
        auth: SessionAuth,
    ) -> Result<Arc<dyn MediaSession>, BackendError> {
        if auth == SessionAuth::HomeCredential && dc_id != self.home_dc {
            return Err(BackendError::Unauthorized(format!(
                "credential of DC {} is not valid in DC {}",
                self.home_dc, dc_id
            )));
        }
        self.state.sessions_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemorySession {
            dc_id,
            authorized: AtomicBool::new(auth == SessionAuth::HomeCredential),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemorySession {
    dc_id: DcId,
    authorized: AtomicBool,
    state: Arc<MemoryState>,
}

impl MemorySession {
    fn take_import_fault(&self) -> Option<BackendError> {
        let mut fault = self.state.import_fault.lock();
        match fault.take() {
            Some(ImportFault::Always(error)) => {
                *fault = Some(ImportFault::Always(error.clone()));
                Some(error)
            }
            Some(ImportFault::Times(error, remaining)) if remaining > 0 => {
                if remaining > 1 {
                    *fault = Some(ImportFault::Times(error.clone(), remaining - 1));
                }
                Some(error)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl MediaSession for MemorySession {
    fn dc_id(&self) -> DcId {
        self.dc_id
    }

    async fn import_authorization(
        &self,
        authorization: &ExportedAuthorization,
    ) -> Result<(), BackendError> {
        self.state.import_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.take_import_fault() {
            return Err(error);
        }

        match self.state.tokens.remove(&authorization.id) {
            Some((_, (dc_id, bytes))) if dc_id == self.dc_id && bytes == authorization.bytes => {
                self.authorized.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(BackendError::AuthBytesInvalid),
        }
    }

    async fn fetch(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, BackendError> {
        self.state.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.state.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.state.fetch_faults.lock().get(&offset).cloned() {
            return Err(error);
        }
        if !self.authorized.load(Ordering::SeqCst) {
            return Err(BackendError::Unauthorized("authorization not imported".into()));
        }

        let data = self
            .state
            .objects
            .iter()
            .find_map(|entry| match entry.value() {
                Some((payload, data)) if &payload.location == location => Some(data.clone()),
                _ => None,
            })
            .ok_or_else(|| BackendError::Other(format!("unknown location {location}")))?;

        let len = data.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(limit).min(len);
        Ok(data.slice(offset as usize..end as usize))
    }

    async fn stop(&self) {
        self.state.sessions_stopped.fetch_add(1, Ordering::SeqCst);
    }
}
