//! Backend serving objects from local directories.
//!
//! Each store is one directory pinned to a datacenter. A file named
//! `<message_id>_<name>` is the media payload of message `message_id`.

use super::{
    object_fingerprint, BackendError, BackendIdentity, ExportedAuthorization, MediaPayload,
    MediaSession, SessionAuth, StoredObject,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use streamgate_common::paths::guess_mime;
use streamgate_common::{DcId, FileLocation};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A store directory and the datacenter it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryStore {
    pub id: i64,
    pub dc: DcId,
    pub path: PathBuf,
}

struct DirectoryState {
    stores: HashMap<i64, DirectoryStore>,
    tokens: DashMap<i64, (DcId, Bytes)>,
    next_token: AtomicI64,
}

/// Directory backend shared by every configured identity.
#[derive(Clone)]
pub struct DirectoryBackend {
    state: Arc<DirectoryState>,
}

impl DirectoryBackend {
    pub fn new(stores: impl IntoIterator<Item = DirectoryStore>) -> Self {
        let stores = stores.into_iter().map(|s| (s.id, s)).collect();
        Self {
            state: Arc::new(DirectoryState {
                stores,
                tokens: DashMap::new(),
                next_token: AtomicI64::new(0),
            }),
        }
    }

    /// Handle for one identity.
    pub fn identity(&self, name: impl Into<String>, home_dc: DcId) -> DirectoryIdentity {
        DirectoryIdentity {
            name: name.into(),
            home_dc,
            state: Arc::clone(&self.state),
        }
    }

    pub fn store_count(&self) -> usize {
        self.state.stores.len()
    }
}

/// Leading message id of a store file name.
///
/// The digits must be followed by `_`, `.` or the end of the name.
fn message_id_of(file_name: &str) -> Option<i64> {
    let digits = file_name
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(file_name.len());
    if digits == 0 {
        return None;
    }
    match file_name[digits..].chars().next() {
        None | Some('_') | Some('.') => file_name[..digits].parse().ok(),
        _ => None,
    }
}

/// Name shown to clients: the part after `<message_id>_`.
fn display_name_of(file_name: &str) -> &str {
    file_name
        .split_once('_')
        .map(|(_, rest)| rest)
        .filter(|rest| !rest.is_empty())
        .unwrap_or(file_name)
}

fn io_error(e: std::io::Error) -> BackendError {
    match e.kind() {
        ErrorKind::TimedOut => BackendError::Timeout,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            BackendError::Connection(e.to_string())
        }
        _ => BackendError::Other(e.to_string()),
    }
}

impl DirectoryState {
    fn location_path(
        &self,
        location: &FileLocation,
    ) -> Result<(&DirectoryStore, PathBuf), BackendError> {
        let (store_id, file_name) = location
            .as_str()
            .split_once(':')
            .ok_or_else(|| BackendError::Malformed(format!("bad location {location}")))?;
        let store = store_id
            .parse::<i64>()
            .ok()
            .and_then(|id| self.stores.get(&id))
            .ok_or_else(|| BackendError::Other(format!("unknown store in {location}")))?;
        if file_name.contains('/') || file_name.contains('\\') || file_name == ".." {
            return Err(BackendError::Malformed(format!("bad location {location}")));
        }
        Ok((store, store.path.join(file_name)))
    }
}

/// One identity's view of a [`DirectoryBackend`].
pub struct DirectoryIdentity {
    name: String,
    home_dc: DcId,
    state: Arc<DirectoryState>,
}

#[async_trait]
impl BackendIdentity for DirectoryIdentity {
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
        let Some(store) = self.state.stores.get(&store_id) else {
            return Ok(None);
        };

        let mut matches = Vec::new();
        let mut entries = tokio::fs::read_dir(&store.path).await.map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if message_id_of(&file_name) != Some(message_id) {
                continue;
            }
            let metadata = entry.metadata().await.map_err(io_error)?;
            if metadata.is_file() {
                matches.push((file_name, metadata.len()));
            }
        }

        // Lowest file name wins so duplicates resolve the same way every time.
        matches.sort();
        let Some((file_name, size)) = matches.first() else {
            return Ok(None);
        };
        if matches.len() > 1 {
            tracing::warn!(
                store_id,
                message_id,
                chosen = %file_name,
                candidates = matches.len(),
                "Several store files claim one message id"
            );
        }

        let name = display_name_of(file_name).to_string();
        tracing::trace!(store_id, message_id, file = %file_name, "Matched store file");
        Ok(Some(StoredObject {
            store_id,
            message_id,
            media: Some(MediaPayload {
                location: FileLocation::new(format!("{store_id}:{file_name}")),
                dc_id: store.dc,
                size: *size,
                mime: guess_mime(&name).map(str::to_string),
                unique_id: object_fingerprint(store_id, message_id, file_name),
                name: Some(name),
            }),
        }))
    }

    async fn export_authorization(
        &self,
        dc_id: DcId,
    ) -> Result<ExportedAuthorization, BackendError> {
        let id = self.state.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        let bytes = Bytes::from(rand::random::<[u8; 32]>().to_vec());
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
                "home credential of {} is bound to DC {}",
                self.name, self.home_dc
            )));
        }
        Ok(Arc::new(DirectorySession {
            dc_id,
            authorized: AtomicBool::new(auth == SessionAuth::HomeCredential),
            state: Arc::clone(&self.state),
        }))
    }
}

struct DirectorySession {
    dc_id: DcId,
    authorized: AtomicBool,
    state: Arc<DirectoryState>,
}

#[async_trait]
impl MediaSession for DirectorySession {
    fn dc_id(&self) -> DcId {
        self.dc_id
    }

    async fn import_authorization(
        &self,
        authorization: &ExportedAuthorization,
    ) -> Result<(), BackendError> {
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
        if !self.authorized.load(Ordering::SeqCst) {
            return Err(BackendError::Unauthorized("authorization not imported".into()));
        }
        let (store, path) = self.state.location_path(location)?;
        if store.dc != self.dc_id {
            return Err(BackendError::Other(format!(
                "store {} lives in DC {}, session is in DC {}",
                store.id, store.dc, self.dc_id
            )));
        }

        let mut file = tokio::fs::File::open(&path).await.map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();
        if offset >= len {
            return Ok(Bytes::new());
        }
        file.seek(SeekFrom::Start(offset)).await.map_err(io_error)?;

        let want = limit.min(len - offset) as usize;
        let mut buf = Vec::with_capacity(want);
        file.take(want as u64)
            .read_to_end(&mut buf)
            .await
            .map_err(io_error)?;
        Ok(Bytes::from(buf))
    }

    async fn stop(&self) {
        tracing::trace!(dc = %self.dc_id, "Directory session stopped");
    }
}
