//! Remote chunk backend capability.
//!
//! The streaming core talks to the backend only through two traits:
//!
//! - [`BackendIdentity`]: one authenticated actor. It can look up stored
//!   objects, export an authorization for another datacenter, and open
//!   sessions.
//! - [`MediaSession`]: an authenticated context scoped to one datacenter that
//!   can accept an imported authorization and fetch chunks.
//!
//! Two implementations ship with the crate: [`directory`] serves files from
//! local directories (one per store) and [`memory`] keeps objects in memory
//! with fault injection for tests.

pub mod directory;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use streamgate_common::{DcId, FileDescriptor, FileLocation};

pub use directory::{DirectoryBackend, DirectoryStore};
pub use memory::MemoryBackend;

/// Failures reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The imported authorization was rejected; a fresh export may succeed.
    #[error("Authorization bytes invalid")]
    AuthBytesInvalid,

    /// The transport to the datacenter failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend did not answer in time.
    #[error("Request timed out")]
    Timeout,

    /// The backend answered with something that is not a chunk.
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The session is not allowed to perform the call.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other backend failure.
    #[error("Backend failure: {0}")]
    Other(String),
}

impl BackendError {
    /// Errors that end a running stream early instead of failing it.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout | BackendError::Malformed(_))
    }
}

/// How a new session authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAuth {
    /// Reuse the identity's own credential (home datacenter only).
    HomeCredential,
    /// Negotiate a fresh key; the session must import an authorization
    /// before it may fetch.
    FreshKey,
}

/// Token exported by the home session for use in another datacenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedAuthorization {
    pub id: i64,
    pub bytes: Bytes,
}

/// Media attached to a stored message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub location: FileLocation,
    pub dc_id: DcId,
    pub size: u64,
    pub mime: Option<String>,
    pub name: Option<String>,
    pub unique_id: String,
}

impl From<MediaPayload> for FileDescriptor {
    fn from(media: MediaPayload) -> Self {
        FileDescriptor {
            location: media.location,
            dc_id: media.dc_id,
            size: media.size,
            mime: media.mime.filter(|m| !m.is_empty()),
            name: media.name.filter(|n| !n.is_empty()),
            unique_id: media.unique_id,
        }
    }
}

/// A message as returned by the backend's messaging lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub store_id: i64,
    pub message_id: i64,
    /// `None` for messages without a media payload.
    pub media: Option<MediaPayload>,
}

/// Authenticated context scoped to one datacenter.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Datacenter this session is connected to.
    fn dc_id(&self) -> DcId;

    /// Import an authorization exported by the identity's home session.
    async fn import_authorization(
        &self,
        authorization: &ExportedAuthorization,
    ) -> Result<(), BackendError>;

    /// Fetch up to `limit` bytes at `offset`. An empty result means the
    /// object ended.
    async fn fetch(
        &self,
        location: &FileLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, BackendError>;

    /// Close the session.
    async fn stop(&self);
}

impl std::fmt::Debug for dyn MediaSession + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("dc_id", &self.dc_id())
            .finish_non_exhaustive()
    }
}

/// One authenticated actor on the backend.
#[async_trait]
pub trait BackendIdentity: Send + Sync {
    /// Display name used in logs and the status endpoint.
    fn name(&self) -> &str;

    /// Datacenter holding this identity's credential.
    fn home_dc(&self) -> DcId;

    /// Messaging lookup; `Ok(None)` when the message does not exist.
    async fn get_object(
        &self,
        store_id: i64,
        message_id: i64,
    ) -> Result<Option<StoredObject>, BackendError>;

    /// Ask the home session for an authorization usable in `dc_id`.
    async fn export_authorization(
        &self,
        dc_id: DcId,
    ) -> Result<ExportedAuthorization, BackendError>;

    /// Open (and start) a session to `dc_id`.
    async fn open_session(
        &self,
        dc_id: DcId,
        auth: SessionAuth,
    ) -> Result<Arc<dyn MediaSession>, BackendError>;
}

/// Stable unique id for an object, hex SHA-256 over its address and name.
pub fn object_fingerprint(store_id: i64, message_id: i64, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{store_id}:{message_id}:{name}").as_bytes());
    hex::encode(hasher.finalize())
}
