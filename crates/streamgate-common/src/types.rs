//! Resolved file metadata handed from the resolver to the streaming engine.

use crate::ids::{verification_prefix, DcId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-specific pointer to an object's bytes.
///
/// The streaming core never interprets it; only the backend that produced the
/// location knows how to fetch from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileLocation(String);

impl FileLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to stream one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Where the bytes live.
    pub location: FileLocation,
    /// Datacenter that stores the bytes.
    pub dc_id: DcId,
    /// Total size in bytes.
    pub size: u64,
    /// MIME type reported by the backend, if any.
    pub mime: Option<String>,
    /// Original file name, if any.
    pub name: Option<String>,
    /// Stable unique id of the underlying object.
    pub unique_id: String,
}

impl FileDescriptor {
    /// Six-character fingerprint compared against decoded links.
    pub fn verification_hash(&self) -> &str {
        verification_prefix(&self.unique_id)
    }

    /// Check a decoded link's hash against this object.
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.verification_hash() == hash
    }
}
