//! Identifiers shared between the codec, the dispatcher, and the backends.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a backend datacenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DcId(pub i32);

impl From<i32> for DcId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for DcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The minimal triple identifying a stored object for streaming.
///
/// The serialized field names are part of the opaque link format and must not
/// change: links minted by the catalog writer decode to these keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceTuple {
    /// Store (channel) holding the object.
    #[serde(rename = "chat_id", default)]
    pub store_id: i64,
    /// Message carrying the media payload.
    #[serde(rename = "msg_id", default)]
    pub message_id: i64,
    /// First six characters of the object's unique fingerprint.
    #[serde(rename = "hash", default)]
    pub verification_hash: String,
}

impl ReferenceTuple {
    /// Length of the verification hash prefix.
    pub const HASH_LEN: usize = 6;

    pub fn new(store_id: i64, message_id: i64, verification_hash: impl Into<String>) -> Self {
        Self {
            store_id,
            message_id,
            verification_hash: verification_hash.into(),
        }
    }

    /// Build a tuple from an object's full unique id, keeping only the hash prefix.
    pub fn from_unique_id(store_id: i64, message_id: i64, unique_id: &str) -> Self {
        Self::new(store_id, message_id, verification_prefix(unique_id))
    }

    /// `true` when both the message id and the verification hash are present.
    pub fn is_complete(&self) -> bool {
        self.message_id != 0 && !self.verification_hash.is_empty()
    }
}

/// Short fingerprint used to verify a decoded link against its object.
pub fn verification_prefix(unique_id: &str) -> &str {
    match unique_id.char_indices().nth(ReferenceTuple::HASH_LEN) {
        Some((idx, _)) => &unique_id[..idx],
        None => unique_id,
    }
}
