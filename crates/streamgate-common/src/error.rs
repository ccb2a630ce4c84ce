//! Error taxonomy for the streaming core.
//!
//! Every failure is scoped to one request. [`Error::http_status`] is the single
//! place where a failure is mapped to the status code the HTTP layer returns.

use crate::ids::DcId;

/// Request-scoped error type for streamgate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The opaque link could not be decoded (bad symbol, bad compression, bad payload).
    #[error("Decode error: {0}")]
    Decode(String),

    /// Request data failed validation (e.g. a decoded tuple with missing fields).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The backend has no object, or no media payload, for this address.
    #[error("Object not found: store {store_id}, message {message_id}")]
    ObjectNotFound {
        /// Store (channel) the lookup targeted.
        store_id: i64,
        /// Message id inside the store.
        message_id: i64,
    },

    /// The decoded verification hash does not match the object's fingerprint.
    #[error("Invalid hash for message {message_id}")]
    InvalidHash {
        /// Message id whose fingerprint did not match.
        message_id: i64,
    },

    /// The requested byte window lies outside the object.
    #[error("Range not satisfiable for object of {size} bytes")]
    RangeNotSatisfiable {
        /// Total object size, echoed in `Content-Range: bytes */size`.
        size: u64,
    },

    /// Session setup for a datacenter exhausted its retry budget.
    #[error("Session unavailable for DC {dc_id} after {attempts} attempts")]
    SessionUnavailable {
        /// Datacenter that could not be reached.
        dc_id: DcId,
        /// Number of authorization attempts made.
        attempts: u32,
    },

    /// The backend returned an error outside the streaming loop.
    #[error("Backend error: {0}")]
    Backend(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Decode(_) => 400,
            Error::Validation(_) => 400,
            Error::ObjectNotFound { .. } => 404,
            Error::InvalidHash { .. } => 403,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::SessionUnavailable { .. } => 503,
            Error::Backend(_) => 502,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Decode(_) => "decode_error",
            Error::Validation(_) => "validation_error",
            Error::ObjectNotFound { .. } => "not_found",
            Error::InvalidHash { .. } => "invalid_hash",
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::SessionUnavailable { .. } => "session_unavailable",
            Error::Backend(_) => "backend_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Create a new Decode error.
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new Validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new ObjectNotFound error.
    pub fn object_not_found(store_id: i64, message_id: i64) -> Self {
        Self::ObjectNotFound {
            store_id,
            message_id,
        }
    }

    /// Create a new Backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
