//! Error types for streamgate-codec.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for codec operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A character outside `[0-9a-zA-Z]`.
    #[error("Invalid base-62 symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },

    /// The link is longer than any encoded reference tuple.
    #[error("Link is {length} symbols long, at most {max} allowed")]
    TooLong { length: usize, max: usize },

    /// The decoded bytes are not a valid zlib stream.
    #[error("Decompression failed: {0}")]
    Decompress(String),

    /// Compression of the serialized tuple failed.
    #[error("Compression failed: {0}")]
    Compress(#[source] std::io::Error),

    /// The payload is not a serialized reference tuple.
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The blocking worker running the codec was cancelled or panicked.
    #[error("Codec worker failed: {0}")]
    Worker(String),
}

impl From<Error> for streamgate_common::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Worker(msg) => streamgate_common::Error::internal(msg),
            other => streamgate_common::Error::decode(other.to_string()),
        }
    }
}
