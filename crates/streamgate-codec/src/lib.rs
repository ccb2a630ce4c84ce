//! Opaque download link codec.
//!
//! A [`ReferenceTuple`] is turned into a short, URL-safe link and back:
//!
//! 1. serialize the tuple as compact JSON (`{"chat_id":..,"msg_id":..,"hash":".."}`)
//! 2. compress with zlib at maximum ratio
//! 3. encode the compressed bytes in base-62 (`0-9a-zA-Z`, no padding)
//!
//! The link *is* the data: there is no mapping table, and encoding is
//! deterministic.
//!
//! # Examples
//!
//! ```
//! use streamgate_codec::{decode, encode};
//! use streamgate_common::ReferenceTuple;
//!
//! let tuple = ReferenceTuple::new(2193361335, 42, "AgADbQ");
//! let link = encode(&tuple).unwrap();
//! assert!(link.chars().all(|c| c.is_ascii_alphanumeric()));
//! assert_eq!(decode(&link).unwrap(), tuple);
//! ```
//!
//! With the `async` feature, [`encode_async`] and [`decode_async`] run the
//! CPU-bound work on tokio's blocking pool so request tasks are not stalled.

mod base62;
pub mod error;

pub use base62::{base62_decode, base62_encode, ALPHABET};
pub use error::{Error, Result};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use std::io::Write;
use streamgate_common::ReferenceTuple;

/// Compress bytes with zlib at the best compression level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len()), Compression::best());
    encoder.write_all(data).map_err(Error::Compress)?;
    encoder.finish().map_err(Error::Compress)
}

/// Inflate a zlib stream, rejecting input that ends before the stream does.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len().max(16) * 4);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let (in_before, out_before) = (inflater.total_in(), inflater.total_out());
        let status = inflater
            .decompress_vec(&data[in_before as usize..], &mut out, FlushDecompress::Finish)
            .map_err(|e| Error::Decompress(e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled =
                    inflater.total_in() == in_before && inflater.total_out() == out_before;
                let input_exhausted = inflater.total_in() as usize == data.len();
                if out.len() < out.capacity() && (stalled || input_exhausted) {
                    return Err(Error::Decompress("truncated zlib stream".to_string()));
                }
            }
        }
    }
}

/// Encode a reference tuple into an opaque link.
pub fn encode(tuple: &ReferenceTuple) -> Result<String> {
    let json = serde_json::to_vec(tuple)?;
    let compressed = compress(&json)?;
    Ok(base62_encode(&compressed))
}

/// Longest link [`decode`] accepts. Encoded tuples stay far below it.
pub const MAX_LINK_LEN: usize = 512;

/// Decode an opaque link back into its reference tuple.
pub fn decode(link: &str) -> Result<ReferenceTuple> {
    let length = link.chars().count();
    if length > MAX_LINK_LEN {
        return Err(Error::TooLong {
            length,
            max: MAX_LINK_LEN,
        });
    }
    let compressed = base62_decode(link)?;
    let json = decompress(&compressed)?;
    Ok(serde_json::from_slice(&json)?)
}

/// [`encode`] on the blocking pool.
#[cfg(feature = "async")]
pub async fn encode_async(tuple: ReferenceTuple) -> Result<String> {
    tokio::task::spawn_blocking(move || encode(&tuple))
        .await
        .map_err(|e| Error::Worker(e.to_string()))?
}

/// [`decode`] on the blocking pool.
#[cfg(feature = "async")]
pub async fn decode_async(link: String) -> Result<ReferenceTuple> {
    tokio::task::spawn_blocking(move || decode(&link))
        .await
        .map_err(|e| Error::Worker(e.to_string()))?
}
