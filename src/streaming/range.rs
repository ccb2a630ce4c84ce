//! HTTP range translation.
//!
//! Turns a `Range: bytes=A-B` header into a chunk-aligned fetch plan and
//! shapes the response headers around it.
//!
//! Supported forms:
//! - `bytes=A-B`
//! - `bytes=A-` (until the end of the object)
//!
//! Suffix ranges (`bytes=-N`), multiple ranges and anything else that does not
//! parse are answered with 416.

use axum::http::{header, response::Builder, StatusCode};
use bytes::Bytes;
use streamgate_common::paths::{guess_mime, mime_subtype, OCTET_STREAM};
use streamgate_common::{Error, FileDescriptor};

/// Chunk-aligned fetch plan handed to the streaming engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Chunk-aligned offset of the first fetch.
    pub offset: u64,
    /// Bytes dropped from the head of the first chunk.
    pub first_cut: usize,
    /// Bytes kept from the head of the last chunk.
    pub last_cut: usize,
    /// Number of chunks to emit.
    pub part_count: u64,
    pub chunk_size: u64,
}

impl ChunkPlan {
    /// Trim chunk number `part` (1-based) to the requested window.
    ///
    /// Cuts past the end of a short chunk are clamped to its length.
    pub fn trim(&self, part: u64, chunk: Bytes) -> Bytes {
        let len = chunk.len();
        let start = if part == 1 { self.first_cut.min(len) } else { 0 };
        let end = if part == self.part_count {
            self.last_cut.min(len).max(start)
        } else {
            len
        };
        chunk.slice(start..end)
    }
}

/// A validated byte window over an object of `size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePlan {
    /// First byte of the window.
    pub from: u64,
    /// Last byte of the window (inclusive).
    pub until: u64,
    /// Total object size.
    pub size: u64,
    /// `true` when the request carried a `Range` header.
    pub partial: bool,
    pub chunks: ChunkPlan,
}

impl RangePlan {
    /// Value of `Content-Length`.
    pub fn requested_length(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.until - self.from + 1
        }
    }

    pub fn status(&self) -> StatusCode {
        if self.partial {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }

    /// `Content-Range` value, only for partial responses.
    pub fn content_range(&self) -> Option<String> {
        self.partial
            .then(|| format!("bytes {}-{}/{}", self.from, self.until, self.size))
    }

    /// Start a response carrying this plan's status and headers.
    pub fn response(&self, mime: &str, file_name: &str) -> Builder {
        let builder = axum::http::Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, mime)
            .header(header::CONTENT_LENGTH, self.requested_length().to_string())
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_DISPOSITION, content_disposition(file_name));
        match self.content_range() {
            Some(range) => builder.header(header::CONTENT_RANGE, range),
            None => builder,
        }
    }
}

/// Parse `bytes=A-B` / `bytes=A-` into signed bounds; `B` is `None` when omitted.
fn parse_range_header(value: &str) -> Option<(i64, Option<i64>)> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let (from, until) = ranges.split_once('-')?;
    if until.contains('-') {
        return None;
    }
    let from = from.trim().parse::<i64>().ok()?;
    let until = match until.trim() {
        "" => None,
        until => Some(until.parse::<i64>().ok()?),
    };
    Some((from, until))
}

/// Build the fetch plan for an object of `size` bytes.
///
/// # Examples
///
/// ```
/// use streamgate::streaming::plan_range;
///
/// let plan = plan_range(6_000_000, Some("bytes=5242880-"), 1_048_576).unwrap();
/// assert_eq!(plan.until, 5_999_999);
/// assert_eq!(plan.chunks.offset, 5_242_880);
/// assert_eq!(plan.chunks.part_count, 1);
/// ```
pub fn plan_range(size: u64, range: Option<&str>, chunk_size: u64) -> Result<RangePlan, Error> {
    if chunk_size == 0 {
        return Err(Error::internal("chunk size must be positive"));
    }
    let not_satisfiable = || Error::RangeNotSatisfiable { size };

    let (from, until, partial) = match range {
        None if size == 0 => {
            return Ok(RangePlan {
                from: 0,
                until: 0,
                size,
                partial: false,
                chunks: ChunkPlan {
                    offset: 0,
                    first_cut: 0,
                    last_cut: 0,
                    part_count: 0,
                    chunk_size,
                },
            });
        }
        None => (0, size - 1, false),
        Some(value) => {
            let (from, until) = parse_range_header(value).ok_or_else(not_satisfiable)?;
            let last = size as i64 - 1;
            let until = until.unwrap_or(last);
            if until > last || from < 0 || until < from {
                return Err(not_satisfiable());
            }
            (from as u64, until as u64, true)
        }
    };

    let offset = from - from % chunk_size;
    let part_count = (until + chunk_size) / chunk_size - offset / chunk_size;

    Ok(RangePlan {
        from,
        until,
        size,
        partial,
        chunks: ChunkPlan {
            offset,
            first_cut: (from - offset) as usize,
            last_cut: (until % chunk_size + 1) as usize,
            part_count,
            chunk_size,
        },
    })
}

/// File name and content type for a download.
///
/// The descriptor's name wins; otherwise a random stem with the mime subtype
/// (or `unknown`) as extension. The descriptor's mime wins; otherwise it is
/// guessed from the name, falling back to `application/octet-stream`.
pub fn download_name(descriptor: &FileDescriptor) -> (String, String) {
    match (&descriptor.mime, &descriptor.name) {
        (Some(mime), Some(name)) => (name.clone(), mime.clone()),
        (Some(mime), None) => {
            let ext = mime_subtype(mime).unwrap_or("unknown");
            (format!("{}.{ext}", random_stem()), mime.clone())
        }
        (None, Some(name)) => (
            name.clone(),
            guess_mime(name).unwrap_or(OCTET_STREAM).to_string(),
        ),
        (None, None) => (
            format!("{}.unknown", random_stem()),
            OCTET_STREAM.to_string(),
        ),
    }
}

fn random_stem() -> String {
    hex::encode(rand::random::<[u8; 2]>())
}

/// `inline` disposition with an ASCII `filename` and, when needed, an
/// RFC 5987 `filename*`.
pub fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    if file_name.is_ascii() && !file_name.contains(['"', '\\']) {
        format!("inline; filename=\"{ascii}\"")
    } else {
        format!(
            "inline; filename=\"{ascii}\"; filename*=UTF-8''{}",
            percent_encode(file_name)
        )
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
