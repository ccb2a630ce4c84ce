//! File-name helpers for content types and download names.
//!
//! Used when the backend reports no mime type for an object, and when a
//! download name has to be synthesized from a mime type.

use std::path::Path;

/// Extension to MIME type table for media the gateway commonly serves.
const MIME_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mkv", "video/x-matroska"),
    ("webm", "video/webm"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("ts", "video/mp2t"),
    ("m2ts", "video/mp2t"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("m4a", "audio/mp4"),
    ("mp3", "audio/mpeg"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("srt", "application/x-subrip"),
    ("vtt", "text/vtt"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("zip", "application/zip"),
    ("pdf", "application/pdf"),
];

/// Fallback content type for unknown payloads.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guess a MIME type from a file name's extension.
///
/// # Examples
///
/// ```
/// use streamgate_common::paths::guess_mime;
///
/// assert_eq!(guess_mime("Movie.2024.MKV"), Some("video/x-matroska"));
/// assert_eq!(guess_mime("notes"), None);
/// ```
pub fn guess_mime(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())?
        .to_lowercase();

    MIME_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// The part of a MIME type after the slash, e.g. `mp4` for `video/mp4`.
///
/// # Examples
///
/// ```
/// use streamgate_common::paths::mime_subtype;
///
/// assert_eq!(mime_subtype("video/x-matroska"), Some("x-matroska"));
/// assert_eq!(mime_subtype("video"), None);
/// ```
pub fn mime_subtype(mime: &str) -> Option<&str> {
    let (_, subtype) = mime.split_once('/')?;
    let subtype = subtype.split(';').next().unwrap_or(subtype).trim();
    if subtype.is_empty() {
        None
    } else {
        Some(subtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_mime_known() {
        assert_eq!(guess_mime("movie.mp4"), Some("video/mp4"));
        assert_eq!(guess_mime("/srv/a/b/episode.mkv"), Some("video/x-matroska"));
        assert_eq!(guess_mime("track.FLAC"), Some("audio/flac"));
    }

    #[test]
    fn test_guess_mime_unknown() {
        assert_eq!(guess_mime("archive.xyz"), None);
        assert_eq!(guess_mime(""), None);
    }

    #[test]
    fn test_mime_subtype() {
        assert_eq!(mime_subtype("video/mp4"), Some("mp4"));
        assert_eq!(mime_subtype("text/plain; charset=utf-8"), Some("plain"));
        assert_eq!(mime_subtype("video/"), None);
    }
}
