//! Request header and path parsing.

use crate::error::{DavError, DavResult};
use hyper::Uri;
use hyper::header::{HeaderMap, HeaderName, RANGE, USER_AGENT};
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use tracing::debug;
use treedav_core::ResourcePath;

pub(crate) static DEPTH: HeaderName = HeaderName::from_static("depth");
pub(crate) static DESTINATION: HeaderName = HeaderName::from_static("destination");
pub(crate) static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
pub(crate) static DAV: HeaderName = HeaderName::from_static("dav");

/// Characters escaped when a resource name becomes an href segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// PROPFIND depth. `infinity` is served as one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Depth {
    Zero,
    One,
}

pub(crate) fn depth(headers: &HeaderMap) -> Depth {
    match headers.get(&DEPTH).and_then(|v| v.to_str().ok()).map(str::trim) {
        Some("1") => Depth::One,
        Some(v) if v.eq_ignore_ascii_case("infinity") => Depth::One,
        _ => Depth::Zero,
    }
}

/// A single `bytes=` range as sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Clamp to a payload of `size` bytes, returning the inclusive span.
    ///
    /// `None` means the range is not satisfiable (starts past the end).
    pub fn resolve(self, size: u64) -> Option<(u64, u64)> {
        if self.start >= size {
            return None;
        }
        let last = size - 1;
        Some((self.start, self.end.map_or(last, |end| end.min(last))))
    }
}

/// Parse `Range: bytes=<start>-<end>` or `bytes=<start>-`.
///
/// Suffix ranges, multiple ranges and malformed values yield `None`, which
/// callers treat as "no range".
pub(crate) fn byte_range(headers: &HeaderMap) -> Option<ByteRange> {
    let value = headers.get(RANGE)?.to_str().ok()?.trim();
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse().ok()?),
    };
    if end.is_some_and(|end| end < start) {
        return None;
    }
    Some(ByteRange { start, end })
}

/// Whether the client is GNOME's gvfs, which wants a bare 404 for missing
/// PROPFIND targets.
pub(crate) fn is_gvfs(headers: &HeaderMap) -> bool {
    headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ua| ua.to_ascii_lowercase().contains("gvfs"))
}

/// `Overwrite: F` forbids replacing an existing destination.
pub(crate) fn overwrite_allowed(headers: &HeaderMap) -> bool {
    !headers
        .get(&OVERWRITE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("f"))
}

/// Percent-decode a raw URL path.
pub(crate) fn decode_path(raw: &str) -> DavResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DavError::BadRequest(format!("path is not valid UTF-8: {raw}")))
}

/// Percent-encode a resource name for use as one href segment.
pub(crate) fn encode_segment(name: &str) -> String {
    utf8_percent_encode(name, SEGMENT).to_string()
}

/// Decoded path of the `Destination` header, absolute URL or absolute path.
fn destination_path(headers: &HeaderMap) -> DavResult<String> {
    let value = headers
        .get(&DESTINATION)
        .ok_or_else(|| DavError::BadRequest("missing Destination header".into()))?
        .to_str()
        .map_err(|_| DavError::BadRequest("Destination header is not ASCII".into()))?;
    let uri: Uri = value
        .trim()
        .parse()
        .map_err(|_| DavError::BadRequest(format!("invalid Destination: {value}")))?;
    decode_path(uri.path())
}

/// First segment of the `Destination` path, if the header parses.
pub(crate) fn destination_mount(headers: &HeaderMap) -> Option<String> {
    let decoded = destination_path(headers).ok()?;
    let first = decoded.trim_start_matches('/').split('/').next()?;
    (!first.is_empty()).then(|| first.to_string())
}

/// Resolve the `Destination` header to a path inside the mount at `prefix`.
///
/// The leading mount segment is stripped when present. Other paths are
/// taken as relative to this mount; the server rejects ones that name a
/// different mount before they get here.
pub(crate) fn destination(headers: &HeaderMap, prefix: &str) -> DavResult<ResourcePath> {
    let decoded = destination_path(headers)?;
    let trimmed = decoded.trim_start_matches('/');
    let in_mount = match trimmed.split_once('/') {
        Some((first, rest)) if first == prefix => rest,
        None if trimmed == prefix => "",
        _ => {
            debug!(%prefix, destination = %decoded, "destination lacks mount prefix, resolving in this mount");
            trimmed
        }
    };
    Ok(ResourcePath::parse(in_mount)?)
}
