//! Normalized in-mount resource paths.
//!
//! Every resource is addressed by a [`ResourcePath`]: an absolute,
//! slash-separated path relative to the mount root. Paths are normalized at
//! construction so two handles to the same node always compare equal, and
//! `..` segments are rejected outright so no path can climb out of a mount.

use crate::error::{ResourceError, ResourceResult};
use std::fmt;

/// An absolute, normalized path inside a mount.
///
/// Invariants: starts with `/`, has no trailing `/` (except the root itself),
/// and contains no empty, `.` or `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourcePath(String);

impl ResourcePath {
    /// The mount root, `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a path.
    ///
    /// Leading/trailing slashes are optional, repeated slashes and `.`
    /// segments collapse. A `..` segment fails with [`ResourceError::InvalidPath`].
    pub fn parse(raw: &str) -> ResourceResult<Self> {
        let mut normalized = String::with_capacity(raw.len() + 1);
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(ResourceError::InvalidPath(format!(
                        "relative navigation is restricted: {raw}"
                    )));
                }
                name => {
                    normalized.push('/');
                    normalized.push_str(name);
                }
            }
        }
        if normalized.is_empty() {
            normalized.push('/');
        }
        Ok(Self(normalized))
    }

    /// Whether this is the mount root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// The path as a string slice (always starts with `/`).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base name of the path; empty for the root.
    pub fn name(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Parent path, or `None` for the root.
    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
        }
    }

    /// Resolve a relative path against this one.
    pub fn join(&self, relative: &str) -> ResourceResult<ResourcePath> {
        if self.is_root() {
            Self::parse(relative)
        } else {
            Self::parse(&format!("{}/{relative}", self.0))
        }
    }

    /// Path segments, root first. Empty for the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Segment-wise ancestry check (`/a` is an ancestor of `/a/b` but not of `/ab`).
    ///
    /// A path starts with itself.
    pub fn starts_with(&self, base: &ResourcePath) -> bool {
        if base.is_root() {
            return true;
        }
        self.0 == base.0
            || (self.0.starts_with(&base.0) && self.0.as_bytes().get(base.0.len()) == Some(&b'/'))
    }

    /// The part of this path below `base`, without a leading slash.
    ///
    /// Returns `None` when `base` is not an ancestor of (or equal to) this path.
    pub fn relative_to(&self, base: &ResourcePath) -> Option<&str> {
        if !self.starts_with(base) {
            return None;
        }
        if base.is_root() {
            Some(self.0.trim_start_matches('/'))
        } else {
            Some(self.0[base.0.len()..].trim_start_matches('/'))
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
