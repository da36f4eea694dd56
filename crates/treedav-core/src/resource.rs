//! The resource contract implemented by every backend.
//!
//! A [`Resource`] is a cheap, lazy handle: building one never touches the
//! backend, and it may name a path that does not exist yet (the target of a
//! PUT or MKCOL). State is read in an explicit second phase:
//! [`populate_props`](Resource::populate_props) returns an immutable
//! [`ResourceProps`] snapshot and
//! [`populate_collection`](Resource::populate_collection) returns the
//! snapshots of a collection's children.

use crate::error::ResourceResult;
use crate::path::ResourcePath;
use crate::stream::{ContentSink, ContentSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::time::SystemTime;

/// Boxed resource handle, as returned by navigation.
pub type DynResource = Box<dyn Resource>;

/// Textual date format used for `getlastmodified` and `creationdate`.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Every property a resource reports, in canonical order.
pub const ALL_PROPERTIES: [&str; 6] = [
    "getcontenttype",
    "getlastmodified",
    "getcontentlength",
    "getetag",
    "creationdate",
    "displayname",
];

/// Identity of a backend instance (one tree, one root).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackendId(String);

impl BackendId {
    /// Wrap a backend-specific identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Populated metadata of an existing resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProps {
    /// Path of the resource inside its mount.
    pub path: ResourcePath,
    /// Whether the resource is a collection.
    pub is_collection: bool,
    /// Content length in bytes (always 0 for collections).
    pub size: u64,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last modification time.
    pub modified: DateTime<Utc>,
}

impl ResourceProps {
    /// Base name of the resource.
    pub fn name(&self) -> &str {
        self.path.name()
    }

    /// WebDAV properties of this resource.
    ///
    /// With an empty `names` filter every property is returned; otherwise only
    /// the known properties listed in `names`. Either way the result keeps the
    /// canonical order of [`ALL_PROPERTIES`].
    pub fn propfind<S: AsRef<str>>(&self, names: &[S]) -> PropertySet {
        let wanted = |prop: &str| names.is_empty() || names.iter().any(|n| n.as_ref() == prop);
        let mut set = PropertySet::default();
        for prop in ALL_PROPERTIES {
            if !wanted(prop) {
                continue;
            }
            let value = match prop {
                "getlastmodified" => format_time(&self.modified),
                "getcontentlength" => (if self.is_collection { 0 } else { self.size }).to_string(),
                "creationdate" => format_time(&self.created),
                "displayname" => self.name().to_string(),
                // getcontenttype, getetag
                _ => String::new(),
            };
            set.0.push((prop, value));
        }
        set
    }
}

/// Ordered mapping of property name to value, produced by [`ResourceProps::propfind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertySet(Vec<(&'static str, String)>);

impl PropertySet {
    /// Value of a property, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Property names in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(n, _)| *n)
    }

    /// `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(n, v)| (*n, v.as_str()))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no property was selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Format a timestamp with [`DATE_FORMAT`].
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(DATE_FORMAT).to_string()
}

/// Convert an OS timestamp, truncated to whole seconds.
pub(crate) fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    let time: DateTime<Utc> = time.into();
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}

/// The current time, truncated to whole seconds.
pub(crate) fn now() -> DateTime<Utc> {
    from_system_time(SystemTime::now())
}

/// A node in a prefix-rooted resource tree.
///
/// All backends implement this identically; the protocol layer only ever
/// holds `Box<dyn Resource>`.
#[async_trait]
pub trait Resource: Send + Sync + fmt::Debug {
    /// Mount name this resource belongs to.
    fn prefix(&self) -> &str;

    /// Path of this resource inside the mount.
    fn path(&self) -> &ResourcePath;

    /// Base name (empty for the root).
    fn name(&self) -> &str {
        self.path().name()
    }

    /// Identity of the backing tree.
    fn backend_id(&self) -> BackendId;

    /// Handle to the parent collection, `None` for the root.
    ///
    /// Derived from the path; no backend access.
    fn parent(&self) -> Option<DynResource>;

    /// Load metadata. Fails with `DoesNotExist` if the resource is absent.
    async fn populate_props(&self) -> ResourceResult<ResourceProps>;

    /// List children: collections first, then files, each sorted by name.
    async fn populate_collection(&self) -> ResourceResult<Vec<ResourceProps>>;

    /// Resolve a relative path below this resource.
    ///
    /// Intermediate segments must exist and be collections; the final
    /// segment may be absent.
    async fn with_relative(&self, relative: &str) -> ResourceResult<DynResource>;

    /// Stream content from `offset`, up to `limit` bytes (to the end if `None`).
    async fn get_content(
        &self,
        sink: &mut dyn ContentSink,
        offset: u64,
        limit: Option<u64>,
    ) -> ResourceResult<()>;

    /// Replace the content with everything `source` yields.
    ///
    /// Returns `true` if the resource was created by this call.
    async fn put_content(&self, source: &mut dyn ContentSource) -> ResourceResult<bool>;

    /// Create a collection at `relative` below this resource.
    async fn make_collection(&self, relative: &str) -> ResourceResult<DynResource>;

    /// Move this resource to an absolute in-mount `destination`.
    ///
    /// Returns `true` if `destination` did not exist before.
    async fn move_to(&self, destination: &ResourcePath) -> ResourceResult<bool>;

    /// Copy this resource (recursively) to an absolute in-mount `destination`.
    ///
    /// Returns `true` if `destination` did not exist before.
    async fn copy_to(&self, destination: &ResourcePath) -> ResourceResult<bool>;

    /// Remove this resource and its subtree.
    async fn delete(&self) -> ResourceResult<()>;
}
