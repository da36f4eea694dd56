//! Registry of mounted resource trees.
//!
//! Each mount exposes one root resource under `/<prefix>/`. The table is
//! where "one root per mount, one mount per backend instance" is enforced:
//! registering a second root for the same tree, or reusing a prefix, fails
//! instead of silently shadowing.

use crate::error::MountError;
use crate::handler::DavHandler;
use crate::headers;
use hyper::Method;
use hyper::header::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use treedav_core::DynResource;

/// Prefix-keyed set of mounts.
#[derive(Debug, Default)]
pub struct MountTable {
    mounts: BTreeMap<String, Arc<DavHandler>>,
}

impl MountTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a root resource under its own prefix.
    pub fn mount(&mut self, root: DynResource) -> Result<(), MountError> {
        let prefix = root.prefix().to_string();
        if prefix.is_empty() || prefix.contains('/') {
            return Err(MountError::InvalidPrefix(prefix));
        }
        if !root.path().is_root() {
            return Err(MountError::NotRoot {
                prefix,
                path: root.path().to_string(),
            });
        }
        if self.mounts.contains_key(&prefix) {
            return Err(MountError::DuplicatePrefix(prefix));
        }

        let backend = root.backend_id();
        if let Some(existing) = self
            .mounts
            .values()
            .find(|handler| handler.root().backend_id() == backend)
        {
            return Err(MountError::DuplicateBackend {
                backend,
                existing: existing.prefix().to_string(),
            });
        }

        info!(%prefix, %backend, "mounted resource tree");
        self.mounts.insert(prefix, Arc::new(DavHandler::new(root)));
        Ok(())
    }

    /// Handler for a mount prefix.
    pub fn get(&self, prefix: &str) -> Option<&Arc<DavHandler>> {
        self.mounts.get(prefix)
    }

    /// Handler responsible for a raw request path (`/<prefix>/...`).
    pub fn route(&self, path: &str) -> Option<&Arc<DavHandler>> {
        let first = path.trim_start_matches('/').split('/').next()?;
        if first.is_empty() {
            return None;
        }
        self.mounts.get(first).or_else(|| {
            let decoded = percent_encoding::percent_decode_str(first).decode_utf8().ok()?;
            self.mounts.get(decoded.as_ref())
        })
    }

    /// Another registered mount named by the `Destination` of a MOVE or
    /// COPY sent to `handler`.
    pub(crate) fn foreign_destination(
        &self,
        handler: &DavHandler,
        method: &Method,
        headers: &HeaderMap,
    ) -> Option<String> {
        if !matches!(method.as_str(), "MOVE" | "COPY") {
            return None;
        }
        let first = headers::destination_mount(headers)?;
        (first != handler.prefix() && self.mounts.contains_key(&first)).then_some(first)
    }

    /// Registered prefixes, in order.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.mounts.keys().map(String::as_str)
    }

    /// Number of mounts.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Whether nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}
