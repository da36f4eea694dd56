//! WebDAV server for prefix-mounted resource trees.
//!
//! This crate serves [`treedav_core`] resource trees over WebDAV. Each tree
//! is mounted under a URL prefix; requests to `/<prefix>/...` are handled by
//! that mount's [`DavHandler`].
//!
//! # How It Works
//!
//! 1. Build root resources (in-memory or filesystem) and register them in a [`MountTable`]
//! 2. [`WebDavServer::start`] binds a local HTTP server and routes by first path segment
//! 3. The handler translates WebDAV methods into resource operations and
//!    renders the outcome (status, headers, streamed body or multistatus XML)
//!
//! # Supported Methods
//!
//! `OPTIONS`, `GET`, `HEAD`, `PUT`, `DELETE`, `MKCOL`, `MOVE`, `COPY` and
//! `PROPFIND` (Depth 0 and 1). Locking and property updates are not offered.
//!
//! # Example
//!
//! ```ignore
//! use treedav_core::{FsResource, MemoryResource};
//! use treedav_webdav::{MountTable, ServerConfig, WebDavServer};
//!
//! let mut mounts = MountTable::new();
//! mounts.mount(Box::new(FsResource::new_root("files", "/srv/files")))?;
//! mounts.mount(Box::new(MemoryResource::new_root("scratch")))?;
//!
//! let server = WebDavServer::start(mounts, ServerConfig::default()).await?;
//! println!("Mount via: {}", server.mount_url("files"));
//! ```
//!
//! # Security
//!
//! By default, the server binds to localhost (127.0.0.1) only.
//! No authentication is performed.

mod body;
mod error;
mod handler;
mod headers;
mod mount;
mod server;
mod xml;

// Public exports
pub use body::DavBody;
pub use error::{DavError, DavResult, MountError, resource_status};
pub use handler::{ALLOWED_METHODS, DavHandler, DavResponse};
pub use mount::MountTable;
pub use server::{ServerConfig, WebDavServer};
