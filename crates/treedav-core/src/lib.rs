//! Resource trees for WebDAV serving.
//!
//! This crate defines the backend-neutral [`Resource`] contract that the
//! WebDAV handler talks to, plus two implementations of it.
//!
//! # Components
//!
//! - [`Resource`] - Lazy handle to a node in a prefix-rooted tree
//! - [`ResourceProps`] - Populated metadata snapshot of one node
//! - [`ResourcePath`] - Normalized in-mount path that cannot escape its mount
//! - [`ContentSink`] / [`ContentSource`] - Streaming seams for downloads and uploads
//! - [`ResourceError`] - Error taxonomy shared by every backend
//!
//! ## Backends
//!
//! - [`MemoryTree`] / [`MemoryResource`] - Whole tree held in memory
//! - [`FsTree`] / [`FsResource`] - Tree mapped onto a host directory
//!
//! # Example
//!
//! ```ignore
//! use treedav_core::{MemoryResource, Resource};
//!
//! let root = MemoryResource::new_root("scratch");
//! let dir = root.make_collection("notes").await?;
//! let file = dir.with_relative("todo.txt").await?;
//! file.put_content(&mut bytes::Bytes::from_static(b"buy milk")).await?;
//!
//! for child in root.populate_collection().await? {
//!     println!("{} ({} bytes)", child.name(), child.size);
//! }
//! ```

mod error;
mod filesystem;
mod memory;
mod path;
mod resource;
mod stream;

pub use error::{ResourceError, ResourceErrorKind, ResourceResult};
pub use filesystem::{FsResource, FsTree};
pub use memory::{MemoryResource, MemoryTree};
pub use path::ResourcePath;
pub use resource::{
    ALL_PROPERTIES, BackendId, DATE_FORMAT, DynResource, PropertySet, Resource, ResourceProps,
    format_time,
};
pub use stream::{ChunkedSource, ContentSink, ContentSource};
