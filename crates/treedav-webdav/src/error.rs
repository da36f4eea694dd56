//! Error handling and status mapping for the WebDAV server.
//!
//! Resource backends report failures through the shared
//! [`ResourceError`] taxonomy; this module is the single place where that
//! taxonomy (plus protocol-level rejections) becomes an HTTP status code.

use hyper::header::InvalidHeaderValue;
use hyper::{Method, StatusCode};
use std::io;
use thiserror::Error;
use treedav_core::{BackendId, ResourceError, ResourceErrorKind};

/// Failures raised while serving one WebDAV request.
#[derive(Debug, Error)]
pub enum DavError {
    /// A resource operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The request itself is malformed (bad header, undecodable path).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The PROPFIND body is not well-formed XML.
    #[error("Malformed XML body: {0}")]
    Xml(#[from] xmltree::ParseError),

    /// Reading the request body failed.
    #[error("Request body error: {0}")]
    Body(#[source] io::Error),

    /// Rendering the multistatus document failed.
    #[error("XML output error: {0}")]
    XmlWrite(#[from] xmltree::Error),

    /// A response header could not be built.
    #[error("Invalid response header: {0}")]
    Header(#[from] InvalidHeaderValue),

    /// A protocol-level rejection with a fixed status.
    #[error("Rejected with status {0}")]
    Status(StatusCode),
}

impl DavError {
    /// HTTP status for this error when raised while serving `method`.
    pub fn status(&self, method: &Method) -> StatusCode {
        match self {
            DavError::Resource(e) => resource_status(e.kind(), method),
            DavError::BadRequest(_) | DavError::Xml(_) => StatusCode::BAD_REQUEST,
            DavError::Body(_) | DavError::XmlWrite(_) | DavError::Header(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DavError::Status(status) => *status,
        }
    }
}

/// Map a resource error kind to a status code.
///
/// `AlreadyExists` depends on the method: MKCOL onto an occupied path is
/// "method not allowed" there, anywhere else it is a failed precondition.
pub fn resource_status(kind: ResourceErrorKind, method: &Method) -> StatusCode {
    match kind {
        ResourceErrorKind::DoesNotExist => StatusCode::NOT_FOUND,
        ResourceErrorKind::AlreadyExists if method.as_str() == "MKCOL" => {
            StatusCode::METHOD_NOT_ALLOWED
        }
        ResourceErrorKind::AlreadyExists => StatusCode::PRECONDITION_FAILED,
        ResourceErrorKind::InvalidType => StatusCode::BAD_REQUEST,
        ResourceErrorKind::InvalidPath => StatusCode::FORBIDDEN,
        ResourceErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Result type for request handling.
pub type DavResult<T> = Result<T, DavError>;

/// Errors raised while registering mounts.
#[derive(Debug, Error)]
pub enum MountError {
    /// The prefix is empty or contains a slash.
    #[error("Invalid mount prefix: {0:?}")]
    InvalidPrefix(String),

    /// A mount with this prefix is already registered.
    #[error("Prefix already mounted: {0}")]
    DuplicatePrefix(String),

    /// The backend instance is already exposed under another prefix.
    #[error("Backend {backend} is already mounted at {existing}")]
    DuplicateBackend {
        /// Identity of the backing tree.
        backend: BackendId,
        /// Prefix it is already mounted under.
        existing: String,
    },

    /// The resource handed in is not the root of its tree.
    #[error("Mount {prefix} must be a root resource, got {path}")]
    NotRoot {
        /// Requested prefix.
        prefix: String,
        /// Path of the non-root resource.
        path: String,
    },
}
