//! Per-mount WebDAV method handling.
//!
//! A [`DavHandler`] owns the root resource of one mount and turns each HTTP
//! request into resource operations. All error-to-status translation goes
//! through [`DavError::status`], so individual methods only decide what
//! success looks like.

use crate::body::{self, BodySource, DavBody, STREAM_CHANNEL_CAPACITY};
use crate::error::{DavError, DavResult};
use crate::headers::{self, DAV, Depth};
use crate::xml::{self, PropResponse};
use bytes::Bytes;
use futures::channel::mpsc;
use hyper::body::Body;
use hyper::header::{ALLOW, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Request, Response, StatusCode};
use std::error::Error as StdError;
use std::fmt;
use tracing::{Instrument, debug, error, instrument, warn};
use treedav_core::{DynResource, ResourceError, ResourcePath};

/// Full HTTP response produced by the handler.
pub type DavResponse = Response<DavBody>;

/// Methods advertised in `Allow`.
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, MOVE, COPY, PROPFIND";

const MULTISTATUS_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Serves WebDAV requests for one mount.
pub struct DavHandler {
    prefix: String,
    root: DynResource,
}

impl fmt::Debug for DavHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavHandler")
            .field("prefix", &self.prefix)
            .field("backend", &self.root.backend_id())
            .finish()
    }
}

/// Which relocation a MOVE/COPY request performs.
#[derive(Debug, Clone, Copy)]
enum Relocation {
    Move,
    Copy,
}

impl DavHandler {
    /// Wrap a mount root. The prefix is taken from the resource.
    pub fn new(root: DynResource) -> Self {
        Self {
            prefix: root.prefix().to_string(),
            root,
        }
    }

    /// Mount name.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Root resource of the mount.
    pub fn root(&self) -> &DynResource {
        &self.root
    }

    /// Serve one request addressed to `/<prefix>/...`.
    #[instrument(skip_all, fields(mount = %self.prefix, method = %req.method(), path = %req.uri().path()))]
    pub async fn handle<B>(&self, req: Request<B>) -> DavResponse
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let method = req.method().clone();
        match self.dispatch(req).await {
            Ok(response) => {
                debug!(status = %response.status(), "request served");
                response
            }
            Err(err) => {
                let status = err.status(&method);
                if status.is_server_error() {
                    error!(%status, error = %err, "request failed");
                } else {
                    debug!(%status, error = %err, "request rejected");
                }
                status_response(status)
            }
        }
    }

    async fn dispatch<B>(&self, req: Request<B>) -> DavResult<DavResponse>
    where
        B: Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let relative = self.relative_path(req.uri().path())?;
        let method = req.method().clone();
        match method.as_str() {
            "OPTIONS" => Ok(options()),
            "GET" => self.get(&relative, req.headers(), true).await,
            "HEAD" => self.get(&relative, req.headers(), false).await,
            "PUT" => self.put(&relative, req).await,
            "DELETE" => self.delete(&relative).await,
            "MKCOL" => self.mkcol(&relative, req).await,
            "MOVE" => self.relocate(&relative, req.headers(), Relocation::Move).await,
            "COPY" => self.relocate(&relative, req.headers(), Relocation::Copy).await,
            "PROPFIND" => self.propfind(&relative, req).await,
            other => {
                debug!(method = other, "unsupported method");
                let mut response = status_response(StatusCode::METHOD_NOT_ALLOWED);
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
                Ok(response)
            }
        }
    }

    /// Decoded path below the mount, without a leading slash.
    fn relative_path(&self, raw: &str) -> DavResult<String> {
        let below_mount = raw
            .trim_start_matches('/')
            .split_once('/')
            .map_or("", |(_, rest)| rest);
        headers::decode_path(below_mount)
    }

    async fn resolve(&self, relative: &str) -> DavResult<DynResource> {
        Ok(self.root.with_relative(relative).await?)
    }

    async fn get(
        &self,
        relative: &str,
        request_headers: &HeaderMap,
        with_body: bool,
    ) -> DavResult<DavResponse> {
        let range = if with_body {
            headers::byte_range(request_headers)
        } else {
            None
        };
        let target = self.resolve(relative).await?;
        let props = target.populate_props().await?;

        if props.is_collection {
            if with_body {
                return Err(ResourceError::InvalidType(props.path).into());
            }
            return Ok(status_response(StatusCode::OK));
        }

        let size = props.size;

        let (status, offset, length) = match range {
            None => (StatusCode::OK, 0, size),
            Some(range) => match range.resolve(size) {
                Some((start, end)) => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
                None => {
                    let mut response = status_response(StatusCode::RANGE_NOT_SATISFIABLE);
                    response
                        .headers_mut()
                        .insert(CONTENT_RANGE, header_value(&format!("bytes */{size}"))?);
                    return Ok(response);
                }
            },
        };

        let body = if with_body && length > 0 {
            stream_content(target, offset, length)
        } else {
            body::empty()
        };
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
        if status == StatusCode::PARTIAL_CONTENT {
            let last = offset + length - 1;
            response.headers_mut().insert(
                CONTENT_RANGE,
                header_value(&format!("bytes {offset}-{last}/{size}"))?,
            );
        }
        Ok(response)
    }

    async fn put<B>(&self, relative: &str, req: Request<B>) -> DavResult<DavResponse>
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let target = self.resolve(relative).await?;
        match target.populate_props().await {
            Ok(props) if props.is_collection => {
                return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED));
            }
            Ok(_) | Err(ResourceError::DoesNotExist(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let mut source = BodySource::new(req.into_body());
        let created = target.put_content(&mut source).await?;
        Ok(status_response(if created {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        }))
    }

    async fn delete(&self, relative: &str) -> DavResult<DavResponse> {
        self.resolve(relative).await?.delete().await?;
        Ok(status_response(StatusCode::OK))
    }

    async fn mkcol<B>(&self, relative: &str, req: Request<B>) -> DavResult<DavResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let content = body::collect(req.into_body()).await.map_err(DavError::Body)?;
        if !content.is_empty() {
            return Err(DavError::Status(StatusCode::UNSUPPORTED_MEDIA_TYPE));
        }
        self.root.make_collection(relative).await?;
        Ok(status_response(StatusCode::CREATED))
    }

    async fn relocate(
        &self,
        relative: &str,
        request_headers: &HeaderMap,
        mode: Relocation,
    ) -> DavResult<DavResponse> {
        let destination = headers::destination(request_headers, &self.prefix)?;
        let overwrite = headers::overwrite_allowed(request_headers);
        let source = self.resolve(relative).await?;

        let first = match mode {
            Relocation::Move => source.move_to(&destination).await,
            Relocation::Copy => source.copy_to(&destination).await,
        };
        let fresh = match first {
            Ok(fresh) => fresh,
            Err(ResourceError::InvalidType(occupant) | ResourceError::AlreadyExists(occupant))
                if occupant != *source.path() =>
            {
                if !overwrite {
                    return Err(DavError::Status(StatusCode::PRECONDITION_FAILED));
                }
                debug!(%occupant, ?mode, "replacing occupied target");
                self.clear_occupant(&occupant).await?;
                match mode {
                    Relocation::Move => source.move_to(&destination).await?,
                    Relocation::Copy => source.copy_to(&destination).await?,
                };
                false
            }
            Err(e) => return Err(e.into()),
        };

        Ok(status_response(if fresh {
            StatusCode::CREATED
        } else {
            StatusCode::NO_CONTENT
        }))
    }

    async fn clear_occupant(&self, occupant: &ResourcePath) -> DavResult<()> {
        let occupant = self.root.with_relative(occupant.as_str()).await?;
        occupant.delete().await?;
        Ok(())
    }

    async fn propfind<B>(&self, relative: &str, req: Request<B>) -> DavResult<DavResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let depth = headers::depth(req.headers());
        let gvfs = headers::is_gvfs(req.headers());
        let href = req.uri().path().to_string();
        let content = body::collect(req.into_body()).await.map_err(DavError::Body)?;
        let selection = xml::parse_propfind(&content)?;

        let props = match self.resolve(relative).await {
            Ok(target) => target.populate_props().await.map(|props| (target, props)),
            Err(DavError::Resource(e)) => Err(e),
            Err(e) => return Err(e),
        };
        let (target, props) = match props {
            Ok(found) => found,
            Err(ResourceError::DoesNotExist(_) | ResourceError::InvalidType(_)) if gvfs => {
                return Ok(status_response(StatusCode::NOT_FOUND));
            }
            Err(ResourceError::DoesNotExist(_) | ResourceError::InvalidType(_)) => {
                return multistatus_response(&[PropResponse::missing(href)]);
            }
            Err(e) => return Err(e.into()),
        };

        let mut responses = vec![PropResponse {
            href: href.clone(),
            status: StatusCode::OK,
            props: selection.select(&props),
            is_collection: props.is_collection,
        }];

        if depth == Depth::One && props.is_collection {
            let base = href.trim_end_matches('/');
            for child in target.populate_collection().await? {
                responses.push(PropResponse {
                    href: format!("{base}/{}", headers::encode_segment(child.name())),
                    status: StatusCode::OK,
                    props: selection.select(&child),
                    is_collection: child.is_collection,
                });
            }
        }

        debug!(count = responses.len(), ?depth, "propfind");
        multistatus_response(&responses)
    }
}

/// Stream `length` bytes from `offset` through a channel-backed body.
///
/// The download runs in its own task; if the client goes away the channel
/// closes and the task stops at its next write.
fn stream_content(target: DynResource, offset: u64, length: u64) -> DavBody {
    let (mut tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(
        async move {
            if let Err(e) = target.get_content(&mut tx, offset, Some(length)).await {
                match e {
                    ResourceError::Stream(_) => debug!(error = %e, "download aborted"),
                    _ => warn!(error = %e, "download failed"),
                }
            }
        }
        .in_current_span(),
    );
    body::channel(rx)
}

fn options() -> DavResponse {
    let mut response = status_response(StatusCode::OK);
    let headers = response.headers_mut();
    headers.insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    headers.insert(DAV.clone(), HeaderValue::from_static("1, 2"));
    response
}

fn multistatus_response(responses: &[PropResponse]) -> DavResult<DavResponse> {
    let document = xml::multistatus(responses)?;
    let mut response = Response::new(body::full(document));
    *response.status_mut() = StatusCode::MULTI_STATUS;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(MULTISTATUS_CONTENT_TYPE));
    Ok(response)
}

/// Empty-bodied response with the given status.
pub(crate) fn status_response(status: StatusCode) -> DavResponse {
    let mut response = Response::new(body::empty());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

fn header_value(value: &str) -> DavResult<HeaderValue> {
    Ok(HeaderValue::from_str(value)?)
}
