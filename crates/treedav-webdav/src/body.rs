//! Request and response bodies.
//!
//! Responses use one boxed body type so every handler can return the same
//! `Response<DavBody>`, whether it is empty, a buffered XML document, or a
//! stream fed by a resource download task.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::channel::mpsc;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::{Body, Frame};
use std::error::Error as StdError;
use std::io;
use treedav_core::ContentSource;

/// Response body used by every handler.
pub type DavBody = UnsyncBoxBody<Bytes, io::Error>;

/// Capacity of the download channel, in chunks.
pub(crate) const STREAM_CHANNEL_CAPACITY: usize = 4;

pub(crate) fn empty() -> DavBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync()
}

pub(crate) fn full(data: impl Into<Bytes>) -> DavBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Body fed chunk by chunk from a download task.
pub(crate) fn channel(rx: mpsc::Receiver<Bytes>) -> DavBody {
    StreamBody::new(rx.map(|chunk| Ok::<_, io::Error>(Frame::data(chunk)))).boxed_unsync()
}

/// Adapts an HTTP request body to a resource [`ContentSource`].
pub(crate) struct BodySource<B> {
    body: B,
}

impl<B> BodySource<B> {
    pub fn new(body: B) -> Self {
        Self { body }
    }
}

#[async_trait]
impl<B> ContentSource for BodySource<B>
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    async fn read_some(&mut self) -> io::Result<Bytes> {
        loop {
            match self.body.frame().await {
                None => return Ok(Bytes::new()),
                Some(Ok(frame)) => {
                    // Trailers and empty data frames carry no content
                    if let Ok(data) = frame.into_data()
                        && !data.is_empty()
                    {
                        return Ok(data);
                    }
                }
                Some(Err(e)) => return Err(io::Error::other(e)),
            }
        }
    }
}

/// Drain a request body into memory.
pub(crate) async fn collect<B>(body: B) -> io::Result<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;

    #[tokio::test]
    async fn test_body_source_yields_chunks_then_empty() {
        let frames = futures::stream::iter(vec![
            Ok::<_, io::Error>(Frame::data(Bytes::from_static(b"CON"))),
            Ok(Frame::data(Bytes::new())),
            Ok(Frame::data(Bytes::from_static(b"TENT"))),
        ]);
        let mut source = BodySource::new(StreamBody::new(frames));

        assert_eq!(source.read_some().await.unwrap(), Bytes::from_static(b"CON"));
        assert_eq!(source.read_some().await.unwrap(), Bytes::from_static(b"TENT"));
        assert!(source.read_some().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_source_reports_errors() {
        let frames = futures::stream::iter(vec![Err::<Frame<Bytes>, _>(io::Error::other("reset"))]);
        let mut source = BodySource::new(StreamBody::new(frames));
        assert!(source.read_some().await.is_err());
    }

    #[tokio::test]
    async fn test_channel_body() {
        let (mut tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            tx.send(Bytes::from_static(b"a")).await.unwrap();
            tx.send(Bytes::from_static(b"b")).await.unwrap();
        });
        let collected = collect(channel(rx)).await.unwrap();
        assert_eq!(collected, Bytes::from_static(b"ab"));
    }

    #[tokio::test]
    async fn test_full_and_empty() {
        assert_eq!(collect(full("xml")).await.unwrap(), Bytes::from_static(b"xml"));
        assert!(collect(empty()).await.unwrap().is_empty());
    }
}
