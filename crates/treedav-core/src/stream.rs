//! Streaming seams between resources and the transport.
//!
//! Resources never see HTTP bodies directly. Downloads push chunks into a
//! [`ContentSink`]; uploads pull chunks from a [`ContentSource`] until it
//! yields an empty chunk.

use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use futures::channel::mpsc;
use std::collections::VecDeque;
use std::io;

/// Destination for streamed resource content.
#[async_trait]
pub trait ContentSink: Send {
    /// Write one chunk. Errors abort the transfer.
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;
}

/// Origin of uploaded resource content.
#[async_trait]
pub trait ContentSource: Send {
    /// Read the next chunk. An empty chunk signals end of stream.
    async fn read_some(&mut self) -> io::Result<Bytes>;
}

#[async_trait]
impl ContentSink for Vec<u8> {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Channel sink used to feed a streaming response body.
///
/// A dropped receiver (client went away) surfaces as `BrokenPipe`.
#[async_trait]
impl ContentSink for mpsc::Sender<Bytes> {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "content receiver dropped"))
    }
}

/// A whole payload handed over in one chunk.
#[async_trait]
impl ContentSource for Bytes {
    async fn read_some(&mut self) -> io::Result<Bytes> {
        Ok(std::mem::take(self))
    }
}

/// In-memory source yielding a fixed sequence of chunks.
#[derive(Debug, Default, Clone)]
pub struct ChunkedSource {
    chunks: VecDeque<Bytes>,
}

impl ChunkedSource {
    /// Split `data` into chunks of at most `chunk_size` bytes.
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        let mut data: Bytes = data.into();
        let chunk_size = chunk_size.max(1);
        let mut chunks = VecDeque::new();
        while !data.is_empty() {
            let take = chunk_size.min(data.len());
            chunks.push_back(data.split_to(take));
        }
        Self { chunks }
    }
}

#[async_trait]
impl ContentSource for ChunkedSource {
    async fn read_some(&mut self) -> io::Result<Bytes> {
        Ok(self.chunks.pop_front().unwrap_or_default())
    }
}
