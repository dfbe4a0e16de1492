//! Incremental response bodies.
//!
//! A [`ByteStream`] is fed through a bounded channel, so a producer task can
//! only run `stream_buffer` chunks ahead of the connection. The chunk loop in
//! [`drive_stream`] waits on [`TransportChannel::ready`] before every chunk and
//! stops as soon as the channel reports cancellation, dropping the source.
//!
//! ```
//! use lintel_core::streaming::ByteStream;
//!
//! # tokio_test::block_on(async {
//! let (stream, sender) = ByteStream::new();
//!
//! tokio::spawn(async move {
//!     sender.send("Hello, ").await.ok();
//!     sender.send("World!").await.ok();
//!     sender.close().await;
//! });
//! # drop(stream);
//! # });
//! ```

use crate::error::{Error, Result};
use crate::transport::{Readiness, ResponseHead, TransportChannel};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default capacity of the channel behind a [`ByteStream`].
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Any live source of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// How a chunk loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug)]
enum StreamChunk {
    Bytes(Bytes),
    End,
    Error(String),
}

/// Receiving half of a producer-fed body.
pub struct ByteStream {
    receiver: mpsc::Receiver<StreamChunk>,
    finished: bool,
}

/// Sending half of a [`ByteStream`].
#[derive(Clone)]
pub struct ByteStreamSender {
    sender: mpsc::Sender<StreamChunk>,
    bytes_sent: Arc<AtomicU64>,
}

impl ByteStream {
    pub fn new() -> (Self, ByteStreamSender) {
        Self::with_buffer_size(DEFAULT_STREAM_BUFFER)
    }

    pub fn with_buffer_size(size: usize) -> (Self, ByteStreamSender) {
        let (sender, receiver) = mpsc::channel(size.max(1));
        (
            Self {
                receiver,
                finished: false,
            },
            ByteStreamSender {
                sender,
                bytes_sent: Arc::new(AtomicU64::new(0)),
            },
        )
    }

    pub fn boxed(self) -> BodyStream {
        Box::pin(self)
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(StreamChunk::Bytes(bytes))) => Poll::Ready(Some(Ok(bytes))),
            Poll::Ready(Some(StreamChunk::Error(message))) => {
                self.finished = true;
                Poll::Ready(Some(Err(io::Error::other(message))))
            }
            Poll::Ready(Some(StreamChunk::End)) | Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl ByteStreamSender {
    /// Send a chunk, waiting while the buffer is full.
    pub async fn send(&self, data: impl Into<Bytes>) -> io::Result<()> {
        let bytes = data.into();
        let len = bytes.len() as u64;
        self.sender
            .send(StreamChunk::Bytes(bytes))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "body stream receiver dropped"))?;
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    /// Fail the stream; the consumer sees an I/O error.
    pub async fn send_error(&self, error: impl Into<String>) -> io::Result<()> {
        self.sender
            .send(StreamChunk::Error(error.into()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "body stream receiver dropped"))
    }

    pub async fn close(&self) {
        let _ = self.sender.send(StreamChunk::End).await;
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Chunks the producer may run ahead of the connection.
    pub fn buffer_size(&self) -> usize {
        self.sender.max_capacity()
    }

    /// True once the consumer is gone, e.g. after a cancelled exchange.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Newline-delimited JSON on top of a [`ByteStream`].
pub struct JsonStreamSender {
    inner: ByteStreamSender,
    items_sent: Arc<AtomicU64>,
}

impl JsonStreamSender {
    pub fn channel(buffer: usize) -> (ByteStream, Self) {
        let (stream, inner) = ByteStream::with_buffer_size(buffer);
        (
            stream,
            Self {
                inner,
                items_sent: Arc::new(AtomicU64::new(0)),
            },
        )
    }

    pub async fn send_json<T: Serialize>(&self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value).map_err(io::Error::other)?;
        line.push(b'\n');
        self.inner.send(line).await?;
        self.items_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }

    pub fn items_sent(&self) -> u64 {
        self.items_sent.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size()
    }
}

/// Pump `stream` into the channel, one chunk per writability signal.
///
/// Neither the head nor the terminal marker is written here. On
/// cancellation the source is dropped immediately.
pub async fn drive_stream(
    channel: &mut dyn TransportChannel,
    stream: BodyStream,
) -> Result<StreamOutcome> {
    pump(channel, stream, None).await.map(|(outcome, _)| outcome)
}

/// [`drive_stream`] for a body announced with a Content-Length.
///
/// The source must yield exactly `length` bytes. Ending early fails with
/// `UnexpectedEof`, running long fails with `InvalidData` before the
/// excess chunk is written.
pub async fn drive_sized_stream(
    channel: &mut dyn TransportChannel,
    stream: BodyStream,
    length: u64,
) -> Result<StreamOutcome> {
    let (outcome, sent) = pump(channel, stream, Some(length)).await?;
    if outcome == StreamOutcome::Completed && sent != length {
        debug!(sent, length, "stream ended before its declared length");
        return Err(Error::Transport(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("body ended after {sent} of {length} bytes"),
        )));
    }
    Ok(outcome)
}

async fn pump(
    channel: &mut dyn TransportChannel,
    mut stream: BodyStream,
    limit: Option<u64>,
) -> Result<(StreamOutcome, u64)> {
    let mut chunks = 0usize;
    let mut sent = 0u64;
    while let Some(next) = stream.next().await {
        let chunk = next.map_err(Error::Transport)?;
        if channel.ready().await == Readiness::Cancelled {
            debug!(chunks, sent, "stream cancelled by transport");
            return Ok((StreamOutcome::Cancelled, sent));
        }
        if chunk.is_empty() {
            continue;
        }
        let len = chunk.len() as u64;
        if let Some(limit) = limit.filter(|limit| sent + len > *limit) {
            return Err(Error::Transport(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("body exceeds its declared length of {limit} bytes"),
            )));
        }
        trace!(len, "writing stream chunk");
        channel.write_stream_chunk(chunk).await?;
        chunks += 1;
        sent += len;
    }
    trace!(chunks, sent, "stream completed");
    Ok((StreamOutcome::Completed, sent))
}

/// Head, chunks, then the terminal marker when `need_last` is set and the
/// stream ran to completion.
///
/// A head carrying Content-Length holds the stream to that many bytes.
pub async fn write_streamed(
    channel: &mut dyn TransportChannel,
    head: ResponseHead,
    stream: BodyStream,
    need_last: bool,
) -> Result<StreamOutcome> {
    let declared = head
        .headers
        .content_length()
        .filter(|_| head.allows_body())
        .map(|len| len as u64);
    channel.write_head(head).await?;
    let outcome = match declared {
        Some(length) => drive_sized_stream(channel, stream, length).await?,
        None => drive_stream(channel, stream).await?,
    };
    if outcome == StreamOutcome::Completed && need_last {
        channel.write_terminal().await?;
    }
    Ok(outcome)
}
