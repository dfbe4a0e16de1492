//! HTTP/1.1 channel over any async writer.
//!
//! Buffered responses are framed by Content-Length. Streamed responses
//! without a declared length switch to chunked transfer coding and end with
//! the `0\r\n\r\n` terminal chunk.

use crate::headers::{CONTENT_LENGTH, TRANSFER_ENCODING};
use crate::transport::{FullResponse, Readiness, ResponseHead, TransportChannel};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub struct Http1Channel<W> {
    writer: W,
    cancel: CancellationToken,
    chunked: bool,
}

impl<W> Http1Channel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self::with_cancellation(writer, CancellationToken::new())
    }

    /// Use `cancel` to signal that the peer is gone.
    pub fn with_cancellation(writer: W, cancel: CancellationToken) -> Self {
        Self {
            writer,
            cancel,
            chunked: false,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn encode_head(head: &ResponseHead) -> BytesMut {
        let mut buf = BytesMut::with_capacity(128);
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(head.status.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(head.status.canonical_reason().unwrap_or("").as_bytes());
        buf.put_slice(b"\r\n");
        for (name, value) in head.headers.iter() {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf
    }
}

#[async_trait]
impl<W> TransportChannel for Http1Channel<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_buffered(&mut self, response: FullResponse) -> io::Result<()> {
        let mut buf = Self::encode_head(&response.head);
        buf.put_slice(&response.body);
        self.writer.write_all(&buf).await?;
        self.writer.flush().await
    }

    async fn write_head(&mut self, mut head: ResponseHead) -> io::Result<()> {
        self.chunked = head.allows_body() && !head.headers.contains(CONTENT_LENGTH);
        if self.chunked {
            head.headers.insert(TRANSFER_ENCODING, "chunked");
        }
        trace!(status = %head.status, chunked = self.chunked, "writing response head");
        self.writer.write_all(&Self::encode_head(&head)).await
    }

    async fn write_stream_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        if !self.chunked {
            return self.writer.write_all(&chunk).await;
        }
        let mut buf = BytesMut::with_capacity(chunk.len() + 12);
        buf.put_slice(format!("{:X}\r\n", chunk.len()).as_bytes());
        buf.put_slice(&chunk);
        buf.put_slice(b"\r\n");
        self.writer.write_all(&buf).await
    }

    async fn write_terminal(&mut self) -> io::Result<()> {
        if self.chunked {
            self.writer.write_all(b"0\r\n\r\n").await?;
        }
        self.writer.flush().await
    }

    async fn ready(&mut self) -> Readiness {
        if self.cancel.is_cancelled() {
            return Readiness::Cancelled;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Readiness::Cancelled,
            flushed = self.writer.flush() => match flushed {
                Ok(()) => Readiness::Writable,
                Err(_) => Readiness::Cancelled,
            },
        }
    }

    async fn abort(&mut self) {
        self.cancel.cancel();
        let _ = self.writer.shutdown().await;
    }
}
