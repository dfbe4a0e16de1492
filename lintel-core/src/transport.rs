//! Transport write strategies.
//!
//! A writer either hands back one [`FullResponse`] (buffered) or drives a
//! [`TransportChannel`] itself (streaming). Plain codecs always take the
//! buffered path; writers that need the channel implement
//! [`TransportWriter`] and declare which shapes they support per value.

use crate::body_type::BodyType;
use crate::custom::file::FileResource;
use crate::error::{CodecError, Result};
use crate::exchange::{Request, Response};
use crate::headers::{CONTENT_LENGTH, HeaderMap, TRANSFER_ENCODING};
use crate::media_type::MediaType;
use crate::streaming::StreamOutcome;
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use std::any::Any;
use std::io;

/// How a response body reaches the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    Buffered,
    Streaming,
}

/// Strategies a writer supports for a particular value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteStrategies {
    buffered: bool,
    streaming: bool,
}

impl WriteStrategies {
    pub const fn buffered() -> Self {
        Self {
            buffered: true,
            streaming: false,
        }
    }

    pub const fn streaming() -> Self {
        Self {
            buffered: false,
            streaming: true,
        }
    }

    pub const fn both() -> Self {
        Self {
            buffered: true,
            streaming: true,
        }
    }

    pub fn supports(&self, strategy: WriteStrategy) -> bool {
        match strategy {
            WriteStrategy::Buffered => self.buffered,
            WriteStrategy::Streaming => self.streaming,
        }
    }

    /// Buffered when available, otherwise streaming.
    pub fn preferred(&self) -> Option<WriteStrategy> {
        if self.buffered {
            Some(WriteStrategy::Buffered)
        } else if self.streaming {
            Some(WriteStrategy::Streaming)
        } else {
            None
        }
    }
}

/// Status line and headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    /// Snapshot of the response's current status and headers.
    pub fn from_response(response: &Response) -> Self {
        Self::new(response.status, response.headers.clone())
    }

    /// Whether the status permits a message body at all.
    pub fn allows_body(&self) -> bool {
        !(self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED)
    }

    /// Prepare for chunked streaming: no fixed length.
    pub fn into_streaming(mut self) -> Self {
        self.headers.remove(CONTENT_LENGTH);
        self
    }
}

/// A complete response written in one go.
///
/// Always framed by Content-Length, zero included; never chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullResponse {
    pub head: ResponseHead,
    pub body: Bytes,
}

impl FullResponse {
    pub fn new(mut head: ResponseHead, body: Bytes) -> Self {
        head.headers.remove(TRANSFER_ENCODING);
        if head.allows_body() {
            head.headers.set_content_length(body.len());
        }
        Self { head, body }
    }
}

/// Result of waiting for the channel before the next chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Writable,
    /// The peer went away or the exchange was cancelled.
    Cancelled,
}

/// The connection an exchange writes to.
///
/// One channel serves one exchange at a time. Either `write_buffered` is
/// called once, or `write_head` is followed by chunks or a zero-copy
/// transfer and, when required, `write_terminal`.
#[async_trait]
pub trait TransportChannel: Send {
    async fn write_buffered(&mut self, response: FullResponse) -> io::Result<()>;

    async fn write_head(&mut self, head: ResponseHead) -> io::Result<()>;

    async fn write_stream_chunk(&mut self, chunk: Bytes) -> io::Result<()>;

    async fn write_terminal(&mut self) -> io::Result<()>;

    fn supports_zero_copy(&self) -> bool {
        false
    }

    /// Send `length` bytes of `file` without copying them through user space.
    ///
    /// The channel owns the resource from here on and must release it on
    /// every exit path.
    async fn write_zero_copy(&mut self, file: FileResource, length: u64) -> io::Result<()> {
        drop(file);
        let _ = length;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "zero-copy transfer not supported by this channel",
        ))
    }

    /// Wait until the next chunk may be written.
    async fn ready(&mut self) -> Readiness;

    /// Terminate the exchange abnormally after bytes were committed.
    async fn abort(&mut self);
}

/// A writer that needs direct access to the channel or the response envelope.
#[async_trait]
pub trait TransportWriter: Send + Sync {
    fn strategies(&self, body_type: &BodyType, value: &dyn Any) -> WriteStrategies;

    /// Build the whole response. Must not touch any channel.
    fn write_buffered(
        &self,
        _request: &Request,
        _response: &mut Response,
        _body_type: &BodyType,
        _value: &dyn Any,
        _media_type: &MediaType,
    ) -> std::result::Result<FullResponse, CodecError> {
        Err(CodecError::Unsupported("buffered write"))
    }

    /// Drive the channel: head, chunks, terminal.
    async fn write_streaming(
        &self,
        _request: &Request,
        _response: &mut Response,
        body_type: &BodyType,
        _value: Box<dyn Any + Send>,
        media_type: &MediaType,
        _channel: &mut dyn TransportChannel,
    ) -> Result<StreamOutcome> {
        Err(crate::Error::Encoding {
            body_type: body_type.clone(),
            media_type: media_type.clone(),
            source: CodecError::Unsupported("streaming write"),
        })
    }
}

/// Channel wrapper remembering whether anything reached the wire.
pub struct TrackedChannel<'a> {
    inner: &'a mut dyn TransportChannel,
    committed: bool,
}

impl<'a> TrackedChannel<'a> {
    pub fn new(inner: &'a mut dyn TransportChannel) -> Self {
        Self {
            inner,
            committed: false,
        }
    }

    pub fn committed(&self) -> bool {
        self.committed
    }
}

#[async_trait]
impl TransportChannel for TrackedChannel<'_> {
    async fn write_buffered(&mut self, response: FullResponse) -> io::Result<()> {
        self.committed = true;
        self.inner.write_buffered(response).await
    }

    async fn write_head(&mut self, head: ResponseHead) -> io::Result<()> {
        self.committed = true;
        self.inner.write_head(head).await
    }

    async fn write_stream_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.committed = true;
        self.inner.write_stream_chunk(chunk).await
    }

    async fn write_terminal(&mut self) -> io::Result<()> {
        self.committed = true;
        self.inner.write_terminal().await
    }

    fn supports_zero_copy(&self) -> bool {
        self.inner.supports_zero_copy()
    }

    async fn write_zero_copy(&mut self, file: FileResource, length: u64) -> io::Result<()> {
        self.committed = true;
        self.inner.write_zero_copy(file, length).await
    }

    async fn ready(&mut self) -> Readiness {
        self.inner.ready().await
    }

    async fn abort(&mut self) {
        self.inner.abort().await
    }
}
