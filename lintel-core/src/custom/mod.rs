//! Customizable response types.
//!
//! Some values are not encoded by a codec at all: a file on disk, a live
//! stream. A [`CustomResponseHandler`] claims such values by type and
//! describes the whole response as a [`CustomResponse`]; [`transmit`] then
//! puts it on the channel.

pub mod file;
pub mod stream;

pub use file::{FileResource, PathFileHandler, SystemFile, SystemFileHandler};
pub use stream::{StreamedBody, StreamedBodyHandler};

use crate::body_type::BodyType;
use crate::config::BodyConfig;
use crate::error::Result;
use crate::exchange::{OutgoingBody, Request, Response};
use crate::streaming::{BodyStream, StreamOutcome, drive_sized_stream, write_streamed};
use crate::transport::{FullResponse, Readiness, ResponseHead, TransportChannel};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Handles values of particular types end to end, bypassing codecs.
#[async_trait]
pub trait CustomResponseHandler: Send + Sync {
    fn name(&self) -> &str;

    /// Lower runs first when several handlers support the same type.
    fn order(&self) -> i32 {
        0
    }

    fn supports(&self, body_type: &BodyType) -> bool;

    /// Turn `value` into a response description.
    ///
    /// May set headers and the status on `response`; the returned head is
    /// what goes on the wire.
    async fn handle(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
    ) -> Result<CustomResponse>;
}

/// Payload of a [`CustomResponse`].
pub enum CustomBody {
    Empty,
    Bytes(Bytes),
    File(FileResource),
    Stream(BodyStream),
}

impl fmt::Debug for CustomBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomBody::Empty => f.write_str("Empty"),
            CustomBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            CustomBody::File(file) => f.debug_tuple("File").field(file).finish(),
            CustomBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Everything needed to write one response: head, body, and whether the
/// transport must send a terminal marker after the body.
#[derive(Debug)]
pub struct CustomResponse {
    pub head: ResponseHead,
    pub body: CustomBody,
    pub need_last: bool,
}

impl CustomResponse {
    pub fn new(head: ResponseHead, body: CustomBody, need_last: bool) -> Self {
        Self {
            head,
            body,
            need_last,
        }
    }
}

/// Ordered set of custom handlers.
#[derive(Clone, Default)]
pub struct CustomResponseRegistry {
    handlers: Vec<Arc<dyn CustomResponseHandler>>,
}

/// Builder for [`CustomResponseRegistry`].
#[derive(Default)]
pub struct CustomResponseRegistryBuilder {
    handlers: Vec<Arc<dyn CustomResponseHandler>>,
}

impl CustomResponseRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: CustomResponseHandler + 'static>(self, handler: H) -> Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(mut self, handler: Arc<dyn CustomResponseHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// File and stream handlers.
    pub fn with_defaults(self) -> Self {
        let system = Arc::new(SystemFileHandler);
        self.register_arc(system.clone())
            .register(PathFileHandler::new(system))
            .register(StreamedBodyHandler)
    }

    pub fn build(mut self) -> CustomResponseRegistry {
        // stable: registration order breaks ties
        self.handlers.sort_by_key(|h| h.order());
        CustomResponseRegistry {
            handlers: self.handlers,
        }
    }
}

impl CustomResponseRegistry {
    pub fn builder() -> CustomResponseRegistryBuilder {
        CustomResponseRegistryBuilder::new()
    }

    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler names in dispatch order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// First handler, in ascending order, that supports `body_type`.
    pub fn handler_for(&self, body_type: &BodyType) -> Option<Arc<dyn CustomResponseHandler>> {
        self.handlers
            .iter()
            .find(|h| h.supports(body_type))
            .cloned()
    }
}

impl fmt::Debug for CustomResponseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomResponseRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

/// Write a [`CustomResponse`] to the channel.
///
/// Files go out by zero-copy transfer when both the config and the channel
/// allow it, otherwise in `chunk_size` pieces. A cancelled exchange ends
/// without a terminal marker and without error.
pub async fn transmit(
    custom: CustomResponse,
    channel: &mut dyn TransportChannel,
    config: &BodyConfig,
) -> Result<StreamOutcome> {
    let CustomResponse {
        mut head,
        body,
        need_last,
    } = custom;

    match body {
        CustomBody::Empty | CustomBody::Bytes(_) if !need_last => {
            let bytes = match body {
                CustomBody::Bytes(bytes) => bytes,
                _ => Bytes::new(),
            };
            trace!(len = bytes.len(), "custom response buffered");
            channel.write_buffered(FullResponse::new(head, bytes)).await?;
            Ok(StreamOutcome::Completed)
        }
        CustomBody::Empty => {
            if head.allows_body() {
                head.headers.set_content_length(0);
            }
            channel.write_head(head).await?;
            channel.write_terminal().await?;
            Ok(StreamOutcome::Completed)
        }
        CustomBody::Bytes(bytes) => {
            if head.allows_body() {
                head.headers.set_content_length(bytes.len());
            }
            channel.write_head(head).await?;
            if !bytes.is_empty() {
                if channel.ready().await == Readiness::Cancelled {
                    return Ok(StreamOutcome::Cancelled);
                }
                channel.write_stream_chunk(bytes).await?;
            }
            channel.write_terminal().await?;
            Ok(StreamOutcome::Completed)
        }
        CustomBody::File(resource) => {
            channel.write_head(head).await?;
            let outcome = if config.zero_copy && channel.supports_zero_copy() {
                if channel.ready().await == Readiness::Cancelled {
                    drop(resource);
                    StreamOutcome::Cancelled
                } else {
                    let length = resource.len();
                    debug!(path = %resource.path().display(), length, "zero-copy file transfer");
                    channel.write_zero_copy(resource, length).await?;
                    StreamOutcome::Completed
                }
            } else {
                let length = resource.len();
                debug!(
                    path = %resource.path().display(),
                    length,
                    chunk_size = config.chunk_size,
                    "chunked file transfer"
                );
                drive_sized_stream(channel, resource.into_stream(config.chunk_size), length).await?
            };
            if outcome == StreamOutcome::Completed && need_last {
                channel.write_terminal().await?;
            }
            Ok(outcome)
        }
        CustomBody::Stream(stream) => write_streamed(channel, head, stream, need_last).await,
    }
}
