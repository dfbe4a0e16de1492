//! Response assembly.
//!
//! [`ResponseAssembler`] is the single entry point a server calls per
//! exchange. It offers the value to the custom handlers first, and otherwise
//! negotiates a media type, resolves a writer and picks a write strategy.

use crate::body_type::BodyType;
use crate::charset::Charset;
use crate::codec::{CodecRegistry, MessageBodyWriter};
use crate::config::BodyConfig;
use crate::custom::{self, CustomResponseRegistry, StreamedBody};
use crate::error::{BoxError, CodecError, Error, Result};
use crate::exchange::{OutgoingBody, Request, Response};
use crate::media_type::{MediaType, negotiate};
use crate::streaming::{ByteStreamSender, JsonStreamSender, StreamOutcome};
use crate::transport::{
    FullResponse, ResponseHead, TrackedChannel, TransportChannel, WriteStrategy,
};
use bytes::{BufMut, BytesMut};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// A failed render, with whether the channel had already seen bytes.
///
/// When `committed` is false the exchange is untouched and the caller can
/// still send [`error_response`](Self::error_response).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RenderError {
    #[source]
    pub error: Error,
    pub committed: bool,
}

impl RenderError {
    pub fn into_error(self) -> Error {
        self.error
    }

    /// Error response for an uncommitted failure.
    pub fn error_response(&self) -> Option<FullResponse> {
        (!self.committed).then(|| self.error.to_response())
    }
}

/// Turns application values into responses on a channel.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    codecs: Arc<CodecRegistry>,
    custom: Arc<CustomResponseRegistry>,
    config: BodyConfig,
}

impl ResponseAssembler {
    pub fn new(codecs: Arc<CodecRegistry>, custom: Arc<CustomResponseRegistry>) -> Self {
        Self {
            codecs,
            custom,
            config: BodyConfig::default(),
        }
    }

    /// Built-in codecs and custom handlers with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(
            Arc::new(CodecRegistry::with_defaults()),
            Arc::new(CustomResponseRegistry::with_defaults()),
        )
    }

    /// Replace the configuration.
    ///
    /// `default_charset` fills in `text/*` bodies that declare no charset,
    /// on both requests and responses.
    pub fn with_config(mut self, config: BodyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn custom_handlers(&self) -> &Arc<CustomResponseRegistry> {
        &self.custom
    }

    pub fn config(&self) -> &BodyConfig {
        &self.config
    }

    /// Producer-fed octet-stream body buffered `stream_buffer` chunks deep.
    pub fn streamed_body(&self) -> (StreamedBody, ByteStreamSender) {
        StreamedBody::channel(self.config.stream_buffer)
    }

    /// Producer-fed NDJSON body buffered `stream_buffer` lines deep.
    pub fn ndjson_body(&self) -> (StreamedBody, JsonStreamSender) {
        StreamedBody::ndjson(self.config.stream_buffer)
    }

    /// Write `value` as the response to `request`.
    ///
    /// Failures after the first byte abort the channel.
    pub async fn render(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
        channel: &mut dyn TransportChannel,
    ) -> std::result::Result<StreamOutcome, RenderError> {
        let mut tracked = TrackedChannel::new(channel);
        match self.dispatch(value, request, response, &mut tracked).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let committed = tracked.committed();
                if committed {
                    warn!(%error, "response failed after commit, aborting exchange");
                    tracked.abort().await;
                } else {
                    debug!(%error, status = %error.status_code(), "response failed before commit");
                }
                Err(RenderError { error, committed })
            }
        }
    }

    /// Render whatever body the response carries; an empty body otherwise.
    pub async fn send(
        &self,
        request: &Request,
        response: &mut Response,
        channel: &mut dyn TransportChannel,
    ) -> std::result::Result<StreamOutcome, RenderError> {
        match response.take_body() {
            Some(value) => self.render(value, request, response, channel).await,
            None => {
                let full = FullResponse::new(ResponseHead::from_response(response), Default::default());
                channel
                    .write_buffered(full)
                    .await
                    .map_err(|e| RenderError {
                        error: Error::Transport(e),
                        committed: true,
                    })?;
                Ok(StreamOutcome::Completed)
            }
        }
    }

    async fn dispatch(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
        channel: &mut dyn TransportChannel,
    ) -> Result<StreamOutcome> {
        if let Some(handler) = self.custom.handler_for(value.body_type()) {
            let body_type = value.body_type().clone();
            debug!(handler = handler.name(), %body_type, "custom response handler selected");
            let custom = handler
                .handle(value, request, response)
                .await
                .map_err(|e| match e {
                    Error::CustomHandler { .. } => e,
                    other => Error::custom_handler(handler.name(), body_type, other),
                })?;
            return custom::transmit(custom, channel, &self.config).await;
        }
        self.write_with_codec(value, request, response, channel).await
    }

    async fn write_with_codec(
        &self,
        value: OutgoingBody,
        request: &Request,
        response: &mut Response,
        channel: &mut dyn TransportChannel,
    ) -> Result<StreamOutcome> {
        let (value, body_type, produces) = value.into_parts();

        let candidates = if !produces.is_empty() {
            produces
        } else if let Some(content_type) = response.headers.content_type_media() {
            vec![content_type]
        } else {
            vec![self.config.media_type()]
        };
        let accept = request.accept();
        let Some(matched) = negotiate(&candidates, accept.media_types()) else {
            debug!(%body_type, ?candidates, accept = ?accept.media_types(), "negotiation failed");
            return Err(Error::NotAcceptable {
                body_type,
                produces: candidates,
                accept: accept.media_types().to_vec(),
            });
        };
        let media_type = self.concrete(matched.negotiated());
        let media_type = if self.config.charset().ok() == Some(Charset::Utf8) {
            media_type
        } else {
            with_charset(media_type, &self.config.default_charset)
        };
        trace!(%body_type, %media_type, "media type negotiated");

        let writer = self.codecs.resolve_writer(&body_type, &media_type)?;
        let encoding = |source: CodecError| Error::Encoding {
            body_type: body_type.clone(),
            media_type: media_type.clone(),
            source,
        };

        let strategy = writer
            .transport()
            .and_then(|transport| transport.strategies(&body_type, &*value).preferred());
        match (writer.transport(), strategy) {
            (Some(transport), Some(WriteStrategy::Streaming)) => {
                debug!(%body_type, %media_type, "streaming write");
                transport
                    .write_streaming(request, response, &body_type, value, &media_type, channel)
                    .await
            }
            (Some(transport), Some(WriteStrategy::Buffered)) => {
                debug!(%body_type, %media_type, "transport-aware buffered write");
                let full = transport
                    .write_buffered(request, response, &body_type, &*value, &media_type)
                    .map_err(encoding)?;
                channel.write_buffered(full).await?;
                Ok(StreamOutcome::Completed)
            }
            _ => {
                debug!(%body_type, %media_type, "buffered write");
                let full = encode_buffered(writer.as_ref(), response, &body_type, &*value, &media_type)
                    .map_err(encoding)?;
                channel.write_buffered(full).await?;
                Ok(StreamOutcome::Completed)
            }
        }
    }

    /// A wildcard cannot go on the wire: use the configured default when the
    /// wildcard covers it, `application/octet-stream` otherwise.
    fn concrete(&self, media_type: MediaType) -> MediaType {
        if !media_type.is_wildcard() {
            return media_type;
        }
        let default = self.config.media_type();
        if media_type.includes(&default) {
            default
        } else {
            MediaType::octet_stream()
        }
    }

    /// Decode the request body as `body_type`.
    ///
    /// A request without Content-Type is treated as
    /// `application/octet-stream`.
    pub fn read_body(&self, request: &Request, body_type: &BodyType) -> Result<Box<dyn Any + Send>> {
        let media_type = request_media_type(request, Some(self.config.default_charset.as_str()));
        self.codecs
            .read(body_type, &media_type, &request.headers, &mut request.body.as_ref())
    }

    pub fn read_body_as<T: Any>(&self, request: &Request) -> Result<T> {
        let media_type = request_media_type(request, Some(self.config.default_charset.as_str()));
        self.codecs
            .read_as(&media_type, &request.headers, &mut request.body.as_ref())
    }

    /// Pair a request with this assembler's codecs and a declared body type.
    pub fn typed<T: Any>(&self, request: Request) -> TypedRequest<T> {
        TypedRequest::new(request, self.codecs.clone())
            .with_default_charset(self.config.default_charset.clone())
    }
}

/// Add `charset` to a `text/*` type that names none.
fn with_charset(media_type: MediaType, charset: &str) -> MediaType {
    if media_type.type_() == "text" && media_type.charset().is_none() {
        media_type.with_param("charset", charset)
    } else {
        media_type
    }
}

/// The request's Content-Type, `application/octet-stream` when absent.
fn request_media_type(request: &Request, default_charset: Option<&str>) -> MediaType {
    let media_type = request.content_type().unwrap_or_else(MediaType::octet_stream);
    match default_charset {
        Some(charset) => with_charset(media_type, charset),
        None => media_type,
    }
}

fn encode_buffered(
    writer: &dyn MessageBodyWriter,
    response: &mut Response,
    body_type: &BodyType,
    value: &dyn Any,
    media_type: &MediaType,
) -> std::result::Result<FullResponse, CodecError> {
    let mut output = BytesMut::new().writer();
    writer.write_to(body_type, value, media_type, &mut response.headers, &mut output)?;
    Ok(FullResponse::new(
        ResponseHead::from_response(response),
        output.into_inner().freeze(),
    ))
}

/// A request whose body is read as `T`.
pub struct TypedRequest<T> {
    request: Request,
    codecs: Arc<CodecRegistry>,
    default_charset: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> TypedRequest<T> {
    pub fn new(request: Request, codecs: Arc<CodecRegistry>) -> Self {
        Self {
            request,
            codecs,
            default_charset: None,
            _marker: PhantomData,
        }
    }

    /// Charset for `text/*` bodies whose Content-Type names none.
    pub fn with_default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = Some(charset.into());
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn into_inner(self) -> Request {
        self.request
    }

    pub fn body_type(&self) -> BodyType {
        BodyType::of::<T>()
    }

    /// The decoded body, or `None` when the request has none.
    pub fn body(&self) -> Result<Option<T>> {
        if self.request.body.is_empty() {
            return Ok(None);
        }
        let body_type = self.body_type();
        let media_type = request_media_type(&self.request, self.default_charset.as_deref());
        let value = self.codecs.read(
            &body_type,
            &media_type,
            &self.request.headers,
            &mut self.request.body.as_ref(),
        )?;
        match value.downcast::<T>() {
            Ok(value) => Ok(Some(*value)),
            Err(_) => {
                let source: BoxError =
                    format!("reader did not produce a {}", std::any::type_name::<T>()).into();
                Err(Error::Conversion { body_type, source })
            }
        }
    }
}
