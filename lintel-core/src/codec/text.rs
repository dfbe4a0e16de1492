use super::{
    HandlerRegistration, MessageBodyReader, MessageBodyWriter, ensure_content_type, expect_value,
};
use crate::body_type::BodyType;
use crate::charset::Charset;
use crate::error::CodecError;
use crate::exchange::{Request, Response};
use crate::headers::HeaderMap;
use crate::media_type::MediaType;
use crate::transport::{FullResponse, ResponseHead, TransportWriter, WriteStrategies};
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::io::{Read, Write};

/// `String` over `text/*`.
///
/// Reads decode with the charset of the message's Content-Type and fall back
/// to the configured default (UTF-8 unless changed).
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPlainHandler {
    default_charset: Charset,
}

impl TextPlainHandler {
    pub const NAME: &'static str = "text-plain";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_charset(default_charset: Charset) -> Self {
        Self { default_charset }
    }

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(
            BodyType::of::<String>(),
            vec![MediaType::new("text", "*")],
            Self::new(),
        )
        .named(Self::NAME)
    }

    fn read_charset(&self, media_type: &MediaType, headers: &HeaderMap) -> Result<Charset, CodecError> {
        match media_type.charset() {
            Some(name) => Charset::for_name(name),
            None => Charset::from_headers(headers, self.default_charset),
        }
    }

    /// Set Content-Type if absent, then encode with whatever charset it names.
    fn encode(
        &self,
        value: &str,
        media_type: &MediaType,
        headers: &mut HeaderMap,
    ) -> Result<Vec<u8>, CodecError> {
        ensure_content_type(headers, media_type);
        Charset::from_headers(headers, self.default_charset)?.encode(value)
    }
}

impl MessageBodyReader for TextPlainHandler {
    fn read(
        &self,
        _body_type: &BodyType,
        media_type: &MediaType,
        headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        let charset = self.read_charset(media_type, headers)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Ok(Box::new(charset.decode(&bytes)?))
    }
}

impl MessageBodyWriter for TextPlainHandler {
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<(), CodecError> {
        let text = expect_value::<String>(value)?;
        let bytes = self.encode(text, media_type, headers)?;
        output.write_all(&bytes)?;
        Ok(())
    }
}

/// Text handler that writes complete response envelopes itself.
///
/// Replaces [`TextPlainHandler`] when registered; reading and plain writes
/// are delegated to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportTextPlainHandler {
    plain: TextPlainHandler,
}

impl TransportTextPlainHandler {
    pub const NAME: &'static str = "transport-text-plain";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_charset(default_charset: Charset) -> Self {
        Self {
            plain: TextPlainHandler::with_default_charset(default_charset),
        }
    }

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(
            BodyType::of::<String>(),
            vec![MediaType::new("text", "*")],
            Self::new(),
        )
        .named(Self::NAME)
        .replaces(TextPlainHandler::NAME)
    }
}

impl MessageBodyReader for TransportTextPlainHandler {
    fn read(
        &self,
        body_type: &BodyType,
        media_type: &MediaType,
        headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        self.plain.read(body_type, media_type, headers, input)
    }
}

impl MessageBodyWriter for TransportTextPlainHandler {
    fn write_to(
        &self,
        body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<(), CodecError> {
        self.plain
            .write_to(body_type, value, media_type, headers, output)
    }

    fn transport(&self) -> Option<&dyn TransportWriter> {
        Some(self)
    }
}

#[async_trait]
impl TransportWriter for TransportTextPlainHandler {
    fn strategies(&self, _body_type: &BodyType, _value: &dyn Any) -> WriteStrategies {
        WriteStrategies::buffered()
    }

    fn write_buffered(
        &self,
        _request: &Request,
        response: &mut Response,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
    ) -> Result<FullResponse, CodecError> {
        let text = expect_value::<String>(value)?;
        let bytes = self.plain.encode(text, media_type, &mut response.headers)?;
        Ok(FullResponse::new(
            ResponseHead::from_response(response),
            Bytes::from(bytes),
        ))
    }
}
