use super::{
    HandlerRegistration, MessageBodyReader, MessageBodyWriter, ensure_content_type, expect_value,
};
use crate::body_type::BodyType;
use crate::error::{CodecError, Error, Result};
use crate::exchange::{Request, Response};
use crate::headers::HeaderMap;
use crate::media_type::MediaType;
use crate::streaming::{BodyStream, StreamOutcome, write_streamed};
use crate::transport::{ResponseHead, TransportChannel, TransportWriter, WriteStrategies};
use async_trait::async_trait;
use bytes::Bytes;
use std::any::Any;
use std::io::{BufRead, BufReader, Read, Write};

type Items = Vec<serde_json::Value>;

fn encode_line(item: &serde_json::Value) -> std::result::Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(item)?;
    line.push(b'\n');
    Ok(line)
}

/// Newline-delimited JSON: one `serde_json::Value` per line.
///
/// Over a live channel every item becomes its own chunk, so the response
/// is never materialised in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NdjsonHandler;

impl NdjsonHandler {
    pub const NAME: &'static str = "ndjson";

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(BodyType::of::<Items>(), vec![MediaType::ndjson()], NdjsonHandler)
            .named(Self::NAME)
    }
}

impl MessageBodyReader for NdjsonHandler {
    fn read(
        &self,
        _body_type: &BodyType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> std::result::Result<Box<dyn Any + Send>, CodecError> {
        let mut items = Items::new();
        for line in BufReader::new(input).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            items.push(serde_json::from_str(&line)?);
        }
        Ok(Box::new(items))
    }
}

impl MessageBodyWriter for NdjsonHandler {
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> std::result::Result<(), CodecError> {
        let items = expect_value::<Items>(value)?;
        ensure_content_type(headers, media_type);
        for item in items {
            output.write_all(&encode_line(item)?)?;
        }
        Ok(())
    }

    fn transport(&self) -> Option<&dyn TransportWriter> {
        Some(self)
    }
}

#[async_trait]
impl TransportWriter for NdjsonHandler {
    fn strategies(&self, _body_type: &BodyType, _value: &dyn Any) -> WriteStrategies {
        WriteStrategies::streaming()
    }

    async fn write_streaming(
        &self,
        _request: &Request,
        response: &mut Response,
        body_type: &BodyType,
        value: Box<dyn Any + Send>,
        media_type: &MediaType,
        channel: &mut dyn TransportChannel,
    ) -> Result<StreamOutcome> {
        let encoding_error = |source: CodecError| Error::Encoding {
            body_type: body_type.clone(),
            media_type: media_type.clone(),
            source,
        };
        let items = *value.downcast::<Items>().map_err(|_| {
            encoding_error(CodecError::TypeMismatch {
                expected: std::any::type_name::<Items>(),
            })
        })?;

        ensure_content_type(&mut response.headers, media_type);
        let head = ResponseHead::from_response(response).into_streaming();

        // Items are encoded lazily, one per writability signal.
        let stream: BodyStream = Box::pin(futures_util::stream::iter(items.into_iter().map(
            |item| {
                encode_line(&item)
                    .map(Bytes::from)
                    .map_err(std::io::Error::other)
            },
        )));
        write_streamed(channel, head, stream, true).await
    }
}
