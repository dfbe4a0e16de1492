use super::{
    HandlerRegistration, MessageBodyReader, MessageBodyWriter, ensure_content_type, expect_value,
};
use crate::body_type::BodyType;
use crate::error::CodecError;
use crate::headers::HeaderMap;
use crate::media_type::MediaType;
use bytes::Bytes;
use std::any::Any;
use std::io::{Read, Write};

/// Raw bytes in any media type. Registered below every other handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesHandler;

impl BytesHandler {
    pub const NAME: &'static str = "bytes";
    pub const PRIORITY: i32 = -100;

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(BodyType::of::<Bytes>(), vec![MediaType::any()], BytesHandler)
            .named(Self::NAME)
            .priority(Self::PRIORITY)
    }
}

impl MessageBodyReader for BytesHandler {
    fn read(
        &self,
        _body_type: &BodyType,
        _media_type: &MediaType,
        _headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;
        Ok(Box::new(Bytes::from(buf)))
    }
}

impl MessageBodyWriter for BytesHandler {
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<(), CodecError> {
        let bytes = expect_value::<Bytes>(value)?;
        let media_type = if media_type.is_wildcard() {
            MediaType::octet_stream()
        } else {
            media_type.clone()
        };
        ensure_content_type(headers, &media_type);
        output.write_all(bytes)?;
        Ok(())
    }
}
