use super::{
    CodecRegistryBuilder, HandlerRegistration, MessageBodyReader, MessageBodyWriter,
    ensure_content_type, expect_value,
};
use crate::body_type::BodyType;
use crate::charset::Charset;
use crate::error::CodecError;
use crate::headers::HeaderMap;
use crate::media_type::MediaType;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::io::{Read, Write};
use std::marker::PhantomData;

fn json_media_types() -> Vec<MediaType> {
    vec![MediaType::json(), MediaType::new("application", "*+json")]
}

/// Read the body as text in the declared charset. JSON is UTF-8 unless
/// the sender says otherwise.
fn read_json_text(media_type: &MediaType, input: &mut dyn Read) -> Result<String, CodecError> {
    let charset = match media_type.charset() {
        Some(name) => Charset::for_name(name)?,
        None => Charset::Utf8,
    };
    let mut bytes = Vec::new();
    input.read_to_end(&mut bytes)?;
    charset.decode(&bytes)
}

fn write_json<T: Serialize + ?Sized>(
    value: &T,
    media_type: &MediaType,
    headers: &mut HeaderMap,
    output: &mut dyn Write,
) -> Result<(), CodecError> {
    ensure_content_type(headers, media_type);
    let charset = Charset::from_headers(headers, Charset::Utf8)?;
    if charset == Charset::Utf8 {
        serde_json::to_writer(output, value)?;
    } else {
        let text = serde_json::to_string(value)?;
        output.write_all(&charset.encode(&text)?)?;
    }
    Ok(())
}

/// `serde_json::Value` over `application/json` and `application/*+json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonHandler;

impl JsonHandler {
    pub const NAME: &'static str = "json";

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(
            BodyType::of::<serde_json::Value>(),
            json_media_types(),
            JsonHandler,
        )
        .named(Self::NAME)
    }
}

impl MessageBodyReader for JsonHandler {
    fn read(
        &self,
        _body_type: &BodyType,
        media_type: &MediaType,
        _headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        let text = read_json_text(media_type, input)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        Ok(Box::new(value))
    }
}

impl MessageBodyWriter for JsonHandler {
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<(), CodecError> {
        write_json(expect_value::<serde_json::Value>(value)?, media_type, headers, output)
    }
}

/// JSON codec for one concrete serde type.
pub struct TypedJsonHandler<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedJsonHandler<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    pub fn registration() -> HandlerRegistration {
        HandlerRegistration::handler(BodyType::of::<T>(), json_media_types(), Self::new())
    }
}

impl<T> Default for TypedJsonHandler<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MessageBodyReader for TypedJsonHandler<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn read(
        &self,
        _body_type: &BodyType,
        media_type: &MediaType,
        _headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>, CodecError> {
        let text = read_json_text(media_type, input)?;
        let value: T = serde_json::from_str(&text)?;
        Ok(Box::new(value))
    }
}

impl<T> MessageBodyWriter for TypedJsonHandler<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    fn write_to(
        &self,
        _body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<(), CodecError> {
        write_json(expect_value::<T>(value)?, media_type, headers, output)
    }
}

impl CodecRegistryBuilder {
    /// Read and write `T` as JSON.
    pub fn register_json<T>(self) -> Self
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        self.register(TypedJsonHandler::<T>::registration())
    }
}
