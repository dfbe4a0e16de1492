//! Body codec registry.
//!
//! Maps a (body type, media type) pair to exactly one reader or writer.
//! Registrations are collected in a [`CodecRegistryBuilder`] at startup and
//! frozen into a [`CodecRegistry`], which is then shared by `Arc` and only
//! ever read.
//!
//! When several registrations match, the winner has the highest priority,
//! then the most specific body type pattern, then the latest registration.
//!
//! ```
//! use lintel_core::codec::CodecRegistry;
//! use lintel_core::{BodyType, HeaderMap, MediaType};
//!
//! let registry = CodecRegistry::builder().with_defaults().build();
//!
//! let mut headers = HeaderMap::new();
//! let bytes = registry
//!     .write_value(&"hello".to_string(), &MediaType::text_plain(), &mut headers)
//!     .unwrap();
//! assert_eq!(bytes, b"hello".to_vec());
//! assert_eq!(headers.get("Content-Type"), Some(&"text/plain".to_string()));
//!
//! let text: String = registry
//!     .read_as(&MediaType::text_plain(), &headers, &mut bytes.as_slice())
//!     .unwrap();
//! assert_eq!(text, "hello");
//! ```

mod json;
mod ndjson;
mod raw;
mod text;

pub use json::{JsonHandler, TypedJsonHandler};
pub use ndjson::NdjsonHandler;
pub use raw::BytesHandler;
pub use text::{TextPlainHandler, TransportTextPlainHandler};

use crate::body_type::BodyType;
use crate::error::{CodecError, Error, Operation, Result};
use crate::headers::HeaderMap;
use crate::media_type::{MediaType, negotiate};
use crate::transport::TransportWriter;
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::{debug, trace};

/// Converts bytes into a value.
pub trait MessageBodyReader: Send + Sync {
    /// Finer check after the registration's patterns matched.
    fn is_readable(&self, _body_type: &BodyType, _media_type: &MediaType) -> bool {
        true
    }

    fn read(
        &self,
        body_type: &BodyType,
        media_type: &MediaType,
        headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> std::result::Result<Box<dyn Any + Send>, CodecError>;
}

/// Converts a value into bytes.
pub trait MessageBodyWriter: Send + Sync {
    /// Finer check after the registration's patterns matched.
    fn is_writeable(&self, _body_type: &BodyType, _media_type: &MediaType) -> bool {
        true
    }

    /// Write `value` to `output`. May add headers, must never overwrite a
    /// Content-Type the caller already set.
    fn write_to(
        &self,
        body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> std::result::Result<(), CodecError>;

    /// Channel-aware side of this writer, if any.
    fn transport(&self) -> Option<&dyn TransportWriter> {
        None
    }
}

/// One entry in the registry.
#[derive(Clone)]
pub struct HandlerRegistration {
    body_type: BodyType,
    media_types: Vec<MediaType>,
    reader: Option<Arc<dyn MessageBodyReader>>,
    writer: Option<Arc<dyn MessageBodyWriter>>,
    priority: i32,
    name: Option<String>,
    replaces: Option<String>,
    seq: usize,
}

impl HandlerRegistration {
    fn empty(body_type: BodyType, media_types: Vec<MediaType>) -> Self {
        Self {
            body_type,
            media_types,
            reader: None,
            writer: None,
            priority: 0,
            name: None,
            replaces: None,
            seq: 0,
        }
    }

    pub fn reader<R>(body_type: BodyType, media_types: Vec<MediaType>, reader: R) -> Self
    where
        R: MessageBodyReader + 'static,
    {
        let mut registration = Self::empty(body_type, media_types);
        registration.reader = Some(Arc::new(reader));
        registration
    }

    pub fn writer<W>(body_type: BodyType, media_types: Vec<MediaType>, writer: W) -> Self
    where
        W: MessageBodyWriter + 'static,
    {
        let mut registration = Self::empty(body_type, media_types);
        registration.writer = Some(Arc::new(writer));
        registration
    }

    /// Register one implementation for both directions.
    pub fn handler<H>(body_type: BodyType, media_types: Vec<MediaType>, handler: H) -> Self
    where
        H: MessageBodyReader + MessageBodyWriter + 'static,
    {
        let handler = Arc::new(handler);
        let mut registration = Self::empty(body_type, media_types);
        registration.reader = Some(handler.clone());
        registration.writer = Some(handler);
        registration
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Remove every earlier registration called `name` when the registry is built.
    pub fn replaces(mut self, name: impl Into<String>) -> Self {
        self.replaces = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn body_type(&self) -> &BodyType {
        &self.body_type
    }

    pub fn media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    pub fn is_readable(&self) -> bool {
        self.reader.is_some()
    }

    pub fn is_writeable(&self) -> bool {
        self.writer.is_some()
    }

    fn covers(&self, body_type: &BodyType, media_type: &MediaType) -> bool {
        self.body_type.is_assignable_from(body_type)
            && negotiate(std::slice::from_ref(media_type), &self.media_types).is_some()
    }

    fn rank(&self) -> (i32, u32, usize) {
        (self.priority, self.body_type.specificity(), self.seq)
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("name", &self.name)
            .field("body_type", &self.body_type)
            .field("media_types", &self.media_types)
            .field("readable", &self.is_readable())
            .field("writeable", &self.is_writeable())
            .field("priority", &self.priority)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Collects registrations before the registry is frozen.
#[derive(Default)]
pub struct CodecRegistryBuilder {
    registrations: Vec<HandlerRegistration>,
}

impl CodecRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, registration: HandlerRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Text, JSON, NDJSON and raw bytes.
    pub fn with_defaults(self) -> Self {
        self.register(TextPlainHandler::registration())
            .register(JsonHandler::registration())
            .register(NdjsonHandler::registration())
            .register(BytesHandler::registration())
    }

    /// Swap the plain text handler for the envelope-writing one.
    pub fn with_transport_handlers(self) -> Self {
        self.register(TransportTextPlainHandler::registration())
    }

    pub fn build(self) -> CodecRegistry {
        let mut registrations: Vec<HandlerRegistration> = Vec::with_capacity(self.registrations.len());
        for registration in self.registrations {
            if let Some(replaced) = &registration.replaces {
                let before = registrations.len();
                registrations.retain(|r| r.name.as_deref() != Some(replaced.as_str()));
                debug!(
                    replaced = %replaced,
                    by = ?registration.name,
                    removed = before - registrations.len(),
                    "codec registration replaced"
                );
            }
            registrations.push(registration);
        }
        for (seq, registration) in registrations.iter_mut().enumerate() {
            registration.seq = seq;
        }
        CodecRegistry { registrations }
    }
}

/// Frozen set of body codecs.
pub struct CodecRegistry {
    registrations: Vec<HandlerRegistration>,
}

impl CodecRegistry {
    pub fn builder() -> CodecRegistryBuilder {
        CodecRegistryBuilder::new()
    }

    /// Registry with the built-in handlers only.
    pub fn with_defaults() -> Self {
        Self::builder().with_defaults().build()
    }

    pub fn registrations(&self) -> &[HandlerRegistration] {
        &self.registrations
    }

    pub fn resolve_reader(
        &self,
        body_type: &BodyType,
        media_type: &MediaType,
    ) -> Result<Arc<dyn MessageBodyReader>> {
        let selected = self
            .registrations
            .iter()
            .filter_map(|r| r.reader.as_ref().map(|reader| (r, reader)))
            .filter(|(r, reader)| {
                r.covers(body_type, media_type) && reader.is_readable(body_type, media_type)
            })
            .max_by_key(|(r, _)| r.rank());

        match selected {
            Some((registration, reader)) => {
                trace!(handler = ?registration.name, %body_type, %media_type, "reader resolved");
                Ok(reader.clone())
            }
            None => Err(self.unsupported(Operation::Read, body_type, media_type)),
        }
    }

    pub fn resolve_writer(
        &self,
        body_type: &BodyType,
        media_type: &MediaType,
    ) -> Result<Arc<dyn MessageBodyWriter>> {
        let selected = self
            .registrations
            .iter()
            .filter_map(|r| r.writer.as_ref().map(|writer| (r, writer)))
            .filter(|(r, writer)| {
                r.covers(body_type, media_type) && writer.is_writeable(body_type, media_type)
            })
            .max_by_key(|(r, _)| r.rank());

        match selected {
            Some((registration, writer)) => {
                trace!(handler = ?registration.name, %body_type, %media_type, "writer resolved");
                Ok(writer.clone())
            }
            None => Err(self.unsupported(Operation::Write, body_type, media_type)),
        }
    }

    fn unsupported(&self, operation: Operation, body_type: &BodyType, media_type: &MediaType) -> Error {
        debug!(%operation, %body_type, %media_type, "no codec registered");
        Error::UnsupportedMediaType {
            operation,
            body_type: body_type.clone(),
            media_type: media_type.clone(),
        }
    }

    /// Decode `input` into a value of `body_type`.
    ///
    /// Nothing is read from `input` unless a reader resolves.
    pub fn read(
        &self,
        body_type: &BodyType,
        media_type: &MediaType,
        headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<Box<dyn Any + Send>> {
        let reader = self.resolve_reader(body_type, media_type)?;
        reader
            .read(body_type, media_type, headers, input)
            .map_err(|source| Error::Decoding {
                body_type: body_type.clone(),
                media_type: media_type.clone(),
                source,
            })
    }

    /// Typed form of [`read`](Self::read).
    pub fn read_as<T: Any>(
        &self,
        media_type: &MediaType,
        headers: &HeaderMap,
        input: &mut dyn Read,
    ) -> Result<T> {
        let body_type = BodyType::of::<T>();
        let value = self.read(&body_type, media_type, headers, input)?;
        value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| Error::Decoding {
                body_type,
                media_type: media_type.clone(),
                source: CodecError::TypeMismatch {
                    expected: std::any::type_name::<T>(),
                },
            })
    }

    /// Encode `value` into `output`.
    pub fn write(
        &self,
        body_type: &BodyType,
        value: &dyn Any,
        media_type: &MediaType,
        headers: &mut HeaderMap,
        output: &mut dyn Write,
    ) -> Result<()> {
        let writer = self.resolve_writer(body_type, media_type)?;
        writer
            .write_to(body_type, value, media_type, headers, output)
            .map_err(|source| Error::Encoding {
                body_type: body_type.clone(),
                media_type: media_type.clone(),
                source,
            })
    }

    /// Typed form of [`write`](Self::write), collecting into a buffer.
    pub fn write_value<T: Any>(
        &self,
        value: &T,
        media_type: &MediaType,
        headers: &mut HeaderMap,
    ) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.write(&BodyType::of::<T>(), value, media_type, headers, &mut output)?;
        Ok(output)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.registrations).finish()
    }
}

/// Set Content-Type to the negotiated media type unless the caller set one.
pub(crate) fn ensure_content_type(headers: &mut HeaderMap, media_type: &MediaType) {
    headers.set_if_absent(crate::headers::CONTENT_TYPE, media_type.to_header_value());
}

/// Downcast a writer's input, reporting the expected type on mismatch.
pub(crate) fn expect_value<T: Any>(value: &dyn Any) -> std::result::Result<&T, CodecError> {
    value.downcast_ref::<T>().ok_or(CodecError::TypeMismatch {
        expected: std::any::type_name::<T>(),
    })
}
