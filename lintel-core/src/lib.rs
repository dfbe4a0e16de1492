// Core library for Lintel
// Media type negotiation, the body codec registry, transport write strategies
// and customizable response handlers, tied together by the response assembler

pub mod assembler;
pub mod body_type;
pub mod charset;
pub mod codec;
pub mod config;
pub mod custom;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod http1;
pub mod logging;
pub mod media_type;
pub mod streaming;
pub mod transport;

// Re-export commonly used types
pub use assembler::{RenderError, ResponseAssembler, TypedRequest};
pub use body_type::BodyType;
pub use charset::Charset;
pub use codec::{
    BytesHandler, CodecRegistry, CodecRegistryBuilder, HandlerRegistration, JsonHandler,
    MessageBodyReader, MessageBodyWriter, NdjsonHandler, TextPlainHandler,
    TransportTextPlainHandler, TypedJsonHandler,
};
pub use config::BodyConfig;
pub use custom::{
    CustomBody, CustomResponse, CustomResponseHandler, CustomResponseRegistry,
    CustomResponseRegistryBuilder, FileResource, PathFileHandler, StreamedBody,
    StreamedBodyHandler, SystemFile, SystemFileHandler,
};
pub use error::{BoxError, CodecError, Error, Operation, Result};
pub use exchange::{OutgoingBody, Request, Response};
pub use headers::HeaderMap;
pub use http1::Http1Channel;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use media_type::{Accept, MediaMatch, MediaType, negotiate};
pub use streaming::{BodyStream, ByteStream, ByteStreamSender, JsonStreamSender, StreamOutcome};
pub use transport::{
    FullResponse, Readiness, ResponseHead, TransportChannel, TransportWriter, WriteStrategies,
    WriteStrategy,
};
