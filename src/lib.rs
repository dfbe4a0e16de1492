// Lintel - HTTP message-body negotiation and response writing
//
// Media type negotiation, a registry of body readers and writers, buffered,
// streamed and zero-copy writes, and handlers for values such as files that
// build their own responses.

// Re-export core functionality
pub use lintel_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use lintel_config;

#[cfg(feature = "testing")]
pub use lintel_testing;

/// Commonly used types
pub mod prelude {
    pub use lintel_core::{
        Accept, BodyConfig, BodyType, CodecRegistry, CustomResponseHandler,
        CustomResponseRegistry, Error, HandlerRegistration, HeaderMap, MediaType,
        MessageBodyReader, MessageBodyWriter, OutgoingBody, Request, Response,
        ResponseAssembler, Result, StreamedBody, SystemFile, TransportChannel,
    };
}
