// Error types for the body pipeline

use crate::{BodyType, FullResponse, HeaderMap, MediaType, ResponseHead};
use bytes::Bytes;
use http::StatusCode;
use thiserror::Error;

/// Boxed cause carried by pipeline errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for pipeline operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Which side of the codec registry a lookup was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Read => f.write_str("reader"),
            Operation::Write => f.write_str("writer"),
        }
    }
}

/// Failures raised by a single reader or writer while converting bytes.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("Invalid {charset} byte sequence at offset {offset}")]
    Malformed { charset: &'static str, offset: usize },

    #[error("Character {character:?} cannot be encoded as {charset}")]
    Unmappable { charset: &'static str, character: char },

    #[error("Expected a value of type {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation not supported by this handler: {0}")]
    Unsupported(&'static str),
}

/// Errors surfaced by negotiation, codec resolution and response writing.
#[derive(Error, Debug)]
pub enum Error {
    #[error(
        "Not Acceptable: {body_type} can be produced as [{}], client accepts [{}]",
        join(.produces),
        join(.accept)
    )]
    NotAcceptable {
        body_type: BodyType,
        produces: Vec<MediaType>,
        accept: Vec<MediaType>,
    },

    #[error("Unsupported Media Type: no {operation} registered for {body_type} as {media_type}")]
    UnsupportedMediaType {
        operation: Operation,
        body_type: BodyType,
        media_type: MediaType,
    },

    #[error("Decoding error: cannot read {body_type} from {media_type}: {source}")]
    Decoding {
        body_type: BodyType,
        media_type: MediaType,
        #[source]
        source: CodecError,
    },

    #[error("Encoding error: cannot write {body_type} as {media_type}: {source}")]
    Encoding {
        body_type: BodyType,
        media_type: MediaType,
        #[source]
        source: CodecError,
    },

    #[error("Custom response handler '{handler}' failed for {body_type}: {source}")]
    CustomHandler {
        handler: String,
        body_type: BodyType,
        #[source]
        source: BoxError,
    },

    #[error("Cannot convert request body to {body_type}: {source}")]
    Conversion {
        body_type: BodyType,
        #[source]
        source: BoxError,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}

fn join(media_types: &[MediaType]) -> String {
    media_types
        .iter()
        .map(|mt| mt.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Wrap an arbitrary failure raised inside a customizable response handler.
    pub fn custom_handler(
        handler: impl Into<String>,
        body_type: BodyType,
        source: impl Into<BoxError>,
    ) -> Self {
        Error::CustomHandler {
            handler: handler.into(),
            body_type,
            source: source.into(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            Error::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Error::Decoding { .. } | Error::Conversion { .. } => StatusCode::BAD_REQUEST,
            Error::Encoding { .. } | Error::CustomHandler { .. } | Error::Transport(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Build a well-formed error response.
    ///
    /// Only meaningful while nothing has been written for the exchange yet.
    pub fn to_response(&self) -> FullResponse {
        let status = self.status_code();
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "application/json");
        FullResponse::new(
            ResponseHead::new(status, headers),
            Bytes::from(body.to_string()),
        )
    }
}
