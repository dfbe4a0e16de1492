//! Pipeline configuration.

use crate::charset::Charset;
use crate::error::CodecError;
use crate::media_type::MediaType;
use crate::streaming::DEFAULT_STREAM_BUFFER;
use serde::{Deserialize, Serialize};

/// Tunables for body reading and response writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    /// Charset used when a text body declares none
    pub default_charset: String,
    /// Chunk size in bytes for streamed file fallback
    pub chunk_size: usize,
    /// Capacity of the bounded channel behind a `ByteStream`
    pub stream_buffer: usize,
    /// Allow zero-copy file transfer when the channel supports it
    pub zero_copy: bool,
    /// Media type assumed when a value declares none
    pub default_media_type: String,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            default_charset: "utf-8".to_string(),
            chunk_size: 16 * 1024,
            stream_buffer: DEFAULT_STREAM_BUFFER,
            zero_copy: true,
            default_media_type: "application/json".to_string(),
        }
    }
}

impl BodyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_zero_copy(mut self, enabled: bool) -> Self {
        self.zero_copy = enabled;
        self
    }

    pub fn with_default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = charset.into();
        self
    }

    pub fn with_default_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.default_media_type = media_type.into();
        self
    }

    pub fn charset(&self) -> Result<Charset, CodecError> {
        Charset::for_name(&self.default_charset)
    }

    /// Parsed default media type; `application/json` when unparseable.
    pub fn media_type(&self) -> MediaType {
        MediaType::parse(&self.default_media_type).unwrap_or_else(MediaType::json)
    }
}
