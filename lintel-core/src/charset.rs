//! Character sets used by the text codecs.

use crate::error::CodecError;
use crate::headers::HeaderMap;

/// A supported character set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    UsAscii,
    Latin1,
    Utf16Be,
    Utf16Le,
    /// UTF-16 with byte order mark: detected on decode, big-endian with BOM on encode.
    Utf16,
}

impl Charset {
    /// Look up a charset by its IANA name or a common alias.
    pub fn for_name(name: &str) -> Result<Self, CodecError> {
        let normalized = name.trim().trim_matches('"').to_ascii_lowercase();
        let charset = match normalized.as_str() {
            "utf-8" | "utf8" => Charset::Utf8,
            "us-ascii" | "ascii" => Charset::UsAscii,
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Charset::Latin1,
            "utf-16be" => Charset::Utf16Be,
            "utf-16le" => Charset::Utf16Le,
            "utf-16" | "utf16" => Charset::Utf16,
            _ => return Err(CodecError::UnsupportedCharset(name.to_string())),
        };
        Ok(charset)
    }

    /// Charset named by the Content-Type `charset` parameter, or `default`.
    pub fn from_headers(headers: &HeaderMap, default: Charset) -> Result<Self, CodecError> {
        match headers
            .content_type_media()
            .as_ref()
            .and_then(|m| m.charset())
        {
            Some(name) => Self::for_name(name),
            None => Ok(default),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::UsAscii => "US-ASCII",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Utf16 => "UTF-16",
        }
    }

    /// Decode bytes into a string, rejecting invalid sequences.
    pub fn decode(self, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| self.malformed(e.valid_up_to())),
            Charset::UsAscii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(self.malformed(offset)),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            Charset::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            Charset::Utf16Be => self.decode_utf16(bytes, u16::from_be_bytes, 0),
            Charset::Utf16Le => self.decode_utf16(bytes, u16::from_le_bytes, 0),
            Charset::Utf16 => match bytes {
                [0xFF, 0xFE, rest @ ..] => self.decode_utf16(rest, u16::from_le_bytes, 2),
                [0xFE, 0xFF, rest @ ..] => self.decode_utf16(rest, u16::from_be_bytes, 2),
                _ => self.decode_utf16(bytes, u16::from_be_bytes, 0),
            },
        }
    }

    /// Encode a string, rejecting characters the charset cannot represent.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            Charset::Utf8 => Ok(text.as_bytes().to_vec()),
            Charset::UsAscii => self.encode_narrow(text, 0x7F),
            Charset::Latin1 => self.encode_narrow(text, 0xFF),
            Charset::Utf16Be => Ok(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
            Charset::Utf16Le => Ok(text.encode_utf16().flat_map(u16::to_le_bytes).collect()),
            Charset::Utf16 => {
                let mut out = vec![0xFE, 0xFF];
                out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
                Ok(out)
            }
        }
    }

    fn encode_narrow(self, text: &str, max: u32) -> Result<Vec<u8>, CodecError> {
        text.chars()
            .map(|c| {
                if (c as u32) <= max {
                    Ok(c as u8)
                } else {
                    Err(CodecError::Unmappable {
                        charset: self.name(),
                        character: c,
                    })
                }
            })
            .collect()
    }

    fn decode_utf16(
        self,
        bytes: &[u8],
        unit: fn([u8; 2]) -> u16,
        base: usize,
    ) -> Result<String, CodecError> {
        if bytes.len() % 2 != 0 {
            return Err(self.malformed(base + bytes.len() - 1));
        }
        let units = bytes.chunks_exact(2).map(|pair| unit([pair[0], pair[1]]));
        let mut out = String::with_capacity(bytes.len() / 2);
        let mut position = 0usize;
        for decoded in char::decode_utf16(units) {
            match decoded {
                Ok(c) => {
                    out.push(c);
                    position += c.len_utf16();
                }
                Err(_) => return Err(self.malformed(base + position * 2)),
            }
        }
        Ok(out)
    }

    fn malformed(self, offset: usize) -> CodecError {
        CodecError::Malformed {
            charset: self.name(),
            offset,
        }
    }
}

impl std::fmt::Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
