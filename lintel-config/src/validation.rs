// Configuration validation

use crate::{ConfigError, Result};
use lintel_core::{BodyConfig, MediaType};

/// Trait for validating configuration
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

/// Reusable validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", field)));
        }
        Ok(())
    }

    pub fn positive(value: usize, field: &str) -> Result<()> {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than zero",
                field
            )));
        }
        Ok(())
    }

    /// A concrete media type: parseable, no wildcard
    pub fn concrete_media_type(value: &str, field: &str) -> Result<()> {
        match MediaType::parse(value) {
            Some(media_type) if !media_type.is_wildcard() => Ok(()),
            Some(_) => Err(ConfigError::ValidationError(format!(
                "{} must not be a wildcard, got {}",
                field, value
            ))),
            None => Err(ConfigError::ValidationError(format!(
                "{} is not a media type: {}",
                field, value
            ))),
        }
    }
}

impl Validate for BodyConfig {
    fn validate(&self) -> Result<()> {
        ConfigValidator::not_empty(&self.default_charset, "default_charset")?;
        self.charset()
            .map_err(|e| ConfigError::ValidationError(format!("default_charset: {}", e)))?;
        ConfigValidator::positive(self.chunk_size, "chunk_size")?;
        ConfigValidator::positive(self.stream_buffer, "stream_buffer")?;
        ConfigValidator::concrete_media_type(&self.default_media_type, "default_media_type")
    }
}
