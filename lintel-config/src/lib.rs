// Configuration loading for the Lintel body pipeline
//
// Precedence, lowest first: built-in defaults, configuration file,
// `.env` file, process environment.

pub mod env;
pub mod error;
pub mod loader;
pub mod validation;

pub use env::{DEFAULT_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use validation::{ConfigValidator, Validate};

use lintel_core::BodyConfig;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;

/// Builds a validated [`BodyConfig`] from layered sources.
#[derive(Debug, Clone)]
pub struct BodyConfigLoader {
    file: Option<PathBuf>,
    dotenv: Option<PathBuf>,
    env: Option<EnvLoader>,
}

impl BodyConfigLoader {
    /// Defaults plus `LINTEL_*` environment variables.
    pub fn new() -> Self {
        Self {
            file: None,
            dotenv: None,
            env: Some(EnvLoader::default()),
        }
    }

    /// Read a TOML or JSON file, format chosen by extension.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Read prefixed variables from a `.env` file.
    pub fn dotenv(mut self, path: impl Into<PathBuf>) -> Self {
        self.dotenv = Some(path.into());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env = Some(EnvLoader::new(prefix));
        self
    }

    /// Ignore the process environment.
    pub fn without_env(mut self) -> Self {
        self.env = None;
        self
    }

    pub fn load(&self) -> Result<BodyConfig> {
        let template = serde_json::to_value(BodyConfig::default())?;
        let mut merged = match template.clone() {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if let Some(path) = &self.file {
            let loader = ConfigLoader::auto(path)?;
            let section = ConfigLoader::body_section(loader.load_file(path)?);
            if let Value::Object(map) = section {
                debug!(path = %path.display(), keys = map.len(), "loaded configuration file");
                merged.extend(map);
            }
        }

        let prefix_loader = self.env.clone().unwrap_or_default();
        if let Some(path) = &self.dotenv {
            let vars = prefix_loader.load_dotenv(path)?;
            merged.extend(EnvLoader::typed_overrides(&vars, &template));
        }
        if let Some(env) = &self.env {
            let vars = env.load();
            merged.extend(EnvLoader::typed_overrides(&vars, &template));
        }

        let config: BodyConfig = serde_json::from_value(Value::Object(merged))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for BodyConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the pipeline configuration from an optional file plus the
/// `LINTEL_*` environment.
pub fn load_body_config(path: Option<&std::path::Path>) -> Result<BodyConfig> {
    let mut loader = BodyConfigLoader::new();
    if let Some(path) = path {
        loader = loader.file(path);
    }
    loader.load()
}
