// Environment variable loading

use crate::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Default prefix for pipeline settings, e.g. `LINTEL_CHUNK_SIZE`.
pub const DEFAULT_PREFIX: &str = "LINTEL";

/// Collects prefixed variables into lower-case keys.
///
/// `LINTEL_ZERO_COPY=false` becomes `zero_copy = "false"`; typing happens in
/// [`EnvLoader::typed_overrides`].
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Matching variables from the process environment
    pub fn load(&self) -> BTreeMap<String, String> {
        self.collect(env::vars())
    }

    /// Matching variables from a `.env` file, without touching the process
    /// environment.
    pub fn load_dotenv(&self, path: impl AsRef<Path>) -> Result<BTreeMap<String, String>> {
        let mut pairs = Vec::new();
        for item in dotenvy::from_path_iter(path.as_ref())? {
            pairs.push(item?);
        }
        Ok(self.collect(pairs))
    }

    /// Filter `vars` by prefix and strip it.
    pub fn collect<I>(&self, vars: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{}_", self.prefix.to_uppercase());
        vars.into_iter()
            .filter_map(|(key, value)| {
                key.to_uppercase()
                    .strip_prefix(&marker)
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| (rest.to_lowercase(), value))
            })
            .collect()
    }

    /// Convert string values to the JSON type of the same key in `template`.
    ///
    /// Keys missing from the template are dropped. Values that do not parse
    /// as the expected type are kept as strings so deserialization reports
    /// them.
    pub fn typed_overrides(vars: &BTreeMap<String, String>, template: &Value) -> Map<String, Value> {
        let mut out = Map::new();
        for (key, raw) in vars {
            let Some(expected) = template.get(key) else {
                tracing::trace!(key = %key, "ignoring unknown configuration variable");
                continue;
            };
            let typed = match expected {
                Value::Bool(_) => match raw.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => Value::Bool(true),
                    "false" | "0" | "no" | "off" => Value::Bool(false),
                    _ => Value::String(raw.clone()),
                },
                Value::Number(_) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(raw.clone())),
                _ => Value::String(raw.clone()),
            };
            out.insert(key.clone(), typed);
        }
        out
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_collect_strips_prefix() {
        let loader = EnvLoader::default();
        let found = loader.collect(vars(&[
            ("LINTEL_CHUNK_SIZE", "4096"),
            ("LINTEL_", "empty"),
            ("OTHER_CHUNK_SIZE", "1"),
            ("PATH", "/bin"),
        ]));
        assert_eq!(found.len(), 1);
        assert_eq!(found["chunk_size"], "4096");
    }

    #[test]
    fn test_typed_overrides_follow_template() {
        let template = json!({"chunk_size": 1, "zero_copy": true, "default_charset": "utf-8"});
        let found = EnvLoader::default().collect(vars(&[
            ("LINTEL_CHUNK_SIZE", " 4096 "),
            ("LINTEL_ZERO_COPY", "off"),
            ("LINTEL_DEFAULT_CHARSET", "1252"),
            ("LINTEL_UNKNOWN", "x"),
        ]));
        let typed = EnvLoader::typed_overrides(&found, &template);

        assert_eq!(typed["chunk_size"], 4096);
        assert_eq!(typed["zero_copy"], false);
        assert_eq!(typed["default_charset"], "1252");
        assert!(!typed.contains_key("unknown"));
    }

    #[test]
    fn test_load_dotenv_does_not_touch_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# pipeline").unwrap();
        writeln!(file, "LINTEL_STREAM_BUFFER=8").unwrap();
        writeln!(file, "UNRELATED=1").unwrap();
        file.flush().unwrap();

        let found = EnvLoader::default().load_dotenv(file.path()).unwrap();
        assert_eq!(found.get("stream_buffer").map(String::as_str), Some("8"));
        assert_eq!(found.len(), 1);
        assert!(std::env::var("LINTEL_STREAM_BUFFER").is_err());
    }
}
