//! Opaque application configuration as seen by the module graph.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use weave_core::ConfigurationError;

/// Read-only configuration mapping.
///
/// The module graph never interprets configuration itself; it only carries it to
/// modules, providers and setup factories. Cloning is cheap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    values: Arc<Map<String, Value>>,
}

impl Config {
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Build from any JSON value; non-object values yield an empty config.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::default(),
        }
    }

    /// Raw value at `key`. Dotted keys (`log.level`) walk nested objects.
    pub fn value(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let first = self.values.get(segments.next()?)?;
        segments.try_fold(first, |current, segment| current.get(segment))
    }

    /// Deserialize the sub-tree at `key`.
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigurationError> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ConfigurationError::invalid_value(format!("`{key}`: {e}")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
}

impl From<Map<String, Value>> for Config {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_keys_walk_nested_objects() {
        let config = Config::from_value(json!({
            "log": { "level": "debug", "json": false },
            "database": { "pool": { "size": 4 } }
        }));

        assert_eq!(config.value("log.level"), Some(&json!("debug")));
        assert_eq!(config.get::<u32>("database.pool.size").unwrap(), Some(4));
        assert_eq!(config.get::<u32>("database.pool.timeout").unwrap(), None);
        assert!(!config.contains("missing"));
    }

    #[test]
    fn type_errors_name_the_key() {
        let config = Config::from_value(json!({ "port": "eighty" }));
        let err = config.get::<u16>("port").unwrap_err();
        assert!(err.to_string().contains("`port`"));
    }
}
