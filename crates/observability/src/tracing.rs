//! Tracing/logging initialization.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Logging options, usually read from the `log` section of the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive (`info`, `weave_module=debug,info`, ...). `RUST_LOG` wins
    /// when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl LogSettings {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(&LogSettings::default());
}

/// Initialize tracing with explicit settings.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_info_and_json() {
        let settings = LogSettings::default();
        assert_eq!(settings.level, "info");
        assert!(settings.json);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: LogSettings = serde_json::from_str(r#"{ "level": "debug" }"#).unwrap();
        assert_eq!(settings.level, "debug");
        assert!(settings.json);
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init_with(&LogSettings {
            level: "debug".into(),
            json: false,
        });
    }
}
