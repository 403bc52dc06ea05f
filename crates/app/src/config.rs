//! Layered configuration loading.
//!
//! Later sources override earlier ones:
//!
//! 1. built-in defaults ([`AppSettings::default`])
//! 2. a TOML file (`weave.toml` in the working directory unless a path is given)
//! 3. environment variables prefixed with `WEAVE_`, nested on `__`
//!    (`WEAVE_LOG__LEVEL=debug` sets `log.level`)
//! 4. values set programmatically with [`ConfigLoader::set`]

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use weave_core::ConfigurationError;
use weave_observability::LogSettings;

pub use weave_module::Config;

pub const DEFAULT_CONFIG_FILE: &str = "weave.toml";
pub const DEFAULT_ENV_PREFIX: &str = "WEAVE_";

/// Typed settings the bootstrap itself needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Application name, reported by `Application::name`.
    pub name: String,
    pub log: LogSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "weave".to_string(),
            log: LogSettings::default(),
        }
    }
}

/// The result of a load: typed settings plus the full mapping handed to modules.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: AppSettings,
    pub config: Config,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: PathBuf,
    explicit_file: bool,
    env_prefix: String,
    values: Vec<(String, Value)>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_CONFIG_FILE),
            explicit_file: false,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            values: Vec::new(),
        }
    }

    /// Read this file instead of `weave.toml`. Unlike the default file, it must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = path.as_ref().to_path_buf();
        self.explicit_file = true;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Set `key` (dotted for nested keys) after every other source.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The merged provider stack, before extraction.
    pub fn figment(&self) -> Figment {
        let figment = Figment::from(Serialized::defaults(AppSettings::default()))
            .merge(Toml::file(&self.file))
            .merge(Env::prefixed(&self.env_prefix).split("__"));

        self.values
            .iter()
            .fold(figment, |figment, (key, value)| {
                figment.merge(Serialized::default(key, value))
            })
    }

    pub fn load(&self) -> Result<LoadedConfig, ConfigurationError> {
        if self.explicit_file && !self.file.exists() {
            return Err(ConfigurationError::invalid_value(format!(
                "configuration file `{}` does not exist",
                self.file.display()
            )));
        }

        let figment = self.figment();
        let settings: AppSettings = figment
            .extract()
            .map_err(|e| ConfigurationError::invalid_value(format!("failed to load settings: {e}")))?;
        let values: Value = figment
            .extract()
            .map_err(|e| ConfigurationError::invalid_value(format!("failed to load configuration: {e}")))?;
        let config = Config::from_value(values);

        debug!(
            file = %self.file.display(),
            env_prefix = %self.env_prefix,
            keys = config.keys().count(),
            "configuration loaded"
        );
        Ok(LoadedConfig { settings, config })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use figment::Jail;
    use tempfile::Builder;

    use super::*;

    #[test]
    fn defaults_apply_without_any_source() {
        Jail::expect_with(|_| {
            let loaded = ConfigLoader::new().load().unwrap();
            assert_eq!(loaded.settings, AppSettings::default());
            assert_eq!(
                loaded.config.get::<String>("log.level").unwrap().as_deref(),
                Some("info")
            );
            Ok(())
        });
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
name = "billing"

[log]
json = false

[database]
url = "postgres://localhost/billing"
"#
        )
        .unwrap();

        Jail::expect_with(|_| {
            let loaded = ConfigLoader::new().with_file(file.path()).load().unwrap();
            assert_eq!(loaded.settings.name, "billing");
            assert!(!loaded.settings.log.json);
            assert_eq!(loaded.settings.log.level, "info");
            assert_eq!(
                loaded.config.get::<String>("database.url").unwrap().as_deref(),
                Some("postgres://localhost/billing")
            );
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_the_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_FILE,
                r#"
name = "from-file"

[database]
pool = 4
"#,
            )?;
            jail.set_env("WEAVE_NAME", "from-env");
            jail.set_env("WEAVE_LOG__LEVEL", "debug");
            jail.set_env("WEAVE_DATABASE__POOL", "16");

            let loaded = ConfigLoader::new().load().unwrap();
            assert_eq!(loaded.settings.name, "from-env");
            assert_eq!(loaded.settings.log.level, "debug");
            assert_eq!(loaded.config.get::<u32>("database.pool").unwrap(), Some(16));
            Ok(())
        });
    }

    #[test]
    fn programmatic_values_win() {
        Jail::expect_with(|jail| {
            jail.set_env("WEAVE_NAME", "from-env");
            let loaded = ConfigLoader::new()
                .set("name", "pinned")
                .set("feature.flags", vec!["a", "b"])
                .load()
                .unwrap();
            assert_eq!(loaded.settings.name, "pinned");
            assert_eq!(
                loaded.config.get::<Vec<String>>("feature.flags").unwrap(),
                Some(vec!["a".to_string(), "b".to_string()])
            );
            Ok(())
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::new()
            .with_file(dir.path().join("absent.toml"))
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("absent.toml"));
    }
}
