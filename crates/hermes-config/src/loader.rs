//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use hermes_flow::FlowMode;
use hermes_telemetry::LogFormat;

use crate::{ConfigError, HermesConfig};

/// Environment prefix used by [`ConfigLoader::with_default_env`].
pub const DEFAULT_ENV_PREFIX: &str = "HERMES";

/// Configuration loader.
///
/// Layers, later ones overriding earlier ones:
/// 1. Defaults (or a preset)
/// 2. A configuration file (TOML or JSON)
/// 3. Environment variables `PREFIX__SECTION__KEY`
///
/// # Example
///
/// ```no_run
/// use hermes_config::ConfigLoader;
///
/// # fn main() -> Result<(), hermes_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_optional_file("hermes.toml")?
///     .with_env_prefix("HERMES")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: HermesConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HermesConfig::default(),
            env_prefix: None,
        }
    }

    /// Resets to the defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = HermesConfig::default();
        self
    }

    /// Starts from the development preset.
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = HermesConfig::development();
        self
    }

    /// Starts from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = HermesConfig::production();
        self
    }

    /// Loads a `.toml` or `.json` configuration file.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, carries unknown
    /// fields or has an unsupported extension.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        self.config = Self::parse_file(&content, path)?;
        tracing::debug!(path = %path.display(), "configuration file loaded");
        Ok(self)
    }

    /// Loads a configuration file if it exists.
    ///
    /// # Errors
    ///
    /// Fails like [`with_file`](Self::with_file) when the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Loads configuration from a string in `format` (`toml` or `json`).
    ///
    /// ```
    /// use hermes_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[flows]\napi_match_required = true", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert!(config.flows.api_match_required);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on malformed content or an unsupported format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::validation_error(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };
        Ok(self)
    }

    /// Applies environment overrides with `prefix` when loading.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies `HERMES__` environment overrides when loading.
    #[must_use]
    pub fn with_default_env(self) -> Self {
        self.with_env_prefix(DEFAULT_ENV_PREFIX)
    }

    /// Loads a `.env` file into the process environment, if one exists.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), ".env file loaded");
        }
        self
    }

    /// Applies environment overrides and validates.
    ///
    /// # Errors
    ///
    /// Fails on an unparsable override or a failed constraint.
    pub fn load(mut self) -> Result<HermesConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> HermesConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<HermesConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::validation_error(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let mut vars: Vec<(String, String)> = env::vars()
            .filter(|(key, _)| key.starts_with(prefix))
            .collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(stripped) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // HERMESX_FOO and friends share the prefix but not the separator.
            return Ok(());
        };
        let parts: Vec<&str> = stripped.split("__").collect();
        let bool_value = || {
            parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
        };

        match parts.as_slice() {
            ["GATEWAY", "SHARDING_TAGS"] => {
                self.config.gateway.sharding_tags = value
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["GATEWAY", "CLIENT_IDENTIFIER_HEADER"] => {
                self.config.gateway.client_identifier_header = value.to_lowercase();
            }

            ["FLOWS", "MODE"] => {
                self.config.flows.mode = match value.to_lowercase().as_str() {
                    "default" => FlowMode::Default,
                    "best_match" => FlowMode::BestMatch,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'default' or 'best_match'",
                        ))
                    }
                };
            }
            ["FLOWS", "PLAN_MATCH_REQUIRED"] => {
                self.config.flows.plan_match_required = bool_value()?;
            }
            ["FLOWS", "API_MATCH_REQUIRED"] => {
                self.config.flows.api_match_required = bool_value()?;
            }

            ["DEPLOYMENT", "DEFINITIONS_PATH"] => {
                self.config.deployment.definitions_path =
                    (!value.is_empty()).then(|| value.into());
            }
            ["DEPLOYMENT", "ORGANIZATION_PATH"] => {
                self.config.deployment.organization_path =
                    (!value.is_empty()).then(|| value.into());
            }
            ["DEPLOYMENT", "WATCH"] => {
                self.config.deployment.watch = bool_value()?;
            }
            ["DEPLOYMENT", "DEBOUNCE_MS"] => {
                self.config.deployment.debounce_ms = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            ["TELEMETRY", "SERVICE_NAME"] => {
                self.config.telemetry.service_name = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                self.config.telemetry.logging.enabled = bool_value()?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                self.config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                self.config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "ANSI"] => {
                self.config.telemetry.logging.ansi = bool_value()?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                self.config.telemetry.metrics.enabled = bool_value()?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => {
                self.config.telemetry.metrics.addr = value.to_string();
            }

            _ => {
                tracing::warn!(var = %key, "unknown configuration variable ignored");
            }
        }

        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.flows.mode, FlowMode::BestMatch);
    }

    #[test]
    fn test_loader_with_string_json() {
        let config = ConfigLoader::new()
            .with_string(r#"{"gateway": {"sharding_tags": ["eu"]}}"#, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.gateway.sharding_tags, vec!["eu"]);
    }

    #[test]
    fn test_loader_with_string_unsupported_format() {
        let result = ConfigLoader::new().with_string("a: b", "ini");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/hermes.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/hermes.toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config, HermesConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are exercised through apply_env_var; mutating the process
    // environment would race with other tests.

    #[test]
    fn test_apply_env_var_gateway() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__GATEWAY__SHARDING_TAGS", "eu, us ,!internal,", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__GATEWAY__CLIENT_IDENTIFIER_HEADER", "X-Client", "TEST")
            .unwrap();
        assert_eq!(loader.config.gateway.sharding_tags, vec!["eu", "us", "!internal"]);
        assert_eq!(loader.config.gateway.client_identifier_header, "x-client");
    }

    #[test]
    fn test_apply_env_var_flows() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__FLOWS__MODE", "BEST_MATCH", "TEST").unwrap();
        loader.apply_env_var("TEST__FLOWS__PLAN_MATCH_REQUIRED", "yes", "TEST").unwrap();
        assert_eq!(loader.config.flows.mode, FlowMode::BestMatch);
        assert!(loader.config.flows.plan_match_required);

        let result = loader.apply_env_var("TEST__FLOWS__MODE", "fastest", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_deployment() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__DEPLOYMENT__DEFINITIONS_PATH", "/srv/api.yaml", "TEST")
            .unwrap();
        loader.apply_env_var("TEST__DEPLOYMENT__WATCH", "true", "TEST").unwrap();
        loader.apply_env_var("TEST__DEPLOYMENT__DEBOUNCE_MS", "250", "TEST").unwrap();

        assert_eq!(
            loader.config.deployment.definitions_path,
            Some(PathBuf::from("/srv/api.yaml"))
        );
        assert!(loader.config.deployment.watch);
        assert_eq!(loader.config.deployment.debounce_ms, 250);

        let result = loader.apply_env_var("TEST__DEPLOYMENT__DEBOUNCE_MS", "soon", "TEST");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_var_telemetry() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__TELEMETRY__SERVICE_NAME", "edge", "TEST").unwrap();
        loader.apply_env_var("TEST__TELEMETRY__LOGGING__FORMAT", "pretty", "TEST").unwrap();
        loader.apply_env_var("TEST__TELEMETRY__METRICS__ENABLED", "off", "TEST").unwrap();

        assert_eq!(loader.config.telemetry.service_name, "edge");
        assert_eq!(loader.config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!loader.config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_apply_env_var_ignores_unknown_and_foreign_keys() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SERVER__PORT", "80", "TEST").unwrap();
        loader.apply_env_var("TESTING_MODE", "1", "TEST").unwrap();
        assert_eq!(loader.config, HermesConfig::default());
    }
}
