//! Layered configuration loader.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use keystone_telemetry::LogFormat;

use crate::{ConfigError, KeystoneConfig};

/// Loads a [`KeystoneConfig`] in layers, later layers overriding earlier
/// ones:
/// 1. Default values
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use keystone_config::ConfigLoader;
///
/// # fn main() -> Result<(), keystone_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("keystone.toml")?
///     .with_env_prefix("KEYSTONE")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: KeystoneConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: KeystoneConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = KeystoneConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use keystone_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = KeystoneConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = KeystoneConfig::production();
        self
    }

    /// Load configuration from a file. The extension picks the format:
    /// `.toml` or `.json`.
    ///
    /// Sections missing from the file keep their default values; the file
    /// replaces whatever an earlier preset set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Same as [`with_file`](Self::with_file) once the file exists.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `"toml"` or `"json"` format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails or the format is unknown.
    ///
    /// # Example
    ///
    /// ```
    /// use keystone_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [dispatcher]
    ///     realm = "billing"
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.dispatcher.realm, "billing");
    /// ```
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

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the form `PREFIX__SECTION__KEY`, for example
    /// `KEYSTONE__DISPATCHER__REALM=billing` or
    /// `KEYSTONE__LOGGING__LEVEL=debug`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment. A missing file is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if the file exists but cannot
    /// be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::validation_error(format!("invalid .env file: {e}"))),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override fails to parse or validation
    /// fails.
    pub fn load(mut self) -> Result<KeystoneConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: HashMap<String, String> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            for (key, value) in vars {
                self.apply_env_var(&key, &value, &prefix)?;
            }
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> KeystoneConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<KeystoneConfig, ConfigError> {
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

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix but not the separator, e.g. KEYSTONE_HOME.
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let dispatcher = &mut self.config.dispatcher;
        let multipart = &mut self.config.multipart;
        let logging = &mut self.config.logging;

        match parts.as_slice() {
            ["DISPATCHER", "REALM"] => dispatcher.realm = value.to_string(),
            ["DISPATCHER", "INTERNAL_ERROR_MESSAGE"] => {
                dispatcher.internal_error_message = value.to_string();
            }
            ["DISPATCHER", "REPORT_INTERNAL_ERRORS"] => {
                dispatcher.report_internal_errors = parse_bool_var(key, value)?;
            }
            ["DISPATCHER", "MAX_BODY_SIZE"] => dispatcher.max_body_size = parse_usize_var(key, value)?,
            ["DISPATCHER", "REQUEST_ID_HEADER"] => dispatcher.request_id_header = value.to_string(),

            ["MULTIPART", "MAX_FIELD_SIZE"] => multipart.max_field_size = parse_usize_var(key, value)?,
            ["MULTIPART", "MAX_FIELDS"] => multipart.max_fields = parse_usize_var(key, value)?,
            ["MULTIPART", "MAX_IMAGE_DIMENSION"] => {
                multipart.max_image_dimension = parse_number_var(key, value)?;
            }
            ["MULTIPART", "MAX_IMAGE_ALLOC"] => {
                multipart.max_image_alloc = parse_number_var(key, value)?;
            }

            ["LOGGING", "ENABLED"] => logging.enabled = parse_bool_var(key, value)?,
            ["LOGGING", "LEVEL"] => logging.level = value.to_string(),
            ["LOGGING", "FORMAT"] => {
                logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => return Err(ConfigError::env_parse_error(key, "expected 'json' or 'pretty'")),
                };
            }
            ["LOGGING", "SPAN_EVENTS"] => logging.span_events = parse_bool_var(key, value)?,
            ["LOGGING", "FILE_LINE_INFO"] => logging.file_line_info = parse_bool_var(key, value)?,
            ["LOGGING", "INCLUDE_TARGET"] => logging.include_target = parse_bool_var(key, value)?,

            _ => return Err(ConfigError::env_parse_error(key, "unknown configuration key")),
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

fn parse_bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn parse_usize_var(key: &str, value: &str) -> Result<usize, ConfigError> {
    parse_number_var(key, value)
}

fn parse_number_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().with_defaults().load().unwrap();
        assert_eq!(config, KeystoneConfig::default());
    }

    #[test]
    fn test_loader_presets() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);

        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"multipart": {"max_fields": 8}}"#;
        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.multipart.max_fields, 8);
        assert_eq!(config.dispatcher.realm, "keystone");
    }

    #[test]
    fn test_loader_with_string_unknown_format() {
        let result = ConfigLoader::new().with_string("realm: x", "yaml");
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let toml = r#"
            [dispatcher]
            relm = "typo"
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [dispatcher]
            realm = "billing"
            max_body_size = 1024
            request_id_header = "x-trace-id"

            [logging]
            level = "warn"
            format = "pretty"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.dispatcher.realm, "billing");
        assert_eq!(config.dispatcher.max_body_size, 1024);
        assert_eq!(config.dispatcher.request_id_header, "x-trace-id");
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.multipart, keystone_bind::MultipartConfig::default());
    }

    #[test]
    fn test_loader_with_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"dispatcher": {{"report_internal_errors": false}}}}"#).unwrap();

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(!config.dispatcher.report_internal_errors);
    }

    #[test]
    fn test_loader_with_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/keystone.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/keystone.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config, KeystoneConfig::default());
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("[dispatcher]\nmax_body_size = 0\n", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[dispatcher]\nmax_body_size = 0\n", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.dispatcher.max_body_size, 0);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("No"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    // Overrides go through apply_env_var directly; mutating the process
    // environment would race with other tests.

    #[test]
    fn test_apply_env_var_dispatcher() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__DISPATCHER__REALM", "billing", "TEST").unwrap();
        loader.apply_env_var("TEST__DISPATCHER__MAX_BODY_SIZE", "2048", "TEST").unwrap();
        loader
            .apply_env_var("TEST__DISPATCHER__REPORT_INTERNAL_ERRORS", "off", "TEST")
            .unwrap();
        assert_eq!(loader.config.dispatcher.realm, "billing");
        assert_eq!(loader.config.dispatcher.max_body_size, 2048);
        assert!(!loader.config.dispatcher.report_internal_errors);
    }

    #[test]
    fn test_apply_env_var_logging() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__LOGGING__FORMAT", "pretty", "TEST").unwrap();
        loader.apply_env_var("TEST__LOGGING__LEVEL", "debug", "TEST").unwrap();
        assert_eq!(loader.config.logging.format, LogFormat::Pretty);
        assert_eq!(loader.config.logging.level, "debug");

        let err = loader.apply_env_var("TEST__LOGGING__FORMAT", "xml", "TEST").unwrap_err();
        assert!(err.to_string().contains("TEST__LOGGING__FORMAT"));
    }

    #[test]
    fn test_apply_env_var_multipart() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__MULTIPART__MAX_FIELDS", "3", "TEST").unwrap();
        assert_eq!(loader.config.multipart.max_fields, 3);

        let result = loader.apply_env_var("TEST__MULTIPART__MAX_FIELD_SIZE", "big", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));

        loader
            .apply_env_var("TEST__MULTIPART__MAX_IMAGE_DIMENSION", "4096", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__MULTIPART__MAX_IMAGE_ALLOC", "1048576", "TEST")
            .unwrap();
        assert_eq!(loader.config.multipart.max_image_dimension, 4096);
        assert_eq!(loader.config.multipart.image_limits().max_alloc, 1_048_576);

        let result = loader.apply_env_var("TEST__MULTIPART__MAX_IMAGE_DIMENSION", "-1", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParseError { .. })));
    }

    #[test]
    fn test_apply_env_var_unknown_key() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__SERVER__PORT", "80", "TEST").is_err());
        // Same prefix without the separator is not ours.
        assert!(loader.apply_env_var("TESTING_HOME", "/tmp", "TEST").is_ok());
    }
}
