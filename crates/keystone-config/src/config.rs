//! Root configuration type.

use http::HeaderName;
use keystone_bind::MultipartConfig;
use keystone_dispatch::DispatcherConfig;
use keystone_telemetry::{create_env_filter, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Complete Keystone configuration.
///
/// Built once at process start, then handed to the dispatcher and the
/// logging setup. Use [`ConfigLoader`](crate::ConfigLoader) to load it from
/// files and environment variables.
///
/// # Example
///
/// ```
/// use keystone_config::KeystoneConfig;
///
/// let config = KeystoneConfig::default();
/// assert_eq!(config.dispatcher.realm, "keystone");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct KeystoneConfig {
    /// Dispatcher settings.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Multipart body limits.
    #[serde(default)]
    pub multipart: MultipartConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LogConfig,
}

impl KeystoneConfig {
    /// Development preset: debug level, pretty logs, internal errors not
    /// reported.
    #[must_use]
    pub fn development() -> Self {
        Self {
            dispatcher: DispatcherConfig {
                report_internal_errors: false,
                ..DispatcherConfig::default()
            },
            multipart: MultipartConfig::default(),
            logging: LogConfig::development(),
        }
    }

    /// Production preset: JSON logs at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LogConfig {
                format: LogFormat::Json,
                include_target: false,
                ..LogConfig::default()
            },
            ..Self::default()
        }
    }

    /// Checks values serde cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let realm = &self.dispatcher.realm;
        if realm.is_empty() {
            return Err(ConfigError::invalid_value("dispatcher.realm", "must not be empty"));
        }
        if realm.chars().any(|c| c.is_whitespace() || c == '"') {
            return Err(ConfigError::invalid_value(
                "dispatcher.realm",
                "must not contain whitespace or quotes",
            ));
        }

        if self.dispatcher.max_body_size == 0 {
            return Err(ConfigError::invalid_value(
                "dispatcher.max_body_size",
                "must be greater than zero",
            ));
        }

        if HeaderName::from_bytes(self.dispatcher.request_id_header.trim().as_bytes()).is_err() {
            return Err(ConfigError::invalid_value(
                "dispatcher.request_id_header",
                format!("'{}' is not a valid header name", self.dispatcher.request_id_header),
            ));
        }

        if self.multipart.max_fields == 0 {
            return Err(ConfigError::invalid_value(
                "multipart.max_fields",
                "must be greater than zero",
            ));
        }

        if self.multipart.max_image_dimension == 0 {
            return Err(ConfigError::invalid_value(
                "multipart.max_image_dimension",
                "must be greater than zero",
            ));
        }
        if self.multipart.max_image_alloc == 0 {
            return Err(ConfigError::invalid_value(
                "multipart.max_image_alloc",
                "must be greater than zero",
            ));
        }

        if self.logging.enabled {
            create_env_filter(&self.logging.level)
                .map_err(|e| ConfigError::invalid_value("logging.level", e.to_string()))?;
        }

        Ok(())
    }
}
