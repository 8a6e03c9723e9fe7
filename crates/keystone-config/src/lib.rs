//! # Keystone Config
//!
//! Typed, layered configuration for Keystone.
//!
//! ## Layers
//!
//! Later layers override earlier ones:
//!
//! 1. Defaults built into [`KeystoneConfig`]
//! 2. A TOML or JSON file
//! 3. Environment variables `PREFIX__SECTION__KEY`
//!
//! Unknown fields are rejected at every layer.
//!
//! ## Example
//!
//! ```no_run
//! use keystone_config::ConfigLoader;
//!
//! # fn main() -> Result<(), keystone_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()?
//!     .with_optional_file("keystone.toml")?
//!     .with_env_prefix("KEYSTONE")
//!     .load()?;
//!
//! keystone_telemetry::init_logging(&config.logging).ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variables
//!
//! - `KEYSTONE__DISPATCHER__REALM=billing`
//! - `KEYSTONE__DISPATCHER__MAX_BODY_SIZE=1048576`
//! - `KEYSTONE__MULTIPART__MAX_FIELDS=20`
//! - `KEYSTONE__LOGGING__FORMAT=pretty`

#![doc(html_root_url = "https://docs.rs/keystone-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;

pub use config::KeystoneConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
