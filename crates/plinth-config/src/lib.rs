#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Layered configuration for the Plinth plugin installer.
//!
//! # Usage
//!
//! ```rust,no_run
//! use plinth_config::Config;
//!
//! let config = Config::load(None).unwrap();
//! println!("registry: {}", config.registry.url);
//! ```
//!
//! # Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`PLINTH_REGISTRY_URL`, `PLINTH_PLUGINS_DIR`,
//!    `PLINTH_LOG_LEVEL`)
//! 2. **User** (`<config dir>/config.toml`)
//! 3. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! This crate has no dependencies on other plinth crates. The installer
//! converts [`Config`] into its own options type.

/// Environment variable overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Recursive merging of TOML layers.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl Config {
    /// Load configuration with the full precedence chain.
    ///
    /// `config_dir` overrides the directory searched for `config.toml`.
    /// See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the user config file is malformed or the
    /// final configuration fails validation.
    pub fn load(config_dir: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(config_dir)
    }

    /// Load configuration from a single file (no layering).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }
}
