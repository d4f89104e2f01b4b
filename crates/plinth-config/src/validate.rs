//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Validate a fully merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_registry(config)?;
    validate_install(config)?;
    validate_logging(config)?;
    Ok(())
}

/// Upper bound for `registry.max_redirects`.
const MAX_REDIRECTS_UPPER_BOUND: usize = 50;

fn validate_registry(config: &Config) -> ConfigResult<()> {
    let r = &config.registry;

    let scheme = r.url.split_once("://").map(|(scheme, _)| scheme);
    if !matches!(scheme, Some("http" | "https")) {
        return Err(ConfigError::ValidationError {
            field: "registry.url".to_owned(),
            message: format!("'{}' is not an http or https URL", r.url),
        });
    }

    if r.catalog_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "registry.catalog_timeout_secs".to_owned(),
            message: "catalog_timeout_secs must be greater than 0".to_owned(),
        });
    }

    if r.connect_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "registry.connect_timeout_secs".to_owned(),
            message: "connect_timeout_secs must be greater than 0".to_owned(),
        });
    }

    if r.max_redirects > MAX_REDIRECTS_UPPER_BOUND {
        return Err(ConfigError::ValidationError {
            field: "registry.max_redirects".to_owned(),
            message: format!("max_redirects must be at most {MAX_REDIRECTS_UPPER_BOUND}"),
        });
    }

    Ok(())
}

fn validate_install(config: &Config) -> ConfigResult<()> {
    let i = &config.install;

    if i.trusted_prefix.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "install.trusted_prefix".to_owned(),
            message: "trusted_prefix must not be empty".to_owned(),
        });
    }

    if i.plugins_dir
        .as_ref()
        .is_some_and(|dir| dir.as_os_str().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "install.plugins_dir".to_owned(),
            message: "plugins_dir must not be empty when set".to_owned(),
        });
    }

    if i.host_version
        .as_deref()
        .is_some_and(|v| v.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "install.host_version".to_owned(),
            message: "host_version must not be empty when set".to_owned(),
        });
    }

    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}
