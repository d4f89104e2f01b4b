//! Configuration types.
//!
//! Every struct implements [`Default`] with production values, so a bare
//! `[section]` header in TOML yields a working configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plugin registry endpoint and HTTP limits.
    pub registry: RegistrySection,
    /// Install destination and trust settings.
    pub install: InstallSection,
    /// Logging level, format, and per-target directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// RegistrySection
// ---------------------------------------------------------------------------

/// Plugin registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Registry API root, e.g. `https://plugins.plinth.dev/api/plugins`.
    pub url: String,
    /// Upper bound for a catalog request, in seconds.
    pub catalog_timeout_secs: u64,
    /// TCP/TLS connect timeout for all requests, in seconds.
    pub connect_timeout_secs: u64,
    /// Redirects followed before a request fails.
    pub max_redirects: usize,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            url: "https://plugins.plinth.dev/api/plugins".to_owned(),
            catalog_timeout_secs: 10,
            connect_timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// InstallSection
// ---------------------------------------------------------------------------

/// Install destination and trust settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallSection {
    /// Directory plugins are installed under. `None` means the platform
    /// data directory; see [`InstallSection::resolve_plugins_dir`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,
    /// Plugin IDs starting with this prefix may ship symlinks.
    pub trusted_prefix: String,
    /// Host version reported to the registry. `None` uses the installer's
    /// crate version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_version: Option<String>,
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            trusted_prefix: "plinth-".to_owned(),
            host_version: None,
        }
    }
}

impl InstallSection {
    /// The configured plugins directory, or `<data dir>/plinth/plugins`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoHomeDir`] when no directory is configured and
    /// the platform data directory cannot be determined.
    pub fn resolve_plugins_dir(&self) -> ConfigResult<PathBuf> {
        if let Some(dir) = &self.plugins_dir {
            return Ok(dir.clone());
        }
        directories::ProjectDirs::from("dev", "plinth", "plinth")
            .map(|dirs| dirs.data_dir().join("plugins"))
            .ok_or(ConfigError::NoHomeDir)
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, or `"json"`.
    pub format: String,
    /// Per-target tracing directives (e.g. `["plinth_installer=debug",
    /// "hyper=warn"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.registry.catalog_timeout_secs, 10);
        assert_eq!(config.install.trusted_prefix, "plinth-");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [registry]
            url = "http://localhost:3000/api/plugins"
        "#,
        )
        .unwrap();
        assert_eq!(config.registry.url, "http://localhost:3000/api/plugins");
        assert_eq!(config.registry.max_redirects, 10);
    }

    #[test]
    fn explicit_plugins_dir_wins() {
        let section = InstallSection {
            plugins_dir: Some(PathBuf::from("/srv/plinth/plugins")),
            ..InstallSection::default()
        };
        assert_eq!(
            section.resolve_plugins_dir().unwrap(),
            PathBuf::from("/srv/plinth/plugins")
        );
    }
}
