//! Runtime options for [`Installer`](crate::Installer).

use std::time::Duration;

use crate::platform::Platform;

/// Registry used when none is configured.
pub const DEFAULT_REGISTRY_URL: &str = "https://plugins.plinth.dev/api/plugins";

/// Plugin ID prefix of first-party plugins, which may ship symlinks.
pub const DEFAULT_TRUSTED_PREFIX: &str = "plinth-";

/// Knobs for the install pipeline.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    /// Registry API root.
    pub registry_url: String,
    /// Bound on the catalog lookup. Archive downloads are unbounded.
    pub catalog_timeout: Duration,
    /// TCP/TLS connect timeout for every request.
    pub connect_timeout: Duration,
    /// Redirects followed before a request fails.
    pub max_redirects: usize,
    /// Host version sent in request identity headers.
    pub host_version: String,
    /// Plugins whose ID starts with this prefix may create symlinks.
    pub trusted_prefix: String,
    /// Platform versions are resolved for.
    pub platform: Platform,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_owned(),
            catalog_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            max_redirects: 10,
            host_version: env!("CARGO_PKG_VERSION").to_owned(),
            trusted_prefix: DEFAULT_TRUSTED_PREFIX.to_owned(),
            platform: Platform::current(),
        }
    }
}

impl InstallerOptions {
    /// Whether `plugin_id` is trusted to ship symlinks.
    #[must_use]
    pub fn allows_symlinks(&self, plugin_id: &str) -> bool {
        !self.trusted_prefix.is_empty() && plugin_id.starts_with(&self.trusted_prefix)
    }
}

impl From<&plinth_config::Config> for InstallerOptions {
    fn from(config: &plinth_config::Config) -> Self {
        let defaults = Self::default();
        Self {
            registry_url: config.registry.url.clone(),
            catalog_timeout: Duration::from_secs(config.registry.catalog_timeout_secs),
            connect_timeout: Duration::from_secs(config.registry.connect_timeout_secs),
            max_redirects: config.registry.max_redirects,
            host_version: config
                .install
                .host_version
                .clone()
                .unwrap_or(defaults.host_version),
            trusted_prefix: config.install.trusted_prefix.clone(),
            platform: defaults.platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_prefix_controls_symlinks() {
        let options = InstallerOptions::default();
        assert!(options.allows_symlinks("plinth-piechart-panel"));
        assert!(!options.allows_symlinks("acme-piechart-panel"));

        let none = InstallerOptions {
            trusted_prefix: String::new(),
            ..InstallerOptions::default()
        };
        assert!(!none.allows_symlinks("plinth-piechart-panel"));
    }

    #[test]
    fn from_config_maps_every_field() {
        let mut config = plinth_config::Config::default();
        config.registry.url = "http://localhost:9000/api".to_owned();
        config.registry.catalog_timeout_secs = 3;
        config.registry.connect_timeout_secs = 4;
        config.registry.max_redirects = 2;
        config.install.trusted_prefix = "acme-".to_owned();
        config.install.host_version = Some("11.0.0".to_owned());

        let options = InstallerOptions::from(&config);
        assert_eq!(options.registry_url, "http://localhost:9000/api");
        assert_eq!(options.catalog_timeout, Duration::from_secs(3));
        assert_eq!(options.connect_timeout, Duration::from_secs(4));
        assert_eq!(options.max_redirects, 2);
        assert_eq!(options.host_version, "11.0.0");
        assert!(options.allows_symlinks("acme-clock"));
    }

    #[test]
    fn from_config_defaults_host_version_to_crate_version() {
        let options = InstallerOptions::from(&plinth_config::Config::default());
        assert_eq!(options.host_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(options.registry_url, DEFAULT_REGISTRY_URL);
    }
}
