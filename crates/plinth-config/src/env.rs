//! `PLINTH_*` environment overrides.
//!
//! Overrides are applied to the merged TOML tree before deserialization, so
//! they go through the same validation as file values.

use std::collections::HashMap;

use tracing::debug;

use crate::merge::set_path;

/// Environment variables and the config field each one sets.
pub const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PLINTH_REGISTRY_URL", "registry.url"),
    ("PLINTH_PLUGINS_DIR", "install.plugins_dir"),
    ("PLINTH_LOG_LEVEL", "logging.level"),
];

/// Snapshot the `PLINTH_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("PLINTH_"))
        .collect()
}

/// Apply every known override present in `env_vars` to `merged`.
///
/// Empty values are ignored. Returns the number of overrides applied.
pub fn apply_env_overrides(merged: &mut toml::Value, env_vars: &HashMap<String, String>) -> usize {
    let mut applied = 0_usize;
    for (var, field) in ENV_OVERRIDES {
        let Some(value) = env_vars.get(*var) else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        debug!(var, field, "applying environment override");
        set_path(merged, field, toml::Value::String(value.to_owned()));
        applied = applied.saturating_add(1);
    }
    applied
}
