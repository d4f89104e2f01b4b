//! Reading `plugin.json` from an extracted plugin.
//!
//! Only the identity, version, and dependency fields are interpreted; the
//! rest of the manifest belongs to the plugin runtime.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{InstallError, InstallResult};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Version assumed when a manifest has none.
pub const DEFAULT_VERSION: &str = "0.0.0";

/// Subdirectory searched before the install root.
const DIST_DIR: &str = "dist";

/// The fields of `plugin.json` the installer cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    /// Plugin ID.
    pub id: String,
    /// Declared version, or [`DEFAULT_VERSION`].
    pub version: String,
    /// Display name.
    pub name: Option<String>,
    /// Plugin type (`panel`, `datasource`, `app`, ...).
    pub kind: Option<String>,
    /// Host version constraint. Informational only.
    pub host_dependency: Option<String>,
    /// Plugins this one depends on, in declared order.
    pub dependencies: Vec<DependencyRef>,
}

/// A dependency declared in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRef {
    /// Dependency plugin ID.
    pub id: String,
    /// Version constraint as written; empty means latest.
    pub version: String,
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    id: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    info: RawInfo,
    #[serde(default)]
    dependencies: RawDependencies,
}

#[derive(Default, Deserialize)]
struct RawInfo {
    version: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDependencies {
    host_dependency: Option<String>,
    #[serde(default)]
    plugins: Vec<RawDependency>,
}

#[derive(Deserialize)]
struct RawDependency {
    #[serde(default)]
    id: String,
    #[serde(default)]
    version: String,
}

/// Load the manifest of the plugin extracted at `install_dir`.
///
/// `dist/plugin.json` wins over `plugin.json`. A manifest whose ID differs
/// from `plugin_id` is accepted with a warning.
///
/// # Errors
///
/// - [`InstallError::ManifestMissing`] if neither file exists
/// - [`InstallError::ManifestInvalid`] if the file is not JSON, has no `id`,
///   or declares a dependency without an `id`
pub fn load(install_dir: &Path, plugin_id: &str) -> InstallResult<PluginManifest> {
    let path = find_manifest(install_dir).ok_or_else(|| InstallError::ManifestMissing {
        plugin_id: plugin_id.to_owned(),
        install_dir: install_dir.to_path_buf(),
    })?;
    debug!(path = %path.display(), "reading plugin manifest");

    let bytes = std::fs::read(&path).map_err(|e| InstallError::from_io(&path, e))?;
    let manifest = parse(&bytes, &path)?;

    if manifest.id != plugin_id {
        warn!(
            requested = plugin_id,
            manifest_id = %manifest.id,
            path = %path.display(),
            "manifest id does not match the requested plugin id"
        );
    }
    Ok(manifest)
}

fn find_manifest(install_dir: &Path) -> Option<PathBuf> {
    [
        install_dir.join(DIST_DIR).join(MANIFEST_FILE),
        install_dir.join(MANIFEST_FILE),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

fn parse(bytes: &[u8], path: &Path) -> InstallResult<PluginManifest> {
    let invalid = |message: String| InstallError::ManifestInvalid {
        path: path.to_path_buf(),
        message,
    };

    let raw: RawManifest = serde_json::from_slice(bytes).map_err(|e| invalid(e.to_string()))?;
    if raw.id.trim().is_empty() {
        return Err(invalid("missing plugin id".to_owned()));
    }

    let dependencies = raw
        .dependencies
        .plugins
        .into_iter()
        .map(|dep| {
            if dep.id.trim().is_empty() {
                Err(invalid("dependency without an id".to_owned()))
            } else {
                Ok(DependencyRef {
                    id: dep.id,
                    version: dep.version,
                })
            }
        })
        .collect::<InstallResult<Vec<_>>>()?;

    Ok(PluginManifest {
        id: raw.id,
        version: raw
            .info
            .version
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_VERSION.to_owned()),
        name: raw.name,
        kind: raw.kind,
        host_dependency: raw.dependencies.host_dependency,
        dependencies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn write(dir: &Path, rel: &str, body: &str) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn full_manifest() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plugin.json",
            r#"{
                "id": "ops-app",
                "name": "Ops",
                "type": "app",
                "info": { "version": "3.1.0", "author": { "name": "x" } },
                "dependencies": {
                    "hostDependency": ">=10.0.0",
                    "plugins": [
                        { "id": "clock-panel", "version": "^1.2.0", "type": "panel" },
                        { "id": "json-datasource", "version": "" }
                    ]
                }
            }"#,
        );

        let manifest = load(dir.path(), "ops-app").unwrap();
        assert_eq!(manifest.id, "ops-app");
        assert_eq!(manifest.version, "3.1.0");
        assert_eq!(manifest.name.as_deref(), Some("Ops"));
        assert_eq!(manifest.kind.as_deref(), Some("app"));
        assert_eq!(manifest.host_dependency.as_deref(), Some(">=10.0.0"));
        assert_eq!(
            manifest.dependencies,
            vec![
                DependencyRef {
                    id: "clock-panel".into(),
                    version: "^1.2.0".into()
                },
                DependencyRef {
                    id: "json-datasource".into(),
                    version: String::new()
                },
            ]
        );
    }

    #[test]
    fn dist_manifest_wins() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plugin.json", r#"{"id":"root-copy"}"#);
        write(dir.path(), "dist/plugin.json", r#"{"id":"dist-copy"}"#);

        assert_eq!(load(dir.path(), "dist-copy").unwrap().id, "dist-copy");
    }

    #[test]
    fn missing_version_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plugin.json", r#"{"id":"legacy"}"#);

        let manifest = load(dir.path(), "legacy").unwrap();
        assert_eq!(manifest.version, DEFAULT_VERSION);
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(dir.path(), "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManifestMissing);
    }

    #[test]
    fn missing_or_empty_id_is_invalid() {
        for body in [r#"{"info":{"version":"1.0.0"}}"#, r#"{"id":""}"#, r#"{"id":"  "}"#] {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "plugin.json", body);
            let err = load(dir.path(), "x").unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ManifestInvalid, "{body}");
        }
    }

    #[test]
    fn malformed_json_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plugin.json", "{ not json");
        assert_eq!(
            load(dir.path(), "x").unwrap_err().kind(),
            ErrorKind::ManifestInvalid
        );
    }

    #[test]
    fn dependency_without_id_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "plugin.json",
            r#"{"id":"a","dependencies":{"plugins":[{"version":"1.0.0"}]}}"#,
        );
        assert_eq!(
            load(dir.path(), "a").unwrap_err().kind(),
            ErrorKind::ManifestInvalid
        );
    }

    #[test]
    fn mismatched_id_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plugin.json", r#"{"id":"renamed-panel"}"#);
        assert_eq!(load(dir.path(), "clock-panel").unwrap().id, "renamed-panel");
    }
}
