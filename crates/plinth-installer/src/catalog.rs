//! Serde types for registry catalog responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::platform::{ANY_PLATFORM, Platform};

/// Registry response for `GET <registry>/repo/<plugin-id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginCatalogEntry {
    /// Plugin ID.
    pub id: String,
    /// Published versions, newest first. The order is trusted as served.
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

/// A single published version of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Version string as published.
    pub version: String,
    /// Platform key (`<os>-<arch>` or `any`) → build info.
    ///
    /// Empty means the version is a platform-independent source archive.
    #[serde(rename = "arch", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arch_compatibility: BTreeMap<String, ArchInfo>,
    /// Where the version was built from.
    #[serde(flatten)]
    pub download_ref: DownloadRef,
}

/// Build info for one platform of a version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchInfo {
    /// SHA-256 hex digest of the archive for this platform.
    #[serde(rename = "sha256", default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Opaque locator of a version's source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRef {
    /// Commit the version was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Source repository URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl VersionRecord {
    /// Whether this version can be installed on `platform`.
    ///
    /// True when the version lists no platforms at all, lists the exact
    /// platform key, or lists `any`.
    #[must_use]
    pub fn is_compatible_with(&self, platform: &Platform) -> bool {
        self.arch_compatibility.is_empty()
            || self
                .arch_compatibility
                .contains_key(platform.to_string().as_str())
            || self.arch_compatibility.contains_key(ANY_PLATFORM)
    }
}

/// A concrete archive to fetch, produced by resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    /// Plugin ID.
    pub plugin_id: String,
    /// Resolved version.
    pub version: String,
    /// Archive download URL.
    pub download_url: String,
    /// Expected SHA-256 hex digest, if the registry published one.
    pub expected_checksum: Option<String>,
}
