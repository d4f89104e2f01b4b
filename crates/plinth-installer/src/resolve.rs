//! Version selection over a registry catalog.
//!
//! Pure functions: no I/O, no reordering. The catalog's newest-first order
//! decides which compatible version counts as "latest".

use crate::catalog::{PluginCatalogEntry, VersionRecord};
use crate::error::{InstallError, InstallResult};
use crate::platform::{ANY_PLATFORM, Platform};

/// Normalize a user-supplied version string for comparison.
///
/// Removes all whitespace, then strips a single leading `^` or `v`.
#[must_use]
pub fn normalize_version(version: &str) -> String {
    let compact: String = version.chars().filter(|c| !c.is_whitespace()).collect();
    match compact.strip_prefix('^').or_else(|| compact.strip_prefix('v')) {
        Some(stripped) => stripped.to_owned(),
        None => compact,
    }
}

/// First version in catalog order that runs on `platform`.
#[must_use]
pub fn latest_compatible<'a>(
    catalog: &'a PluginCatalogEntry,
    platform: &Platform,
) -> Option<&'a VersionRecord> {
    catalog
        .versions
        .iter()
        .find(|record| record.is_compatible_with(platform))
}

/// Pick the version to install.
///
/// An empty `requested` selects the latest compatible version. Otherwise the
/// normalized version must match a catalog entry exactly and be compatible
/// with `platform`.
///
/// # Errors
///
/// - [`InstallError::VersionUnsupported`] when nothing (or not the requested
///   version) runs on `platform`
/// - [`InstallError::VersionNotFound`] when the requested version is not
///   published
///
/// Both carry the latest compatible version as a hint.
pub fn resolve<'a>(
    catalog: &'a PluginCatalogEntry,
    requested: &str,
    platform: &Platform,
) -> InstallResult<&'a VersionRecord> {
    let latest = latest_compatible(catalog, platform);
    let latest_hint = latest.map(|record| record.version.clone());

    let requested = normalize_version(requested);
    if requested.is_empty() {
        return latest.ok_or_else(|| InstallError::VersionUnsupported {
            plugin_id: catalog.id.clone(),
            version: None,
            platform: platform.to_string(),
            latest: None,
        });
    }

    let Some(record) = catalog.versions.iter().find(|r| r.version == requested) else {
        return Err(InstallError::VersionNotFound {
            plugin_id: catalog.id.clone(),
            requested,
            latest: latest_hint,
        });
    };

    if !record.is_compatible_with(platform) {
        return Err(InstallError::VersionUnsupported {
            plugin_id: catalog.id.clone(),
            version: Some(requested),
            platform: platform.to_string(),
            latest: latest_hint,
        });
    }

    Ok(record)
}

/// Checksum the registry published for `record` on `platform`.
///
/// Falls back to the `any` entry. `None` means the archive is unsigned and
/// verification is skipped.
#[must_use]
pub fn expected_checksum<'a>(record: &'a VersionRecord, platform: &Platform) -> Option<&'a str> {
    let arch = &record.arch_compatibility;
    arch.get(platform.to_string().as_str())
        .or_else(|| arch.get(ANY_PLATFORM))
        .and_then(|info| info.checksum.as_deref())
        .filter(|checksum| !checksum.is_empty())
}
