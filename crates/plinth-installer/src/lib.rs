//! Plugin installation for the Plinth host.
//!
//! Takes a plugin ID (and optionally a version) and leaves a verified,
//! extracted plugin directory on disk, recursing into the plugin's declared
//! dependencies:
//!
//! - [`resolve`]: picks a version from the registry catalog for a [`Platform`]
//! - [`Downloader`]: streams the archive to a temp file, hashing as it goes,
//!   retrying corrupt responses
//! - [`extract()`]: unpacks the zip into `<plugins-root>/<plugin-id>` with
//!   zip-slip and symlink protection
//! - [`manifest::load`]: reads `plugin.json` from the extracted directory
//! - [`Installer`]: runs the whole pipeline and walks the dependency graph
//!
//! # Pipeline
//!
//! ```text
//! Resolving → Downloading → Verifying → Extracting → ReadingManifest
//!           → InstallingDependencies → Done
//! ```
//!
//! Any stage can fail; the error propagates and a partially written plugin
//! directory is left for the caller to clean up.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod catalog;
pub mod download;
pub mod error;
pub mod extract;
pub mod install;
pub mod manifest;
pub mod options;
pub mod platform;
pub mod registry;
pub mod resolve;

pub use catalog::{ArchInfo, DownloadRef, PluginCatalogEntry, ResolvedDownload, VersionRecord};
pub use download::{DownloadedArchive, Downloader};
pub use error::{ErrorKind, InstallError, InstallResult};
pub use extract::{ExtractWarning, Extraction, extract};
pub use install::{InstallObserver, InstallStage, InstalledPlugin, Installer, validate_plugin_id};
pub use manifest::{DependencyRef, PluginManifest};
pub use options::InstallerOptions;
pub use platform::Platform;
pub use registry::RegistryClient;
