//! Install orchestration.
//!
//! Each plugin goes through
//! `Resolving → Downloading → Verifying → Extracting → ReadingManifest →
//! InstallingDependencies → Done`, or ends in `Failed`. Dependencies are
//! installed one at a time in manifest order. Nothing is rolled back on
//! failure.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::catalog::ResolvedDownload;
use crate::download::Downloader;
use crate::error::{InstallError, InstallResult};
use crate::extract::{ExtractWarning, extract};
use crate::manifest;
use crate::options::InstallerOptions;
use crate::registry::{RegistryClient, build_http_client};
use crate::resolve::{expected_checksum, resolve};

/// Longest accepted plugin ID.
pub const MAX_PLUGIN_ID_LEN: usize = 190;

/// A step of the per-plugin install state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStage {
    /// Fetching the catalog and picking a version.
    Resolving,
    /// Streaming the archive to a temp file.
    Downloading,
    /// Comparing the archive digest with the registry checksum.
    Verifying,
    /// Unpacking into the plugins directory.
    Extracting,
    /// Reading `plugin.json`.
    ReadingManifest,
    /// Installing declared dependencies.
    InstallingDependencies,
    /// Installed.
    Done,
    /// Stopped by an error.
    Failed,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::ReadingManifest => "reading_manifest",
            Self::InstallingDependencies => "installing_dependencies",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Receives install progress.
pub trait InstallObserver: Send + Sync {
    /// Called on every stage transition of every plugin, dependencies included.
    fn on_stage(&self, plugin_id: &str, stage: InstallStage) {
        let _ = (plugin_id, stage);
    }
}

/// An installed plugin and its installed dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPlugin {
    /// Plugin ID as requested.
    pub id: String,
    /// Resolved version, or the manifest version for direct-source installs.
    pub version: String,
    /// `<dest_root>/<id>`.
    pub install_path: PathBuf,
    /// Dependencies by ID. Shared when several plugins depend on the same one.
    ///
    /// A dependency that closes a cycle is not listed.
    pub dependencies: BTreeMap<String, Arc<InstalledPlugin>>,
    /// Entries the extractor skipped.
    pub warnings: Vec<ExtractWarning>,
}

/// What to fetch for a plugin.
#[derive(Clone, Copy)]
enum Target<'a> {
    /// Resolve this version (empty = latest) from the registry.
    Version(&'a str),
    /// Download this URL or local path as-is.
    Source(&'a str),
}

/// State shared across one top-level install and its dependencies.
#[derive(Default)]
struct InstallSession {
    in_progress: HashSet<String>,
    completed: HashMap<String, Arc<InstalledPlugin>>,
}

type InstallFuture<'a> =
    Pin<Box<dyn Future<Output = InstallResult<Arc<InstalledPlugin>>> + Send + 'a>>;

/// Resolves, downloads, verifies, and extracts plugins with their dependencies.
pub struct Installer {
    options: InstallerOptions,
    registry: RegistryClient,
    downloader: Downloader,
    observer: Option<Arc<dyn InstallObserver>>,
    cancel: CancellationToken,
}

impl Installer {
    /// Build an installer with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::Registry`] if the registry URL is invalid or the
    /// HTTP client cannot be built.
    pub fn new(options: InstallerOptions) -> InstallResult<Self> {
        let client = build_http_client(&options)?;
        let registry =
            RegistryClient::new(client.clone(), &options.registry_url, options.catalog_timeout)?;
        Ok(Self {
            downloader: Downloader::new(client),
            registry,
            options,
            observer: None,
            cancel: CancellationToken::new(),
        })
    }

    /// Report stage transitions to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn InstallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Abort in-flight requests when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Options this installer was built with.
    #[must_use]
    pub fn options(&self) -> &InstallerOptions {
        &self.options
    }

    /// Registry client used for catalog lookups.
    #[must_use]
    pub fn registry(&self) -> &RegistryClient {
        &self.registry
    }

    /// Install `plugin_id` at `requested` (empty for latest) under `dest_root`.
    ///
    /// # Errors
    ///
    /// Any [`InstallError`]. A dependency failure comes back wrapped in
    /// [`InstallError::Dependency`] with the parent's ID.
    pub async fn install(
        &self,
        plugin_id: &str,
        requested: &str,
        dest_root: &Path,
    ) -> InstallResult<InstalledPlugin> {
        let mut session = InstallSession::default();
        let installed = self
            .install_one(plugin_id, Target::Version(requested), dest_root, &mut session)
            .await?;
        Ok(Arc::unwrap_or_clone(installed))
    }

    /// Install `plugin_id` from an explicit URL or local archive path.
    ///
    /// No version is resolved and no checksum is checked. Dependencies are
    /// still resolved from the registry.
    ///
    /// # Errors
    ///
    /// Any [`InstallError`].
    pub async fn install_from_source(
        &self,
        plugin_id: &str,
        source: &str,
        dest_root: &Path,
    ) -> InstallResult<InstalledPlugin> {
        let mut session = InstallSession::default();
        let installed = self
            .install_one(plugin_id, Target::Source(source), dest_root, &mut session)
            .await?;
        Ok(Arc::unwrap_or_clone(installed))
    }

    fn install_one<'a>(
        &'a self,
        plugin_id: &'a str,
        target: Target<'a>,
        dest_root: &'a Path,
        session: &'a mut InstallSession,
    ) -> InstallFuture<'a> {
        let span = info_span!("install", plugin_id, version = tracing::field::Empty);
        Box::pin(
            async move {
                validate_plugin_id(plugin_id)?;

                session.in_progress.insert(plugin_id.to_owned());
                let result = self.run_stages(plugin_id, target, dest_root, session).await;
                session.in_progress.remove(plugin_id);

                match result {
                    Ok(installed) => {
                        let installed = Arc::new(installed);
                        session
                            .completed
                            .insert(plugin_id.to_owned(), Arc::clone(&installed));
                        self.enter(plugin_id, InstallStage::Done);
                        info!(
                            version = %installed.version,
                            path = %installed.install_path.display(),
                            "plugin installed"
                        );
                        Ok(installed)
                    },
                    Err(err) => {
                        self.enter(plugin_id, InstallStage::Failed);
                        debug!(error = %err, "plugin install failed");
                        Err(err)
                    },
                }
            }
            .instrument(span),
        )
    }

    async fn run_stages(
        &self,
        plugin_id: &str,
        target: Target<'_>,
        dest_root: &Path,
        session: &mut InstallSession,
    ) -> InstallResult<InstalledPlugin> {
        let resolved = match target {
            Target::Version(requested) => {
                self.enter(plugin_id, InstallStage::Resolving);
                self.resolve_download(plugin_id, requested).await?
            },
            Target::Source(source) => ResolvedDownload {
                plugin_id: plugin_id.to_owned(),
                version: String::new(),
                download_url: source.to_owned(),
                expected_checksum: None,
            },
        };
        if !resolved.version.is_empty() {
            tracing::Span::current().record("version", resolved.version.as_str());
        }

        self.enter(plugin_id, InstallStage::Downloading);
        let archive = self
            .downloader
            .fetch(&resolved.download_url, &self.cancel)
            .await?;

        self.enter(plugin_id, InstallStage::Verifying);
        let archive = if archive.is_local() {
            archive
        } else {
            archive.verify(resolved.expected_checksum.as_deref())?
        };

        self.enter(plugin_id, InstallStage::Extracting);
        if self.cancel.is_cancelled() {
            return Err(InstallError::Cancelled);
        }
        let allow_symlinks = self.options.allows_symlinks(plugin_id);
        let id = plugin_id.to_owned();
        let root = dest_root.to_path_buf();
        let extraction = tokio::task::spawn_blocking(move || {
            let result = extract(archive.path(), &id, &root, allow_symlinks);
            drop(archive);
            result
        })
        .await
        .map_err(|e| InstallError::Archive {
            message: format!("extraction task failed: {e}"),
        })??;

        self.enter(plugin_id, InstallStage::ReadingManifest);
        let manifest = manifest::load(&extraction.install_dir, plugin_id)?;

        self.enter(plugin_id, InstallStage::InstallingDependencies);
        let mut dependencies = BTreeMap::new();
        for dep in &manifest.dependencies {
            if let Some(done) = session.completed.get(&dep.id) {
                debug!(dependency = %dep.id, "dependency already installed in this session");
                dependencies.insert(dep.id.clone(), Arc::clone(done));
                continue;
            }
            if session.in_progress.contains(&dep.id) {
                debug!(dependency = %dep.id, "dependency cycle detected, skipping");
                continue;
            }

            let installed = self
                .install_one(&dep.id, Target::Version(&dep.version), dest_root, session)
                .await
                .map_err(|e| InstallError::Dependency {
                    parent: plugin_id.to_owned(),
                    source: Box::new(e),
                })?;
            dependencies.insert(dep.id.clone(), installed);
        }

        let version = if resolved.version.is_empty() {
            manifest.version
        } else {
            resolved.version
        };
        Ok(InstalledPlugin {
            id: plugin_id.to_owned(),
            version,
            install_path: extraction.install_dir,
            dependencies,
            warnings: extraction.warnings,
        })
    }

    async fn resolve_download(
        &self,
        plugin_id: &str,
        requested: &str,
    ) -> InstallResult<ResolvedDownload> {
        let catalog = self.registry.fetch_catalog(plugin_id, &self.cancel).await?;
        let platform = &self.options.platform;
        let record = resolve(&catalog, requested, platform)?;
        let download_url = self.registry.download_url(plugin_id, &record.version)?;

        debug!(
            version = %record.version,
            %platform,
            checksum = expected_checksum(record, platform).is_some(),
            "version resolved"
        );
        Ok(ResolvedDownload {
            plugin_id: plugin_id.to_owned(),
            version: record.version.clone(),
            download_url: download_url.to_string(),
            expected_checksum: expected_checksum(record, platform).map(str::to_owned),
        })
    }

    fn enter(&self, plugin_id: &str, stage: InstallStage) {
        debug!(plugin_id, %stage, "install stage");
        if let Some(observer) = &self.observer {
            observer.on_stage(plugin_id, stage);
        }
    }
}

/// Check that `id` is safe to use as a directory name.
///
/// Accepts 1 to [`MAX_PLUGIN_ID_LEN`] characters from `[A-Za-z0-9._-]`, not
/// starting with `.`.
///
/// # Errors
///
/// Returns [`InstallError::InvalidPluginId`] describing the first problem.
pub fn validate_plugin_id(id: &str) -> InstallResult<()> {
    let invalid = |reason: String| {
        Err(InstallError::InvalidPluginId {
            id: id.to_owned(),
            reason,
        })
    };

    if id.is_empty() {
        return invalid("must not be empty".to_owned());
    }
    if id.len() > MAX_PLUGIN_ID_LEN {
        return invalid(format!("longer than {MAX_PLUGIN_ID_LEN} characters"));
    }
    if id.starts_with('.') {
        return invalid("must not start with '.'".to_owned());
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '.' | '_' | '-')))
    {
        return invalid(format!("invalid character {c:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn valid_plugin_ids() {
        for id in ["clock-panel", "plinth-piechart-panel", "a", "x.y_z-1"] {
            validate_plugin_id(id).unwrap();
        }
        validate_plugin_id(&"a".repeat(MAX_PLUGIN_ID_LEN)).unwrap();
    }

    #[test]
    fn invalid_plugin_ids() {
        let long = "a".repeat(MAX_PLUGIN_ID_LEN + 1);
        for id in ["", ".", "..", ".hidden", "../x", "a/b", "a\\b", "a b", "é", &long] {
            let err = validate_plugin_id(id).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPluginId, "{id:?}");
        }
    }

    #[test]
    fn stage_names() {
        assert_eq!(InstallStage::ReadingManifest.to_string(), "reading_manifest");
        assert_eq!(InstallStage::Failed.to_string(), "failed");
    }

    #[test]
    fn installer_rejects_bad_registry_url() {
        let result = Installer::new(InstallerOptions {
            registry_url: "not a url".to_owned(),
            ..InstallerOptions::default()
        });
        assert!(matches!(result, Err(InstallError::Registry { .. })));
    }

    #[test]
    fn default_observer_is_a_no_op() {
        struct Silent;
        impl InstallObserver for Silent {}
        Silent.on_stage("x", InstallStage::Done);
    }
}
