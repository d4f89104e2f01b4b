//! Installer error types.

use std::io;
use std::path::{Path, PathBuf};

/// Classification of an [`InstallError`], independent of dependency wrapping.
///
/// Obtained through [`InstallError::kind`], which looks through
/// [`InstallError::Dependency`] to the error that actually stopped the install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested version is not in the catalog.
    VersionNotFound,
    /// The version exists but does not run on the current platform.
    VersionUnsupported,
    /// Downloaded bytes do not match the registry digest.
    ChecksumMismatch,
    /// The response body kept failing mid-stream.
    CorruptResponse,
    /// An archive entry tried to escape the destination root.
    PathTraversal,
    /// The OS rejected a filesystem write.
    PermissionDenied,
    /// A destination file is held open by a running process.
    FileBusy,
    /// No `plugin.json` in the extracted archive.
    ManifestMissing,
    /// `plugin.json` is unreadable or lacks a plugin identity.
    ManifestInvalid,
    /// The registry answered with a 4xx status.
    HttpClient,
    /// The registry answered with a 5xx (or other non-2xx) status.
    HttpServer,
    /// The catalog response could not be understood.
    Registry,
    /// Connection, DNS, or TLS failure before a response arrived.
    Transport,
    /// The archive is not a readable zip or exceeds limits.
    Archive,
    /// Any other filesystem failure.
    Io,
    /// The install was cancelled.
    Cancelled,
    /// A plugin ID is not usable as a directory name.
    InvalidPluginId,
}

/// Errors from resolving, downloading, extracting, or installing a plugin.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Requested version is absent from the catalog.
    #[error("version {requested} of {plugin_id} not found{}", latest_hint(.latest.as_deref()))]
    VersionNotFound {
        /// Plugin being resolved.
        plugin_id: String,
        /// Normalized requested version.
        requested: String,
        /// Newest version compatible with the platform, if any.
        latest: Option<String>,
    },

    /// Version exists but is not built for the current platform.
    #[error("{} of {plugin_id} is not supported on {platform}{}", describe_version(.version.as_deref()), latest_hint(.latest.as_deref()))]
    VersionUnsupported {
        /// Plugin being resolved.
        plugin_id: String,
        /// Requested version, or `None` when the latest version was wanted.
        version: Option<String>,
        /// Platform key the catalog was filtered against.
        platform: String,
        /// Newest version compatible with the platform, if any.
        latest: Option<String>,
    },

    /// Downloaded archive digest does not match the registry checksum.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Expected SHA-256 hex digest.
        expected: String,
        /// Actual SHA-256 hex digest.
        actual: String,
    },

    /// Response stream stayed corrupt after every retry.
    #[error("corrupt response from {url} after {attempts} attempts: {message}")]
    CorruptResponse {
        /// URL being downloaded.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Last stream error.
        message: String,
    },

    /// Archive entry escapes the destination root.
    #[error("path traversal detected in archive entry: {path}")]
    PathTraversal {
        /// Raw entry name.
        path: String,
    },

    /// Filesystem write rejected by OS permissions.
    #[error("permission denied: {}", .path.display())]
    PermissionDenied {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Destination file is locked by a running process.
    #[error("{} is in use by a running process; stop the host before retrying the install", .path.display())]
    FileBusy {
        /// The busy file.
        path: PathBuf,
    },

    /// No manifest under `dist/` or the install directory.
    #[error("plugin {plugin_id} has no plugin.json in {}", .install_dir.display())]
    ManifestMissing {
        /// Plugin being installed.
        plugin_id: String,
        /// Directory that was searched.
        install_dir: PathBuf,
    },

    /// Manifest is malformed or has no plugin ID.
    #[error("invalid manifest {}: {message}", .path.display())]
    ManifestInvalid {
        /// Manifest file path.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// 4xx response from the registry.
    #[error("registry request failed with status {status}: {message}")]
    HttpClient {
        /// HTTP status code.
        status: u16,
        /// Server-provided message or truncated body.
        message: String,
    },

    /// 5xx or otherwise unexpected non-2xx response.
    #[error("registry server error {status}: {message}")]
    HttpServer {
        /// HTTP status code.
        status: u16,
        /// Server-provided message or truncated body.
        message: String,
    },

    /// Catalog could not be fetched or decoded.
    #[error("registry error: {message}")]
    Registry {
        /// Description of the failure.
        message: String,
    },

    /// Request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Target URL.
        url: String,
        /// Underlying client error.
        message: String,
    },

    /// Archive unreadable or over limits.
    #[error("archive error: {message}")]
    Archive {
        /// Description of the failure.
        message: String,
    },

    /// Other filesystem failure.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Cancellation signal fired.
    #[error("install cancelled")]
    Cancelled,

    /// Plugin ID cannot be used as a directory name.
    #[error("invalid plugin id '{id}': {reason}")]
    InvalidPluginId {
        /// The rejected ID.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A dependency of `parent` failed to install.
    #[error("failed to install dependency of {parent}: {source}")]
    Dependency {
        /// Plugin whose dependency failed.
        parent: String,
        /// The dependency's error.
        #[source]
        source: Box<InstallError>,
    },
}

impl InstallError {
    /// Classify a filesystem error at `path`.
    ///
    /// Permission and busy-file failures get their own variants so callers
    /// can tell the operator what to fix.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        if is_file_busy(&source) {
            return Self::FileBusy { path };
        }
        if source.kind() == io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied { path, source };
        }
        Self::Io { path, source }
    }

    /// Kind of the innermost error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            Self::VersionUnsupported { .. } => ErrorKind::VersionUnsupported,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::CorruptResponse { .. } => ErrorKind::CorruptResponse,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::FileBusy { .. } => ErrorKind::FileBusy,
            Self::ManifestMissing { .. } => ErrorKind::ManifestMissing,
            Self::ManifestInvalid { .. } => ErrorKind::ManifestInvalid,
            Self::HttpClient { .. } => ErrorKind::HttpClient,
            Self::HttpServer { .. } => ErrorKind::HttpServer,
            Self::Registry { .. } => ErrorKind::Registry,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Io { .. } => ErrorKind::Io,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidPluginId { .. } => ErrorKind::InvalidPluginId,
            Self::Dependency { source, .. } => source.kind(),
        }
    }

    /// Innermost error, with dependency wrapping removed.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Plugin IDs on the path from the top-level install to the failing one.
    ///
    /// Empty when the top-level plugin itself failed.
    #[must_use]
    pub fn dependency_chain(&self) -> Vec<&str> {
        let mut chain = Vec::new();
        let mut current = self;
        while let Self::Dependency { parent, source } = current {
            chain.push(parent.as_str());
            current = source;
        }
        chain
    }

    /// Whether retrying the whole install could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::CorruptResponse
                | ErrorKind::ChecksumMismatch
                | ErrorKind::HttpServer
                | ErrorKind::Transport
        )
    }
}

fn latest_hint(latest: Option<&str>) -> String {
    latest.map_or_else(
        || " (no version is available for this platform)".to_owned(),
        |v| format!(" (latest compatible version is {v})"),
    )
}

fn describe_version(version: Option<&str>) -> String {
    version.map_or_else(|| "no version".to_owned(), |v| format!("version {v}"))
}

fn is_file_busy(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION
    const WINDOWS_SHARING_VIOLATION: i32 = 32;

    matches!(
        err.kind(),
        io::ErrorKind::ExecutableFileBusy | io::ErrorKind::ResourceBusy
    ) || (cfg!(windows) && err.raw_os_error() == Some(WINDOWS_SHARING_VIOLATION))
}

/// Result type for installer operations.
pub type InstallResult<T> = Result<T, InstallError>;
