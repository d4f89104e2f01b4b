//! Safe zip extraction with path traversal protection.
//!
//! Unpacks a plugin archive into `<dest_root>/<plugin_id>` while guarding
//! against:
//! - Path traversal (`../` components, absolute names, drive prefixes)
//! - Writes through symlinks created by earlier entries
//! - Symlinks pointing outside the plugin directory
//! - Excessive entry counts and declared sizes
//!
//! Traversal aborts the whole extraction. Symlink problems are soft: the
//! entry is skipped, a warning is recorded, and extraction continues.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::{InstallError, InstallResult};
use crate::install::validate_plugin_id;
use crate::platform::is_backend_executable;

/// Maximum number of entries allowed in an archive.
pub const MAX_ENTRY_COUNT: usize = 10_000;

/// Maximum total declared uncompressed size (1 GB).
pub const MAX_EXTRACTED_SIZE: u64 = 1_000_000_000;

const FILE_TYPE_MASK: u32 = 0o170_000;
const SYMLINK_TYPE: u32 = 0o120_000;
const PERMISSION_BITS: u32 = 0o777;
const DIR_MODE: u32 = 0o755;
const EXECUTABLE_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;

/// A non-fatal problem with a single archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractWarning {
    /// Symlink entry skipped because the plugin may not ship symlinks.
    SymlinkSkipped {
        /// Where the link would have been created.
        path: PathBuf,
    },
    /// Symlink target is absolute or resolves outside the plugin directory.
    SymlinkEscapes {
        /// Where the link would have been created.
        path: PathBuf,
        /// Link target as stored in the archive.
        target: String,
    },
    /// Symlink could not be read or created.
    SymlinkFailed {
        /// Where the link would have been created.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}

impl fmt::Display for ExtractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SymlinkSkipped { path } => write!(
                f,
                "skipped symlink {}: plugin is not trusted to ship symlinks",
                path.display()
            ),
            Self::SymlinkEscapes { path, target } => write!(
                f,
                "skipped symlink {} -> {target}: target is outside the plugin directory",
                path.display()
            ),
            Self::SymlinkFailed { path, reason } => {
                write!(f, "failed to create symlink {}: {reason}", path.display())
            },
        }
    }
}

/// Result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// `<dest_root>/<plugin_id>`, absolute.
    pub install_dir: PathBuf,
    /// Entries that were skipped.
    pub warnings: Vec<ExtractWarning>,
}

/// Extract the zip at `archive_path` for `plugin_id` under `dest_root`.
///
/// Any existing `<dest_root>/<plugin_id>` is removed first. A leading
/// commit-ish directory in entry names (as in source snapshots) is rewritten
/// to `<plugin_id>/`; containment is always checked on the raw name.
///
/// # Security
///
/// - Rejects absolute names and names starting with `..`
/// - Rejects names whose normalized path leaves `dest_root`
/// - Rejects entries whose parent directory resolves (through symlinks)
///   outside `dest_root`
/// - Never applies setuid/setgid/sticky bits
/// - Limits entry count to [`MAX_ENTRY_COUNT`] and declared size to
///   [`MAX_EXTRACTED_SIZE`]
///
/// # Errors
///
/// - [`InstallError::PathTraversal`] on an escaping entry (nothing further is written)
/// - [`InstallError::Archive`] if the archive is unreadable, empty, or over limits
/// - [`InstallError::PermissionDenied`] / [`InstallError::FileBusy`] /
///   [`InstallError::Io`] on filesystem failures
/// - [`InstallError::InvalidPluginId`] if `plugin_id` is not a safe directory name
pub fn extract(
    archive_path: &Path,
    plugin_id: &str,
    dest_root: &Path,
    allow_symlinks: bool,
) -> InstallResult<Extraction> {
    validate_plugin_id(plugin_id)?;

    let dest_root = std::path::absolute(dest_root)
        .map(|p| normalize_lexically(&p))
        .map_err(|e| InstallError::from_io(dest_root, e))?;
    create_dirs(&dest_root)?;
    let canonical_root = dest_root
        .canonicalize()
        .map_err(|e| InstallError::from_io(&dest_root, e))?;

    let install_dir = dest_root.join(plugin_id);
    remove_existing(&install_dir)?;
    let canonical_install_dir = canonical_root.join(plugin_id);

    let file = File::open(archive_path).map_err(|e| InstallError::from_io(archive_path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| InstallError::Archive {
        message: format!("failed to read zip archive {}: {e}", archive_path.display()),
    })?;

    let entry_count = archive.len();
    if entry_count == 0 {
        return Err(InstallError::Archive {
            message: "archive is empty".to_owned(),
        });
    }
    if entry_count > MAX_ENTRY_COUNT {
        return Err(InstallError::Archive {
            message: format!("archive exceeds maximum entry count ({MAX_ENTRY_COUNT})"),
        });
    }

    debug!(
        plugin_id,
        entries = entry_count,
        dest = %dest_root.display(),
        allow_symlinks,
        "extracting archive"
    );

    let mut warnings = Vec::new();
    let mut total_size: u64 = 0;
    let mut files: usize = 0;

    for index in 0..entry_count {
        let mut entry = archive.by_index(index).map_err(|e| InstallError::Archive {
            message: format!("failed to read archive entry {index}: {e}"),
        })?;
        let raw_name = entry.name().replace('\\', "/");

        total_size = total_size.saturating_add(entry.size());
        if total_size > MAX_EXTRACTED_SIZE {
            return Err(InstallError::Archive {
                message: format!(
                    "archive exceeds maximum extracted size ({MAX_EXTRACTED_SIZE} bytes)"
                ),
            });
        }

        // Containment is judged on the name as stored, before any rewrite.
        validate_entry_path(&raw_name, &dest_root)?;

        let effective_name = rewrite_git_build_prefix(&raw_name, plugin_id);
        let target = normalize_lexically(&dest_root.join(&effective_name));

        if entry.is_dir() {
            ensure_within_root(&target, &canonical_root, &raw_name)?;
            create_dirs(&target)?;
            continue;
        }

        let parent = target.parent().unwrap_or(dest_root.as_path());
        ensure_within_root(parent, &canonical_root, &raw_name)?;
        create_dirs(parent)?;
        if is_symlink(&target) {
            // An earlier entry put a link here; writing would follow it.
            return Err(InstallError::PathTraversal { path: raw_name });
        }

        let mode = entry.unix_mode();
        if mode.is_some_and(|m| m & FILE_TYPE_MASK == SYMLINK_TYPE) {
            if let Some(warning) =
                extract_symlink(&mut entry, &target, &canonical_install_dir, allow_symlinks)
            {
                warn!(plugin_id, entry = %raw_name, %warning, "archive entry skipped");
                warnings.push(warning);
            }
            continue;
        }

        write_file(&mut entry, &target, &raw_name)?;
        set_mode(&target, file_mode(&effective_name, mode))?;
        files = files.saturating_add(1);
    }

    info!(
        plugin_id,
        files,
        warnings = warnings.len(),
        install_dir = %install_dir.display(),
        "archive extracted"
    );

    Ok(Extraction {
        install_dir,
        warnings,
    })
}

/// Check a raw entry name against the destination root.
fn validate_entry_path(raw_name: &str, dest_root: &Path) -> InstallResult<()> {
    let traversal = || InstallError::PathTraversal {
        path: raw_name.to_owned(),
    };
    let entry = Path::new(raw_name);

    if entry.is_absolute() || entry.has_root() {
        return Err(traversal());
    }
    if entry
        .components()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(traversal());
    }
    if matches!(entry.components().next(), Some(Component::ParentDir)) {
        return Err(traversal());
    }

    // The joined path must be strictly below the root.
    let joined = normalize_lexically(&dest_root.join(entry));
    if joined == dest_root || !joined.starts_with(dest_root) {
        return Err(traversal());
    }
    Ok(())
}

/// Rewrite a leading `[A-Za-z0-9_.-]*/` segment to `<plugin_id>/`.
///
/// Source snapshots wrap everything in a directory named after the repo and
/// commit; installed plugins always live under their ID.
fn rewrite_git_build_prefix(name: &str, plugin_id: &str) -> String {
    let Some((first, rest)) = name.split_once('/') else {
        return name.to_owned();
    };
    let is_ref_segment = first
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if is_ref_segment {
        format!("{plugin_id}/{rest}")
    } else {
        name.to_owned()
    }
}

/// Fail if the deepest existing ancestor of `path` resolves outside the root.
fn ensure_within_root(path: &Path, canonical_root: &Path, raw_name: &str) -> InstallResult<()> {
    let mut current = path;
    loop {
        match current.canonicalize() {
            Ok(resolved) if resolved.starts_with(canonical_root) => return Ok(()),
            Ok(_) => break,
            Err(_) => match current.parent() {
                Some(parent) => current = parent,
                None => break,
            },
        }
    }
    Err(InstallError::PathTraversal {
        path: raw_name.to_owned(),
    })
}

fn extract_symlink(
    entry: &mut impl Read,
    link: &Path,
    install_dir: &Path,
    allow_symlinks: bool,
) -> Option<ExtractWarning> {
    if !allow_symlinks {
        return Some(ExtractWarning::SymlinkSkipped {
            path: link.to_path_buf(),
        });
    }

    let mut raw_target = String::new();
    if let Err(e) = entry.read_to_string(&mut raw_target) {
        return Some(ExtractWarning::SymlinkFailed {
            path: link.to_path_buf(),
            reason: format!("unreadable link target: {e}"),
        });
    }
    let target = raw_target.trim();
    if target.is_empty() {
        return Some(ExtractWarning::SymlinkFailed {
            path: link.to_path_buf(),
            reason: "empty link target".to_owned(),
        });
    }

    let target_path = Path::new(target);
    let link_dir = link.parent().unwrap_or(install_dir);
    let contained = resolve_link_target(link_dir, target_path)
        .is_some_and(|resolved| resolved.starts_with(install_dir));
    if !contained {
        return Some(ExtractWarning::SymlinkEscapes {
            path: link.to_path_buf(),
            target: target.to_owned(),
        });
    }

    if fs::symlink_metadata(link).is_ok()
        && let Err(e) = fs::remove_file(link)
    {
        return Some(ExtractWarning::SymlinkFailed {
            path: link.to_path_buf(),
            reason: format!("could not replace existing entry: {e}"),
        });
    }

    match create_symlink(target_path, link) {
        Ok(()) => {
            debug!(link = %link.display(), target, "created symlink");
            None
        },
        Err(e) => Some(ExtractWarning::SymlinkFailed {
            path: link.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

/// Where a link in `link_dir` pointing at `target` resolves right now.
///
/// The parent is canonicalized and the target walked one component at a
/// time, following links created by earlier entries. `..` is only honored
/// directly under real directories: after a link or a missing component a
/// later entry could change what it climbs out of. Returns `None` for
/// absolute targets, dangling links, and such `..` segments.
fn resolve_link_target(link_dir: &Path, target: &Path) -> Option<PathBuf> {
    let mut resolved = link_dir.canonicalize().ok()?;
    let mut settled = true;
    for component in target.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !settled {
                    return None;
                }
                resolved.pop();
            },
            Component::Normal(name) => {
                let next = resolved.join(name);
                match fs::symlink_metadata(&next) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        resolved = next.canonicalize().ok()?;
                        settled = false;
                    },
                    Ok(_) => resolved = next,
                    Err(_) => {
                        resolved = next;
                        settled = false;
                    },
                }
            },
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(resolved)
}

fn write_file(entry: &mut impl Read, target: &Path, raw_name: &str) -> InstallResult<()> {
    let mut out = File::create(target).map_err(|e| InstallError::from_io(target, e))?;
    io::copy(entry, &mut out).map_err(|e| {
        if e.kind() == io::ErrorKind::InvalidData {
            InstallError::Archive {
                message: format!("corrupt archive entry {raw_name}: {e}"),
            }
        } else {
            InstallError::from_io(target, e)
        }
    })?;
    Ok(())
}

/// Permission bits for an extracted file.
///
/// Backend binaries are always executable. Otherwise only the stored
/// permission bits are kept; special bits are dropped.
fn file_mode(effective_name: &str, stored: Option<u32>) -> u32 {
    if is_backend_executable(effective_name) {
        return EXECUTABLE_MODE;
    }
    match stored.map(|m| m & PERMISSION_BITS) {
        Some(0) | None => DEFAULT_FILE_MODE,
        Some(bits) => bits,
    }
}

fn remove_existing(install_dir: &Path) -> InstallResult<()> {
    match fs::remove_dir_all(install_dir) {
        Ok(()) => {
            debug!(path = %install_dir.display(), "removed previous install");
            Ok(())
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallError::from_io(install_dir, e)),
    }
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// Collapse `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(unix)]
fn create_dirs(dir: &Path) -> InstallResult<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
        .map_err(|e| InstallError::from_io(dir, e))
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path) -> InstallResult<()> {
    let _ = DIR_MODE;
    fs::create_dir_all(dir).map_err(|e| InstallError::from_io(dir, e))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> InstallResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| InstallError::from_io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> InstallResult<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_symlink(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}
