//! Platform keys used to filter catalog versions.
//!
//! The registry identifies build targets as `<os>-<arch>` using Go-style
//! names (`darwin`, `amd64`, `arm64`), plus the sentinel `any`.

use std::fmt;

/// Catalog key matching every platform.
pub const ANY_PLATFORM: &str = "any";

/// Suffixes of plugin backend binaries that must be executable after
/// extraction, one per supported `<os>_<arch>` build.
const EXECUTABLE_SUFFIXES: &[&str] = &[
    "_linux_amd64",
    "_linux_arm",
    "_linux_arm64",
    "_darwin_amd64",
    "_darwin_arm64",
    "_freebsd_amd64",
    "_windows_amd64.exe",
];

/// An operating system and CPU architecture pair.
///
/// Passed explicitly through resolution and request headers so that tests can
/// resolve for any platform without touching process-level state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Platform {
    os: String,
    arch: String,
}

impl Platform {
    /// Create a platform from registry-style names (e.g. `"linux"`, `"arm64"`).
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// The platform this process is running on.
    #[must_use]
    pub fn current() -> Self {
        Self::new(
            registry_os(std::env::consts::OS),
            registry_arch(std::env::consts::ARCH),
        )
    }

    /// Operating system name.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Architecture name.
    #[must_use]
    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Suffix a backend binary built for this platform carries.
    #[must_use]
    pub fn executable_suffix(&self) -> String {
        let exe = if self.os == "windows" { ".exe" } else { "" };
        format!("_{}_{}{exe}", self.os, self.arch)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Whether an extracted path names a plugin backend binary.
#[must_use]
pub fn is_backend_executable(path: &str) -> bool {
    EXECUTABLE_SUFFIXES
        .iter()
        .any(|suffix| path.ends_with(suffix))
}

fn registry_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

fn registry_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}
