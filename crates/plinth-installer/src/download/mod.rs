//! Archive downloads.
//!
//! Sources are either a local file (copied as-is, trusted) or a URL, which is
//! streamed straight into a temp file through a SHA-256 hasher. A body that
//! breaks off mid-stream is retried from scratch a bounded number of times.
//! Every other failure is returned immediately.

pub mod checksum;

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::checksum::{HashingWriter, verify_checksum};
use crate::error::{InstallError, InstallResult};
use crate::registry::{cancellable, error_for_status, transport_error};

/// Attempts made against a corrupt response stream before giving up.
pub const MAX_ATTEMPTS: u32 = 3;

/// An archive in a temp file, removed when dropped.
#[derive(Debug)]
pub struct DownloadedArchive {
    file: NamedTempFile,
    sha256: String,
    source: String,
    local: bool,
}

impl DownloadedArchive {
    /// Temp file holding the archive.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Hex SHA-256 of the archive bytes.
    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// URL or path the archive came from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the archive was copied from the local filesystem.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Check the archive against a registry checksum.
    ///
    /// `None` or an empty string skips verification. On mismatch the temp
    /// file is deleted.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::ChecksumMismatch`] if the digests differ.
    pub fn verify(self, expected: Option<&str>) -> InstallResult<Self> {
        match expected.filter(|e| !e.is_empty()) {
            Some(expected) => {
                verify_checksum(expected, &self.sha256)?;
                debug!(source = %self.source, sha256 = %self.sha256, "checksum verified");
            },
            None => debug!(source = %self.source, "no checksum published, skipping verification"),
        }
        Ok(self)
    }
}

/// Outcome of a single streaming attempt that did not succeed.
enum AttemptError {
    /// Body broke off mid-stream; worth another try.
    Corrupt(String),
    /// Anything else.
    Fatal(InstallError),
}

/// Fetches plugin archives into temp files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader on a shared client.
    ///
    /// The client should have no overall request timeout.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch `source` and verify it against `expected`.
    ///
    /// Local files are trusted: their checksum is computed but not enforced.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch) and [`DownloadedArchive::verify`].
    pub async fn download(
        &self,
        source: &str,
        expected: Option<&str>,
        cancel: &CancellationToken,
    ) -> InstallResult<DownloadedArchive> {
        let archive = self.fetch(source, cancel).await?;
        if archive.is_local() {
            return Ok(archive);
        }
        archive.verify(expected)
    }

    /// Fetch `source` into a temp file without verifying it.
    ///
    /// # Errors
    ///
    /// - [`InstallError::CorruptResponse`] after [`MAX_ATTEMPTS`] broken streams
    /// - [`InstallError::Transport`], [`InstallError::HttpClient`],
    ///   [`InstallError::HttpServer`] on the first failure of that kind
    /// - [`InstallError::Cancelled`] if `cancel` fires
    /// - filesystem errors writing the temp file
    pub async fn fetch(
        &self,
        source: &str,
        cancel: &CancellationToken,
    ) -> InstallResult<DownloadedArchive> {
        let local = Path::new(source);
        if local.exists() {
            return copy_local(local);
        }
        self.fetch_remote(source, cancel).await
    }

    async fn fetch_remote(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> InstallResult<DownloadedArchive> {
        let mut file = new_temp_file()?;
        let path = file.path().to_path_buf();

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            debug!(url, attempt, "downloading archive");

            match self
                .stream_once(url, file.as_file_mut(), &path, cancel)
                .await
            {
                Ok((sha256, bytes)) => {
                    info!(url, bytes, attempts = attempt, "archive downloaded");
                    return Ok(DownloadedArchive {
                        file,
                        sha256,
                        source: url.to_owned(),
                        local: false,
                    });
                },
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Corrupt(message)) => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(InstallError::CorruptResponse {
                            url: url.to_owned(),
                            attempts: attempt,
                            message,
                        });
                    }
                    warn!(url, attempt, %message, "corrupt response stream, retrying");
                    rewind(file.as_file_mut()).map_err(|e| InstallError::from_io(&path, e))?;
                },
            }
        }
    }

    /// One GET, streamed through the hasher into `file`.
    async fn stream_once(
        &self,
        url: &str,
        file: &mut File,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(String, u64), AttemptError> {
        let response = cancellable(cancel, self.client.get(url).send())
            .await
            .map_err(AttemptError::Fatal)?
            .map_err(|e| AttemptError::Fatal(transport_error(url, &e)))?;
        let response = error_for_status(response)
            .await
            .map_err(AttemptError::Fatal)?;

        let write_err = |e: io::Error| AttemptError::Fatal(InstallError::from_io(path, e));
        let mut writer = HashingWriter::new(BufWriter::new(file));
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;

        while let Some(chunk) = cancellable(cancel, stream.next())
            .await
            .map_err(AttemptError::Fatal)?
        {
            let chunk = chunk.map_err(|e| AttemptError::Corrupt(e.to_string()))?;
            writer.write_all(&chunk).map_err(write_err)?;
            bytes = bytes.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
        }

        let (sha256, mut buffered) = writer.finish();
        buffered.flush().map_err(write_err)?;
        Ok((sha256, bytes))
    }
}

fn copy_local(source: &Path) -> InstallResult<DownloadedArchive> {
    debug!(path = %source.display(), "copying local archive");

    let mut input = File::open(source).map_err(|e| InstallError::from_io(source, e))?;
    let mut file = new_temp_file()?;
    let dest: PathBuf = file.path().to_path_buf();

    let mut writer = HashingWriter::new(BufWriter::new(file.as_file_mut()));
    io::copy(&mut input, &mut writer).map_err(|e| InstallError::from_io(&dest, e))?;
    let (sha256, mut buffered) = writer.finish();
    buffered
        .flush()
        .map_err(|e| InstallError::from_io(&dest, e))?;
    drop(buffered);

    Ok(DownloadedArchive {
        file,
        sha256,
        source: source.display().to_string(),
        local: true,
    })
}

fn new_temp_file() -> InstallResult<NamedTempFile> {
    tempfile::Builder::new()
        .prefix("plinth-plugin-")
        .suffix(".zip")
        .tempfile()
        .map_err(|e| InstallError::from_io(std::env::temp_dir(), e))
}

fn rewind(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

#[cfg(test)]
mod tests;
