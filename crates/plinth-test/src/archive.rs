//! In-memory zip archive builder.
//!
//! Entry names are written exactly as given, so hostile names such as
//! `../../etc/passwd` can be produced for extraction tests.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Builder for zip archives used as plugin fixtures.
pub struct ZipFixture {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl Default for ZipFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipFixture {
    /// Start an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add a regular file with mode `0644`.
    #[must_use]
    pub fn file(self, name: &str, contents: impl AsRef<[u8]>) -> Self {
        self.file_with_mode(name, contents, 0o644)
    }

    /// Add a regular file with explicit Unix permission bits.
    ///
    /// # Panics
    ///
    /// Panics if the entry cannot be written (e.g. a duplicate name).
    #[must_use]
    pub fn file_with_mode(mut self, name: &str, contents: impl AsRef<[u8]>, mode: u32) -> Self {
        let options = SimpleFileOptions::default().unix_permissions(mode);
        self.writer
            .start_file(name, options)
            .expect("failed to start zip entry");
        self.writer
            .write_all(contents.as_ref())
            .expect("failed to write zip entry");
        self
    }

    /// Add a directory entry. `name` should end in `/`.
    ///
    /// # Panics
    ///
    /// Panics if the entry cannot be written.
    #[must_use]
    pub fn dir(mut self, name: &str) -> Self {
        self.writer
            .add_directory(name, SimpleFileOptions::default())
            .expect("failed to add zip directory");
        self
    }

    /// Add a symlink entry whose content is `target`.
    ///
    /// # Panics
    ///
    /// Panics if the entry cannot be written.
    #[must_use]
    pub fn symlink(mut self, name: &str, target: &str) -> Self {
        self.writer
            .add_symlink(name, target, SimpleFileOptions::default())
            .expect("failed to add zip symlink");
        self
    }

    /// Finish the archive and return its bytes.
    ///
    /// # Panics
    ///
    /// Panics if the central directory cannot be written.
    #[must_use]
    pub fn finish(self) -> Vec<u8> {
        self.writer
            .finish()
            .expect("failed to finish zip archive")
            .into_inner()
    }

    /// Finish the archive and write it to `path`, returning the path.
    ///
    /// # Panics
    ///
    /// Panics if the archive or the file cannot be written.
    pub fn write_to(self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        std::fs::write(path, self.finish()).expect("failed to write zip fixture");
        path.to_path_buf()
    }
}
