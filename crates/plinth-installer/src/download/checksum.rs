//! SHA-256 hashing and digest verification for downloaded archives.
//!
//! Registry checksums are lowercase or uppercase hex. Comparison happens on
//! the decoded bytes in constant time.

use std::io::{self, Write};

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{InstallError, InstallResult};

/// Writer adapter that hashes every byte it forwards.
///
/// Lets the download stream be written and hashed in one pass.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Hex digest of everything written so far, plus the inner writer.
    pub fn finish(self) -> (String, W) {
        (hex::encode(self.hasher.finalize()), self.inner)
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        // Only hash what actually reached the inner writer.
        self.hasher.update(buf.get(..written).unwrap_or(buf));
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hex SHA-256 of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compare a registry checksum against a computed hex digest.
///
/// An `expected` value that is not valid hex can never match and is reported
/// as a mismatch.
///
/// # Errors
///
/// Returns [`InstallError::ChecksumMismatch`] when the digests differ.
pub fn verify_checksum(expected: &str, actual: &str) -> InstallResult<()> {
    let mismatch = || InstallError::ChecksumMismatch {
        expected: expected.to_owned(),
        actual: actual.to_owned(),
    };

    let expected_bytes = hex::decode(expected.trim()).map_err(|_| mismatch())?;
    let actual_bytes = hex::decode(actual).map_err(|_| mismatch())?;

    if bool::from(expected_bytes.ct_eq(&actual_bytes)) {
        Ok(())
    } else {
        Err(mismatch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    // sha256("hello world")
    const HELLO: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn hashing_writer_matches_one_shot_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        let (digest, inner) = writer.finish();

        assert_eq!(digest, HELLO);
        assert_eq!(inner, b"hello world");
        assert_eq!(sha256_hex(b"hello world"), HELLO);
    }

    #[test]
    fn verify_accepts_any_hex_case() {
        verify_checksum(HELLO, HELLO).unwrap();
        verify_checksum(&HELLO.to_uppercase(), HELLO).unwrap();
    }

    #[test]
    fn verify_rejects_flipped_byte() {
        let mut tampered = b"hello world".to_vec();
        tampered[0] ^= 1;
        let err = verify_checksum(HELLO, &sha256_hex(&tampered)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChecksumMismatch);
    }

    #[test]
    fn verify_rejects_garbage_and_truncated_digests() {
        assert!(verify_checksum("not-hex", HELLO).is_err());
        assert!(verify_checksum(&HELLO[..32], HELLO).is_err());
    }
}
