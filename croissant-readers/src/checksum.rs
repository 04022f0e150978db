//! File checksums
//!
//! Manifests declare checksums either hex encoded or base64 encoded; both are
//! accepted when verifying.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use md5::Md5;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// MD5
    Md5,
    /// SHA-256
    Sha256,
}

impl Algorithm {
    /// Lowercase name of the algorithm
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha256 => "sha256",
        }
    }
}

fn digest<D: Digest>(path: &Path) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_vec())
}

/// Hash the content of a file
pub fn hash_file(path: &Path, algorithm: Algorithm) -> Result<Vec<u8>> {
    match algorithm {
        Algorithm::Md5 => digest::<Md5>(path),
        Algorithm::Sha256 => digest::<Sha256>(path),
    }
}

fn matches(expected: &str, actual: &[u8]) -> bool {
    let expected = expected.trim();
    if expected.eq_ignore_ascii_case(&hex::encode(actual)) {
        return true;
    }
    STANDARD
        .decode(expected)
        .is_ok_and(|decoded| decoded == actual)
}

/// Verify `path` against a declared checksum
///
/// Directories are never hashed and always pass.
pub fn verify(path: &Path, algorithm: Algorithm, expected: &str) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    let actual = hash_file(path, algorithm)?;
    if matches(expected, &actual) {
        Ok(())
    } else {
        Err(Error::Checksum {
            path: path.to_path_buf(),
            algorithm: algorithm.name(),
            expected: expected.to_string(),
            actual: hex::encode(actual),
        })
    }
}

/// Verify against whichever of `md5` and `sha256` is declared
///
/// `md5` wins when both are present. Nothing is checked when neither is.
pub fn verify_declared(path: &Path, md5: Option<&str>, sha256: Option<&str>) -> Result<()> {
    match (md5, sha256) {
        (Some(expected), _) => verify(path, Algorithm::Md5, expected),
        (None, Some(expected)) => verify(path, Algorithm::Sha256, expected),
        (None, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // md5("hello") and sha256("hello")
    const MD5_HEX: &str = "5d41402abc4b2a76b9719d911017c592";
    const SHA256_HEX: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn hello() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        file
    }

    #[test]
    fn test_hex_checksums() {
        let file = hello();
        verify(file.path(), Algorithm::Md5, MD5_HEX).unwrap();
        verify(file.path(), Algorithm::Sha256, &SHA256_HEX.to_uppercase()).unwrap();
    }

    #[test]
    fn test_base64_checksum() {
        let file = hello();
        let encoded = STANDARD.encode(hex::decode(SHA256_HEX).unwrap());
        verify(file.path(), Algorithm::Sha256, &encoded).unwrap();
    }

    #[test]
    fn test_mismatch_reports_both_hashes() {
        let file = hello();
        let err = verify_declared(file.path(), Some("00"), None).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("expected md5 00"));
        assert!(message.contains(MD5_HEX));
    }

    #[test]
    fn test_directories_and_undeclared_pass() {
        let dir = tempfile::tempdir().unwrap();
        verify(dir.path(), Algorithm::Md5, "00").unwrap();
        verify_declared(hello().path(), None, None).unwrap();
    }
}
