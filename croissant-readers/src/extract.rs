//! Archive extraction into the cache
//!
//! Archives are unpacked into a temporary directory next to their final location
//! and renamed into place, so an existing extraction directory is always complete.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::{Error, Result};

const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

/// Kind of archive, detected from content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Zip archive
    Zip,
    /// Uncompressed tar
    Tar,
    /// Gzip-compressed tar
    TarGz,
    /// Single gzip-compressed file
    Gzip,
}

fn read_prefix<R: Read>(reader: R, len: usize) -> io::Result<Vec<u8>> {
    let mut prefix = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut prefix)?;
    Ok(prefix)
}

fn is_tar_header(prefix: &[u8]) -> bool {
    prefix.get(TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()) == Some(TAR_MAGIC)
}

/// Detect the archive kind of a file from its first bytes
pub fn detect(path: &Path) -> Result<Option<ArchiveKind>> {
    let prefix = read_prefix(File::open(path)?, 512)?;
    if prefix.starts_with(b"PK\x03\x04") || prefix.starts_with(b"PK\x05\x06") {
        return Ok(Some(ArchiveKind::Zip));
    }
    if prefix.starts_with(&[0x1f, 0x8b]) {
        let inner = read_prefix(GzDecoder::new(File::open(path)?), 512)?;
        return Ok(Some(if is_tar_header(&inner) {
            ArchiveKind::TarGz
        } else {
            ArchiveKind::Gzip
        }));
    }
    if is_tar_header(&prefix) {
        return Ok(Some(ArchiveKind::Tar));
    }
    Ok(None)
}

fn unpack(archive: &Path, kind: ArchiveKind, target: &Path, name: &str) -> Result<()> {
    let reader = BufReader::new(File::open(archive)?);
    match kind {
        ArchiveKind::Zip => zip::ZipArchive::new(reader)?.extract(target)?,
        ArchiveKind::Tar => tar::Archive::new(reader).unpack(target)?,
        ArchiveKind::TarGz => tar::Archive::new(GzDecoder::new(reader)).unpack(target)?,
        ArchiveKind::Gzip => {
            let filename = name.strip_suffix(".gz").unwrap_or(name);
            let mut output = File::create(target.join(filename))?;
            io::copy(&mut GzDecoder::new(reader), &mut output)?;
        }
    }
    Ok(())
}

/// Extracts archives into `extract_dir`
#[derive(Debug, Clone)]
pub struct Extractor {
    extract_dir: PathBuf,
}

impl Extractor {
    /// Create an extractor writing into `extract_dir`
    pub fn new(extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            extract_dir: extract_dir.into(),
        }
    }

    /// Directory holding the extractions
    pub fn extract_dir(&self) -> &Path {
        &self.extract_dir
    }

    /// Extract `archive` into `extract_dir/key` unless already extracted
    ///
    /// `name` is the file name of the archive as declared in the manifest; a single
    /// gzip-compressed file is written under that name without its `.gz` suffix.
    pub fn extract(&self, archive: &Path, key: &str, name: &str) -> Result<PathBuf> {
        let dest = self.extract_dir.join(key);
        if dest.exists() {
            debug!(path = %dest.display(), "extraction cache hit");
            return Ok(dest);
        }
        let kind = detect(archive)?.ok_or_else(|| {
            Error::Unsupported(format!(
                "unsupported compression method for file: {}",
                archive.display()
            ))
        })?;
        fs::create_dir_all(&self.extract_dir)?;
        let staging = tempfile::tempdir_in(&self.extract_dir)?;
        unpack(archive, kind, staging.path(), name)?;
        if let Err(e) = fs::rename(staging.path(), &dest) {
            if !dest.exists() {
                return Err(Error::Io(e));
            }
        }
        info!(
            archive = %archive.display(),
            path = %dest.display(),
            kind = ?kind,
            "archive extracted"
        );
        Ok(dest)
    }
}
