//! Paths of files handed from one operation to the next

use std::path::{Path, PathBuf};

/// A file on disk together with its path relative to the resource root
///
/// `fullpath` is what include patterns match against and what the `fullpath` file
/// property exposes; `filepath` is where the bytes actually are.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilePath {
    /// Location on disk
    pub filepath: PathBuf,
    /// Path relative to the download/extract/local root
    pub fullpath: PathBuf,
}

impl FilePath {
    /// Create a new file path
    pub fn new(filepath: impl Into<PathBuf>, fullpath: impl Into<PathBuf>) -> Self {
        Self {
            filepath: filepath.into(),
            fullpath: fullpath.into(),
        }
    }

    /// Path whose relative part is computed against `root`
    ///
    /// Falls back to the absolute path when `filepath` is not under `root`.
    pub fn under_root(filepath: impl Into<PathBuf>, root: &Path) -> Self {
        let filepath = filepath.into();
        let fullpath = filepath
            .strip_prefix(root)
            .map_or_else(|_| filepath.clone(), Path::to_path_buf);
        Self { filepath, fullpath }
    }

    /// Final component of the file name
    pub fn filename(&self) -> String {
        self.filepath
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `filepath` as a string
    pub fn filepath_str(&self) -> String {
        self.filepath.to_string_lossy().into_owned()
    }

    /// `fullpath` as a string with forward slashes
    pub fn fullpath_str(&self) -> String {
        self.fullpath.to_string_lossy().replace('\\', "/")
    }
}
