//! Error types for readers, downloads and archives

use std::path::PathBuf;

use thiserror::Error;

/// Result type for readers, downloads and archives
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for readers, downloads and archives
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] croissant_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Parquet format error
    #[cfg(feature = "parquet")]
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON format error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Zip archive error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Invalid glob pattern
    #[error("Glob error: {0}")]
    Glob(#[from] glob::PatternError),

    /// Directory traversal error
    #[error("Directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Download failure
    #[error("Could not download {url}: {reason}")]
    Download {
        /// URL being fetched
        url: String,
        /// What went wrong
        reason: String,
    },

    /// Checksum mismatch
    #[error("Hash of file {} does not match: expected {algorithm} {expected}, got {actual}", path.display())]
    Checksum {
        /// File that was hashed
        path: PathBuf,
        /// Hash algorithm
        algorithm: &'static str,
        /// Declared checksum
        expected: String,
        /// Computed checksum, hex encoded
        actual: String,
    },

    /// Format error
    #[error("Format error: {0}")]
    Format(String),

    /// Unsupported operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}
