//! Error types for Croissant manifests

use std::io;
use thiserror::Error;

use crate::issues::ValidationReport;

/// Result type for manifest and structure graph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for manifest and structure graph operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The manifest is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The manifest failed validation; carries every collected issue
    #[error("{0}")]
    Validation(ValidationReport),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A value could not be coerced to the declared type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// A column needed by an operation is absent from its input
    #[error(
        "Column \"{column}\" does not exist in node \"{node}\". Available columns: {available:?}"
    )]
    MissingColumn {
        /// Node whose data was expected to hold the column
        node: String,
        /// Name of the missing column
        column: String,
        /// Columns that were actually present
        available: Vec<String>,
    },

    /// Feature not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
