//! Error types for casts, transforms and joins

use thiserror::Error;

use croissant_core::DataType;

/// Result type for casts, transforms and joins
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for casts, transforms and joins
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] croissant_core::Error),

    /// A value could not be coerced to the declared type
    #[error("Cannot cast {value} ({kind}) to {data_type}: {reason}")]
    Cast {
        /// The offending value, as text
        value: String,
        /// Runtime type of the value
        kind: &'static str,
        /// Declared type
        data_type: DataType,
        /// What went wrong
        reason: String,
    },

    /// Malformed bounding box
    #[error("Bounding box error: {0}")]
    BoundingBox(String),

    /// Unparsable date or date-time
    #[error("Date error: {0}")]
    Date(String),

    /// Invalid regular expression in a transform
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid JSON path in a transform or extract
    #[error("JSON path error: {0}")]
    JsonPath(String),

    /// Malformed `replace` transform
    #[error("Replace error: {0}")]
    Replace(String),

    /// Image decoding error
    #[error("Image error: {0}")]
    Image(String),

    /// The two sides of a join could not be told apart
    #[error("Join error: {0}")]
    Join(String),
}
