//! Error types for planning and executing a dataset

use thiserror::Error;

/// Result type for planning and execution
pub type Result<T> = std::result::Result<T, Error>;

fn unknown_record_set(name: &str, available: &[String]) -> String {
    let hint = if available.is_empty() {
        "This dataset declares no record sets.".to_string()
    } else {
        format!("Possible RecordSets: {available:?}")
    };
    format!("did not find any record set with the name `{name}`. {hint}")
}

/// Error type for planning and execution
#[derive(Error, Debug)]
pub enum Error {
    /// Manifest or structure graph error, including validation failures
    #[error("Core error: {0}")]
    Core(#[from] croissant_core::Error),

    /// Error while downloading, extracting or reading files
    #[error("Reader error: {0}")]
    Readers(#[from] croissant_readers::Error),

    /// Error while transforming, casting or joining values
    #[error("Transform error: {0}")]
    Transforms(#[from] croissant_transforms::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The download worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// An operation failed while generating records
    #[error(
        "An error occurred during the {strategy} generation of the dataset, more \
         specifically during the operation {operation}: {source}"
    )]
    Generation {
        /// `sequential` or `streaming`
        strategy: &'static str,
        /// Display identity of the failing operation, e.g. `Read(ratings.csv)`
        operation: String,
        /// Underlying failure
        source: Box<Error>,
    },

    /// The requested RecordSet is not declared
    #[error("{}", unknown_record_set(.name, .available))]
    UnknownRecordSet {
        /// Requested name
        name: String,
        /// Declared RecordSet names
        available: Vec<String>,
    },

    /// Record filters could not be applied
    #[error("Invalid filters: {0}")]
    Filter(String),

    /// The operation graph is malformed
    #[error("Operation graph error: {0}")]
    Plan(String),

    /// The plan requires something this build or dataset cannot do
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
