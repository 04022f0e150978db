//! Operation graph compiler and execution engine for Croissant datasets
//!
//! A [`Dataset`] validates a manifest into a structure graph, compiles it into an
//! [`OperationGraph`] and hands out lazy [`Records`] iterators. Downloads run in
//! parallel before anything is read; the rest of the plan runs either as a stream,
//! one file at a time, or sequentially when joins or shared inputs require
//! materialized intermediate tables.

#![warn(missing_docs)]

pub mod dataset;
pub mod error;
pub mod fields;
pub mod filters;
pub mod operation;
pub mod plan;

mod executor;
mod sequential;
mod streaming;

// Re-export key types for convenience
pub use dataset::{Dataset, Manifest, Records};
pub use error::{Error, Result};
pub use fields::{RecordSetReader, Rows};
pub use filters::{capture_one_capturing_group, regex_to_glob};
pub use operation::{Operation, OperationId, OperationKind, Output};
pub use plan::OperationGraph;

pub use croissant_core::{DatasetConfig, ExecutionStrategy, Record, Value};
