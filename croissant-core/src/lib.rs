//! Manifest model, issue ledger and structure graph for Croissant datasets
//!
//! This crate holds everything that happens before any byte of data is read: the
//! dataset configuration, the vocabulary of the two supported schema revisions,
//! validation of a manifest into a [`StructureGraph`], and the value and table types
//! that the other crates pass between operations.

#![warn(missing_docs)]

pub mod config;
pub mod data_type;
pub mod error;
pub mod image;
pub mod issues;
pub mod path;
pub mod structure;
pub mod table;
pub mod value;
pub mod vocab;

// Re-export key types for convenience
pub use config::{DatasetConfig, DatasetConfigBuilder, ExecutionStrategy};
pub use data_type::DataType;
pub use error::{Error, Result};
pub use image::{ImageFormat, ImageHandle};
pub use issues::{ContextKind, Issue, IssueContext, Issues, ValidationReport};
pub use path::FilePath;
pub use structure::{
    Field, FileObject, FileProperty, FileSet, Metadata, Node, NodeId, RecordSet, Source,
    SourceKind, StructureGraph, Transform,
};
pub use table::{Column, Table};
pub use value::{Record, Value};
pub use vocab::CroissantVersion;
