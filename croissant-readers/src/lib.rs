//! File access for Croissant datasets
//!
//! This crate provides the I/O used by the operations of an execution plan:
//! downloading into a content-addressed cache, unpacking archives, selecting files
//! with glob patterns, verifying checksums and parsing files into tables according
//! to their encoding format.

mod error;

#[cfg(feature = "csv")]
pub mod csv;

#[cfg(feature = "parquet")]
pub mod parquet;

pub mod binary;
pub mod checksum;
pub mod download;
pub mod extract;
pub mod filter;
pub mod format;
pub mod json;
pub mod reader;
pub mod text;

pub use checksum::{verify_declared, Algorithm};
pub use download::{cache_key, default_transport, is_url, Downloader, NoTransport, Transport};
pub use error::{Error, Result};
pub use extract::{ArchiveKind, Extractor};
pub use filter::GlobFilter;
pub use format::{EncodingFormat, ReadingMethod};
pub use reader::{attach_paths, read_file, ReadOptions};

#[cfg(feature = "http")]
pub use download::HttpTransport;

#[cfg(feature = "csv")]
pub use self::csv::{read_csv, CsvOptions};

#[cfg(feature = "parquet")]
pub use self::parquet::read_parquet;
