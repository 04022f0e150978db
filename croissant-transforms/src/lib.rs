//! Type casts, field transforms and joins for Croissant record sets
//!
//! Everything here is a pure function over [`croissant_core::Value`]s and
//! [`croissant_core::Table`]s. The execution engine calls into this crate once it has
//! read raw tables from disk.

#![warn(missing_docs)]

pub mod bounding_box;
pub mod bundle;
pub mod cast;
pub mod dates;
pub mod error;
pub mod image;
pub mod join;
pub mod transform;

// Re-export key types for convenience
pub use bundle::{bundle, bundle_row, bundled_len};
pub use cast::cast;
pub use error::{Error, Result};
pub use join::{left_join, orient, JoinKey, Orientation};
pub use transform::{apply_transforms, TransformChain};
