//! Structure graph: typed manifest nodes linked by containment and data-flow edges
//!
//! Building happens in two passes. The first instantiates one node per manifest
//! object and runs the checks that only need that node. The second links sources,
//! references and containers, then validates the graph as a whole.

mod graph;
mod nodes;
mod parse;
mod serialize;
mod source;

use std::sync::Arc;

pub use graph::StructureGraph;
pub use nodes::{Field, FileObject, FileSet, Metadata, Node, NodeId, NodeInfo, RecordSet};
pub use parse::MAX_NAME_LENGTH;
pub use source::{normalize_json_path, Extract, FileProperty, Source, SourceKind, Transform};

use crate::config::DatasetConfig;
use crate::error::Result;
use crate::issues::Issues;

/// Build and validate the structure graph of a manifest
pub fn build(
    manifest: &serde_json::Value,
    config: &DatasetConfig,
    issues: Arc<Issues>,
) -> Result<StructureGraph> {
    StructureGraph::build(manifest, config, issues)
}
