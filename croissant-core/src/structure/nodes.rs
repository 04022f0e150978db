//! Typed nodes of the structure graph

use std::fmt;

use serde_json::{Map, Value as JsonValue};

use crate::data_type::DataType;
use crate::issues::IssueContext;
use crate::structure::source::Source;
use crate::vocab::{CroissantVersion, NodeRefs, StrList};

/// Index of a node in the structure graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attributes shared by every node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeInfo {
    /// Unique identifier (`@id` in 1.0, derived from names in 0.8)
    pub uid: String,
    /// Human-readable name
    pub name: String,
    /// Explicit `@id`, if declared
    pub id: Option<String>,
    /// Optional description
    pub description: Option<String>,
    /// `@type` as written in the manifest
    pub raw_type: Option<String>,
    /// Chain of ancestor names for issue reporting
    pub context: IssueContext,
    /// Properties that are not modelled, kept verbatim
    pub extra: Map<String, JsonValue>,
}

/// The dataset as a whole; root of the structure graph
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    /// Shared attributes
    pub info: NodeInfo,
    /// Vocabulary revision the manifest conforms to
    pub version: CroissantVersion,
    /// `@context`, kept verbatim
    pub json_context: Option<JsonValue>,
    /// Whether the dataset changes over time (checksums are not required)
    pub is_live_dataset: bool,
    /// FileObjects and FileSets, in declaration order
    pub distribution: Vec<NodeId>,
    /// RecordSets, in declaration order
    pub record_sets: Vec<NodeId>,
}

impl Metadata {
    /// Name of the dataset
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// `url` of the dataset, if declared
    pub fn url(&self) -> Option<&str> {
        crate::vocab::lookup_str(&self.info.extra, "url")
    }

    /// `license` of the dataset, if declared
    pub fn license(&self) -> Option<&JsonValue> {
        crate::vocab::lookup(&self.info.extra, "license")
    }

    /// `citeAs` (1.0) or `citation` (0.8) of the dataset, if declared
    pub fn citation(&self) -> Option<&JsonValue> {
        crate::vocab::lookup(&self.info.extra, "citeAs")
            .or_else(|| crate::vocab::lookup(&self.info.extra, "citation"))
    }
}

/// A single downloadable file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileObject {
    /// Shared attributes
    pub info: NodeInfo,
    /// URL or local path of the file
    pub content_url: Option<String>,
    /// MIME types
    pub encoding_formats: StrList,
    /// MD5 checksum (hex or base64)
    pub md5: Option<String>,
    /// SHA-256 checksum (hex or base64)
    pub sha256: Option<String>,
    /// Archives or directories this file comes from
    pub contained_in: Option<NodeRefs>,
}

/// A glob-matched collection of files
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileSet {
    /// Shared attributes
    pub info: NodeInfo,
    /// Include glob patterns
    pub includes: StrList,
    /// Exclude glob patterns
    pub excludes: StrList,
    /// MIME types
    pub encoding_formats: StrList,
    /// Archives or directories the files come from
    pub contained_in: Option<NodeRefs>,
}

/// A named table of typed records
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordSet {
    /// Shared attributes
    pub info: NodeInfo,
    /// Top-level fields, in declaration order
    pub fields: Vec<NodeId>,
    /// Inline literal rows
    pub data: Option<JsonValue>,
    /// Key field(s)
    pub key: Option<NodeRefs>,
}

impl RecordSet {
    /// Inline rows, if the RecordSet declares literal data
    pub fn data_rows(&self) -> Option<Vec<&Map<String, JsonValue>>> {
        match &self.data {
            Some(JsonValue::Array(rows)) => Some(rows.iter().filter_map(JsonValue::as_object).collect()),
            _ => None,
        }
    }

    /// Whether the RecordSet carries inline rows
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// One column of a RecordSet, or a sub-field of another field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Field {
    /// Shared attributes
    pub info: NodeInfo,
    /// Owning RecordSet
    pub record_set: Option<NodeId>,
    /// Enclosing field, for sub-fields
    pub parent: Option<NodeId>,
    /// Declared data types
    pub data_types: Vec<DataType>,
    /// `dataType` as written in the manifest
    pub raw_data_type: Option<JsonValue>,
    /// Where values come from
    pub source: Option<Source>,
    /// Foreign key used to join with another resource
    pub references: Option<Source>,
    /// Nested fields
    pub sub_fields: Vec<NodeId>,
    /// Whether the field holds a list of values
    pub repeated: Option<bool>,
    /// Node the source resolves to
    pub(crate) source_node: Option<NodeId>,
    /// Node the reference resolves to
    pub(crate) references_node: Option<NodeId>,
}

impl Field {
    /// Node the source resolves to
    pub fn source_node(&self) -> Option<NodeId> {
        self.source_node
    }

    /// Node the reference resolves to
    pub fn references_node(&self) -> Option<NodeId> {
        self.references_node
    }

    /// Whether the field is a sub-field
    pub fn is_sub_field(&self) -> bool {
        self.parent.is_some()
    }
}

/// A node of the structure graph
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The dataset
    Metadata(Metadata),
    /// A single file
    FileObject(FileObject),
    /// A collection of files
    FileSet(FileSet),
    /// A table of records
    RecordSet(RecordSet),
    /// A column or sub-field
    Field(Field),
}

impl Node {
    /// Shared attributes
    pub fn info(&self) -> &NodeInfo {
        match self {
            Node::Metadata(node) => &node.info,
            Node::FileObject(node) => &node.info,
            Node::FileSet(node) => &node.info,
            Node::RecordSet(node) => &node.info,
            Node::Field(node) => &node.info,
        }
    }

    /// Unique identifier
    pub fn uid(&self) -> &str {
        &self.info().uid
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.info().name
    }

    /// Name of the node type, as used in messages
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Metadata(_) => "Metadata",
            Node::FileObject(_) => "FileObject",
            Node::FileSet(_) => "FileSet",
            Node::RecordSet(_) => "RecordSet",
            Node::Field(_) => "Field",
        }
    }

    /// Whether this is a FileObject or a FileSet
    pub fn is_resource(&self) -> bool {
        matches!(self, Node::FileObject(_) | Node::FileSet(_))
    }

    /// Encoding formats of a resource
    pub fn encoding_formats(&self) -> &[String] {
        match self {
            Node::FileObject(node) => &node.encoding_formats.items,
            Node::FileSet(node) => &node.encoding_formats.items,
            _ => &[],
        }
    }

    /// Containing nodes of a resource
    pub fn contained_in(&self) -> Option<&NodeRefs> {
        match self {
            Node::FileObject(node) => node.contained_in.as_ref(),
            Node::FileSet(node) => node.contained_in.as_ref(),
            _ => None,
        }
    }
}
