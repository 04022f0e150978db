//! Operations of an execution plan and the values they exchange

use std::fmt;

use croissant_core::{FilePath, NodeId, Table};

use crate::error::{Error, Result};

/// Index of an operation in the operation graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub(crate) usize);

impl OperationId {
    /// Position in the operation graph
    pub fn index(self) -> usize {
        self.0
    }
}

/// What an operation does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Single entry point feeding every operation without another predecessor
    Init,
    /// Resolve a FileObject to a local file: mapping override, local path or download
    Download,
    /// Unpack an archive FileObject into the extraction cache
    Extract,
    /// Root directory of a FileSet that is not contained in an archive
    LocalDirectory,
    /// Select files of a FileSet with glob patterns
    FilterFiles {
        /// Include patterns
        includes: Vec<String>,
        /// Exclude patterns
        excludes: Vec<String>,
    },
    /// Merge several file lists into one
    Concatenate,
    /// Parse the files of a FileObject or FileSet into a table
    Read,
    /// Inline rows of a RecordSet
    Data,
    /// Left-join the tables feeding a RecordSet
    Join,
    /// Extract, transform and cast the fields of a RecordSet, one record per row
    ReadFields,
}

impl OperationKind {
    /// Name of the operation kind
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Init => "Init",
            OperationKind::Download => "Download",
            OperationKind::Extract => "Extract",
            OperationKind::LocalDirectory => "LocalDirectory",
            OperationKind::FilterFiles { .. } => "FilterFiles",
            OperationKind::Concatenate => "Concatenate",
            OperationKind::Read => "Read",
            OperationKind::Data => "Data",
            OperationKind::Join => "Join",
            OperationKind::ReadFields => "ReadFields",
        }
    }
}

/// One step of the plan, derived from a structure graph node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// What the operation does
    pub kind: OperationKind,
    /// Structure graph node the operation was derived from
    pub node: NodeId,
    /// Uid of that node, for display
    pub uid: String,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind.name(), self.uid)
    }
}

/// Result of an operation, consumed by its successors
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Output {
    /// No data (the entry point)
    #[default]
    Nothing,
    /// Files or directories on disk
    Files(Vec<FilePath>),
    /// Tabular data
    Table(Table),
}

impl Output {
    /// Files carried by the output
    pub fn into_files(self) -> Result<Vec<FilePath>> {
        match self {
            Output::Nothing => Ok(Vec::new()),
            Output::Files(files) => Ok(files),
            Output::Table(_) => Err(Error::Plan("expected files, got a table".into())),
        }
    }

    /// Table carried by the output
    pub fn into_table(self) -> Result<Table> {
        match self {
            Output::Nothing => Ok(Table::new()),
            Output::Table(table) => Ok(table),
            Output::Files(_) => Err(Error::Plan("expected a table, got files".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let filter = OperationKind::FilterFiles {
            includes: vec!["*.csv".into()],
            excludes: Vec::new(),
        };
        assert_eq!(filter.name(), "FilterFiles");
        assert_eq!(OperationKind::ReadFields.name(), "ReadFields");
    }

    #[test]
    fn test_output_conversions() {
        assert_eq!(Output::Nothing.into_table().unwrap(), Table::new());
        assert!(Output::Files(Vec::new()).into_table().is_err());
        assert!(Output::Table(Table::new()).into_files().is_err());
    }
}
