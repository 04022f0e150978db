//! Field extraction: turning the table feeding a RecordSet into typed records

use std::collections::BTreeSet;
use std::fs;
use std::sync::Arc;

use croissant_core::{
    Column, DataType, FileProperty, NodeId, Record, RecordSet, StructureGraph, Table, Value,
};
use croissant_transforms::{bundle_row, bundled_len, cast, TransformChain};

use crate::error::{Error, Result};

/// Separator between a group uid and a column name in joined tables
pub const QUALIFIER: &str = "::";

/// Column name of `column` once the table of `group` has been joined with others
pub fn qualified(group: &str, column: &str) -> String {
    format!("{group}{QUALIFIER}{column}")
}

#[derive(Debug, Clone)]
enum Extraction {
    /// Values are read from a column of the input table
    Column {
        /// Qualified column in the input table
        column: String,
        /// Node whose data should hold the column, for error messages
        node: String,
    },
    /// Whole file contents, read per row from the path column
    Content {
        /// Qualified `filepath` column
        filepath: String,
    },
    /// Record of sub-fields
    Nested(Vec<FieldPlan>),
}

/// How one field is extracted, transformed and cast
#[derive(Debug, Clone)]
pub struct FieldPlan {
    name: String,
    uid: String,
    extraction: Extraction,
    chain: TransformChain,
    data_type: Option<DataType>,
    format: Option<String>,
}

impl FieldPlan {
    fn compile(graph: &StructureGraph, id: NodeId, record_set: NodeId, joined: bool) -> Result<Self> {
        let field = graph
            .field(id)
            .ok_or_else(|| Error::Plan(format!("{} is not a field", graph.node(id).uid())))?;
        let (extraction, chain, format) = if field.sub_fields.is_empty() {
            match &field.source {
                Some(source) => {
                    let group = field.source_node().map(|node| graph.group(node));
                    let column = graph.source_column(source);
                    let column = match group {
                        Some(group) if joined && group != record_set => {
                            qualified(graph.node(group).uid(), &column)
                        }
                        _ => column,
                    };
                    let extraction = Extraction::Column {
                        column,
                        node: source.uid.clone(),
                    };
                    let chain = TransformChain::new(&source.transforms)?;
                    (extraction, chain, source.format().map(str::to_string))
                }
                None => (
                    Extraction::Column {
                        column: field.info.name.clone(),
                        node: graph.node(record_set).uid().to_string(),
                    },
                    TransformChain::default(),
                    None,
                ),
            }
        } else {
            let children = field
                .sub_fields
                .iter()
                .map(|child| Self::compile(graph, *child, record_set, joined))
                .collect::<Result<Vec<_>>>()?;
            (Extraction::Nested(children), TransformChain::default(), None)
        };
        Ok(Self {
            name: field.info.name.clone(),
            uid: field.info.uid.clone(),
            extraction,
            chain,
            data_type: graph.data_type(id).cloned(),
            format,
        })
    }

    /// Output key of the field
    pub fn name(&self) -> &str {
        &self.name
    }

    fn leaves(&self) -> Vec<&FieldPlan> {
        match &self.extraction {
            Extraction::Nested(children) => children.iter().flat_map(FieldPlan::leaves).collect(),
            _ => vec![self],
        }
    }

    fn value(&self, raw: &Record) -> Result<Value> {
        let extracted = match &self.extraction {
            Extraction::Nested(children) => {
                let record = children
                    .iter()
                    .map(|child| Ok((child.name.clone(), child.value(raw)?)))
                    .collect::<Result<Record>>()?;
                return Ok(Value::Record(record));
            }
            Extraction::Column { .. } => raw.get(&self.uid).cloned().unwrap_or_default(),
            Extraction::Content { .. } => match raw.get(&self.uid) {
                Some(Value::Text(path)) => Value::Bytes(fs::read(path)?),
                _ => Value::Null,
            },
        };
        let value = self.chain.apply(extracted);
        match &self.data_type {
            Some(data_type) => Ok(cast(value, data_type, self.format.as_deref())?),
            None => Ok(value),
        }
    }
}

/// Extraction plan of a RecordSet
#[derive(Debug, Clone)]
pub struct RecordSetReader {
    uid: String,
    fields: Arc<[FieldPlan]>,
}

impl RecordSetReader {
    /// Compile the fields of `record_set`
    ///
    /// When `joined` is set the input table is the output of a join and columns are
    /// qualified by the uid of the group they come from.
    pub fn new(graph: &StructureGraph, record_set: NodeId, joined: bool) -> Result<Self> {
        let node: &RecordSet = graph.record_set(record_set).ok_or_else(|| {
            Error::Plan(format!("{} is not a RecordSet", graph.node(record_set).uid()))
        })?;
        let fields = node
            .fields
            .iter()
            .map(|id| FieldPlan::compile(graph, *id, record_set, joined))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            uid: node.info.uid.clone(),
            fields: fields.into(),
        })
    }

    /// Uid of the RecordSet
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Gather the raw column of every field from `table`
    ///
    /// `lines` columns missing from the table are produced here by splitting the
    /// file behind each row; `content` columns are read later, one row at a time.
    pub fn prepare(&self, table: Table) -> Result<Rows> {
        if table.is_empty() {
            return Ok(Rows::empty());
        }
        let mut table = table;
        let mut fields: Vec<FieldPlan> = self.fields.to_vec();
        let mut exploded = BTreeSet::new();
        for field in self.fields.iter().flat_map(FieldPlan::leaves) {
            let Extraction::Column { column, .. } = &field.extraction else {
                continue;
            };
            if table.has_column(column) {
                continue;
            }
            let (prefix, property) = split_qualified(column);
            let filepath = format!("{prefix}{}", FileProperty::Filepath.as_str());
            if !table.has_column(&filepath) {
                continue;
            }
            if property == FileProperty::Content.as_str() {
                for plan in &mut fields {
                    plan.use_lazy_content(&field.uid, &filepath);
                }
            } else if (property == FileProperty::Lines.as_str()
                || property == FileProperty::LineNumbers.as_str())
                && exploded.insert(prefix.to_string())
            {
                table = explode_lines(&table, prefix, &filepath)?;
            }
        }

        let mut columns = Vec::new();
        for field in fields.iter().flat_map(FieldPlan::leaves) {
            let values = match &field.extraction {
                Extraction::Column { column, node } => table.require_column(node, column)?.values().to_vec(),
                Extraction::Content { filepath } => table.require_column(&self.uid, filepath)?.values().to_vec(),
                Extraction::Nested(_) => continue,
            };
            columns.push(Column::new(field.uid.clone(), values));
        }
        let rows = if columns.is_empty() { 0 } else { bundled_len(&columns) };
        Ok(Rows {
            fields: fields.into(),
            columns,
            next: 0,
            rows,
        })
    }

    /// Read every record of `table` into a table keyed by field name
    ///
    /// Used when another RecordSet consumes this one.
    pub fn collect(&self, table: Table) -> Result<Table> {
        let records = self.prepare(table)?.collect::<Result<Vec<_>>>()?;
        Ok(Table::from_records(&records))
    }
}

impl FieldPlan {
    fn use_lazy_content(&mut self, uid: &str, filepath: &str) {
        match &mut self.extraction {
            Extraction::Nested(children) => {
                for child in children {
                    child.use_lazy_content(uid, filepath);
                }
            }
            extraction if self.uid == uid => {
                *extraction = Extraction::Content {
                    filepath: filepath.to_string(),
                };
            }
            _ => {}
        }
    }
}

/// `("group::", "column")` for a qualified name, `("", name)` otherwise
fn split_qualified(column: &str) -> (&str, &str) {
    match column.rfind(QUALIFIER) {
        Some(at) => column.split_at(at + QUALIFIER.len()),
        None => ("", column),
    }
}

/// Repeat each row once per line of the file it points to
fn explode_lines(table: &Table, prefix: &str, filepath: &str) -> Result<Table> {
    let lines_column = format!("{prefix}{}", FileProperty::Lines.as_str());
    let numbers_column = format!("{prefix}{}", FileProperty::LineNumbers.as_str());
    let mut records = Vec::new();
    for row in table.rows() {
        let Some(Value::Text(path)) = row.get(filepath) else {
            records.push(row);
            continue;
        };
        let content = fs::read_to_string(path)?;
        for (number, line) in content.lines().enumerate() {
            let mut record = row.clone();
            record.insert(lines_column.clone(), Value::from(line));
            record.insert(
                numbers_column.clone(),
                Value::Int(i64::try_from(number).unwrap_or(i64::MAX)),
            );
            records.push(record);
        }
    }
    Ok(Table::from_records(&records))
}

/// Lazily produced records of a RecordSet
///
/// Transforms and casts run for one row at a time when the iterator is advanced.
#[derive(Debug)]
pub struct Rows {
    fields: Arc<[FieldPlan]>,
    columns: Vec<Column>,
    next: usize,
    rows: usize,
}

impl Rows {
    /// Iterator producing nothing
    pub fn empty() -> Self {
        Self {
            fields: Arc::from(Vec::new()),
            columns: Vec::new(),
            next: 0,
            rows: 0,
        }
    }
}

impl Iterator for Rows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.rows {
            return None;
        }
        let raw = bundle_row(&self.columns, self.next);
        self.next += 1;
        let record = self
            .fields
            .iter()
            .map(|field| Ok((field.name.clone(), field.value(&raw)?)))
            .collect::<Result<Record>>();
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows.saturating_sub(self.next);
        (left, Some(left))
    }
}
