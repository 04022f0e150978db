//! In-memory tabular results exchanged between operations
//!
//! A [`Table`] is a list of named columns. Columns are allowed to have different
//! lengths: a JSON document may produce one scalar next to a list of rows. Reading a
//! row broadcasts shorter columns by repeating their last value.

use crate::error::{Error, Result};
use crate::value::{Record, Value};

/// A named column of values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    name: String,
    values: Vec<Value>,
}

impl Column {
    /// Create a new column
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the values of this column
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the column holds no value
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `row`, repeating the last value past the end
    pub fn broadcast(&self, row: usize) -> Option<&Value> {
        let last = self.values.len().checked_sub(1)?;
        self.values.get(row.min(last))
    }

    /// Consume the column into its values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A collection of named columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from columns; later duplicates replace earlier ones
    pub fn from_columns(columns: Vec<Column>) -> Self {
        let mut table = Self::new();
        for column in columns {
            table.set_column(column);
        }
        table
    }

    /// Build a table from records; missing keys become nulls
    pub fn from_records(records: &[Record]) -> Self {
        let mut names: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        let columns = names
            .into_iter()
            .map(|name| {
                let values = records
                    .iter()
                    .map(|record| record.get(&name).cloned().unwrap_or_default())
                    .collect();
                Column::new(name, values)
            })
            .collect();
        Self { columns }
    }

    /// Get the columns of this table
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Names of all columns, in insertion order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Find a column by name, failing with the list of available columns
    pub fn require_column(&self, node: &str, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| Error::MissingColumn {
            node: node.to_string(),
            column: name.to_string(),
            available: self.column_names(),
        })
    }

    /// Insert a column, replacing any column with the same name
    pub fn set_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Add a column repeating one value on every row
    ///
    /// A table without columns gains a single row.
    pub fn set_constant(&mut self, name: impl Into<String>, value: Value) {
        let rows = if self.columns.is_empty() {
            1
        } else {
            self.num_rows()
        };
        self.set_column(Column::new(name, vec![value; rows]));
    }

    /// Number of rows, i.e. the length of the longest column
    pub fn num_rows(&self) -> usize {
        self.columns.iter().map(Column::len).max().unwrap_or(0)
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Value at (`row`, `name`) with broadcasting
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name).and_then(|c| c.broadcast(row))
    }

    /// Row as a record, with broadcasting
    pub fn row(&self, row: usize) -> Record {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.broadcast(row).cloned().unwrap_or_default()))
            .collect()
    }

    /// Copy of the table where every column has exactly `num_rows()` values
    #[must_use]
    pub fn normalized(&self) -> Table {
        let rows = self.num_rows();
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = (0..rows)
                    .map(|i| c.broadcast(i).cloned().unwrap_or_default())
                    .collect();
                Column::new(c.name.clone(), values)
            })
            .collect();
        Table { columns }
    }

    /// Stack tables vertically
    ///
    /// Columns are unioned in first-seen order; rows of a table missing a column
    /// get nulls there.
    pub fn concat(tables: Vec<Table>) -> Table {
        if tables.len() == 1 {
            return tables.into_iter().next().unwrap_or_default().normalized();
        }
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }
        let mut columns: Vec<Column> = names
            .iter()
            .map(|name| Column::new(name.clone(), Vec::new()))
            .collect();
        for table in tables {
            let table = table.normalized();
            let rows = table.num_rows();
            for column in &mut columns {
                match table.column(&column.name) {
                    Some(source) => column.values.extend(source.values.iter().cloned()),
                    None => column.values.extend(std::iter::repeat(Value::Null).take(rows)),
                }
            }
        }
        Table { columns }
    }

    /// Iterate over rows as records
    pub fn rows(&self) -> impl Iterator<Item = Record> + '_ {
        (0..self.num_rows()).map(move |i| self.row(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_columns(vec![
            Column::new("id", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Column::new("split", vec![Value::from("train")]),
        ])
    }

    #[test]
    fn test_broadcast_repeats_last_value() {
        let table = table();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.get(2, "split"), Some(&Value::from("train")));
        assert_eq!(table.get(2, "id"), Some(&Value::Int(3)));
        assert_eq!(table.get(0, "missing"), None);

        let normalized = table.normalized();
        assert_eq!(normalized.column("split").unwrap().len(), 3);
    }

    #[test]
    fn test_require_column_lists_available() {
        let err = table().require_column("ratings", "user").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("\"user\""));
        assert!(message.contains("ratings"));
        assert!(message.contains("\"id\""));
    }

    #[test]
    fn test_concat_unions_columns() {
        let a = Table::from_columns(vec![Column::new("x", vec![Value::Int(1)])]);
        let b = Table::from_columns(vec![
            Column::new("x", vec![Value::Int(2)]),
            Column::new("y", vec![Value::from("b")]),
        ]);
        let table = Table::concat(vec![a, b]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.get(0, "y"), Some(&Value::Null));
        assert_eq!(table.get(1, "y"), Some(&Value::from("b")));
    }

    #[test]
    fn test_records_roundtrip() {
        let rows: Vec<Record> = table().rows().collect();
        assert_eq!(rows.len(), 3);
        let rebuilt = Table::from_records(&rows);
        assert_eq!(rebuilt.num_rows(), 3);
        assert_eq!(rebuilt.get(1, "split"), Some(&Value::from("train")));
    }

    #[test]
    fn test_set_constant() {
        let mut table = table();
        table.set_constant("filename", Value::from("a.csv"));
        assert_eq!(table.column("filename").unwrap().len(), 3);

        let mut empty = Table::new();
        empty.set_constant("content", Value::from("x"));
        assert_eq!(empty.num_rows(), 1);
    }
}
