//! Bundling per-field columns into records

use croissant_core::{Column, Record, Value};

/// Number of records produced by bundling `columns`
pub fn bundled_len(columns: &[Column]) -> usize {
    columns.iter().map(Column::len).max().unwrap_or(0)
}

/// Record at `row`, repeating the last value of shorter columns
pub fn bundle_row(columns: &[Column], row: usize) -> Record {
    columns
        .iter()
        .map(|column| {
            let value = column.broadcast(row).cloned().unwrap_or(Value::Null);
            (column.name().to_string(), value)
        })
        .collect()
}

/// Zip same-RecordSet field columns into one record per row
///
/// Columns may have different lengths: a field read once per file sits next to
/// fields read once per line. Shorter columns are broadcast forward.
pub fn bundle(columns: &[Column]) -> impl Iterator<Item = Record> + '_ {
    (0..bundled_len(columns)).map(move |row| bundle_row(columns, row))
}
