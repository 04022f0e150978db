//! Delimited text reader

use std::io::Read;

use csv::ReaderBuilder;

use croissant_core::{Column, Table, Value};

use crate::error::Result;

/// Options for delimited text
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: u8,
    /// Quote character
    pub quote: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
        }
    }
}

impl CsvOptions {
    /// Options for tab-separated values
    pub fn tsv() -> Self {
        Self {
            delimiter: b'\t',
            ..Self::default()
        }
    }
}

/// Read delimited text with a header row into a table of text values
///
/// Empty cells and cells missing from short rows are nulls.
pub fn read_csv<R: Read>(reader: R, options: &CsvOptions) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .delimiter(options.delimiter)
        .quote(options.quote)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, column) in columns.iter_mut().enumerate() {
            let value = match record.get(i) {
                Some("") | None => Value::Null,
                Some(cell) => Value::from(cell),
            };
            column.push(value);
        }
    }
    Ok(Table::from_columns(
        headers
            .into_iter()
            .zip(columns)
            .map(|(name, values)| Column::new(name, values))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let data = "id,name,score\n1,Alice,10.5\n2,,20\n3,\"Smith, J\"\n";
        let table = read_csv(data.as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["id", "name", "score"]);
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.get(0, "name"), Some(&Value::from("Alice")));
        assert_eq!(table.get(1, "name"), Some(&Value::Null));
        assert_eq!(table.get(2, "name"), Some(&Value::from("Smith, J")));
        assert_eq!(table.get(2, "score"), Some(&Value::Null));
    }

    #[test]
    fn test_read_tsv() {
        let table = read_csv("a\tb\nx\ty\n".as_bytes(), &CsvOptions::tsv()).unwrap();
        assert_eq!(table.get(0, "b"), Some(&Value::from("y")));
    }

    #[test]
    fn test_header_only() {
        let table = read_csv("a,b\n".as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert!(table.is_empty());
    }
}
