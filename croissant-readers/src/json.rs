//! JSON and JSON Lines readers

use std::io::{BufRead, BufReader, Read};

use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use croissant_core::structure::normalize_json_path;
use croissant_core::{Column, Record, Table, Value};

use crate::error::{Error, Result};

fn record_of(value: &JsonValue) -> Record {
    match value {
        JsonValue::Object(object) => object
            .iter()
            .map(|(key, value)| (key.clone(), Value::from_json(value)))
            .collect(),
        other => Record::from([("value".to_string(), Value::from_json(other))]),
    }
}

/// Parse a JSON document into a table
///
/// An array of objects gives one row per object, any other document a single row.
pub fn read_json<R: Read>(reader: R) -> Result<Table> {
    let document: JsonValue = serde_json::from_reader(BufReader::new(reader))?;
    let records: Vec<Record> = match &document {
        JsonValue::Array(items) => items.iter().map(record_of).collect(),
        other => vec![record_of(other)],
    };
    Ok(Table::from_records(&records))
}

/// Evaluate JSON paths on a JSON document, one column per path
///
/// Columns are named after the path as written in the manifest. Paths matching
/// several nodes give one row per node; the resulting columns may have different
/// lengths and are broadcast when rows are read.
pub fn read_json_paths<R: Read>(reader: R, paths: &[String]) -> Result<Table> {
    let document: JsonValue = serde_json::from_reader(BufReader::new(reader))?;
    let mut table = Table::new();
    for path in paths {
        let compiled = JsonPath::parse(&normalize_json_path(path))
            .map_err(|e| Error::Format(format!("invalid JSON path {path}: {e}")))?;
        let values = compiled
            .query(&document)
            .all()
            .into_iter()
            .map(Value::from_json)
            .collect();
        table.set_column(Column::new(path.clone(), values));
    }
    Ok(table)
}

/// Parse JSON Lines, one row per non-empty line
pub fn read_json_lines<R: Read>(reader: R) -> Result<Table> {
    let mut records = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: JsonValue = serde_json::from_str(&line)?;
        records.push(record_of(&value));
    }
    Ok(Table::from_records(&records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_json_array() {
        let data = r#"[{"id": 1, "tags": ["a"]}, {"id": 2, "extra": true}]"#;
        let table = read_json(data.as_bytes()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.get(1, "id"), Some(&Value::Int(2)));
        assert_eq!(table.get(0, "extra"), Some(&Value::Null));
        assert_eq!(table.get(0, "tags"), Some(&Value::List(vec![Value::from("a")])));
    }

    #[test]
    fn test_read_json_paths_are_ragged() {
        let data = r#"{"dataset": "coco", "images": [{"id": 1}, {"id": 2}, {"id": 3}]}"#;
        let paths = vec!["dataset".to_string(), "$.images[*].id".to_string()];
        let table = read_json_paths(data.as_bytes(), &paths).unwrap();
        assert_eq!(table.column("dataset").unwrap().len(), 1);
        assert_eq!(table.column("$.images[*].id").unwrap().len(), 3);
        assert_eq!(table.get(2, "dataset"), Some(&Value::from("coco")));
    }

    #[test]
    fn test_read_json_lines() {
        let data = "{\"a\": 1}\n\n{\"a\": 2, \"b\": \"x\"}\n";
        let table = read_json_lines(data.as_bytes()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.get(1, "b"), Some(&Value::from("x")));
        assert!(read_json_lines("{oops".as_bytes()).is_err());
    }
}
