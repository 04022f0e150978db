//! Parquet reader

use std::fs::File;
use std::path::Path;

use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;

use croissant_core::{Record, Table, Value};

use crate::error::Result;

fn to_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Bool(*b),
        Field::Byte(i) => Value::Int(i64::from(*i)),
        Field::Short(i) => Value::Int(i64::from(*i)),
        Field::Int(i) => Value::Int(i64::from(*i)),
        Field::Long(i) => Value::Int(*i),
        Field::UByte(i) => Value::Int(i64::from(*i)),
        Field::UShort(i) => Value::Int(i64::from(*i)),
        Field::UInt(i) => Value::Int(i64::from(*i)),
        Field::Float(f) => Value::Float(f64::from(*f)),
        Field::Double(f) => Value::Float(*f),
        Field::Str(s) => Value::Text(s.clone()),
        Field::Bytes(bytes) => Value::Bytes(bytes.data().to_vec()),
        other => Value::from_json(&other.to_json_value()),
    }
}

/// Read every row of a Parquet file
pub fn read_parquet(path: &Path) -> Result<Table> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let mut records = Vec::new();
    for row in reader.get_row_iter(None)? {
        let row = row?;
        let record: Record = row
            .get_column_iter()
            .map(|(name, field)| (name.clone(), to_value(field)))
            .collect();
        records.push(record);
    }
    Ok(Table::from_records(&records))
}
