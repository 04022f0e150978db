//! Plain text and raw byte readers

use std::io::{BufRead, BufReader, Read};

use croissant_core::{Column, FileProperty, Table, Value};

use crate::error::Result;

/// One row per line, with an optional `lineNumbers` column
///
/// Lines are split on `\n` with a trailing `\r` removed. Lines that are not UTF-8
/// are kept as bytes.
pub fn read_lines<R: Read>(reader: R, line_numbers: bool) -> Result<Table> {
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        if buffer.last() == Some(&b'\n') {
            buffer.pop();
            if buffer.last() == Some(&b'\r') {
                buffer.pop();
            }
        }
        let line = match String::from_utf8(buffer.clone()) {
            Ok(text) => Value::Text(text),
            Err(e) => Value::Bytes(e.into_bytes()),
        };
        lines.push(line);
    }
    let count = lines.len();
    let mut table = Table::from_columns(vec![Column::new(FileProperty::Lines.as_str(), lines)]);
    if line_numbers {
        #[allow(clippy::cast_possible_wrap)]
        let numbers = (0..count).map(|i| Value::Int(i as i64)).collect();
        table.set_column(Column::new(FileProperty::LineNumbers.as_str(), numbers));
    }
    Ok(table)
}
