//! Raw file contents

use std::io::Read;

use croissant_core::{Column, FileProperty, Table, Value};

use crate::error::Result;

/// Whole file as a single `content` row of bytes
pub fn read_content<R: Read>(mut reader: R) -> Result<Table> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(Table::from_columns(vec![Column::new(
        FileProperty::Content.as_str(),
        vec![Value::Bytes(bytes)],
    )]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_content() {
        let table = read_content(&[0u8, 159, 146, 150][..]).unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.get(0, "content"),
            Some(&Value::Bytes(vec![0, 159, 146, 150]))
        );
    }
}
