//! Left equality join between two tables

use std::collections::HashMap;

use tracing::debug;

use croissant_core::{Column, Table, Value};

use crate::error::{Error, Result};
use crate::transform::TransformChain;

/// Suffix added to right-side columns whose name is already taken on the left
pub const RIGHT_SUFFIX: &str = "_right";

/// One side of a join: the node it comes from and its key column
#[derive(Debug, Clone, Copy)]
pub struct JoinKey<'a> {
    /// Identifier of the node the key belongs to, used in error messages
    pub node: &'a str,
    /// Column holding the key
    pub column: &'a str,
}

/// Which of two inputs is the left side of a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// The first input is the left side
    AsGiven,
    /// The second input is the left side
    Swapped,
}

/// Decide which input holds the left key and which the right key
///
/// When both inputs carry both key columns, `hint` (which input the left key was
/// compiled from, if known) settles it; without a hint the join is ambiguous and
/// fails rather than guessing.
pub fn orient(
    first: &Table,
    second: &Table,
    left: JoinKey<'_>,
    right: JoinKey<'_>,
    hint: Option<Orientation>,
) -> Result<Orientation> {
    let as_given = first.has_column(left.column) && second.has_column(right.column);
    let swapped = second.has_column(left.column) && first.has_column(right.column);
    match (as_given, swapped) {
        (true, false) => Ok(Orientation::AsGiven),
        (false, true) => Ok(Orientation::Swapped),
        (true, true) => hint.ok_or_else(|| {
            Error::Join(format!(
                "both inputs have columns \"{}\" and \"{}\"; cannot tell which one is \"{}\"",
                left.column, right.column, left.node
            ))
        }),
        (false, false) => {
            let (left_table, right_table) = match hint {
                Some(Orientation::Swapped) => (second, first),
                _ => (first, second),
            };
            left_table.require_column(left.node, left.column)?;
            right_table.require_column(right.node, right.column)?;
            Err(Error::Join(format!(
                "cannot join \"{}\" with \"{}\"",
                left.column, right.column
            )))
        }
    }
}

/// Left join `left` with `right` on `left.column == right.column`
///
/// `transforms` are applied to the left key before comparison; the left column
/// itself is kept as read. Left row order is preserved. A left row matching several
/// right rows is repeated once per match; a left row without match gets nulls in
/// every right column.
pub fn left_join(
    left_table: &Table,
    right_table: &Table,
    left: JoinKey<'_>,
    right: JoinKey<'_>,
    transforms: &TransformChain,
) -> Result<Table> {
    let left_table = left_table.normalized();
    let right_table = right_table.normalized();
    let left_keys = left_table.require_column(left.node, left.column)?;
    let right_keys = right_table.require_column(right.node, right.column)?;

    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (row, value) in right_keys.values().iter().enumerate() {
        if let Some(key) = value.join_key() {
            index.entry(key).or_default().push(row);
        }
    }

    let mut pairs: Vec<(usize, Option<usize>)> = Vec::with_capacity(left_table.num_rows());
    for (row, value) in left_keys.values().iter().enumerate() {
        let key = transforms.apply(value.clone()).join_key();
        match key.as_ref().and_then(|key| index.get(key)) {
            Some(matches) => pairs.extend(matches.iter().map(|m| (row, Some(*m)))),
            None => pairs.push((row, None)),
        }
    }

    let mut columns: Vec<Column> = left_table
        .columns()
        .iter()
        .map(|column| {
            let values = pairs.iter().map(|(row, _)| column.values()[*row].clone()).collect();
            Column::new(column.name(), values)
        })
        .collect();
    for column in right_table.columns() {
        let name = if left_table.has_column(column.name()) {
            format!("{}{RIGHT_SUFFIX}", column.name())
        } else {
            column.name().to_string()
        };
        let values = pairs
            .iter()
            .map(|(_, row)| row.map_or(Value::Null, |row| column.values()[row].clone()))
            .collect();
        columns.push(Column::new(name, values));
    }

    debug!(
        left = left.node,
        right = right.node,
        rows = pairs.len(),
        "joined tables"
    );
    Ok(Table::from_columns(columns))
}
