//! Sequential strategy: every intermediate result is materialized once

use std::collections::{BTreeSet, HashMap};

use crate::error::{Error, Result};
use crate::executor::{table_of, Executor};
use crate::fields::Rows;
use crate::operation::{OperationId, Output};

pub(crate) const NAME: &str = "sequential";

/// Run every relevant operation in order and return the rows of `target`
///
/// An output consumed by several operations is cloned for all but the last of them.
pub(crate) fn run(executor: &Executor<'_>, relevant: &[OperationId], target: OperationId) -> Result<Rows> {
    let plan = executor.plan();
    let members: BTreeSet<OperationId> = relevant.iter().copied().collect();
    let mut consumers: HashMap<OperationId, usize> = relevant
        .iter()
        .map(|id| (*id, plan.successors(*id).filter(|s| members.contains(s)).count()))
        .collect();
    let mut outputs: HashMap<OperationId, Output> = HashMap::new();

    for id in relevant.iter().copied() {
        let inputs = plan
            .predecessors(id)
            .filter(|p| members.contains(p))
            .map(|p| take(&mut outputs, &mut consumers, p))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| executor.failure(NAME, id, e))?;
        if id == target {
            return table_of(inputs)
                .and_then(|table| executor.reader(id)?.prepare(table))
                .map_err(|e| executor.failure(NAME, id, e));
        }
        let output = executor
            .execute(id, inputs)
            .map_err(|e| executor.failure(NAME, id, e))?;
        outputs.insert(id, output);
    }
    Err(Error::Plan(format!(
        "{} is not reachable from the entry point",
        plan.operation(target)
    )))
}

fn take(
    outputs: &mut HashMap<OperationId, Output>,
    consumers: &mut HashMap<OperationId, usize>,
    id: OperationId,
) -> Result<(OperationId, Output)> {
    let left = consumers.entry(id).or_insert(1);
    let output = if *left > 1 {
        *left -= 1;
        outputs.get(&id).cloned()
    } else {
        outputs.remove(&id)
    };
    output
        .map(|output| (id, output))
        .ok_or_else(|| Error::Plan(format!("output of operation #{} is not available", id.index())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use croissant_core::Table;

    #[test]
    fn test_take_clones_until_last_consumer() {
        let id = OperationId(4);
        let mut outputs = HashMap::from([(id, Output::Table(Table::new()))]);
        let mut consumers = HashMap::from([(id, 2)]);
        take(&mut outputs, &mut consumers, id).unwrap();
        assert!(outputs.contains_key(&id));
        take(&mut outputs, &mut consumers, id).unwrap();
        assert!(outputs.is_empty());
        assert!(take(&mut outputs, &mut consumers, id).is_err());
    }
}
