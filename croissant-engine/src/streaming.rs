//! Streaming strategy: files are read one at a time
//!
//! The relevant operations form a single chain. Whenever the chain reaches a
//! `Read`, the file list is pushed as a frame and each file is carried through the
//! rest of the chain on its own, so the records of a file are produced before the
//! next file is opened.

use std::vec;

use croissant_core::{FilePath, Record};

use crate::error::Result;
use crate::executor::{files_of, table_of, Executor};
use crate::fields::Rows;
use crate::operation::{OperationId, OperationKind, Output};

pub(crate) const NAME: &str = "streaming";

#[derive(Debug)]
struct Frame {
    /// Position of the `Read` in the chain
    read: usize,
    files: vec::IntoIter<FilePath>,
}

/// Suspended state of a streaming run
#[derive(Debug)]
pub(crate) struct Stream {
    chain: Vec<OperationId>,
    frames: Vec<Frame>,
    rows: Option<Rows>,
    started: bool,
}

impl Stream {
    pub(crate) fn new(chain: Vec<OperationId>) -> Self {
        Self {
            chain,
            frames: Vec::new(),
            rows: None,
            started: false,
        }
    }

    fn target(&self) -> Option<OperationId> {
        self.chain.last().copied()
    }

    /// Run the chain from position `start` with `output` as input
    fn advance(&mut self, executor: &Executor<'_>, start: usize, output: Output) -> Result<()> {
        let mut output = output;
        for position in start..self.chain.len() {
            let id = self.chain[position];
            let previous = self.chain[position.saturating_sub(1)];
            let inputs = vec![(previous, output)];
            if position + 1 == self.chain.len() {
                let rows = table_of(inputs)
                    .and_then(|table| executor.reader(id)?.prepare(table))
                    .map_err(|e| executor.failure(NAME, id, e))?;
                self.rows = Some(rows);
                return Ok(());
            }
            if executor.plan().operation(id).kind == OperationKind::Read {
                let files = files_of(inputs).map_err(|e| executor.failure(NAME, id, e))?;
                self.frames.push(Frame {
                    read: position,
                    files: files.into_iter(),
                });
                return Ok(());
            }
            output = executor
                .execute(id, inputs)
                .map_err(|e| executor.failure(NAME, id, e))?;
        }
        Ok(())
    }

    /// Next record, or `None` once every file has been consumed
    pub(crate) fn next(&mut self, executor: &Executor<'_>) -> Option<Result<Record>> {
        loop {
            if let Some(rows) = &mut self.rows {
                match rows.next() {
                    Some(Ok(record)) => return Some(Ok(record)),
                    Some(Err(e)) => {
                        let target = self.target()?;
                        return Some(Err(executor.failure(NAME, target, e)));
                    }
                    None => self.rows = None,
                }
            }
            if !self.started {
                self.started = true;
                if let Err(e) = self.advance(executor, 0, Output::Nothing) {
                    return Some(Err(e));
                }
                continue;
            }
            let frame = self.frames.last_mut()?;
            let Some(file) = frame.files.next() else {
                self.frames.pop();
                continue;
            };
            let read = frame.read;
            let id = self.chain[read];
            let table = executor
                .execute(id, vec![(id, Output::Files(vec![file]))])
                .map_err(|e| executor.failure(NAME, id, e));
            let result = table.and_then(|table| self.advance(executor, read + 1, table));
            if let Err(e) = result {
                return Some(Err(e));
            }
        }
    }
}
