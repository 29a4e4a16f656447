use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Row};

/// Emits one pre-built row, then exhaustion. Statement results (affected
/// row counts, status rows) flow through this.
pub struct ConstantExec {
    row: Option<Row>,
}

impl ConstantExec {
    pub fn new(row: Row) -> Self {
        Self { row: Some(row) }
    }
}

impl Executor for ConstantExec {
    fn next(&mut self, _ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        Ok(self.row.take().map(|row| (row, None)))
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        match &self.row {
            Some(row) => push_line(out, indent, &format!("Constant: {row}")),
            None => push_line(out, indent, "Constant: (consumed)"),
        }
    }
}
