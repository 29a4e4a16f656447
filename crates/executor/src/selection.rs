use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Schema};
use expr::Expr;

/// Drops child rows whose predicate is not truthy. A predicate evaluating
/// to null filters the row, per SQL `WHERE` semantics.
pub struct SelectionExec {
    child: Box<dyn Executor>,
    predicate: Expr,
    schema: Schema,
}

impl SelectionExec {
    pub fn new(child: Box<dyn Executor>, predicate: Expr, schema: Schema) -> Self {
        Self {
            child,
            predicate,
            schema,
        }
    }
}

impl Executor for SelectionExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        loop {
            let Some((row, pos)) = self.child.next(ctx)? else {
                return Ok(None);
            };
            if self.predicate.evaluate(&row, &self.schema)?.truthy() {
                return Ok(Some((row, pos)));
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(out, indent, &format!("Selection: [{}]", self.predicate));
        self.child.explain_into(out, indent + 1);
    }
}
