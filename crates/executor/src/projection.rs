use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Row, Schema};
use expr::NamedExpr;

/// Evaluates each named expression against the child's rows, emitting an
/// output row per input row in listed order. The source position passes
/// through so write plans above a projection can still reach the heap.
pub struct ProjectionExec {
    child: Box<dyn Executor>,
    columns: Vec<NamedExpr>,
    input_schema: Schema,
}

impl ProjectionExec {
    pub fn new(child: Box<dyn Executor>, columns: Vec<NamedExpr>, input_schema: Schema) -> Self {
        Self {
            child,
            columns,
            input_schema,
        }
    }
}

impl Executor for ProjectionExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        let Some((row, pos)) = self.child.next(ctx)? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.columns.len());
        for named in &self.columns {
            values.push(named.expr.evaluate(&row, &self.input_schema)?);
        }
        Ok(Some((Row::new(values), pos)))
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        let cols: Vec<String> = self.columns.iter().map(|c| c.to_string()).collect();
        push_line(out, indent, &format!("Projection: {{{}}}", cols.join(", ")));
        self.child.explain_into(out, indent + 1);
    }
}
