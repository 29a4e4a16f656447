use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Row};

/// Cartesian product. The right child is materialized in full on the first
/// `next()`; each left row then replays the materialized table.
pub struct CrossJoinExec {
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    right_rows: Option<Vec<Row>>,
    hold_left: Option<Row>,
    cursor: usize,
}

impl CrossJoinExec {
    pub fn new(left: Box<dyn Executor>, right: Box<dyn Executor>) -> Self {
        Self {
            left,
            right,
            right_rows: None,
            hold_left: None,
            cursor: 0,
        }
    }
}

impl Executor for CrossJoinExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.right_rows.is_none() {
            let mut rows = Vec::new();
            while let Some((row, _)) = self.right.next(ctx)? {
                rows.push(row);
            }
            self.right_rows = Some(rows);
        }
        let Some(right_rows) = self.right_rows.as_ref() else {
            return Ok(None);
        };
        loop {
            match (&self.hold_left, right_rows.get(self.cursor)) {
                (Some(left), Some(right)) => {
                    let joined = left.clone() + right.clone();
                    self.cursor += 1;
                    return Ok(Some((joined, None)));
                }
                // Exhausted the materialized side for this left row.
                (Some(_), None) => {
                    self.hold_left = None;
                }
                (None, _) => match self.left.next(ctx)? {
                    Some((row, _)) => {
                        self.hold_left = Some(row);
                        self.cursor = 0;
                    }
                    None => return Ok(None),
                },
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(out, indent, "CrossJoin:");
        self.left.explain_into(out, indent + 1);
        self.right.explain_into(out, indent + 1);
    }
}
