use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Row, TableId};
use storage::IndexEntry;

/// Joins by index point lookup: for each left row, probes the right
/// table's index with the projected key and emits `left ++ right` for
/// every match. The lookup state is rebuilt whenever the left cursor
/// advances.
pub struct IndexJoinExec {
    left: Box<dyn Executor>,
    left_cols: Vec<usize>,
    right_table: TableId,
    right_table_name: String,
    right_index: String,
    hold_left: Option<Row>,
    matches: Vec<IndexEntry>,
    cursor: usize,
}

impl IndexJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        left_cols: Vec<usize>,
        right_table: TableId,
        right_table_name: impl Into<String>,
        right_index: impl Into<String>,
    ) -> Self {
        Self {
            left,
            left_cols,
            right_table,
            right_table_name: right_table_name.into(),
            right_index: right_index.into(),
            hold_left: None,
            matches: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for IndexJoinExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        loop {
            let Some(left_row) = &self.hold_left else {
                let Some((row, _)) = self.left.next(ctx)? else {
                    return Ok(None);
                };
                let key = row.extract(&self.left_cols)?.encode_memcomparable();
                self.matches = ctx
                    .store
                    .index_range(
                        &ctx.txn,
                        self.right_table,
                        &self.right_index,
                        Some(&key),
                        Some(&key),
                        true,
                    )?
                    .into_iter()
                    .map(|(_, entry)| entry)
                    .collect();
                self.cursor = 0;
                self.hold_left = Some(row);
                continue;
            };
            if let Some(position) = self.matches.get(self.cursor).map(|entry| entry.position) {
                self.cursor += 1;
                let right_row = ctx.store.read(&ctx.txn, self.right_table, position)?;
                return Ok(Some((left_row.clone() + right_row, None)));
            }
            self.hold_left = None;
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(
            out,
            indent,
            &format!(
                "IndexJoin: left {:?} right {}.{}",
                self.left_cols, self.right_table_name, self.right_index
            ),
        );
        self.left.explain_into(out, indent + 1);
    }
}
