use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, RowPosition, TableId};

/// Walks a table's heap in position order via the storage scan cursor,
/// emitting every live row with its position. The only state between calls
/// is the last position handed out.
pub struct FullScanExec {
    table: TableId,
    table_name: String,
    cursor: Option<RowPosition>,
    exhausted: bool,
}

impl FullScanExec {
    pub fn new(table: TableId, table_name: impl Into<String>) -> Self {
        Self {
            table,
            table_name: table_name.into(),
            cursor: None,
            exhausted: false,
        }
    }
}

impl Executor for FullScanExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.exhausted {
            return Ok(None);
        }
        match ctx.store.scan_next(&ctx.txn, self.table, self.cursor)? {
            Some((pos, row)) => {
                self.cursor = Some(pos);
                Ok(Some((row, Some(pos))))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(out, indent, &format!("FullScan: {}", self.table_name));
    }
}
