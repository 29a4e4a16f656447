use crate::index_scan::range_display;
use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbError, DbResult, Row, Schema, TableId};
use expr::Expr;
use storage::IndexEntry;
use types::Value;

fn bound(v: &Value) -> Option<Vec<u8>> {
    if v.is_null() {
        None
    } else {
        Some(v.to_memcomparable())
    }
}

/// Like `IndexScanExec`, but answers entirely from the index: each emitted
/// row is the decoded key columns followed by the include columns, and the
/// heap is never touched. The residual predicate is evaluated against that
/// derived schema.
pub struct IndexOnlyScanExec {
    table: TableId,
    table_name: String,
    index_name: String,
    begin: Value,
    end: Value,
    ascending: bool,
    predicate: Expr,
    /// Key columns followed by include columns.
    output_schema: Schema,
    entries: Option<Vec<(Vec<u8>, IndexEntry)>>,
    cursor: usize,
}

#[bon::bon]
impl IndexOnlyScanExec {
    #[builder]
    pub fn new(
        table: TableId,
        table_name: String,
        index_name: String,
        begin: Value,
        end: Value,
        #[builder(default = true)] ascending: bool,
        predicate: Expr,
        output_schema: Schema,
    ) -> Self {
        Self {
            table,
            table_name,
            index_name,
            begin,
            end,
            ascending,
            predicate,
            output_schema,
            entries: None,
            cursor: 0,
        }
    }
}

fn decode_key(bytes: &[u8]) -> DbResult<Vec<Value>> {
    let mut values = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (value, used) = Value::decode_memcomparable(rest)
            .ok_or_else(|| DbError::Internal("malformed index key encoding".into()))?;
        values.push(value);
        rest = &rest[used..];
    }
    Ok(values)
}

impl Executor for IndexOnlyScanExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.entries.is_none() {
            self.entries = Some(ctx.store.index_range(
                &ctx.txn,
                self.table,
                &self.index_name,
                bound(&self.begin).as_deref(),
                bound(&self.end).as_deref(),
                self.ascending,
            )?);
        }
        loop {
            let Some((key_bytes, entry)) = self
                .entries
                .as_ref()
                .and_then(|entries| entries.get(self.cursor))
            else {
                return Ok(None);
            };
            self.cursor += 1;
            let mut values = decode_key(key_bytes)?;
            values.extend(entry.include.iter().cloned());
            let row = Row::new(values);
            if self.predicate.evaluate(&row, &self.output_schema)?.truthy() {
                return Ok(Some((row, None)));
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(
            out,
            indent,
            &format!(
                "IndexOnlyScan: {}.{}{} where {}",
                self.table_name,
                self.index_name,
                range_display(&self.begin, &self.end),
                self.predicate
            ),
        );
    }
}
