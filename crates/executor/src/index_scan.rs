use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbResult, Schema, TableId};
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

pub(crate) fn range_display(begin: &Value, end: &Value) -> String {
    if begin == end && !begin.is_null() {
        String::new()
    } else {
        format!(" [{begin}, {end}]")
    }
}

/// Walks the inclusive index key range `[begin, end]`, fetches each
/// referenced row from the heap, and applies the residual predicate. Null
/// bounds are unbounded ends. The key snapshot is taken on the first
/// `next()`.
pub struct IndexScanExec {
    table: TableId,
    table_name: String,
    index_name: String,
    begin: Value,
    end: Value,
    ascending: bool,
    predicate: Expr,
    schema: Schema,
    entries: Option<Vec<IndexEntry>>,
    cursor: usize,
}

#[bon::bon]
impl IndexScanExec {
    /// Build an index scan.
    ///
    /// # Example
    /// ```ignore
    /// let scan = IndexScanExec::builder()
    ///     .table(TableId(1))
    ///     .table_name("users")
    ///     .index_name("idx_pk")
    ///     .begin(Value::Int64(42))
    ///     .end(Value::Int64(42))
    ///     .predicate(pred)
    ///     .schema(schema)
    ///     .build();
    /// ```
    #[builder]
    pub fn new(
        table: TableId,
        table_name: String,
        index_name: String,
        begin: Value,
        end: Value,
        #[builder(default = true)] ascending: bool,
        predicate: Expr,
        schema: Schema,
    ) -> Self {
        Self {
            table,
            table_name,
            index_name,
            begin,
            end,
            ascending,
            predicate,
            schema,
            entries: None,
            cursor: 0,
        }
    }
}

impl Executor for IndexScanExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.entries.is_none() {
            let snapshot = ctx.store.index_range(
                &ctx.txn,
                self.table,
                &self.index_name,
                bound(&self.begin).as_deref(),
                bound(&self.end).as_deref(),
                self.ascending,
            )?;
            self.entries = Some(snapshot.into_iter().map(|(_, entry)| entry).collect());
        }
        loop {
            let Some(position) = self
                .entries
                .as_ref()
                .and_then(|entries| entries.get(self.cursor))
                .map(|entry| entry.position)
            else {
                return Ok(None);
            };
            self.cursor += 1;
            let row = ctx.store.read(&ctx.txn, self.table, position)?;
            if self.predicate.evaluate(&row, &self.schema)?.truthy() {
                return Ok(Some((row, Some(position))));
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(
            out,
            indent,
            &format!(
                "IndexScan: {}.{}{} where {}",
                self.table_name,
                self.index_name,
                range_display(&self.begin, &self.end),
                self.predicate
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{drain, fixture, sample_schema};
    use common::Row;
    use expr::BinaryOp;

    fn scan(
        catalog: &catalog::Catalog,
        begin: Value,
        end: Value,
        predicate: Expr,
    ) -> IndexScanExec {
        let id = catalog.table("t").unwrap().id;
        IndexScanExec::builder()
            .table(id)
            .table_name("t".to_string())
            .index_name("by_key".to_string())
            .begin(begin)
            .end(end)
            .predicate(predicate)
            .schema(sample_schema())
            .build()
    }

    fn fixture_with_index() -> (catalog::Catalog, storage::PageStore) {
        let (catalog, store) = fixture();
        let id = catalog.table("t").unwrap().id;
        store
            .create_index(id, "by_key", vec![0], vec![], true)
            .unwrap();
        (catalog, store)
    }

    #[test]
    fn walks_key_range_in_order() {
        let (catalog, store) = fixture_with_index();
        let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

        let mut exec = scan(
            &catalog,
            Value::Int64(1),
            Value::Int64(2),
            Expr::constant(1i64),
        );
        let rows = drain(&mut exec, &mut ctx);
        assert_eq!(
            rows,
            vec![
                Row::new(vec![1.into(), "world".into(), 4.9.into()]),
                Row::new(vec![2.into(), "arise".into(), 4.14.into()]),
            ]
        );
    }

    #[test]
    fn unbounded_ends_cover_the_table() {
        let (catalog, store) = fixture_with_index();
        let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

        let mut exec = scan(&catalog, Value::Null, Value::Null, Expr::constant(1i64));
        let rows = drain(&mut exec, &mut ctx);
        let keys: Vec<_> = rows.iter().map(|r| r.values[0].clone()).collect();
        assert_eq!(
            keys,
            vec![0.into(), 1.into(), 2.into(), 3.into()]
        );
    }

    #[test]
    fn residual_predicate_filters_fetched_rows() {
        let (catalog, store) = fixture_with_index();
        let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

        let pred = Expr::binary(Expr::column("score"), BinaryOp::Gt, Expr::constant(4.5));
        let mut exec = scan(&catalog, Value::Null, Value::Int64(2), pred);
        let rows = drain(&mut exec, &mut ctx);
        assert_eq!(rows, vec![Row::new(vec![1.into(), "world".into(), 4.9.into()])]);
    }

    #[test]
    fn emits_positions_for_write_plans() {
        let (catalog, store) = fixture_with_index();
        let id = catalog.table("t").unwrap().id;
        let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

        let mut exec = scan(
            &catalog,
            Value::Int64(3),
            Value::Int64(3),
            Expr::constant(1i64),
        );
        let (row, pos) = exec.next(&mut ctx).unwrap().unwrap();
        let direct = ctx.store.read(&ctx.txn, id, pos.unwrap()).unwrap();
        assert_eq!(row, direct);
    }
}
