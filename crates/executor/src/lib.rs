//! Physical operators: a pull-based iterator tree over the page store.
//!
//! Every operator implements [`Executor`]: repeated `next()` calls emit one
//! row at a time until exhaustion. Operators that materialize state (hash
//! builds, cross-join right sides, aggregation) do so on their first
//! `next()`, never in constructors; dropping the tree releases children and
//! buffers on every exit path.

mod aggregation;
mod constant;
mod cross_join;
mod full_scan;
mod hash_join;
mod index_join;
mod index_only_scan;
mod index_scan;
mod projection;
mod selection;

#[cfg(test)]
pub(crate) mod test_util;

pub use aggregation::AggregationExec;
pub use constant::ConstantExec;
pub use cross_join::CrossJoinExec;
pub use full_scan::FullScanExec;
pub use hash_join::HashJoinExec;
pub use index_join::IndexJoinExec;
pub use index_only_scan::IndexOnlyScanExec;
pub use index_scan::IndexScanExec;
pub use projection::ProjectionExec;
pub use selection::SelectionExec;

use catalog::Catalog;
use common::{DbResult, Row, RowPosition};
use stats::TableStatistics;
use storage::{PageStore, Transaction};

/// One emitted tuple: the row plus, for scan-like operators, the storage
/// handle of the underlying heap tuple.
pub type Tuple = (Row, Option<RowPosition>);

/// Pull-model iterator contract. The caller drives; each `next()` either
/// emits one tuple or signals exhaustion. Errors terminate iteration.
pub trait Executor {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>>;

    /// Append this operator's one-line description and its children,
    /// indented by two spaces per level.
    fn explain_into(&self, out: &mut String, indent: usize);

    fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out.truncate(out.trim_end().len());
        out
    }
}

pub(crate) fn push_line(out: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        out.push_str("  ");
    }
    out.push_str(line);
    out.push('\n');
}

/// The value threaded through planning and execution: one transaction, the
/// catalog, and the page store. Nested operators share this context; the
/// core only ever reads through it.
pub struct TransactionContext<'a> {
    pub txn: Transaction,
    pub catalog: &'a Catalog,
    pub store: &'a PageStore,
}

impl<'a> TransactionContext<'a> {
    pub fn new(txn: Transaction, catalog: &'a Catalog, store: &'a PageStore) -> Self {
        Self {
            txn,
            catalog,
            store,
        }
    }

    /// Commit the wrapped transaction, consuming the context.
    pub fn commit(self) -> DbResult<()> {
        self.store.commit(self.txn)
    }
}

/// Recompute a table's statistics with a full-scan pass and install the
/// snapshot in the catalog.
pub fn refresh_table_statistics(
    catalog: &mut Catalog,
    store: &PageStore,
    txn: &Transaction,
    table: &str,
) -> DbResult<()> {
    let meta = catalog.table(table)?;
    let (id, schema) = (meta.id, meta.schema.clone());

    let mut rows = Vec::new();
    let mut cursor = None;
    while let Some((pos, row)) = store.scan_next(txn, id, cursor)? {
        rows.push(row);
        cursor = Some(pos);
    }
    let stats = TableStatistics::collect(&schema, rows.iter());
    tracing::debug!(table, rows = stats.row_count, "statistics refreshed");
    catalog.update_statistics(table, stats)
}
