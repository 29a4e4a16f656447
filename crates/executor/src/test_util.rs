use crate::{Executor, TransactionContext};
use catalog::Catalog;
use common::{Column, DbResult, Row, Schema};
use storage::PageStore;
use types::{Value, ValueType};

/// Executor fed from a fixed list of rows, for testing operators without
/// touching storage.
pub(crate) struct MockExec {
    rows: Vec<Row>,
    cursor: usize,
}

impl MockExec {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl Executor for MockExec {
    fn next(&mut self, _ctx: &mut TransactionContext) -> DbResult<Option<crate::Tuple>> {
        let row = self.rows.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(row.map(|r| (r, None)))
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        crate::push_line(out, indent, &format!("Mock: {} rows", self.rows.len()));
    }
}

pub(crate) fn int_row(values: &[i64]) -> Row {
    Row::new(values.iter().map(|&v| Value::Int64(v)).collect())
}

pub(crate) fn drain(exec: &mut dyn Executor, ctx: &mut TransactionContext) -> Vec<Row> {
    let mut out = Vec::new();
    while let Some((row, _)) = exec.next(ctx).unwrap() {
        out.push(row);
    }
    out
}

pub(crate) fn sample_schema() -> Schema {
    Schema::new(
        "t",
        vec![
            Column::new("key", ValueType::Int64),
            Column::new("name", ValueType::Varchar),
            Column::new("score", ValueType::Double),
        ],
    )
}

pub(crate) fn sample_rows() -> Vec<Row> {
    vec![
        Row::new(vec![0.into(), "hello".into(), 1.2.into()]),
        Row::new(vec![3.into(), "piyo".into(), 12.2.into()]),
        Row::new(vec![1.into(), "world".into(), 4.9.into()]),
        Row::new(vec![2.into(), "arise".into(), 4.14.into()]),
    ]
}

/// Catalog plus page store holding the four-row sample table `t`, with
/// fresh statistics installed.
pub(crate) fn fixture() -> (Catalog, PageStore) {
    let mut catalog = Catalog::new();
    let id = catalog
        .create_table(
            "t",
            vec![
                Column::new("key", ValueType::Int64),
                Column::new("name", ValueType::Varchar),
                Column::new("score", ValueType::Double),
            ],
        )
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(id);

    let txn = store.begin();
    for row in sample_rows() {
        store.insert(&txn, id, &row).unwrap();
    }
    store.commit(txn).unwrap();

    let txn = store.begin();
    crate::refresh_table_statistics(&mut catalog, &store, &txn, "t").unwrap();
    store.commit(txn).unwrap();

    (catalog, store)
}
