use super::*;
use catalog::Catalog;
use common::{Column, DbError, Row};
use executor::{refresh_table_statistics, Executor, TransactionContext};
use expr::{AggregateOp, BinaryOp, Expr, NamedExpr};
use pretty_assertions::assert_eq;
use storage::PageStore;
use types::{Value, ValueType};

fn execute(plan: &Plan, ctx: &mut TransactionContext) -> Vec<Row> {
    let mut exec = plan.emit_executor(ctx).unwrap();
    let mut rows = Vec::new();
    while let Some((row, _)) = exec.next(ctx).unwrap() {
        rows.push(row);
    }
    rows
}

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by_key(|r| r.encode_memcomparable());
    rows
}

fn eq(col: &str, v: impl Into<Value>) -> Expr {
    Expr::binary(Expr::column(col), BinaryOp::Eq, Expr::Constant(v.into()))
}

fn col_eq_col(a: &str, b: &str) -> Expr {
    Expr::binary(Expr::column(a), BinaryOp::Eq, Expr::column(b))
}

/// Table `t(key, name, score)` with the four sample rows, statistics
/// refreshed.
fn sample_db() -> (Catalog, PageStore) {
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
    for (k, n, s) in [
        (0, "hello", 1.2),
        (3, "piyo", 12.2),
        (1, "world", 4.9),
        (2, "arise", 4.14),
    ] {
        store
            .insert(&txn, id, &Row::new(vec![k.into(), n.into(), s.into()]))
            .unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "t").unwrap();
    store.commit(txn).unwrap();
    (catalog, store)
}

#[test]
fn full_scan_with_selection_and_projection() {
    let (catalog, store) = sample_db();
    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let query = QueryData::new(
        vec!["t"],
        eq("key", 2i64),
        vec![NamedExpr::column("name"), NamedExpr::column("score")],
    );
    let plan = optimize(&query, &ctx).unwrap();
    let rows = execute(&plan, &mut ctx);
    assert_eq!(rows, vec![Row::new(vec!["arise".into(), 4.14.into()])]);

    // Schema consistency: emitted width and types match the plan schema.
    let schema = plan.schema();
    assert_eq!(schema.column_count(), 2);
    assert_eq!(schema.column(0).value_type(), ValueType::Varchar);
    assert_eq!(schema.column(1).value_type(), ValueType::Double);
    for row in &rows {
        assert_eq!(row.len(), schema.column_count());
    }
}

/// `L(a,b) ⋈ R(c,d)` on `a = c`, including duplicate keys on both sides.
fn join_db() -> (Catalog, PageStore) {
    let mut catalog = Catalog::new();
    let l = catalog
        .create_table(
            "l",
            vec![
                Column::new("a", ValueType::Int64),
                Column::new("b", ValueType::Varchar),
            ],
        )
        .unwrap();
    let r = catalog
        .create_table(
            "r",
            vec![
                Column::new("c", ValueType::Int64),
                Column::new("d", ValueType::Varchar),
            ],
        )
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(l);
    store.register_table(r);
    let txn = store.begin();
    for (a, b) in [(1, "x"), (2, "y"), (2, "z"), (3, "w")] {
        store
            .insert(&txn, l, &Row::new(vec![a.into(), b.into()]))
            .unwrap();
    }
    for (c, d) in [(2, "p"), (2, "q"), (4, "r")] {
        store
            .insert(&txn, r, &Row::new(vec![c.into(), d.into()]))
            .unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "l").unwrap();
    refresh_table_statistics(&mut catalog, &store, &txn, "r").unwrap();
    store.commit(txn).unwrap();
    (catalog, store)
}

#[test]
fn hash_join_on_equality() {
    let (catalog, store) = join_db();
    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let query = QueryData::new(
        vec!["l", "r"],
        col_eq_col("a", "c"),
        vec![NamedExpr::column("b"), NamedExpr::column("d")],
    );
    let plan = optimize(&query, &ctx).unwrap();
    let got = sorted(execute(&plan, &mut ctx));
    let expected = sorted(vec![
        Row::new(vec!["y".into(), "p".into()]),
        Row::new(vec!["y".into(), "q".into()]),
        Row::new(vec!["z".into(), "p".into()]),
        Row::new(vec!["z".into(), "q".into()]),
    ]);
    assert_eq!(got, expected);
}

#[test]
fn candidate_plans_agree_on_output() {
    // The hash plan the optimizer picks and the cross-product alternative
    // must produce the same multiset.
    let (catalog, store) = join_db();
    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let query = QueryData::select_all(vec!["l", "r"], col_eq_col("a", "c"));
    let chosen = optimize(&query, &ctx).unwrap();

    let l = ScanTable::from_meta(catalog.table("l").unwrap());
    let r = ScanTable::from_meta(catalog.table("r").unwrap());
    let cross = Plan::selection(
        Plan::product(Plan::full_scan(l), Plan::full_scan(r), JoinKind::Cross),
        col_eq_col("a", "c"),
    );

    let got = sorted(execute(&chosen, &mut ctx));
    let alt = sorted(execute(&cross, &mut ctx));
    assert_eq!(got, alt);
    assert_eq!(got.len(), 4);
}

#[test]
fn scalar_aggregation() {
    let mut catalog = Catalog::new();
    let id = catalog
        .create_table("nums", vec![Column::new("x", ValueType::Int64)])
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(id);
    let txn = store.begin();
    for i in 1..=5i64 {
        store.insert(&txn, id, &Row::new(vec![i.into()])).unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "nums").unwrap();
    store.commit(txn).unwrap();

    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);
    let agg = |op| NamedExpr::bare(Expr::aggregate(op, Expr::column("x")));
    let query = QueryData::new(
        vec!["nums"],
        Expr::constant(1i64),
        vec![
            agg(AggregateOp::Count),
            agg(AggregateOp::Sum),
            agg(AggregateOp::Avg),
            agg(AggregateOp::Min),
            agg(AggregateOp::Max),
        ],
    );
    let plan = optimize(&query, &ctx).unwrap();
    let rows = execute(&plan, &mut ctx);
    assert_eq!(
        rows,
        vec![Row::new(vec![
            Value::Int64(5),
            Value::Int64(15),
            Value::Double(3.0),
            Value::Int64(1),
            Value::Int64(5),
        ])]
    );
}

/// `users(id, name)` with 1,000 rows and a unique index on `id`.
fn indexed_db() -> (Catalog, PageStore) {
    let mut catalog = Catalog::new();
    let id = catalog
        .create_table(
            "users",
            vec![
                Column::new("id", ValueType::Int64).with_constraint(common::Constraint::Primary),
                Column::new("name", ValueType::Varchar),
            ],
        )
        .unwrap();
    catalog
        .create_index()
        .table_name("users")
        .index_name("idx_pk")
        .key(&["id"])
        .unique(true)
        .call()
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(id);
    store
        .create_index(id, "idx_pk", vec![0], vec![], true)
        .unwrap();
    let txn = store.begin();
    for i in 0..1000i64 {
        store
            .insert(
                &txn,
                id,
                &Row::new(vec![i.into(), format!("name{i}").into()]),
            )
            .unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "users").unwrap();
    store.commit(txn).unwrap();
    (catalog, store)
}

#[test]
fn point_query_prefers_the_unique_index() {
    let (catalog, store) = indexed_db();
    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let query = QueryData::new(
        vec!["users"],
        eq("id", 42i64),
        vec![NamedExpr::column("name")],
    );
    let plan = optimize(&query, &ctx).unwrap();
    assert_eq!(
        plan.explain(),
        "Projection: {name} (estimated cost: 1)\n  IndexScan: users.idx_pk where (id = 42)"
    );
    let rows = execute(&plan, &mut ctx);
    assert_eq!(rows, vec![Row::new(vec!["name42".into()])]);
}

#[test]
fn covering_index_uses_index_only_scan() {
    let mut catalog = Catalog::new();
    let id = catalog
        .create_table(
            "events",
            vec![
                Column::new("seq", ValueType::Int64),
                Column::new("tag", ValueType::Varchar),
                Column::new("weight", ValueType::Double),
            ],
        )
        .unwrap();
    catalog
        .create_index()
        .table_name("events")
        .index_name("seq_tag")
        .key(&["seq"])
        .include(&["tag"])
        .unique(true)
        .call()
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(id);
    store
        .create_index(id, "seq_tag", vec![0], vec![1], true)
        .unwrap();
    let txn = store.begin();
    for i in 0..100i64 {
        store
            .insert(
                &txn,
                id,
                &Row::new(vec![i.into(), format!("tag{i}").into(), (i as f64).into()]),
            )
            .unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "events").unwrap();
    store.commit(txn).unwrap();

    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);
    let query = QueryData::new(
        vec!["events"],
        eq("seq", 7i64),
        vec![NamedExpr::column("tag")],
    );
    let plan = optimize(&query, &ctx).unwrap();
    assert!(
        plan.explain().contains("IndexOnlyScan: events.seq_tag"),
        "expected an index-only scan, got:\n{}",
        plan.explain()
    );
    let rows = execute(&plan, &mut ctx);
    assert_eq!(rows, vec![Row::new(vec!["tag7".into()])]);
}

/// Statistics for the three-table join ordering scenario:
/// `|a| = 10`, `|b| = 10,000` (`x` unique, `y` 100-valued), `|c| = 10`.
fn three_table_db() -> (Catalog, PageStore) {
    let mut catalog = Catalog::new();
    catalog
        .create_table("a", vec![Column::new("x", ValueType::Int64)])
        .unwrap();
    catalog
        .create_table(
            "b",
            vec![
                Column::new("x", ValueType::Int64),
                Column::new("y", ValueType::Int64),
            ],
        )
        .unwrap();
    catalog
        .create_table("c", vec![Column::new("y", ValueType::Int64)])
        .unwrap();

    let a_rows: Vec<Row> = (0..10i64).map(|i| Row::new(vec![i.into()])).collect();
    let b_rows: Vec<Row> = (0..10_000i64)
        .map(|i| Row::new(vec![i.into(), (i % 100).into()]))
        .collect();
    let c_rows: Vec<Row> = (0..10i64).map(|i| Row::new(vec![i.into()])).collect();
    for (name, rows) in [("a", &a_rows), ("b", &b_rows), ("c", &c_rows)] {
        let schema = catalog.table(name).unwrap().schema.clone();
        let collected = stats::TableStatistics::collect(&schema, rows.iter());
        catalog.update_statistics(name, collected).unwrap();
    }

    (catalog, PageStore::in_memory())
}

#[test]
fn join_enumeration_orders_three_tables_by_cost() {
    let (catalog, store) = three_table_db();
    let ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let query = QueryData::select_all(
        vec!["a", "b", "c"],
        Expr::binary(
            col_eq_col("a.x", "b.x"),
            BinaryOp::And,
            col_eq_col("b.y", "c.y"),
        ),
    );
    let plan = optimize(&query, &ctx).unwrap();

    // a ⋈ b first on x (hash, building on the 10-row a), then ⋈ c on y.
    let expected = [
        "HashJoin: left [1] right [0] (estimated cost: 20)",
        "  HashJoin: left [0] right [0] (estimated cost: 10010)",
        "    FullScan: b (estimated cost: 10000)",
        "    FullScan: a (estimated cost: 10)",
        "  FullScan: c (estimated cost: 10)",
    ]
    .join("\n");
    assert_eq!(plan.explain(), expected);

    // Strictly cheaper at the root than joining b ⋈ c first.
    let a = ScanTable::from_meta(catalog.table("a").unwrap());
    let b = ScanTable::from_meta(catalog.table("b").unwrap());
    let c = ScanTable::from_meta(catalog.table("c").unwrap());
    let alternative = Plan::product(
        Plan::product(
            Plan::full_scan(b),
            Plan::full_scan(c),
            JoinKind::Hash {
                left_cols: vec![1],
                right_cols: vec![0],
            },
        ),
        Plan::full_scan(a),
        JoinKind::Hash {
            left_cols: vec![0],
            right_cols: vec![0],
        },
    );
    assert!(plan.access_row_count() < alternative.access_row_count());
}

#[test]
fn planning_is_deterministic() {
    let (catalog, store) = three_table_db();
    let ctx = TransactionContext::new(store.begin(), &catalog, &store);
    let query = QueryData::select_all(
        vec!["a", "b", "c"],
        Expr::binary(
            col_eq_col("a.x", "b.x"),
            BinaryOp::And,
            col_eq_col("b.y", "c.y"),
        ),
    );
    let first = optimize(&query, &ctx).unwrap();
    let second = optimize(&query, &ctx).unwrap();
    assert_eq!(first.explain(), second.explain());
}

#[test]
fn equi_join_with_index_uses_index_join() {
    let (catalog, store) = indexed_db();
    // A small probe table referencing users.id.
    let mut catalog = catalog;
    let probe = catalog
        .create_table("visits", vec![Column::new("user_id", ValueType::Int64)])
        .unwrap();
    store.register_table(probe);
    let txn = store.begin();
    for i in [42i64, 7, 42] {
        store
            .insert(&txn, probe, &Row::new(vec![i.into()]))
            .unwrap();
    }
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "visits").unwrap();
    store.commit(txn).unwrap();

    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);
    let query = QueryData::select_all(vec!["visits", "users"], col_eq_col("user_id", "id"));
    let plan = optimize(&query, &ctx).unwrap();
    assert!(
        plan.explain().contains("IndexJoin"),
        "expected an index join, got:\n{}",
        plan.explain()
    );
    let rows = sorted(execute(&plan, &mut ctx));
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].values[0], Value::Int64(7));
    assert_eq!(rows[0].values[2], Value::Varchar("name7".into()));
}

#[test]
fn null_rows_filter_and_propagate() {
    let mut catalog = Catalog::new();
    let id = catalog
        .create_table(
            "pairs",
            vec![
                Column::new("p", ValueType::Int64),
                Column::new("q", ValueType::Int64),
            ],
        )
        .unwrap();
    let store = PageStore::in_memory();
    store.register_table(id);
    let txn = store.begin();
    store
        .insert(&txn, id, &Row::new(vec![Value::Null, 3.into()]))
        .unwrap();
    store.commit(txn).unwrap();
    let txn = store.begin();
    refresh_table_statistics(&mut catalog, &store, &txn, "pairs").unwrap();
    store.commit(txn).unwrap();

    let mut ctx = TransactionContext::new(store.begin(), &catalog, &store);

    // (p = 1) over a null p filters the row out.
    let filtered = optimize(&QueryData::select_all(vec!["pairs"], eq("p", 1i64)), &ctx).unwrap();
    assert!(execute(&filtered, &mut ctx).is_empty());

    // (p IS NULL) passes it.
    let is_null = Expr::unary(expr::UnaryOp::IsNull, Expr::column("p"));
    let kept = optimize(&QueryData::select_all(vec!["pairs"], is_null), &ctx).unwrap();
    assert_eq!(execute(&kept, &mut ctx).len(), 1);

    // p + q projects to null.
    let sum = Expr::binary(Expr::column("p"), BinaryOp::Add, Expr::column("q"));
    let projected = optimize(
        &QueryData::new(vec!["pairs"], Expr::constant(1i64), vec![NamedExpr::bare(sum)]),
        &ctx,
    )
    .unwrap();
    assert_eq!(
        execute(&projected, &mut ctx),
        vec![Row::new(vec![Value::Null])]
    );
}

#[test]
fn planning_failure_modes() {
    let (catalog, store) = sample_db();
    let ctx = TransactionContext::new(store.begin(), &catalog, &store);

    let empty = QueryData::select_all(Vec::<String>::new(), Expr::constant(1i64));
    assert!(matches!(
        optimize(&empty, &ctx),
        Err(DbError::InvalidQuery(_))
    ));

    let unknown_table = QueryData::select_all(vec!["missing"], Expr::constant(1i64));
    assert!(matches!(
        optimize(&unknown_table, &ctx),
        Err(DbError::NameResolution(_))
    ));

    let unknown_column = QueryData::new(
        vec!["t"],
        Expr::constant(1i64),
        vec![NamedExpr::column("nope")],
    );
    assert!(matches!(
        optimize(&unknown_column, &ctx),
        Err(DbError::NameResolution(_))
    ));

    let mixed = QueryData::new(
        vec!["t"],
        Expr::constant(1i64),
        vec![
            NamedExpr::bare(Expr::aggregate(AggregateOp::Count, Expr::column("key"))),
            NamedExpr::column("name"),
        ],
    );
    assert!(matches!(optimize(&mixed, &ctx), Err(DbError::InvalidQuery(_))));
}

#[test]
fn cost_formulas_match_the_model() {
    let (catalog, _store) = sample_db();
    let t = ScanTable::from_meta(catalog.table("t").unwrap());

    let scan = Plan::full_scan(t.clone());
    assert_eq!(scan.access_row_count(), 4);
    assert_eq!(scan.emit_row_count(), 4);

    // Selection: access = child emit, emit = child emit / distinct(key).
    let sel = Plan::selection(scan.clone(), eq("key", 2i64));
    assert_eq!(sel.access_row_count(), 4);
    assert_eq!(sel.emit_row_count(), 1);

    // Cross product: access = l.emit + l.emit * r.emit.
    let cross = Plan::product(scan.clone(), scan.clone(), JoinKind::Cross);
    assert_eq!(cross.access_row_count(), 4 + 16);
    assert_eq!(cross.emit_row_count(), 16);

    // Projection passes both counts through.
    let proj = Plan::projection(sel, vec![NamedExpr::column("name")]);
    assert_eq!(proj.access_row_count(), 4);
    assert_eq!(proj.emit_row_count(), 1);

    // Aggregation emits one row.
    let agg = Plan::aggregation(
        proj,
        vec![NamedExpr::bare(Expr::count_star())],
    );
    assert_eq!(agg.emit_row_count(), 1);
}

#[test]
fn projection_naming_rules() {
    let (catalog, _store) = sample_db();
    let t = ScanTable::from_meta(catalog.table("t").unwrap());
    let plan = Plan::projection(
        Plan::full_scan(t),
        vec![
            NamedExpr::column("name"),
            NamedExpr::new(
                "twice",
                Expr::binary(Expr::column("key"), BinaryOp::Mul, Expr::constant(2i64)),
            ),
            NamedExpr::bare(Expr::binary(
                Expr::column("score"),
                BinaryOp::Add,
                Expr::constant(1.0),
            )),
        ],
    );
    let schema = plan.schema();
    assert_eq!(schema.column(0).name().to_string(), "t.name");
    assert_eq!(schema.column(1).name().to_string(), "twice");
    assert_eq!(schema.column(2).name().to_string(), "$col2");
    assert_eq!(schema.column(1).value_type(), ValueType::Int64);
    assert_eq!(schema.column(2).value_type(), ValueType::Double);
}
