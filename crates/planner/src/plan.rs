use catalog::{IndexMeta, TableMeta};
use common::{Column, ColumnName, DbError, DbResult, Schema, TableId};
use executor::{
    AggregationExec, CrossJoinExec, Executor, FullScanExec, HashJoinExec, IndexJoinExec,
    IndexOnlyScanExec, IndexScanExec, ProjectionExec, SelectionExec, TransactionContext,
};
use expr::{Expr, NamedExpr};
use stats::TableStatistics;
use types::{Value, ValueType};

/// Snapshot of one base table taken at planning time: identity, schema,
/// indexes, and a read-only copy of the statistics.
#[derive(Clone, Debug)]
pub struct ScanTable {
    pub id: TableId,
    pub name: String,
    pub schema: Schema,
    pub indexes: Vec<IndexMeta>,
    pub stats: TableStatistics,
}

impl ScanTable {
    pub fn from_meta(meta: &TableMeta) -> Self {
        Self {
            id: meta.id,
            name: meta.name.clone(),
            schema: meta.schema.clone(),
            indexes: meta.indexes.clone(),
            stats: meta.stats.clone(),
        }
    }
}

/// Physical strategy of a `Product` node.
#[derive(Clone, Debug)]
pub enum JoinKind {
    Cross,
    Hash {
        left_cols: Vec<usize>,
        right_cols: Vec<usize>,
    },
    /// Point lookups against the right table's index. Requires the right
    /// side to be a bare table scan so its output matches the hash
    /// alternative row for row.
    IndexLookup {
        left_cols: Vec<usize>,
        index: IndexMeta,
        right_cols: Vec<usize>,
    },
}

/// Logical plan tree. Immutable once built; every node can report its
/// schema, cost estimates, and build the operator that executes it.
#[derive(Clone, Debug)]
pub enum Plan {
    FullScan {
        table: ScanTable,
    },
    IndexScan {
        table: ScanTable,
        index: IndexMeta,
        begin: Value,
        end: Value,
        ascending: bool,
        predicate: Expr,
    },
    IndexOnlyScan {
        table: ScanTable,
        index: IndexMeta,
        begin: Value,
        end: Value,
        ascending: bool,
        predicate: Expr,
        schema: Schema,
    },
    Selection {
        child: Box<Plan>,
        predicate: Expr,
    },
    Projection {
        child: Box<Plan>,
        columns: Vec<NamedExpr>,
        schema: Schema,
    },
    Product {
        left: Box<Plan>,
        right: Box<Plan>,
        join: JoinKind,
        schema: Schema,
    },
    Aggregation {
        child: Box<Plan>,
        aggregates: Vec<NamedExpr>,
        schema: Schema,
    },
}

impl Plan {
    pub fn full_scan(table: ScanTable) -> Plan {
        Plan::FullScan { table }
    }

    pub fn index_scan(
        table: ScanTable,
        index: IndexMeta,
        begin: Value,
        end: Value,
        predicate: Expr,
    ) -> Plan {
        Plan::IndexScan {
            table,
            index,
            begin,
            end,
            ascending: true,
            predicate,
        }
    }

    /// The output schema is the index's key columns followed by its include
    /// columns, cloned from the table schema.
    pub fn index_only_scan(
        table: ScanTable,
        index: IndexMeta,
        begin: Value,
        end: Value,
        predicate: Expr,
    ) -> Plan {
        let columns: Vec<Column> = index
            .covered_columns()
            .into_iter()
            .map(|o| table.schema.column(o).clone())
            .collect();
        let schema = Schema::new("", columns);
        Plan::IndexOnlyScan {
            table,
            index,
            begin,
            end,
            ascending: true,
            predicate,
            schema,
        }
    }

    pub fn selection(child: Plan, predicate: Expr) -> Plan {
        Plan::Selection {
            child: Box::new(child),
            predicate,
        }
    }

    /// Output column naming: a bare column reference keeps the referenced
    /// column's name, otherwise the alias, otherwise a synthesized `$colN`.
    pub fn projection(child: Plan, columns: Vec<NamedExpr>) -> Plan {
        let input = child.schema();
        let cols = columns
            .iter()
            .enumerate()
            .map(|(i, ne)| {
                let ty = ne.expr.result_type(input).unwrap_or(ValueType::Int64);
                if !ne.alias.is_empty() {
                    return Column::new(ColumnName::bare(ne.alias.clone()), ty);
                }
                if let Expr::ColumnRef(name) = &ne.expr
                    && let Ok(Some(offset)) = input.find(name)
                {
                    return input.column(offset).clone();
                }
                Column::new(ColumnName::bare(format!("$col{i}")), ty)
            })
            .collect();
        let schema = Schema::new("", cols);
        Plan::Projection {
            child: Box::new(child),
            columns,
            schema,
        }
    }

    pub fn product(left: Plan, right: Plan, join: JoinKind) -> Plan {
        let schema = left.schema().clone() + right.schema().clone();
        Plan::Product {
            left: Box::new(left),
            right: Box::new(right),
            join,
            schema,
        }
    }

    pub fn aggregation(child: Plan, aggregates: Vec<NamedExpr>) -> Plan {
        let input = child.schema();
        let cols = aggregates
            .iter()
            .enumerate()
            .map(|(i, ne)| {
                let ty = ne.expr.result_type(input).unwrap_or(ValueType::Int64);
                let name = if ne.alias.is_empty() {
                    format!("$col{i}")
                } else {
                    ne.alias.clone()
                };
                Column::new(ColumnName::bare(name), ty)
            })
            .collect();
        let schema = Schema::new("", cols);
        Plan::Aggregation {
            child: Box::new(child),
            aggregates,
            schema,
        }
    }

    pub fn schema(&self) -> &Schema {
        match self {
            Plan::FullScan { table } | Plan::IndexScan { table, .. } => &table.schema,
            Plan::IndexOnlyScan { schema, .. }
            | Plan::Projection { schema, .. }
            | Plan::Product { schema, .. }
            | Plan::Aggregation { schema, .. } => schema,
            Plan::Selection { child, .. } => child.schema(),
        }
    }

    /// The base table this subtree roots at, if it roots at exactly one.
    pub fn scan_source(&self) -> Option<&ScanTable> {
        match self {
            Plan::FullScan { table }
            | Plan::IndexScan { table, .. }
            | Plan::IndexOnlyScan { table, .. } => Some(table),
            Plan::Selection { child, .. }
            | Plan::Projection { child, .. }
            | Plan::Aggregation { child, .. } => child.scan_source(),
            Plan::Product { .. } => None,
        }
    }

    /// Statistics snapshot guiding this subtree's estimates. A `Product`
    /// reports its left side's statistics.
    pub fn stats(&self) -> &TableStatistics {
        match self {
            Plan::FullScan { table }
            | Plan::IndexScan { table, .. }
            | Plan::IndexOnlyScan { table, .. } => &table.stats,
            Plan::Selection { child, .. }
            | Plan::Projection { child, .. }
            | Plan::Aggregation { child, .. } => child.stats(),
            Plan::Product { left, .. } => left.stats(),
        }
    }

    /// Estimated rows this node must examine to produce its output; the
    /// optimizer's primary cost signal.
    pub fn access_row_count(&self) -> u64 {
        to_rows(self.access_estimate())
    }

    /// Estimated rows this node produces.
    pub fn emit_row_count(&self) -> u64 {
        to_rows(self.emit_estimate())
    }

    fn access_estimate(&self) -> f64 {
        match self {
            Plan::FullScan { table } => table.stats.row_count as f64,
            Plan::IndexScan { .. } | Plan::IndexOnlyScan { .. } => self.emit_estimate(),
            Plan::Selection { child, .. } => child.emit_estimate(),
            Plan::Projection { child, .. } | Plan::Aggregation { child, .. } => {
                child.access_estimate()
            }
            Plan::Product {
                left, right, join, ..
            } => match join {
                JoinKind::Cross => {
                    left.emit_estimate() + left.emit_estimate() * right.emit_estimate()
                }
                JoinKind::Hash { .. } | JoinKind::IndexLookup { .. } => {
                    left.emit_estimate() + right.emit_estimate()
                }
            },
        }
    }

    fn emit_estimate(&self) -> f64 {
        match self {
            Plan::FullScan { table } => table.stats.row_count as f64,
            Plan::IndexScan {
                table,
                index,
                begin,
                end,
                ..
            }
            | Plan::IndexOnlyScan {
                table,
                index,
                begin,
                end,
                ..
            } => {
                if index.unique && !begin.is_null() && begin == end {
                    return 1.0;
                }
                let key_col = index.key.first().copied().unwrap_or(0);
                table.stats.estimate_range(key_col, begin, end).ceil()
            }
            Plan::Selection { child, predicate } => {
                let factor = self
                    .stats()
                    .reduction_factor(child.schema(), predicate)
                    .max(1.0);
                child.emit_estimate() / factor
            }
            Plan::Projection { child, .. } => child.emit_estimate(),
            Plan::Aggregation { .. } => 1.0,
            Plan::Product {
                left, right, join, ..
            } => {
                let cross = left.emit_estimate() * right.emit_estimate();
                match join {
                    JoinKind::Cross => cross,
                    JoinKind::Hash {
                        left_cols,
                        right_cols,
                    }
                    | JoinKind::IndexLookup {
                        left_cols,
                        right_cols,
                        ..
                    } => {
                        let dl = key_distinct(left, left_cols);
                        let dr = key_distinct(right, right_cols);
                        cross / dl.max(dr).max(1.0)
                    }
                }
            }
        }
    }

    /// Build the operator tree executing this plan.
    pub fn emit_executor(&self, ctx: &TransactionContext<'_>) -> DbResult<Box<dyn Executor>> {
        match self {
            Plan::FullScan { table } => {
                let meta = ctx.catalog.table(&table.name)?;
                Ok(Box::new(FullScanExec::new(meta.id, meta.name.clone())))
            }
            Plan::IndexScan {
                table,
                index,
                begin,
                end,
                ascending,
                predicate,
            } => {
                let meta = ctx.catalog.table(&table.name)?;
                meta.index(&index.name)?;
                Ok(Box::new(
                    IndexScanExec::builder()
                        .table(meta.id)
                        .table_name(meta.name.clone())
                        .index_name(index.name.clone())
                        .begin(begin.clone())
                        .end(end.clone())
                        .ascending(*ascending)
                        .predicate(predicate.clone())
                        .schema(table.schema.clone())
                        .build(),
                ))
            }
            Plan::IndexOnlyScan {
                table,
                index,
                begin,
                end,
                ascending,
                predicate,
                schema,
            } => {
                let meta = ctx.catalog.table(&table.name)?;
                meta.index(&index.name)?;
                Ok(Box::new(
                    IndexOnlyScanExec::builder()
                        .table(meta.id)
                        .table_name(meta.name.clone())
                        .index_name(index.name.clone())
                        .begin(begin.clone())
                        .end(end.clone())
                        .ascending(*ascending)
                        .predicate(predicate.clone())
                        .output_schema(schema.clone())
                        .build(),
                ))
            }
            Plan::Selection { child, predicate } => Ok(Box::new(SelectionExec::new(
                child.emit_executor(ctx)?,
                predicate.clone(),
                child.schema().clone(),
            ))),
            Plan::Projection { child, columns, .. } => Ok(Box::new(ProjectionExec::new(
                child.emit_executor(ctx)?,
                columns.clone(),
                child.schema().clone(),
            ))),
            Plan::Product {
                left, right, join, ..
            } => match join {
                JoinKind::Cross => Ok(Box::new(CrossJoinExec::new(
                    left.emit_executor(ctx)?,
                    right.emit_executor(ctx)?,
                ))),
                JoinKind::Hash {
                    left_cols,
                    right_cols,
                } => Ok(Box::new(HashJoinExec::new(
                    left.emit_executor(ctx)?,
                    left_cols.clone(),
                    right.emit_executor(ctx)?,
                    right_cols.clone(),
                ))),
                JoinKind::IndexLookup {
                    left_cols, index, ..
                } => {
                    let src = right.scan_source().ok_or_else(|| {
                        DbError::Internal("index join requires a base-table inner side".into())
                    })?;
                    Ok(Box::new(IndexJoinExec::new(
                        left.emit_executor(ctx)?,
                        left_cols.clone(),
                        src.id,
                        src.name.clone(),
                        index.name.clone(),
                    )))
                }
            },
            Plan::Aggregation {
                child, aggregates, ..
            } => Ok(Box::new(AggregationExec::new(
                child.emit_executor(ctx)?,
                aggregates.clone(),
                child.schema().clone(),
            ))),
        }
    }

    /// Human-readable plan tree: one line per node, children indented two
    /// spaces.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out.truncate(out.trim_end().len());
        out
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        match self {
            Plan::FullScan { table } => {
                out.push_str(&format!(
                    "{pad}FullScan: {} (estimated cost: {})\n",
                    table.name,
                    self.access_row_count()
                ));
            }
            Plan::IndexScan {
                table,
                index,
                begin,
                end,
                predicate,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}IndexScan: {}.{}{} where {}\n",
                    table.name,
                    index.name,
                    range_display(begin, end),
                    predicate
                ));
            }
            Plan::IndexOnlyScan {
                table,
                index,
                begin,
                end,
                predicate,
                ..
            } => {
                out.push_str(&format!(
                    "{pad}IndexOnlyScan: {}.{}{} where {}\n",
                    table.name,
                    index.name,
                    range_display(begin, end),
                    predicate
                ));
            }
            Plan::Selection { child, predicate } => {
                out.push_str(&format!(
                    "{pad}Selection: [{predicate}] (estimated cost: {})\n",
                    self.access_row_count()
                ));
                child.explain_into(out, indent + 1);
            }
            Plan::Projection { child, schema, .. } => {
                let names: Vec<&str> = schema
                    .columns()
                    .iter()
                    .map(|c| c.name().name.as_str())
                    .collect();
                out.push_str(&format!(
                    "{pad}Projection: {{{}}} (estimated cost: {})\n",
                    names.join(", "),
                    self.access_row_count()
                ));
                child.explain_into(out, indent + 1);
            }
            Plan::Product {
                left, right, join, ..
            } => {
                let line = match join {
                    JoinKind::Cross => format!(
                        "{pad}CrossJoin: (estimated cost: {})\n",
                        self.access_row_count()
                    ),
                    JoinKind::Hash {
                        left_cols,
                        right_cols,
                    } => format!(
                        "{pad}HashJoin: left {left_cols:?} right {right_cols:?} (estimated cost: {})\n",
                        self.access_row_count()
                    ),
                    JoinKind::IndexLookup {
                        left_cols, index, ..
                    } => {
                        let inner = right
                            .scan_source()
                            .map(|t| t.name.as_str())
                            .unwrap_or("?");
                        format!(
                            "{pad}IndexJoin: left {left_cols:?} right {inner}.{} (estimated cost: {})\n",
                            index.name,
                            self.access_row_count()
                        )
                    }
                };
                out.push_str(&line);
                left.explain_into(out, indent + 1);
                right.explain_into(out, indent + 1);
            }
            Plan::Aggregation {
                child, aggregates, ..
            } => {
                let items: Vec<String> = aggregates.iter().map(|a| a.to_string()).collect();
                out.push_str(&format!(
                    "{pad}Aggregation: {{{}}} (estimated cost: {})\n",
                    items.join(", "),
                    self.access_row_count()
                ));
                child.explain_into(out, indent + 1);
            }
        }
    }
}

fn range_display(begin: &Value, end: &Value) -> String {
    if begin == end && !begin.is_null() {
        String::new()
    } else {
        format!(" [{begin}, {end}]")
    }
}

fn to_rows(estimate: f64) -> u64 {
    if estimate.is_finite() {
        estimate.max(0.0).ceil() as u64
    } else {
        u64::MAX
    }
}

/// Combined distinct count of a join side's key columns, resolved through
/// the side's scan source. A side spanning several tables has no single
/// statistics snapshot; its emit count stands in for the distinct count.
fn key_distinct(side: &Plan, cols: &[usize]) -> f64 {
    let Some(src) = side.scan_source() else {
        return side.emit_estimate().max(1.0);
    };
    let mut product = 1.0;
    for &col in cols {
        let Some(column) = side.schema().columns().get(col) else {
            return side.emit_estimate().max(1.0);
        };
        let Ok(Some(offset)) = src.schema.find(column.name()) else {
            return side.emit_estimate().max(1.0);
        };
        product *= src.stats.distinct(offset);
    }
    product.min(src.stats.row_count.max(1) as f64)
}
