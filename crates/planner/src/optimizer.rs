//! Query optimization: predicate push-down, access-method choice, and
//! dynamic-programming join enumeration keyed by table subsets. All
//! intermediate state lives in ordered collections so identical inputs
//! always yield structurally identical plans.

use crate::{JoinKind, Plan, QueryData, ScanTable};
use catalog::TableMeta;
use common::{Column, ColumnName, DbError, DbResult, Schema};
use executor::TransactionContext;
use expr::{BinaryOp, Expr, NamedExpr};
use std::collections::{BTreeMap, BTreeSet};
use types::Value;

struct CostAndPlan {
    cost: u64,
    plan: Plan,
    /// Conjunct indices this plan already enforces, via push-down or join
    /// keys. Anything else is wrapped around the final plan.
    used: BTreeSet<usize>,
}

/// Pick the cheapest plan for `query`. Costs compare by the root's
/// `access_row_count`; ties prefer the smaller build side, then the plan
/// constructed first.
pub fn optimize(query: &QueryData, ctx: &TransactionContext<'_>) -> DbResult<Plan> {
    if query.from.is_empty() {
        return Err(DbError::InvalidQuery("query names no tables".into()));
    }

    let mut metas: Vec<&TableMeta> = Vec::with_capacity(query.from.len());
    for name in &query.from {
        metas.push(ctx.catalog.table(name)?);
    }

    // Every referenced column must resolve, unambiguously, in the joined
    // namespace of the FROM tables.
    let joined_schema = metas
        .iter()
        .map(|m| m.schema.clone())
        .reduce(|a, b| a + b)
        .ok_or_else(|| DbError::InvalidQuery("query names no tables".into()))?;
    let mut referenced = query.where_clause.referenced_columns();
    for ne in &query.select {
        ne.expr.collect_columns(&mut referenced);
    }
    for col in &referenced {
        joined_schema.offset(col)?;
    }

    // A constant-true conjunct (the default WHERE) enforces nothing.
    let conjuncts: Vec<Expr> = query
        .where_clause
        .split_conjunctions()
        .into_iter()
        .filter(|c| !matches!(c, Expr::Constant(v) if v.truthy()))
        .cloned()
        .collect();

    // Columns demanded above the scans; `None` (SELECT *) disables pruning.
    let demand: Option<BTreeSet<ColumnName>> = if query.select.is_empty() {
        None
    } else {
        Some(referenced)
    };

    let mut best: BTreeMap<BTreeSet<String>, CostAndPlan> = BTreeMap::new();
    for meta in &metas {
        let (plan, used) = table_access_plan(meta, &conjuncts, demand.as_ref());
        tracing::debug!(table = %meta.name, cost = plan.access_row_count(), "base table plan");
        let cost = plan.access_row_count();
        best.entry(BTreeSet::from([meta.name.clone()]))
            .or_insert(CostAndPlan { cost, plan, used });
    }

    let full_set: BTreeSet<String> = query.from.iter().cloned().collect();
    for _ in 1..full_set.len() {
        let snapshot: Vec<(BTreeSet<String>, Plan, BTreeSet<usize>)> = best
            .iter()
            .map(|(k, v)| (k.clone(), v.plan.clone(), v.used.clone()))
            .collect();
        for (left_key, left_plan, left_used) in &snapshot {
            for (right_key, right_plan, right_used) in &snapshot {
                if left_key.intersection(right_key).next().is_some() {
                    continue;
                }
                let (plan, join_used) = best_join(&conjuncts, left_plan, right_plan);
                let mut used: BTreeSet<usize> = left_used | right_used;
                used.extend(join_used);
                let key: BTreeSet<String> = left_key | right_key;
                let cost = plan.access_row_count();
                match best.get(&key) {
                    Some(existing) if existing.cost <= cost => {}
                    _ => {
                        best.insert(key, CostAndPlan { cost, plan, used });
                    }
                }
            }
        }
    }

    let CostAndPlan { plan, used, .. } = best
        .remove(&full_set)
        .ok_or_else(|| DbError::Internal("join enumeration left no plan for the full set".into()))?;

    let remaining: Vec<Expr> = conjuncts
        .iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, c)| c.clone())
        .collect();
    let mut plan = match Expr::conjunction(remaining) {
        Some(pred) => Plan::selection(plan, pred),
        None => plan,
    };

    if query.select.iter().any(|ne| has_aggregate(&ne.expr)) {
        if !query.select.iter().all(|ne| ne.expr.is_aggregate()) {
            return Err(DbError::InvalidQuery(
                "select list mixes aggregates with plain expressions".into(),
            ));
        }
        plan = Plan::aggregation(plan, query.select.clone());
    } else if !query.select.is_empty() {
        plan = Plan::projection(plan, query.select.clone());
    }

    tracing::debug!(cost = plan.access_row_count(), "plan selected");
    Ok(plan)
}

/// Cheapest access path for one base table: full scan behind its pushed-down
/// selection, or an index (index-only where covering), pruned to the
/// demanded columns.
fn table_access_plan(
    meta: &TableMeta,
    conjuncts: &[Expr],
    demand: Option<&BTreeSet<ColumnName>>,
) -> (Plan, BTreeSet<usize>) {
    let table = ScanTable::from_meta(meta);
    let schema = table.schema.clone();

    let mut used = BTreeSet::new();
    let mut preds = Vec::new();
    for (i, c) in conjuncts.iter().enumerate() {
        if c.references_any(&schema) && c.touches_only(&schema) {
            preds.push(c.clone());
            used.insert(i);
        }
    }
    let predicate = Expr::conjunction(preds);

    let demanded = demanded_offsets(&schema, demand);

    // The full scan seeds the choice; every index candidate must beat it.
    let mut plan = match &predicate {
        Some(p) => Plan::selection(Plan::full_scan(table.clone()), p.clone()),
        None => Plan::full_scan(table.clone()),
    };
    if let Some(p) = &predicate {
        for index in &meta.indexes {
            let Some(&first_key) = index.key.first() else {
                continue;
            };
            let Some((begin, end)) = column_bounds(p, &schema, first_key) else {
                continue;
            };
            let covered: BTreeSet<usize> = index.covered_columns().into_iter().collect();
            let pred_covered = p
                .referenced_columns()
                .iter()
                .all(|c| resolves_within(&schema, c, &covered));
            let demand_covered = demanded
                .as_ref()
                .is_some_and(|d| d.iter().all(|o| covered.contains(o)));
            let candidate = if pred_covered && demand_covered {
                Plan::index_only_scan(table.clone(), index.clone(), begin, end, p.clone())
            } else {
                Plan::index_scan(table.clone(), index.clone(), begin, end, p.clone())
            };
            if candidate.access_row_count() < plan.access_row_count() {
                plan = candidate;
            }
        }
    }

    if let Some(offsets) = &demanded {
        let prune = offsets.len() < schema.column_count()
            || matches!(plan, Plan::IndexOnlyScan { .. });
        if prune {
            let columns = offsets
                .iter()
                .map(|&o| NamedExpr::column(schema.column(o).name().clone()))
                .collect();
            plan = Plan::projection(plan, columns);
        }
    }
    (plan, used)
}

fn resolves_within(schema: &Schema, col: &ColumnName, covered: &BTreeSet<usize>) -> bool {
    matches!(schema.find(col), Ok(Some(offset)) if covered.contains(&offset))
}

fn matches_column(demanded: &ColumnName, column: &Column) -> bool {
    let name = column.name();
    if demanded.is_qualified() {
        demanded == name
    } else {
        demanded.name == name.name
    }
}

fn demanded_offsets(
    schema: &Schema,
    demand: Option<&BTreeSet<ColumnName>>,
) -> Option<Vec<usize>> {
    demand.map(|set| {
        schema
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, col)| set.iter().any(|d| matches_column(d, col)))
            .map(|(i, _)| i)
            .collect()
    })
}

/// Derive inclusive index bounds for `key_offset` from the table's pushed
/// predicate. Strict comparisons keep their bound inclusively; the residual
/// predicate re-checks exactness. Null bounds mean unbounded.
fn column_bounds(predicate: &Expr, schema: &Schema, key_offset: usize) -> Option<(Value, Value)> {
    let mut begin = Value::Null;
    let mut end = Value::Null;
    let mut found = false;
    for c in predicate.split_conjunctions() {
        let Expr::Binary { left, op, right } = c else {
            continue;
        };
        let (col, op, value) = match (&**left, &**right) {
            (Expr::ColumnRef(col), Expr::Constant(v)) => (col, *op, v),
            (Expr::Constant(v), Expr::ColumnRef(col)) => (col, mirror(*op), v),
            _ => continue,
        };
        if value.is_null() {
            continue;
        }
        if !matches!(schema.find(col), Ok(Some(offset)) if offset == key_offset) {
            continue;
        }
        match op {
            BinaryOp::Eq => return Some((value.clone(), value.clone())),
            BinaryOp::Le | BinaryOp::Lt => {
                if end.is_null() {
                    end = value.clone();
                    found = true;
                }
            }
            BinaryOp::Ge | BinaryOp::Gt => {
                if begin.is_null() {
                    begin = value.clone();
                    found = true;
                }
            }
            _ => {}
        }
    }
    found.then_some((begin, end))
}

fn mirror(op: BinaryOp) -> BinaryOp {
    match op {
        BinaryOp::Lt => BinaryOp::Gt,
        BinaryOp::Le => BinaryOp::Ge,
        BinaryOp::Gt => BinaryOp::Lt,
        BinaryOp::Ge => BinaryOp::Le,
        other => other,
    }
}

/// Best way to combine two disjoint subplans: a hash join (either
/// ordering) or an index lookup for each crossing equi-conjunct, else a
/// cross join carrying any crossing predicates as a selection.
fn best_join(
    conjuncts: &[Expr],
    left: &Plan,
    right: &Plan,
) -> (Plan, BTreeSet<usize>) {
    let left_schema = left.schema();
    let right_schema = right.schema();

    struct Candidate {
        plan: Plan,
        used: BTreeSet<usize>,
    }

    fn better(candidate: &Candidate, incumbent: &Candidate) -> bool {
        let cost = candidate.plan.access_row_count();
        let incumbent_cost = incumbent.plan.access_row_count();
        cost < incumbent_cost
            || (cost == incumbent_cost
                && build_size(&candidate.plan) < build_size(&incumbent.plan))
    }

    let mut candidates: Vec<Candidate> = Vec::new();

    for (i, c) in conjuncts.iter().enumerate() {
        let Expr::Binary {
            left: first,
            op: BinaryOp::Eq,
            right: second,
        } = c
        else {
            continue;
        };
        for (probe_expr, build_expr) in [(first, second), (second, first)] {
            let crosses = probe_expr.references_any(left_schema)
                && probe_expr.touches_only(left_schema)
                && build_expr.references_any(right_schema)
                && build_expr.touches_only(right_schema);
            if !crosses {
                continue;
            }
            let left_cols = target_columns(left_schema, probe_expr);
            let right_cols = target_columns(right_schema, build_expr);
            if left_cols.is_empty() || right_cols.is_empty() {
                continue;
            }
            candidates.push(Candidate {
                plan: Plan::product(
                    left.clone(),
                    right.clone(),
                    JoinKind::Hash {
                        left_cols: left_cols.clone(),
                        right_cols: right_cols.clone(),
                    },
                ),
                used: BTreeSet::from([i]),
            });
            candidates.push(Candidate {
                plan: Plan::product(
                    right.clone(),
                    left.clone(),
                    JoinKind::Hash {
                        left_cols: right_cols.clone(),
                        right_cols: left_cols.clone(),
                    },
                ),
                used: BTreeSet::from([i]),
            });
            if let Some(plan) = index_lookup_candidate(left, &left_cols, right, &right_cols) {
                candidates.push(Candidate {
                    plan,
                    used: BTreeSet::from([i]),
                });
            }
            if let Some(plan) = index_lookup_candidate(right, &right_cols, left, &left_cols) {
                candidates.push(Candidate {
                    plan,
                    used: BTreeSet::from([i]),
                });
            }
            break;
        }
    }

    // Strictly-better replacement keeps the first candidate on ties.
    let chosen = candidates.into_iter().reduce(|incumbent, candidate| {
        if better(&candidate, &incumbent) {
            candidate
        } else {
            incumbent
        }
    });
    if let Some(best) = chosen {
        return (best.plan, best.used);
    }

    // No crossing equi-conjunct: fall back to a cross join, carrying any
    // predicates that span both sides as a selection.
    let joined = left_schema.clone() + right_schema.clone();
    let mut used = BTreeSet::new();
    let mut preds = Vec::new();
    for (i, c) in conjuncts.iter().enumerate() {
        if c.references_any(left_schema)
            && c.references_any(right_schema)
            && c.touches_only(&joined)
        {
            preds.push(c.clone());
            used.insert(i);
        }
    }
    let cross = |l: &Plan, r: &Plan| {
        let base = Plan::product(l.clone(), r.clone(), JoinKind::Cross);
        let plan = match Expr::conjunction(preds.clone()) {
            Some(p) => Plan::selection(base, p),
            None => base,
        };
        Candidate {
            plan,
            used: used.clone(),
        }
    };
    let forward = cross(left, right);
    let backward = cross(right, left);
    let best = if better(&backward, &forward) {
        backward
    } else {
        forward
    };
    (best.plan, best.used)
}

/// Rows the join must materialize; smaller builds win cost ties. An index
/// lookup materializes nothing.
fn build_size(plan: &Plan) -> u64 {
    match plan {
        Plan::Product {
            join: JoinKind::IndexLookup { .. },
            ..
        } => 0,
        Plan::Product { right, .. } => right.emit_row_count(),
        Plan::Selection { child, .. } => build_size(child),
        _ => u64::MAX,
    }
}

fn target_columns(schema: &Schema, expr: &Expr) -> Vec<usize> {
    expr.referenced_columns()
        .iter()
        .filter_map(|c| schema.find(c).ok().flatten())
        .collect()
}

/// An index lookup stands in for a hash join only when the inner side is a
/// bare table scan with an index keyed exactly on the join columns, so
/// both strategies emit identical rows.
fn index_lookup_candidate(
    probe: &Plan,
    probe_cols: &[usize],
    inner: &Plan,
    inner_cols: &[usize],
) -> Option<Plan> {
    let Plan::FullScan { table } = inner else {
        return None;
    };
    let index = table.indexes.iter().find(|idx| idx.key == *inner_cols)?;
    Some(Plan::product(
        probe.clone(),
        inner.clone(),
        JoinKind::IndexLookup {
            left_cols: probe_cols.to_vec(),
            index: index.clone(),
            right_cols: inner_cols.to_vec(),
        },
    ))
}

fn has_aggregate(expr: &Expr) -> bool {
    match expr {
        Expr::Aggregate { .. } => true,
        Expr::Constant(_) | Expr::ColumnRef(_) => false,
        Expr::Unary { child, .. } => has_aggregate(child),
        Expr::Binary { left, right, .. } => has_aggregate(left) || has_aggregate(right),
        Expr::Case {
            when_clauses,
            else_clause,
        } => {
            when_clauses
                .iter()
                .any(|(w, t)| has_aggregate(w) || has_aggregate(t))
                || else_clause.as_deref().is_some_and(has_aggregate)
        }
        Expr::In { needle, list } => has_aggregate(needle) || list.iter().any(has_aggregate),
        Expr::FunctionCall { args, .. } => args.iter().any(has_aggregate),
    }
}
