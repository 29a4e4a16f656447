use crate::{push_line, Executor, TransactionContext, Tuple};
use common::{DbError, DbResult, Row, Schema};
use expr::{AggregateOp, Expr, NamedExpr};
use types::Value;

/// Whole-relation aggregation: consumes the entire child on the first
/// `next()`, emits exactly one row, then exhaustion. Null child values are
/// skipped everywhere; `COUNT` therefore counts non-null evaluations, and
/// `COUNT(constant)` counts rows.
pub struct AggregationExec {
    child: Box<dyn Executor>,
    aggregates: Vec<NamedExpr>,
    input_schema: Schema,
    done: bool,
}

impl AggregationExec {
    pub fn new(child: Box<dyn Executor>, aggregates: Vec<NamedExpr>, input_schema: Schema) -> Self {
        Self {
            child,
            aggregates,
            input_schema,
            done: false,
        }
    }
}

enum Accumulator {
    Count { count: i64 },
    Sum { acc: Option<Value> },
    Avg { sum: f64, count: i64 },
    Min { acc: Option<Value> },
    Max { acc: Option<Value> },
}

impl Accumulator {
    fn new(op: AggregateOp) -> Self {
        match op {
            AggregateOp::Count => Accumulator::Count { count: 0 },
            AggregateOp::Sum => Accumulator::Sum { acc: None },
            AggregateOp::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateOp::Min => Accumulator::Min { acc: None },
            AggregateOp::Max => Accumulator::Max { acc: None },
        }
    }

    fn feed(&mut self, value: Value) -> DbResult<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Accumulator::Count { count } => *count += 1,
            Accumulator::Sum { acc } => {
                *acc = Some(match acc.take() {
                    None => value,
                    Some(prev) => add_values(prev, value)?,
                });
            }
            Accumulator::Avg { sum, count } => {
                *sum += numeric(&value)?;
                *count += 1;
            }
            Accumulator::Min { acc } => {
                *acc = Some(match acc.take() {
                    None => value,
                    Some(prev) => pick(prev, value, std::cmp::Ordering::Less)?,
                });
            }
            Accumulator::Max { acc } => {
                *acc = Some(match acc.take() {
                    None => value,
                    Some(prev) => pick(prev, value, std::cmp::Ordering::Greater)?,
                });
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count { count } => Value::Int64(count),
            Accumulator::Sum { acc } => acc.unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Double(sum / count as f64)
                }
            }
            Accumulator::Min { acc } | Accumulator::Max { acc } => acc.unwrap_or(Value::Null),
        }
    }
}

fn add_values(a: Value, b: Value) -> DbResult<Value> {
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x
            .checked_add(y)
            .map(Value::Int64)
            .ok_or_else(|| DbError::Arithmetic("sum overflow".into())),
        (Value::Double(x), Value::Double(y)) => Ok(Value::Double(x + y)),
        (a, b) => Err(DbError::TypeMismatch(format!("cannot sum {a} and {b}"))),
    }
}

fn numeric(v: &Value) -> DbResult<f64> {
    match v {
        Value::Int64(i) => Ok(*i as f64),
        Value::Double(d) => Ok(*d),
        other => Err(DbError::TypeMismatch(format!("AVG over non-numeric {other}"))),
    }
}

fn pick(a: Value, b: Value, keep_b_when: std::cmp::Ordering) -> DbResult<Value> {
    let ord = b
        .cmp_same_type(&a)
        .ok_or_else(|| DbError::TypeMismatch(format!("cannot compare {b} with {a}")))?;
    Ok(if ord == keep_b_when { b } else { a })
}

impl Executor for AggregationExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        let mut state = Vec::with_capacity(self.aggregates.len());
        for named in &self.aggregates {
            match &named.expr {
                Expr::Aggregate { op, child } => state.push((Accumulator::new(*op), child)),
                other => {
                    return Err(DbError::InvalidQuery(format!(
                        "aggregation over non-aggregate expression {other}"
                    )));
                }
            }
        }
        while let Some((row, _)) = self.child.next(ctx)? {
            for (acc, child) in &mut state {
                let value = child.evaluate(&row, &self.input_schema)?;
                acc.feed(value)?;
            }
        }
        let values = state.into_iter().map(|(acc, _)| acc.finish()).collect();
        self.done = true;
        Ok(Some((Row::new(values), None)))
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        let items: Vec<String> = self.aggregates.iter().map(|a| a.to_string()).collect();
        push_line(out, indent, &format!("Aggregation: {{{}}}", items.join(", ")));
        self.child.explain_into(out, indent + 1);
    }
}
