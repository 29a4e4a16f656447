use crate::{BinaryOp, Expr, UnaryOp};
use common::{DbError, DbResult, Row, Schema};
use std::cmp::Ordering;
use types::Value;

fn bool_value(b: bool) -> Value {
    Value::Int64(b as i64)
}

impl Expr {
    /// Evaluate against one row. Equivalent to the join form with an empty
    /// right side.
    pub fn evaluate(&self, row: &Row, schema: &Schema) -> DbResult<Value> {
        self.eval_inner(row, schema, None)
    }

    /// Evaluate a join predicate against a pair of rows. Column references
    /// resolve against the left schema first, then the right.
    pub fn evaluate_join(
        &self,
        left_row: &Row,
        left_schema: &Schema,
        right_row: &Row,
        right_schema: &Schema,
    ) -> DbResult<Value> {
        self.eval_inner(left_row, left_schema, Some((right_row, right_schema)))
    }

    fn eval_inner(
        &self,
        row: &Row,
        schema: &Schema,
        right: Option<(&Row, &Schema)>,
    ) -> DbResult<Value> {
        match self {
            Expr::Constant(v) => Ok(v.clone()),
            Expr::ColumnRef(name) => {
                if let Some(idx) = schema.find(name)? {
                    return fetch(row, idx);
                }
                if let Some((right_row, right_schema)) = right
                    && let Some(idx) = right_schema.find(name)?
                {
                    return fetch(right_row, idx);
                }
                Err(DbError::NameResolution(format!("unknown column '{name}'")))
            }
            Expr::Unary { op, child } => {
                let v = child.eval_inner(row, schema, right)?;
                eval_unary(*op, v)
            }
            Expr::Binary {
                left,
                op,
                right: rhs,
            } => {
                let l = left.eval_inner(row, schema, right)?;
                let r = rhs.eval_inner(row, schema, right)?;
                eval_binary(*op, l, r)
            }
            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                for (when, then) in when_clauses {
                    if when.eval_inner(row, schema, right)?.truthy() {
                        return then.eval_inner(row, schema, right);
                    }
                }
                match else_clause {
                    Some(e) => e.eval_inner(row, schema, right),
                    None => Ok(Value::Null),
                }
            }
            Expr::In { needle, list } => {
                let target = needle.eval_inner(row, schema, right)?;
                if target.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let v = item.eval_inner(row, schema, right)?;
                    if v.is_null() {
                        saw_null = true;
                        continue;
                    }
                    let ord = target.cmp_same_type(&v).ok_or_else(|| {
                        DbError::TypeMismatch(format!("cannot compare {target} with {v}"))
                    })?;
                    if ord == Ordering::Equal {
                        return Ok(bool_value(true));
                    }
                }
                if saw_null {
                    Ok(Value::Null)
                } else {
                    Ok(bool_value(false))
                }
            }
            Expr::Aggregate { .. } => Err(DbError::Internal(
                "aggregate expression evaluated outside an aggregation".into(),
            )),
            Expr::FunctionCall { name, args } => {
                if name.eq_ignore_ascii_case("coalesce") {
                    for arg in args {
                        let v = arg.eval_inner(row, schema, right)?;
                        if !v.is_null() {
                            return Ok(v);
                        }
                    }
                    return Ok(Value::Null);
                }
                Err(DbError::InvalidQuery(format!("unknown function '{name}'")))
            }
        }
    }
}

fn fetch(row: &Row, idx: usize) -> DbResult<Value> {
    row.get(idx).cloned().ok_or_else(|| {
        DbError::Internal(format!(
            "schema resolved offset {idx} but row has {} values",
            row.len()
        ))
    })
}

fn eval_unary(op: UnaryOp, v: Value) -> DbResult<Value> {
    match op {
        UnaryOp::IsNull => Ok(bool_value(v.is_null())),
        UnaryOp::IsNotNull => Ok(bool_value(!v.is_null())),
        UnaryOp::Not => match v {
            Value::Null => Ok(Value::Null),
            other => Ok(bool_value(!other.truthy())),
        },
        UnaryOp::Neg => match v {
            Value::Null => Ok(Value::Null),
            Value::Int64(i) => i
                .checked_neg()
                .map(Value::Int64)
                .ok_or_else(|| DbError::Arithmetic("integer negation overflow".into())),
            Value::Double(d) => Ok(Value::Double(-d)),
            Value::Varchar(_) => Err(DbError::TypeMismatch("cannot negate a varchar".into())),
        },
    }
}

fn eval_binary(op: BinaryOp, l: Value, r: Value) -> DbResult<Value> {
    use BinaryOp::*;
    match op {
        And => Ok(match (&l, &r) {
            (v, _) if !v.is_null() && !v.truthy() => bool_value(false),
            (_, v) if !v.is_null() && !v.truthy() => bool_value(false),
            (a, b) if a.is_null() || b.is_null() => Value::Null,
            _ => bool_value(true),
        }),
        Or => Ok(match (&l, &r) {
            (v, _) if !v.is_null() && v.truthy() => bool_value(true),
            (_, v) if !v.is_null() && v.truthy() => bool_value(true),
            (a, b) if a.is_null() || b.is_null() => Value::Null,
            _ => bool_value(false),
        }),
        Add | Sub | Mul | Div | Mod => eval_arithmetic(op, l, r),
        Eq | Ne | Lt | Le | Gt | Ge => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            let ord = l.cmp_same_type(&r).ok_or_else(|| {
                DbError::TypeMismatch(format!("cannot compare {l} with {r}"))
            })?;
            let hit = match op {
                Eq => ord == Ordering::Equal,
                Ne => ord != Ordering::Equal,
                Lt => ord == Ordering::Less,
                Le => ord != Ordering::Greater,
                Gt => ord == Ordering::Greater,
                Ge => ord != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(bool_value(hit))
        }
    }
}

fn eval_arithmetic(op: BinaryOp, l: Value, r: Value) -> DbResult<Value> {
    use BinaryOp::*;
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    match (l, r) {
        (Value::Int64(a), Value::Int64(b)) => {
            let out = match op {
                Add => a.checked_add(b),
                Sub => a.checked_sub(b),
                Mul => a.checked_mul(b),
                Div => {
                    if b == 0 {
                        return Err(DbError::Arithmetic("integer division by zero".into()));
                    }
                    a.checked_div(b)
                }
                Mod => {
                    if b == 0 {
                        return Err(DbError::Arithmetic("integer modulo by zero".into()));
                    }
                    a.checked_rem(b)
                }
                _ => unreachable!(),
            };
            out.map(Value::Int64)
                .ok_or_else(|| DbError::Arithmetic(format!("integer overflow in {a} {op} {b}")))
        }
        (Value::Double(a), Value::Double(b)) => match op {
            Add => Ok(Value::Double(a + b)),
            Sub => Ok(Value::Double(a - b)),
            Mul => Ok(Value::Double(a * b)),
            Div => {
                if b == 0.0 {
                    return Err(DbError::Arithmetic("division by zero".into()));
                }
                Ok(Value::Double(a / b))
            }
            Mod => Err(DbError::TypeMismatch("modulo requires integers".into())),
            _ => unreachable!(),
        },
        (Value::Varchar(a), Value::Varchar(b)) if op == Add => Ok(Value::Varchar(a + &b)),
        (l, r) => Err(DbError::TypeMismatch(format!(
            "no operator {l} {op} {r}"
        ))),
    }
}
