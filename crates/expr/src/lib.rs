
mod eval;
mod visit;

use common::{ColumnName, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;
use types::{Value, ValueType};

/// Binary operators. Comparisons evaluate to `Int64(0|1)` or `Null`;
/// `And`/`Or` follow SQL three-valued logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    IsNull,
    IsNotNull,
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateOp {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AggregateOp::Count => "COUNT",
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
            AggregateOp::Min => "MIN",
            AggregateOp::Max => "MAX",
        };
        write!(f, "{s}")
    }
}

/// Expression tree evaluated against a row and its schema, or a pair of
/// rows for join predicates. `Aggregate` is a marker resolved by the
/// aggregation operator; evaluating one directly is a programming error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Value),
    ColumnRef(ColumnName),
    Unary {
        op: UnaryOp,
        child: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Case {
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
    In {
        needle: Box<Expr>,
        list: Vec<Expr>,
    },
    Aggregate {
        op: AggregateOp,
        child: Box<Expr>,
    },
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn constant(v: impl Into<Value>) -> Expr {
        Expr::Constant(v.into())
    }

    pub fn column(name: impl Into<ColumnName>) -> Expr {
        Expr::ColumnRef(name.into())
    }

    pub fn unary(op: UnaryOp, child: Expr) -> Expr {
        Expr::Unary {
            op,
            child: Box::new(child),
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn aggregate(op: AggregateOp, child: Expr) -> Expr {
        Expr::Aggregate {
            op,
            child: Box::new(child),
        }
    }

    /// `COUNT(*)`: a constant child never evaluates to null, so counting its
    /// non-null evaluations counts rows.
    pub fn count_star() -> Expr {
        Expr::aggregate(AggregateOp::Count, Expr::constant(1i64))
    }

    pub fn in_list(needle: Expr, list: Vec<Expr>) -> Expr {
        Expr::In {
            needle: Box::new(needle),
            list,
        }
    }

    pub fn function_call(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// Fold a list of predicates into a single conjunction.
    pub fn conjunction(preds: impl IntoIterator<Item = Expr>) -> Option<Expr> {
        preds
            .into_iter()
            .reduce(|acc, p| Expr::binary(acc, BinaryOp::And, p))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expr::Aggregate { .. })
    }

    /// Result type of the expression against a schema, when it can be
    /// derived. Comparisons and predicates are `Int64`.
    pub fn result_type(&self, schema: &Schema) -> Option<ValueType> {
        match self {
            Expr::Constant(v) => v.value_type(),
            Expr::ColumnRef(name) => {
                let idx = schema.find(name).ok().flatten()?;
                Some(schema.column(idx).value_type())
            }
            Expr::Unary { op, child } => match op {
                UnaryOp::IsNull | UnaryOp::IsNotNull | UnaryOp::Not => Some(ValueType::Int64),
                UnaryOp::Neg => child.result_type(schema),
            },
            Expr::Binary { left, op, right } => match op {
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                    left.result_type(schema).or_else(|| right.result_type(schema))
                }
                _ => Some(ValueType::Int64),
            },
            Expr::Case {
                when_clauses,
                else_clause,
            } => when_clauses
                .first()
                .and_then(|(_, then)| then.result_type(schema))
                .or_else(|| else_clause.as_ref().and_then(|e| e.result_type(schema))),
            Expr::In { .. } => Some(ValueType::Int64),
            Expr::Aggregate { op, child } => match op {
                AggregateOp::Count => Some(ValueType::Int64),
                AggregateOp::Avg => Some(ValueType::Double),
                AggregateOp::Sum | AggregateOp::Min | AggregateOp::Max => {
                    child.result_type(schema)
                }
            },
            Expr::FunctionCall { args, .. } => {
                args.first().and_then(|a| a.result_type(schema))
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(v) => write!(f, "{v}"),
            Expr::ColumnRef(name) => write!(f, "{name}"),
            Expr::Unary { op, child } => match op {
                UnaryOp::Neg => write!(f, "(-{child})"),
                UnaryOp::Not => write!(f, "(NOT {child})"),
                UnaryOp::IsNull => write!(f, "({child} IS NULL)"),
                UnaryOp::IsNotNull => write!(f, "({child} IS NOT NULL)"),
            },
            Expr::Binary { left, op, right } => write!(f, "({left} {op} {right})"),
            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                write!(f, "CASE")?;
                for (when, then) in when_clauses {
                    write!(f, " WHEN {when} THEN {then}")?;
                }
                if let Some(e) = else_clause {
                    write!(f, " ELSE {e}")?;
                }
                write!(f, " END")
            }
            Expr::In { needle, list } => {
                write!(f, "{needle} IN (")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Aggregate { op, child } => write!(f, "{op}({child})"),
            Expr::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A select-list entry: an expression plus its output alias. An empty alias
/// lets a bare column reference keep its own name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamedExpr {
    pub alias: String,
    pub expr: Expr,
}

impl NamedExpr {
    pub fn new(alias: impl Into<String>, expr: Expr) -> Self {
        Self {
            alias: alias.into(),
            expr,
        }
    }

    /// Unaliased reference to a column.
    pub fn column(name: impl Into<ColumnName>) -> Self {
        Self::new("", Expr::column(name))
    }

    pub fn bare(expr: Expr) -> Self {
        Self::new("", expr)
    }
}

impl fmt::Display for NamedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)?;
        if !self.alias.is_empty() {
            write!(f, " AS {}", self.alias)?;
        }
        Ok(())
    }
}
