use crate::Expr;
use common::{ColumnName, Schema};
use std::collections::BTreeSet;

/// Structural walks used by the optimizer: which columns an expression
/// touches, whether all of them live in a given schema, and top-level
/// conjunction splitting.
impl Expr {
    pub fn referenced_columns(&self) -> BTreeSet<ColumnName> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    pub fn collect_columns(&self, out: &mut BTreeSet<ColumnName>) {
        match self {
            Expr::Constant(_) => {}
            Expr::ColumnRef(name) => {
                out.insert(name.clone());
            }
            Expr::Unary { child, .. } | Expr::Aggregate { child, .. } => {
                child.collect_columns(out);
            }
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Case {
                when_clauses,
                else_clause,
            } => {
                for (when, then) in when_clauses {
                    when.collect_columns(out);
                    then.collect_columns(out);
                }
                if let Some(e) = else_clause {
                    e.collect_columns(out);
                }
            }
            Expr::In { needle, list } => {
                needle.collect_columns(out);
                for item in list {
                    item.collect_columns(out);
                }
            }
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Every column reference resolves within `schema`. True for
    /// expressions without references.
    pub fn touches_only(&self, schema: &Schema) -> bool {
        self.referenced_columns()
            .iter()
            .all(|c| schema.contains(c))
    }

    /// At least one column reference resolves within `schema`.
    pub fn references_any(&self, schema: &Schema) -> bool {
        self.referenced_columns()
            .iter()
            .any(|c| schema.contains(c))
    }

    /// Split a top-level `AND` tree into its independent predicates.
    pub fn split_conjunctions(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.split_into(&mut out);
        out
    }

    fn split_into<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            Expr::Binary {
                left,
                op: crate::BinaryOp::And,
                right,
            } => {
                left.split_into(out);
                right.split_into(out);
            }
            other => out.push(other),
        }
    }
}
