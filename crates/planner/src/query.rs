use expr::{Expr, NamedExpr};
use std::fmt;

/// Logical query: the relations to draw from, a predicate that must be
/// truthy for a row to survive, and the select list. An empty select list
/// means `SELECT *`.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryData {
    pub from: Vec<String>,
    pub where_clause: Expr,
    pub select: Vec<NamedExpr>,
}

impl QueryData {
    pub fn new(
        from: impl IntoIterator<Item = impl Into<String>>,
        where_clause: Expr,
        select: Vec<NamedExpr>,
    ) -> Self {
        Self {
            from: from.into_iter().map(Into::into).collect(),
            where_clause,
            select,
        }
    }

    /// `SELECT * FROM ... WHERE ...`
    pub fn select_all(from: impl IntoIterator<Item = impl Into<String>>, where_clause: Expr) -> Self {
        Self::new(from, where_clause, Vec::new())
    }
}

impl fmt::Display for QueryData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        if self.select.is_empty() {
            write!(f, "*")?;
        } else {
            for (i, ne) in self.select.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{ne}")?;
            }
        }
        write!(f, " FROM {}", self.from.join(", "))?;
        write!(f, " WHERE {}", self.where_clause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_reads_like_sql() {
        let q = QueryData::new(
            vec!["t"],
            Expr::binary(
                Expr::column("key"),
                expr::BinaryOp::Eq,
                Expr::constant(2i64),
            ),
            vec![NamedExpr::column("name")],
        );
        assert_eq!(q.to_string(), "SELECT name FROM t WHERE (key = 2)");
    }
}
