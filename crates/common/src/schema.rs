use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use types::{Value, ValueType};

/// Qualified column name. The qualifier is the owning schema's name, or
/// empty for a reference that matches on the bare name alone.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    pub schema: String,
    pub name: String,
}

impl ColumnName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    pub fn bare(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    pub fn is_qualified(&self) -> bool {
        !self.schema.is_empty()
    }
}

impl From<&str> for ColumnName {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::bare(s),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_qualified() {
            write!(f, "{}.{}", self.schema, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Column-level constraint recorded in the schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Constraint {
    None,
    NotNull,
    Default(Value),
    Unique,
    Primary,
    ForeignKey,
    Check,
    Index,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: ColumnName,
    value_type: ValueType,
    constraint: Constraint,
}

impl Column {
    pub fn new(name: impl Into<ColumnName>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            constraint: Constraint::None,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn name(&self) -> &ColumnName {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value_type)
    }
}

/// Named, ordered column list. Joined schemas produced by `+` are unnamed
/// and keep each column's original qualifier, which is how cross-relation
/// references resolve after a join.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    columns: Vec<Column>,
}

impl Schema {
    /// Build a schema; columns with an empty qualifier inherit the schema
    /// name.
    pub fn new(name: impl Into<String>, mut columns: Vec<Column>) -> Self {
        let name = name.into();
        for col in &mut columns {
            if col.name.schema.is_empty() {
                col.name.schema = name.clone();
            }
        }
        Self { name, columns }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Locate a column by reference. A qualified reference must match both
    /// parts; an unqualified one matches on the bare name and fails when the
    /// name appears in more than one relation of a joined schema.
    pub fn find(&self, col: &ColumnName) -> DbResult<Option<usize>> {
        if col.is_qualified() {
            return Ok(self
                .columns
                .iter()
                .position(|c| c.name.schema == col.schema && c.name.name == col.name));
        }
        let mut found = None;
        for (idx, c) in self.columns.iter().enumerate() {
            if c.name.name == col.name {
                if found.is_some() {
                    return Err(DbError::NameResolution(format!(
                        "ambiguous column '{}'",
                        col.name
                    )));
                }
                found = Some(idx);
            }
        }
        Ok(found)
    }

    pub fn offset(&self, col: &ColumnName) -> DbResult<usize> {
        self.find(col)?
            .ok_or_else(|| DbError::NameResolution(format!("unknown column '{col}'")))
    }

    /// Whether a reference would resolve here. Ambiguity counts as
    /// containment: the reference touches this schema either way.
    pub fn contains(&self, col: &ColumnName) -> bool {
        !matches!(self.find(col), Ok(None))
    }
}

impl Add for Schema {
    type Output = Schema;

    fn add(mut self, rhs: Schema) -> Schema {
        self.name = String::new();
        self.columns.extend(rhs.columns);
        self
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.name)?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, "]")
    }
}
