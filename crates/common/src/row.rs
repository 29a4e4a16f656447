use crate::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use types::Value;

/// Positional tuple of values matching a schema. Rows are plain value
/// objects: operators hand them over by value and keep no pointers into
/// rows they have emitted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Project the row onto the given column offsets, in the listed order.
    pub fn extract(&self, cols: &[usize]) -> DbResult<Row> {
        let mut values = Vec::with_capacity(cols.len());
        for &idx in cols {
            let v = self.values.get(idx).ok_or_else(|| {
                DbError::Internal(format!(
                    "column offset {idx} out of bounds (row has {} values)",
                    self.values.len()
                ))
            })?;
            values.push(v.clone());
        }
        Ok(Row::new(values))
    }

    /// Concatenation of the per-value memcomparable encodings. Byte order of
    /// the result matches lexicographic tuple order, which is the single
    /// contract ordered indexes rely on.
    pub fn encode_memcomparable(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for v in &self.values {
            v.encode_memcomparable(&mut out);
        }
        out
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

impl Add for Row {
    type Output = Row;

    fn add(mut self, rhs: Row) -> Row {
        self.values.extend(rhs.values);
        self
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}
