//! Per-column distribution summaries feeding the optimizer's selectivity
//! estimates. Refreshed by a full-scan pass over the table.

use common::{ColumnName, Row, Schema};
use expr::{BinaryOp, Expr};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use types::{Value, ValueType};

/// Varchar statistics keep at most this many leading bytes of min/max,
/// enough for range cut estimates.
pub const VARCHAR_PREFIX_LEN: usize = 8;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntegerColumnStats {
    pub min: i64,
    pub max: i64,
    pub count: u64,
    pub distinct: u64,
}

impl Default for IntegerColumnStats {
    fn default() -> Self {
        Self {
            min: i64::MAX,
            max: i64::MIN,
            count: 0,
            distinct: 0,
        }
    }
}

impl IntegerColumnStats {
    fn estimate_range(&self, from: Option<i64>, to: Option<i64>) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let from = from.unwrap_or(self.min).max(self.min);
        let to = to.unwrap_or(self.max).min(self.max);
        if to < from {
            return 0.0;
        }
        if from == to {
            return (self.count as f64 / self.distinct.max(1) as f64).max(1.0);
        }
        let span = (self.max - self.min) as f64 + 1.0;
        let width = (to - from) as f64 + 1.0;
        (self.count as f64 * width / span).max(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoubleColumnStats {
    pub min: f64,
    pub max: f64,
    pub count: u64,
    pub distinct: u64,
}

impl Default for DoubleColumnStats {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            count: 0,
            distinct: 0,
        }
    }
}

impl DoubleColumnStats {
    fn estimate_range(&self, from: Option<f64>, to: Option<f64>) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let from = from.unwrap_or(self.min).max(self.min);
        let to = to.unwrap_or(self.max).min(self.max);
        if to < from {
            return 0.0;
        }
        let span = self.max - self.min;
        if from == to || span <= 0.0 {
            return (self.count as f64 / self.distinct.max(1) as f64).max(1.0);
        }
        (self.count as f64 * (to - from) / span).max(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarcharColumnStats {
    pub min_prefix: Vec<u8>,
    pub max_prefix: Vec<u8>,
    pub count: u64,
    pub distinct: u64,
}

impl Default for VarcharColumnStats {
    fn default() -> Self {
        Self {
            min_prefix: vec![0xFF; VARCHAR_PREFIX_LEN],
            max_prefix: Vec::new(),
            count: 0,
            distinct: 0,
        }
    }
}

impl VarcharColumnStats {
    fn estimate_range(&self, from: Option<&str>, to: Option<&str>) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if let (Some(f), Some(t)) = (from, to)
            && f == t
        {
            return (self.count as f64 / self.distinct.max(1) as f64).max(1.0);
        }
        // Prefixes only support a coarse cut: either the range misses the
        // observed span entirely or we guess a couple of rows.
        let from = from.map(|s| prefix(s)).unwrap_or_default();
        let to = to
            .map(|s| prefix(s))
            .unwrap_or_else(|| vec![0xFF; VARCHAR_PREFIX_LEN]);
        if to <= self.min_prefix || self.max_prefix <= from {
            return 1.0;
        }
        2.0
    }
}

fn prefix(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    bytes[..bytes.len().min(VARCHAR_PREFIX_LEN)].to_vec()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColumnStats {
    Int64(IntegerColumnStats),
    Double(DoubleColumnStats),
    Varchar(VarcharColumnStats),
}

impl ColumnStats {
    fn for_type(ty: ValueType) -> Self {
        match ty {
            ValueType::Int64 => ColumnStats::Int64(IntegerColumnStats::default()),
            ValueType::Double => ColumnStats::Double(DoubleColumnStats::default()),
            ValueType::Varchar => ColumnStats::Varchar(VarcharColumnStats::default()),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            ColumnStats::Int64(s) => s.count,
            ColumnStats::Double(s) => s.count,
            ColumnStats::Varchar(s) => s.count,
        }
    }

    pub fn distinct(&self) -> u64 {
        match self {
            ColumnStats::Int64(s) => s.distinct,
            ColumnStats::Double(s) => s.distinct,
            ColumnStats::Varchar(s) => s.distinct,
        }
    }
}

/// Table-wide statistics snapshot: total row count plus one summary per
/// column, positionally aligned with the table schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableStatistics {
    pub row_count: u64,
    columns: Vec<ColumnStats>,
}

impl TableStatistics {
    pub fn new(schema: &Schema) -> Self {
        Self {
            row_count: 0,
            columns: schema
                .columns()
                .iter()
                .map(|c| ColumnStats::for_type(c.value_type()))
                .collect(),
        }
    }

    /// Build statistics from a full pass over the table's rows. Null values
    /// do not contribute to per-column counts or extremes.
    pub fn collect<'a>(schema: &Schema, rows: impl IntoIterator<Item = &'a Row>) -> Self {
        let mut counters: Vec<DistinctCounter> = schema
            .columns()
            .iter()
            .map(|c| DistinctCounter::new(c.value_type()))
            .collect();
        let mut row_count = 0;
        for row in rows {
            row_count += 1;
            for (idx, counter) in counters.iter_mut().enumerate() {
                if let Some(v) = row.get(idx) {
                    counter.add(v);
                }
            }
        }
        Self {
            row_count,
            columns: counters.into_iter().map(DistinctCounter::finish).collect(),
        }
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnStats> {
        self.columns.get(idx)
    }

    pub fn distinct(&self, idx: usize) -> f64 {
        self.columns
            .get(idx)
            .map(|c| c.distinct().max(1) as f64)
            .unwrap_or(1.0)
    }

    /// Estimated inverse selectivity of `predicate` over rows shaped by
    /// `schema`: a predicate passing one row in N yields N. `1` means no
    /// reduction. The `OR` case sums factors, a coarse placeholder that
    /// degrades join-ordering quality on disjunctive predicates.
    pub fn reduction_factor(&self, schema: &Schema, predicate: &Expr) -> f64 {
        if let Expr::Binary { left, op, right } = predicate {
            match op {
                BinaryOp::Eq => match (&**left, &**right) {
                    (Expr::ColumnRef(l), Expr::ColumnRef(r)) => {
                        if let (Some(lo), Some(ro)) =
                            (self.resolve(schema, l), self.resolve(schema, r))
                        {
                            return self.distinct(lo).min(self.distinct(ro));
                        }
                    }
                    (Expr::ColumnRef(c), _) | (_, Expr::ColumnRef(c)) => {
                        if let Some(o) = self.resolve(schema, c) {
                            return self.distinct(o);
                        }
                    }
                    (Expr::Constant(a), Expr::Constant(b)) => {
                        return if a == b { 1.0 } else { f64::INFINITY };
                    }
                    _ => {}
                },
                BinaryOp::And => {
                    return self.reduction_factor(schema, left)
                        * self.reduction_factor(schema, right);
                }
                BinaryOp::Or => {
                    return self.reduction_factor(schema, left)
                        + self.reduction_factor(schema, right);
                }
                _ => {}
            }
        }
        1.0
    }

    /// Estimated number of rows whose `column` value falls in
    /// `[begin, end]`. Null bounds are unbounded ends.
    pub fn estimate_range(&self, column: usize, begin: &Value, end: &Value) -> f64 {
        let Some(stats) = self.columns.get(column) else {
            return self.row_count as f64;
        };
        match stats {
            ColumnStats::Int64(s) => s.estimate_range(as_int(begin), as_int(end)),
            ColumnStats::Double(s) => s.estimate_range(as_double(begin), as_double(end)),
            ColumnStats::Varchar(s) => s.estimate_range(as_str(begin), as_str(end)),
        }
    }

    fn resolve(&self, schema: &Schema, col: &ColumnName) -> Option<usize> {
        let idx = schema.find(col).ok().flatten()?;
        (idx < self.columns.len()).then_some(idx)
    }
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Int64(i) => Some(*i),
        _ => None,
    }
}

fn as_double(v: &Value) -> Option<f64> {
    match v {
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

fn as_str(v: &Value) -> Option<&str> {
    match v {
        Value::Varchar(s) => Some(s),
        _ => None,
    }
}

enum DistinctCounter {
    Int64 {
        seen: HashSet<i64>,
        acc: IntegerColumnStats,
    },
    Double {
        seen: HashSet<u64>,
        acc: DoubleColumnStats,
    },
    Varchar {
        seen: HashSet<String>,
        acc: VarcharColumnStats,
    },
}

impl DistinctCounter {
    fn new(ty: ValueType) -> Self {
        match ty {
            ValueType::Int64 => DistinctCounter::Int64 {
                seen: HashSet::new(),
                acc: IntegerColumnStats::default(),
            },
            ValueType::Double => DistinctCounter::Double {
                seen: HashSet::new(),
                acc: DoubleColumnStats::default(),
            },
            ValueType::Varchar => DistinctCounter::Varchar {
                seen: HashSet::new(),
                acc: VarcharColumnStats::default(),
            },
        }
    }

    fn add(&mut self, v: &Value) {
        match (self, v) {
            (DistinctCounter::Int64 { seen, acc }, Value::Int64(i)) => {
                acc.min = acc.min.min(*i);
                acc.max = acc.max.max(*i);
                acc.count += 1;
                seen.insert(*i);
            }
            (DistinctCounter::Double { seen, acc }, Value::Double(d)) => {
                acc.min = acc.min.min(*d);
                acc.max = acc.max.max(*d);
                acc.count += 1;
                seen.insert(d.to_bits());
            }
            (DistinctCounter::Varchar { seen, acc }, Value::Varchar(s)) => {
                let p = prefix(s);
                if p < acc.min_prefix {
                    acc.min_prefix = p.clone();
                }
                if acc.max_prefix < p {
                    acc.max_prefix = p;
                }
                acc.count += 1;
                seen.insert(s.clone());
            }
            // Nulls and type-mismatched values carry no distribution signal.
            _ => {}
        }
    }

    fn finish(self) -> ColumnStats {
        match self {
            DistinctCounter::Int64 { seen, mut acc } => {
                acc.distinct = seen.len() as u64;
                ColumnStats::Int64(acc)
            }
            DistinctCounter::Double { seen, mut acc } => {
                acc.distinct = seen.len() as u64;
                ColumnStats::Double(acc)
            }
            DistinctCounter::Varchar { seen, mut acc } => {
                acc.distinct = seen.len() as u64;
                ColumnStats::Varchar(acc)
            }
        }
    }
}
