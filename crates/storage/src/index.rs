use common::{DbError, DbResult, Row, RowPosition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use types::Value;

/// One index posting: where the heap tuple lives plus the include-column
/// values carried for index-only scans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub position: RowPosition,
    pub include: Vec<Value>,
}

/// Ordered index over the memcomparable encoding of the key columns. The
/// map compares nothing but bytes; key order therefore matches tuple order.
#[derive(Debug)]
pub struct OrderedIndex {
    pub name: String,
    pub key: Vec<usize>,
    pub include: Vec<usize>,
    pub unique: bool,
    entries: BTreeMap<Vec<u8>, Vec<IndexEntry>>,
}

impl OrderedIndex {
    pub fn new(name: String, key: Vec<usize>, include: Vec<usize>, unique: bool) -> Self {
        Self {
            name,
            key,
            include,
            unique,
            entries: BTreeMap::new(),
        }
    }

    pub fn key_for(&self, row: &Row) -> DbResult<Vec<u8>> {
        Ok(row.extract(&self.key)?.encode_memcomparable())
    }

    pub fn insert(&mut self, row: &Row, position: RowPosition) -> DbResult<()> {
        let key = self.key_for(row)?;
        let bucket = self.entries.entry(key).or_default();
        if self.unique && !bucket.is_empty() {
            return Err(DbError::Conflict(format!(
                "duplicate key in unique index '{}'",
                self.name
            )));
        }
        let include = row.extract(&self.include)?.values;
        bucket.push(IndexEntry { position, include });
        Ok(())
    }

    pub fn remove(&mut self, row: &Row, position: RowPosition) -> DbResult<()> {
        let key = self.key_for(row)?;
        if let Some(bucket) = self.entries.get_mut(&key) {
            bucket.retain(|e| e.position != position);
            if bucket.is_empty() {
                self.entries.remove(&key);
            }
        }
        Ok(())
    }

    /// Would inserting `row` violate uniqueness?
    pub fn would_conflict(&self, row: &Row) -> DbResult<bool> {
        if !self.unique {
            return Ok(false);
        }
        let key = self.key_for(row)?;
        Ok(self.entries.get(&key).is_some_and(|b| !b.is_empty()))
    }

    /// Snapshot of the inclusive key range `[begin, end]`. `None` bounds are
    /// unbounded. The end bound is segment-inclusive: a stored key whose
    /// leading segment equals `end` is kept even when suffix columns push
    /// its bytes past the bound.
    pub fn range(
        &self,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
    ) -> Vec<(Vec<u8>, IndexEntry)> {
        let lower = match begin {
            Some(b) => Bound::Included(b.to_vec()),
            None => Bound::Unbounded,
        };
        let mut out = Vec::new();
        for (key, bucket) in self.entries.range((lower, Bound::Unbounded)) {
            if let Some(end) = end
                && key.as_slice() > end
                && !key.starts_with(end)
            {
                break;
            }
            for entry in bucket {
                out.push((key.clone(), entry.clone()));
            }
        }
        if !ascending {
            out.reverse();
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PageId;

    fn pos(slot: u16) -> RowPosition {
        RowPosition {
            page_id: PageId(0),
            slot,
        }
    }

    fn row(key: i64, name: &str) -> Row {
        Row::new(vec![Value::Int64(key), Value::Varchar(name.into())])
    }

    fn index(unique: bool) -> OrderedIndex {
        OrderedIndex::new("idx".into(), vec![0], vec![1], unique)
    }

    #[test]
    fn range_is_key_ordered_and_inclusive() {
        let mut idx = index(false);
        for (i, k) in [3i64, 1, 2].iter().enumerate() {
            idx.insert(&row(*k, "v"), pos(i as u16)).unwrap();
        }
        let begin = Value::Int64(1).to_memcomparable();
        let end = Value::Int64(2).to_memcomparable();
        let got = idx.range(Some(&begin), Some(&end), true);
        let keys: Vec<i64> = got
            .iter()
            .map(|(k, _)| match Value::decode_memcomparable(k).unwrap().0 {
                Value::Int64(v) => v,
                other => panic!("unexpected key {other:?}"),
            })
            .collect();
        assert_eq!(keys, vec![1, 2]);
    }

    #[test]
    fn unbounded_range_returns_everything_in_order() {
        let mut idx = index(false);
        for (i, k) in [5i64, -3, 9].iter().enumerate() {
            idx.insert(&row(*k, "v"), pos(i as u16)).unwrap();
        }
        let got = idx.range(None, None, true);
        assert_eq!(got.len(), 3);
        assert!(got.windows(2).all(|w| w[0].0 <= w[1].0));

        let desc = idx.range(None, None, false);
        assert!(desc.windows(2).all(|w| w[0].0 >= w[1].0));
    }

    #[test]
    fn duplicate_keys_kept_in_non_unique_index() {
        let mut idx = index(false);
        idx.insert(&row(1, "a"), pos(0)).unwrap();
        idx.insert(&row(1, "b"), pos(1)).unwrap();
        let point = Value::Int64(1).to_memcomparable();
        assert_eq!(idx.range(Some(&point), Some(&point), true).len(), 2);
    }

    #[test]
    fn unique_index_rejects_duplicates() {
        let mut idx = index(true);
        idx.insert(&row(1, "a"), pos(0)).unwrap();
        assert!(matches!(
            idx.insert(&row(1, "b"), pos(1)),
            Err(DbError::Conflict(_))
        ));
    }

    #[test]
    fn include_values_ride_along() {
        let mut idx = index(false);
        idx.insert(&row(7, "payload"), pos(4)).unwrap();
        let got = idx.range(None, None, true);
        assert_eq!(got[0].1.position, pos(4));
        assert_eq!(got[0].1.include, vec![Value::Varchar("payload".into())]);
    }

    #[test]
    fn segment_inclusive_end_keeps_composite_suffixes() {
        // Two-column key: (1, "a") and (1, "z") both fall inside [1, 1].
        let mut idx = OrderedIndex::new("idx".into(), vec![0, 1], vec![], false);
        idx.insert(&row(1, "a"), pos(0)).unwrap();
        idx.insert(&row(1, "z"), pos(1)).unwrap();
        idx.insert(&row(2, "a"), pos(2)).unwrap();

        let point = Value::Int64(1).to_memcomparable();
        let got = idx.range(Some(&point), Some(&point), true);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn remove_drops_only_the_given_position() {
        let mut idx = index(false);
        idx.insert(&row(1, "a"), pos(0)).unwrap();
        idx.insert(&row(1, "b"), pos(1)).unwrap();
        idx.remove(&row(1, "a"), pos(0)).unwrap();
        let point = Value::Int64(1).to_memcomparable();
        let got = idx.range(Some(&point), Some(&point), true);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].1.position, pos(1));
    }
}
