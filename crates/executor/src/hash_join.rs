use crate::{push_line, Executor, TransactionContext, Tuple};
use ahash::RandomState;
use common::{DbResult, Row};
use hashbrown::HashMap;

/// Equi-join: the right child is materialized into a multimap keyed by the
/// memcomparable encoding of its key columns on the first `next()`, then
/// each left row probes with its own projected key. Duplicates on both
/// sides are preserved.
pub struct HashJoinExec {
    left: Box<dyn Executor>,
    left_cols: Vec<usize>,
    right: Box<dyn Executor>,
    right_cols: Vec<usize>,
    buckets: Option<HashMap<Vec<u8>, Vec<Row>, RandomState>>,
    current: Option<(Row, Vec<u8>)>,
    match_cursor: usize,
}

impl HashJoinExec {
    pub fn new(
        left: Box<dyn Executor>,
        left_cols: Vec<usize>,
        right: Box<dyn Executor>,
        right_cols: Vec<usize>,
    ) -> Self {
        Self {
            left,
            left_cols,
            right,
            right_cols,
            buckets: None,
            current: None,
            match_cursor: 0,
        }
    }

    fn build(&mut self, ctx: &mut TransactionContext) -> DbResult<()> {
        let mut buckets: HashMap<Vec<u8>, Vec<Row>, RandomState> = HashMap::default();
        while let Some((row, _)) = self.right.next(ctx)? {
            let key = row.extract(&self.right_cols)?.encode_memcomparable();
            buckets.entry(key).or_default().push(row);
        }
        tracing::trace!(buckets = buckets.len(), "hash join build complete");
        self.buckets = Some(buckets);
        Ok(())
    }
}

impl Executor for HashJoinExec {
    fn next(&mut self, ctx: &mut TransactionContext) -> DbResult<Option<Tuple>> {
        if self.buckets.is_none() {
            self.build(ctx)?;
        }
        let Some(buckets) = self.buckets.as_ref() else {
            return Ok(None);
        };
        loop {
            if let Some((left_row, key)) = &self.current {
                if let Some(matches) = buckets.get(key) {
                    if self.match_cursor < matches.len() {
                        let joined = left_row.clone() + matches[self.match_cursor].clone();
                        self.match_cursor += 1;
                        return Ok(Some((joined, None)));
                    }
                }
                self.current = None;
            }
            match self.left.next(ctx)? {
                Some((row, _)) => {
                    let key = row.extract(&self.left_cols)?.encode_memcomparable();
                    if buckets.contains_key(&key) {
                        self.current = Some((row, key));
                        self.match_cursor = 0;
                    }
                }
                None => return Ok(None),
            }
        }
    }

    fn explain_into(&self, out: &mut String, indent: usize) {
        push_line(
            out,
            indent,
            &format!(
                "HashJoin: left {:?} right {:?}",
                self.left_cols, self.right_cols
            ),
        );
        self.left.explain_into(out, indent + 1);
        self.right.explain_into(out, indent + 1);
    }
}
