use ahash::RandomState;
use common::{DbError, DbResult, RowPosition, TableId};
use hashbrown::HashMap;
use parking_lot::Mutex;

type LockKey = (TableId, RowPosition);

#[derive(Debug)]
enum LockEntry {
    Shared(Vec<u64>),
    Exclusive(u64),
}

/// Per-row shared/exclusive locks. Incompatible requests fail immediately
/// with `Conflict`; there is no wait queue. An upgrade from shared to
/// exclusive succeeds only when the requester is the sole shared holder.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<HashMap<LockKey, LockEntry, RandomState>>,
}

impl LockManager {
    pub fn acquire_shared(&self, txn: u64, key: LockKey) -> DbResult<()> {
        let mut table = self.table.lock();
        match table.get_mut(&key) {
            Some(LockEntry::Shared(holders)) => {
                if !holders.contains(&txn) {
                    holders.push(txn);
                }
                return Ok(());
            }
            Some(LockEntry::Exclusive(owner)) if *owner == txn => return Ok(()),
            Some(LockEntry::Exclusive(owner)) => {
                tracing::trace!(txn, owner = *owner, ?key, "shared lock conflict");
                return Err(DbError::Conflict(format!(
                    "row {key:?} is exclusively locked by transaction {owner}"
                )));
            }
            None => {}
        }
        table.insert(key, LockEntry::Shared(vec![txn]));
        Ok(())
    }

    pub fn acquire_exclusive(&self, txn: u64, key: LockKey) -> DbResult<()> {
        let mut table = self.table.lock();
        match table.get(&key) {
            None => {}
            Some(LockEntry::Exclusive(owner)) if *owner == txn => return Ok(()),
            Some(LockEntry::Shared(holders)) if holders.len() == 1 && holders[0] == txn => {}
            Some(_) => {
                tracing::trace!(txn, ?key, "exclusive lock conflict");
                return Err(DbError::Conflict(format!(
                    "row {key:?} is locked by another transaction"
                )));
            }
        }
        table.insert(key, LockEntry::Exclusive(txn));
        Ok(())
    }

    /// Release every lock held by `txn`.
    pub fn release_all(&self, txn: u64) {
        let mut table = self.table.lock();
        table.retain(|_, entry| match entry {
            LockEntry::Exclusive(owner) => *owner != txn,
            LockEntry::Shared(holders) => {
                holders.retain(|h| *h != txn);
                !holders.is_empty()
            }
        });
    }
}
