//! Transactional table storage: in-memory slotted pages addressed by
//! `RowPosition`, ordered secondary indexes over memcomparable keys, a
//! write-ahead log, and per-row two-phase locking.


mod heap;
mod index;
mod lock;
mod txn;
mod wal;

pub use index::IndexEntry;
pub use txn::{Transaction, TransactionManager};
pub use wal::{Wal, WalRecord};

use ahash::RandomState;
use bincode::config::{self, Config as BincodeConfig};
use bincode::serde::{decode_from_slice, encode_to_vec};
use bytes::Bytes;
use common::{Config, DbError, DbResult, Row, RowPosition, TableId};
use hashbrown::HashMap;
use heap::TableHeap;
use index::OrderedIndex;
use lock::LockManager;
use parking_lot::{Mutex, RwLock};
use std::fs;

fn bincode_config() -> impl BincodeConfig {
    config::legacy()
}

fn encode_row(row: &Row) -> DbResult<Bytes> {
    let bytes = encode_to_vec(row, bincode_config())
        .map_err(|e| DbError::Internal(format!("serialize row failed: {e}")))?;
    Ok(Bytes::from(bytes))
}

fn decode_row(bytes: &Bytes) -> DbResult<Row> {
    let (row, _) = decode_from_slice(bytes, bincode_config())
        .map_err(|e| DbError::Internal(format!("deserialize row failed: {e}")))?;
    Ok(row)
}

/// The page store: every table's heap and indexes behind one handle.
/// Interior locking keeps the handle shareable across the executor tree;
/// row-level isolation is the lock manager's job, not the `RwLock`'s.
pub struct PageStore {
    config: Config,
    tables: RwLock<HashMap<TableId, TableHeap, RandomState>>,
    locks: LockManager,
    wal: Option<Mutex<Wal>>,
    txn_manager: TransactionManager,
}

impl PageStore {
    /// Open a store under `config`, creating the WAL file when enabled.
    pub fn open(config: Config) -> DbResult<Self> {
        let wal = if config.wal_enabled {
            fs::create_dir_all(&config.data_dir)?;
            Some(Mutex::new(Wal::open(config.data_dir.join("wal.log"))?))
        } else {
            None
        };
        Ok(Self {
            config,
            tables: RwLock::new(HashMap::default()),
            locks: LockManager::default(),
            wal,
            txn_manager: TransactionManager::new(),
        })
    }

    /// A store that never touches disk. Used heavily by tests.
    pub fn in_memory() -> Self {
        Self {
            config: Config {
                wal_enabled: false,
                ..Config::default()
            },
            tables: RwLock::new(HashMap::default()),
            locks: LockManager::default(),
            wal: None,
            txn_manager: TransactionManager::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn begin(&self) -> Transaction {
        self.txn_manager.begin()
    }

    /// Make the transaction's writes durable and release its locks.
    pub fn commit(&self, txn: Transaction) -> DbResult<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        self.locks.release_all(txn.id);
        tracing::debug!(txn = txn.id, "commit");
        Ok(())
    }

    /// Drop the transaction's locks. Undo is recovery's concern, out of
    /// scope here.
    pub fn abort(&self, txn: Transaction) {
        self.locks.release_all(txn.id);
        tracing::debug!(txn = txn.id, "abort");
    }

    /// Ensure a heap exists for the table.
    pub fn register_table(&self, table: TableId) {
        self.tables.write().entry(table).or_default();
    }

    /// Attach an ordered index and backfill it from the existing rows.
    pub fn create_index(
        &self,
        table: TableId,
        name: &str,
        key: Vec<usize>,
        include: Vec<usize>,
        unique: bool,
    ) -> DbResult<()> {
        let mut tables = self.tables.write();
        let heap = tables.entry(table).or_default();
        if heap.indexes.iter().any(|idx| idx.name == name) {
            return Err(DbError::Conflict(format!(
                "index '{name}' already exists in storage"
            )));
        }
        let mut index = OrderedIndex::new(name.to_string(), key, include, unique);
        let mut cursor = None;
        while let Some((pos, payload)) = heap.next_live(cursor) {
            index.insert(&decode_row(payload)?, pos)?;
            cursor = Some(pos);
        }
        tracing::debug!(table = table.0, name, entries = index.len(), "index built");
        heap.indexes.push(index);
        Ok(())
    }

    /// Append a row, maintaining every index. Takes an exclusive lock on
    /// the new position.
    pub fn insert(&self, txn: &Transaction, table: TableId, row: &Row) -> DbResult<RowPosition> {
        let payload = encode_row(row)?;
        if payload.len() > self.config.page_size {
            return Err(DbError::Internal(format!(
                "tuple of {} bytes exceeds page size {}",
                payload.len(),
                self.config.page_size
            )));
        }
        let mut tables = self.tables.write();
        let heap = tables.entry(table).or_default();
        for idx in &heap.indexes {
            if idx.would_conflict(row)? {
                return Err(DbError::Conflict(format!(
                    "duplicate key in unique index '{}'",
                    idx.name
                )));
            }
        }
        let pos = heap.insert(payload, self.config.page_size);
        self.locks.acquire_exclusive(txn.id, (table, pos))?;
        self.log(WalRecord::Insert {
            txn: txn.id,
            table,
            pos,
            row: row.values.clone(),
        })?;
        for idx in &mut heap.indexes {
            idx.insert(row, pos)?;
        }
        Ok(pos)
    }

    /// Point read under a shared lock.
    pub fn read(&self, txn: &Transaction, table: TableId, pos: RowPosition) -> DbResult<Row> {
        self.locks.acquire_shared(txn.id, (table, pos))?;
        let tables = self.tables.read();
        let heap = tables
            .get(&table)
            .ok_or_else(|| DbError::NotFound(format!("no storage for table {}", table.0)))?;
        let payload = heap
            .get(pos)
            .ok_or_else(|| DbError::NotFound(format!("no row at {pos:?}")))?;
        decode_row(payload)
    }

    /// Replace the row at `pos`, upgrading the caller's lock and keeping
    /// the indexes aligned.
    pub fn update(
        &self,
        txn: &Transaction,
        table: TableId,
        pos: RowPosition,
        row: &Row,
    ) -> DbResult<()> {
        let payload = encode_row(row)?;
        if payload.len() > self.config.page_size {
            return Err(DbError::Internal(format!(
                "tuple of {} bytes exceeds page size {}",
                payload.len(),
                self.config.page_size
            )));
        }
        self.locks.acquire_exclusive(txn.id, (table, pos))?;
        let mut tables = self.tables.write();
        let heap = tables
            .get_mut(&table)
            .ok_or_else(|| DbError::NotFound(format!("no storage for table {}", table.0)))?;
        let old = decode_row(
            heap.get(pos)
                .ok_or_else(|| DbError::NotFound(format!("no row at {pos:?}")))?,
        )?;
        for idx in &heap.indexes {
            if idx.key_for(&old)? != idx.key_for(row)? && idx.would_conflict(row)? {
                return Err(DbError::Conflict(format!(
                    "duplicate key in unique index '{}'",
                    idx.name
                )));
            }
        }
        self.log(WalRecord::Update {
            txn: txn.id,
            table,
            pos,
            new_row: row.values.clone(),
        })?;
        heap.page_mut(pos)?.replace(pos.slot, payload)?;
        for idx in &mut heap.indexes {
            idx.remove(&old, pos)?;
            idx.insert(row, pos)?;
        }
        Ok(())
    }

    /// Remove the row at `pos` under an exclusive lock.
    pub fn delete(&self, txn: &Transaction, table: TableId, pos: RowPosition) -> DbResult<()> {
        self.locks.acquire_exclusive(txn.id, (table, pos))?;
        let mut tables = self.tables.write();
        let heap = tables
            .get_mut(&table)
            .ok_or_else(|| DbError::NotFound(format!("no storage for table {}", table.0)))?;
        let old = decode_row(
            heap.get(pos)
                .ok_or_else(|| DbError::NotFound(format!("no row at {pos:?}")))?,
        )?;
        self.log(WalRecord::Delete {
            txn: txn.id,
            table,
            pos,
        })?;
        heap.page_mut(pos)?.vacate(pos.slot)?;
        for idx in &mut heap.indexes {
            idx.remove(&old, pos)?;
        }
        Ok(())
    }

    /// Stateless full-scan cursor: the first live row after `after`, shared-
    /// locked. `None` once the heap is exhausted or the table has no heap.
    pub fn scan_next(
        &self,
        txn: &Transaction,
        table: TableId,
        after: Option<RowPosition>,
    ) -> DbResult<Option<(RowPosition, Row)>> {
        let tables = self.tables.read();
        let Some(heap) = tables.get(&table) else {
            return Ok(None);
        };
        let Some((pos, payload)) = heap.next_live(after) else {
            return Ok(None);
        };
        self.locks.acquire_shared(txn.id, (table, pos))?;
        Ok(Some((pos, decode_row(payload)?)))
    }

    /// Snapshot the inclusive key range `[begin, end]` of an index. `None`
    /// bounds are unbounded ends.
    pub fn index_range(
        &self,
        _txn: &Transaction,
        table: TableId,
        index_name: &str,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
    ) -> DbResult<Vec<(Vec<u8>, IndexEntry)>> {
        let tables = self.tables.read();
        let heap = tables
            .get(&table)
            .ok_or_else(|| DbError::NotFound(format!("no storage for table {}", table.0)))?;
        let index = heap
            .indexes
            .iter()
            .find(|idx| idx.name == index_name)
            .ok_or_else(|| {
                DbError::NameResolution(format!("unknown index '{index_name}' in storage"))
            })?;
        Ok(index.range(begin, end, ascending))
    }

    fn log(&self, record: WalRecord) -> DbResult<()> {
        if let Some(wal) = &self.wal {
            wal.lock().append(&record)?;
        }
        Ok(())
    }
}
