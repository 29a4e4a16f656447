//! Write-ahead log: every mutation is framed into a sequential file before
//! the page store applies it. Frames are length-prefixed bincode so forward
//! iteration and truncation stay safe.

use bincode::config::{self, Config};
use bincode::serde::{decode_from_slice, encode_to_vec};
use common::{DbError, DbResult, RowPosition, TableId};
use serde::{Deserialize, Serialize};
use std::{
    fs::{File, OpenOptions},
    io::{Read, Write},
    path::{Path, PathBuf},
};
use types::Value;

fn bincode_config() -> impl Config {
    config::legacy()
}

/// A logical change to the page store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WalRecord {
    Insert {
        txn: u64,
        table: TableId,
        pos: RowPosition,
        row: Vec<Value>,
    },
    Update {
        txn: u64,
        table: TableId,
        pos: RowPosition,
        new_row: Vec<Value>,
    },
    Delete {
        txn: u64,
        table: TableId,
        pos: RowPosition,
    },
}

#[derive(Debug)]
pub struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    pub fn open(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one frame. Durability is deferred to `sync`.
    pub fn append(&mut self, record: &WalRecord) -> DbResult<()> {
        let payload = encode_to_vec(record, bincode_config())
            .map_err(|e| DbError::Internal(format!("wal encode failed: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| DbError::Internal("wal record exceeds frame size".into()))?;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(&payload)?;
        tracing::trace!(bytes = payload.len(), "wal append");
        Ok(())
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Read every frame back in append order.
    pub fn replay(path: &Path) -> DbResult<Vec<WalRecord>> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut records = Vec::new();
        let mut offset = 0;
        while offset + 4 <= data.len() {
            let len = u32::from_le_bytes(
                data[offset..offset + 4]
                    .try_into()
                    .map_err(|_| DbError::Internal("wal frame header".into()))?,
            ) as usize;
            offset += 4;
            if offset + len > data.len() {
                // Torn tail write; everything before it is intact.
                break;
            }
            let (record, _) = decode_from_slice(&data[offset..offset + len], bincode_config())
                .map_err(|e| DbError::Internal(format!("wal decode failed: {e}")))?;
            records.push(record);
            offset += len;
        }
        Ok(records)
    }
}
