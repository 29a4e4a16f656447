mod row;
mod schema;

pub use row::Row;
pub use schema::{Column, ColumnName, Constraint, Schema};

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// Logical identifier for a page in the storage layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u64);

/// Logical identifier for a table registered in the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Opaque storage handle locating one heap tuple. Scan operators hand it out
/// next to each row; write plans consume it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowPosition {
    pub page_id: PageId,
    pub slot: u16,
}

/// Canonical error type shared across the engine. Each variant classifies a
/// failure mode; messages carry the specifics.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("name resolution: {0}")]
    NameResolution(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("arithmetic: {0}")]
    Arithmetic(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Runtime configuration for the storage engine.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(8192)
///     .wal_enabled(false)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where the write-ahead log lives.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Byte budget of one heap page.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Controls whether mutations are framed into the write-ahead log.
    #[builder(default = true)]
    pub wal_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 4096,
            wal_enabled: true,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Column, ColumnName, Config, Constraint, DbError, DbResult, PageId, Row, RowPosition,
        Schema, TableId,
    };
    pub use types::{Value, ValueType};
}
