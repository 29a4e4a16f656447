use std::{fs, path::Path};

use ahash::RandomState;
use common::{Column, DbError, DbResult, Schema, TableId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use stats::TableStatistics;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Name-to-table and name-to-index resolver. Also the home of each table's
/// statistics snapshot, which the optimizer copies into plans.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u64,
    #[serde(skip)]
    #[serde(default)]
    table_name_index: Map<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    table_id_index: Map<TableId, usize>,
}

#[bon::bon]
impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            next_table_id: 1,
            table_name_index: Map::default(),
            table_id_index: Map::default(),
        }
    }

    /// Load a catalog from disk, returning an empty catalog if the file does
    /// not exist.
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|err| DbError::Internal(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    /// Persist the catalog contents as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Internal(format!("catalog serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Returns an immutable reference to a table by name.
    pub fn table(&self, name: &str) -> DbResult<&TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NameResolution(format!("unknown table '{name}'")))?;
        Ok(&self.tables[idx])
    }

    /// Returns an immutable reference to a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        let idx = self
            .table_id_index
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::NameResolution(format!("unknown table id {}", id.0)))?;
        Ok(&self.tables[idx])
    }

    /// Register a table with the provided columns, returning its identifier.
    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> DbResult<TableId> {
        if self.table_name_index.contains_key(name) {
            return Err(DbError::Conflict(format!("table '{name}' already exists")));
        }
        let schema = Schema::new(name, columns);
        let table_id = TableId(self.next_table_id);
        self.next_table_id += 1;
        let stats = TableStatistics::new(&schema);
        self.tables.push(TableMeta {
            id: table_id,
            name: name.to_string(),
            schema,
            stats,
            indexes: Vec::new(),
            index_name_lookup: Map::default(),
        });
        self.rebuild_indexes();
        Ok(table_id)
    }

    /// Remove a table and its associated indexes.
    pub fn drop_table(&mut self, name: &str) -> DbResult<()> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NameResolution(format!("unknown table '{name}'")))?;
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(())
    }

    /// Attach an ordered index to a table. Key and include columns are given
    /// by name and resolved against the table schema.
    #[builder]
    pub fn create_index(
        &mut self,
        table_name: &str,
        index_name: &str,
        key: &[&str],
        #[builder(default = &[])] include: &[&str],
        #[builder(default = false)] unique: bool,
    ) -> DbResult<()> {
        if key.is_empty() {
            return Err(DbError::InvalidQuery(
                "index must have at least one key column".into(),
            ));
        }
        let (key, include) = {
            let table = self.table(table_name)?;
            let resolve = |names: &[&str]| -> DbResult<Vec<usize>> {
                names
                    .iter()
                    .map(|name| table.schema.offset(&(*name).into()))
                    .collect()
            };
            (resolve(key)?, resolve(include)?)
        };
        let table = self.table_mut(table_name)?;
        if table.index_name_lookup.contains_key(index_name) {
            return Err(DbError::Conflict(format!(
                "index '{index_name}' already exists on table '{}'",
                table.name
            )));
        }
        table.indexes.push(IndexMeta {
            name: index_name.to_string(),
            key,
            include,
            unique,
        });
        table.rebuild_index_lookup();
        Ok(())
    }

    /// Drop an index attached to a table.
    pub fn drop_index(&mut self, table_name: &str, index_name: &str) -> DbResult<()> {
        let table = self.table_mut(table_name)?;
        let idx = table
            .index_name_lookup
            .get(index_name)
            .copied()
            .ok_or_else(|| {
                DbError::NameResolution(format!(
                    "index '{index_name}' does not exist on table '{}'",
                    table.name
                ))
            })?;
        table.indexes.remove(idx);
        table.rebuild_index_lookup();
        Ok(())
    }

    /// Replace a table's statistics snapshot after a refresh pass.
    pub fn update_statistics(&mut self, name: &str, stats: TableStatistics) -> DbResult<()> {
        self.table_mut(name)?.stats = stats;
        Ok(())
    }

    /// Immutable iterator over all tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    fn table_mut(&mut self, name: &str) -> DbResult<&mut TableMeta> {
        let idx = self
            .table_name_index
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NameResolution(format!("unknown table '{name}'")))?;
        Ok(&mut self.tables[idx])
    }

    fn rebuild_indexes(&mut self) {
        self.table_name_index.clear();
        self.table_id_index.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            self.table_name_index.insert(table.name.clone(), idx);
            self.table_id_index.insert(table.id, idx);
            table.rebuild_index_lookup();
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub name: String,
    pub schema: Schema,
    pub stats: TableStatistics,
    pub indexes: Vec<IndexMeta>,
    #[serde(skip)]
    #[serde(default)]
    index_name_lookup: Map<String, usize>,
}

impl TableMeta {
    /// Lookup an index by name.
    pub fn index(&self, name: &str) -> DbResult<&IndexMeta> {
        let idx = self.index_name_lookup.get(name).copied().ok_or_else(|| {
            DbError::NameResolution(format!(
                "index '{name}' does not exist on table '{}'",
                self.name
            ))
        })?;
        Ok(&self.indexes[idx])
    }

    fn rebuild_index_lookup(&mut self) {
        self.index_name_lookup.clear();
        for (idx, index) in self.indexes.iter().enumerate() {
            self.index_name_lookup.insert(index.name.clone(), idx);
        }
    }
}

/// Ordered-index definition: key columns feed the memcomparable key, include
/// columns ride along in the payload for index-only scans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub key: Vec<usize>,
    pub include: Vec<usize>,
    pub unique: bool,
}

impl IndexMeta {
    /// Column offsets an index-only scan can serve, key columns first.
    pub fn covered_columns(&self) -> Vec<usize> {
        let mut out = self.key.clone();
        out.extend_from_slice(&self.include);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ValueType;

    fn sample() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                "users",
                vec![
                    Column::new("id", ValueType::Int64),
                    Column::new("name", ValueType::Varchar),
                    Column::new("age", ValueType::Int64),
                ],
            )
            .unwrap();
        catalog
            .create_index()
            .table_name("users")
            .index_name("idx_users_id")
            .key(&["id"])
            .include(&["name"])
            .unique(true)
            .call()
            .unwrap();
        catalog
    }

    #[test]
    fn create_and_resolve_table() {
        let catalog = sample();
        let table = catalog.table("users").unwrap();
        assert_eq!(table.id, TableId(1));
        assert_eq!(table.schema.column_count(), 3);
        assert_eq!(catalog.table_by_id(TableId(1)).unwrap().name, "users");
    }

    #[test]
    fn unknown_names_are_name_resolution_errors() {
        let catalog = sample();
        assert!(matches!(
            catalog.table("missing"),
            Err(DbError::NameResolution(_))
        ));
        assert!(matches!(
            catalog.table("users").unwrap().index("missing"),
            Err(DbError::NameResolution(_))
        ));
    }

    #[test]
    fn duplicate_table_is_a_conflict() {
        let mut catalog = sample();
        let err = catalog
            .create_table("users", vec![Column::new("id", ValueType::Int64)])
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn index_resolves_columns_by_name() {
        let catalog = sample();
        let index = catalog.table("users").unwrap().index("idx_users_id").unwrap();
        assert_eq!(index.key, vec![0]);
        assert_eq!(index.include, vec![1]);
        assert!(index.unique);
        assert_eq!(index.covered_columns(), vec![0, 1]);
    }

    #[test]
    fn index_on_unknown_column_fails() {
        let mut catalog = sample();
        let err = catalog
            .create_index()
            .table_name("users")
            .index_name("idx_bad")
            .key(&["missing"])
            .call()
            .unwrap_err();
        assert!(matches!(err, DbError::NameResolution(_)));
    }

    #[test]
    fn save_and_load_round_trip() {
        let catalog = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        catalog.save(&path).unwrap();

        let loaded = Catalog::load(&path).unwrap();
        let table = loaded.table("users").unwrap();
        assert_eq!(table.schema.column_count(), 3);
        assert_eq!(table.index("idx_users_id").unwrap().key, vec![0]);
    }

    #[test]
    fn load_missing_file_yields_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("nope.json")).unwrap();
        assert_eq!(catalog.tables().count(), 0);
    }

    #[test]
    fn update_statistics_replaces_snapshot() {
        let mut catalog = sample();
        let schema = catalog.table("users").unwrap().schema.clone();
        let rows = vec![common::Row::new(vec![
            1i64.into(),
            "ada".into(),
            36i64.into(),
        ])];
        catalog
            .update_statistics("users", TableStatistics::collect(&schema, rows.iter()))
            .unwrap();
        assert_eq!(catalog.table("users").unwrap().stats.row_count, 1);
    }
}
