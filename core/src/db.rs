//! The database object: one local directory holding the catalog, the column
//! directory, and the page-oriented data file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::info;

use crate::buffer_manager::BufferManager;
use crate::catalog::{Catalog, ColumnDefinition, TableSchema};
use crate::chunk::ColumnChunk;
use crate::copier::{self, CopyProgress, CopyResult};
use crate::directory::{NodeGroupEntry, TableDirectory};
use crate::err::{Error, Result};
use crate::options::CsvOption;
use crate::page_store::PageStore;
use crate::pk_index::PrimaryKeyIndex;
use crate::session::Session;
use crate::types::{LogicalType, Value};

const CATALOG_FILE: &str = "catalog.json";
const DIRECTORY_FILE: &str = "directory.json";
const DATA_FILE: &str = "data.qv";

pub struct Database {
    dir: PathBuf,
    catalog: RwLock<Catalog>,
    directory: RwLock<TableDirectory>,
    page_store: PageStore,
    buffer_manager: Arc<BufferManager>,
    pk_indexes: RwLock<HashMap<String, Arc<PrimaryKeyIndex>>>,
}

impl Database {
    /// Opens (or creates) the database at `dir`.
    pub fn open(dir: &Path) -> Result<Database> {
        fs::create_dir_all(dir).map_err(|source| Error::OpenFile {
            path: dir.display().to_string(),
            source,
        })?;
        let catalog = Catalog::load(&dir.join(CATALOG_FILE))?;
        let directory = TableDirectory::load(&dir.join(DIRECTORY_FILE))?;
        let page_store = PageStore::open(&dir.join(DATA_FILE))?;
        info!("opened database at {}", dir.display());
        Ok(Database {
            dir: dir.to_path_buf(),
            catalog: RwLock::new(catalog),
            directory: RwLock::new(directory),
            page_store,
            buffer_manager: BufferManager::new(),
            pk_indexes: RwLock::new(HashMap::new()),
        })
    }

    pub fn session(&self) -> Session {
        Session::new()
    }

    pub fn create_node_table(
        &self,
        name: &str,
        columns: Vec<ColumnDefinition>,
        primary_key: &str,
    ) -> Result<()> {
        let mut catalog = self.catalog.write().unwrap();
        catalog.add_node_table(name, columns, primary_key)?;
        catalog.save(&self.dir.join(CATALOG_FILE))
    }

    pub fn create_rel_table(
        &self,
        name: &str,
        src_table: &str,
        dst_table: &str,
        columns: Vec<ColumnDefinition>,
    ) -> Result<()> {
        let mut catalog = self.catalog.write().unwrap();
        catalog.add_rel_table(name, src_table, dst_table, columns)?;
        catalog.save(&self.dir.join(CATALOG_FILE))
    }

    /// Bulk-loads a source file into `table`.
    pub fn copy(
        &self,
        session: &Session,
        table: &str,
        path: &Path,
        option: CsvOption,
    ) -> Result<CopyResult> {
        copier::copy_into_table(self, session, table, path, option, None)
    }

    /// Like [`Database::copy`], but registers every reader the copy starts
    /// with `progress`, so another thread can watch the byte counts while
    /// the load runs.
    pub fn copy_with_progress(
        &self,
        session: &Session,
        table: &str,
        path: &Path,
        option: CsvOption,
        progress: &Arc<CopyProgress>,
    ) -> Result<CopyResult> {
        copier::copy_into_table(self, session, table, path, option, Some(progress.clone()))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.catalog
            .read()
            .unwrap()
            .table_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    pub fn num_rows(&self, table: &str) -> u64 {
        self.directory.read().unwrap().num_rows(table)
    }

    /// Reads one column of `table` back out of the data file, across all
    /// flushed node groups.
    pub fn scan_column(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        let schema = self.table_schema(table)?;
        let columns = schema.copy_columns();
        let column_idx = columns
            .iter()
            .position(|c| c.name == column)
            .ok_or_else(|| {
                Error::Catalog(format!("table {table} has no column {column}"))
            })?;
        let data_type = columns[column_idx].data_type.clone();

        let groups: Vec<NodeGroupEntry> = {
            let directory = self.directory.read().unwrap();
            directory
                .table(table)
                .map(|entry| entry.node_groups.clone())
                .unwrap_or_default()
        };

        let mut values = Vec::new();
        for group in groups {
            let chunk = ColumnChunk::read(
                &self.page_store,
                &group.columns[column_idx],
                data_type.clone(),
                &self.buffer_manager,
            )?;
            for pos in 0..group.num_rows {
                values.push(chunk.value_at(pos));
            }
        }
        Ok(values)
    }

    /// The primary-key index of a node table, rebuilt from flushed chunks
    /// when this database object has not copied the table itself.
    pub fn pk_index(&self, table: &str) -> Result<Arc<PrimaryKeyIndex>> {
        if let Some(index) = self.pk_indexes.read().unwrap().get(table) {
            return Ok(index.clone());
        }
        let node = {
            let catalog = self.catalog.read().unwrap();
            catalog.node_table(table)?.clone()
        };
        let key = node.primary_key().clone();
        let mut index = PrimaryKeyIndex::new(table, &key.data_type);
        let mut offset = 0u64;
        for value in self.scan_column(table, &key.name)? {
            insert_key(&mut index, table, value, offset)?;
            offset += 1;
        }
        let index = Arc::new(index);
        self.pk_indexes
            .write()
            .unwrap()
            .insert(table.to_string(), index.clone());
        Ok(index)
    }

    pub(crate) fn table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(self.catalog.read().unwrap().table(table)?.clone())
    }

    pub(crate) fn page_store(&self) -> &PageStore {
        &self.page_store
    }

    pub(crate) fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffer_manager
    }

    pub(crate) fn add_node_group(&self, table: &str, entry: NodeGroupEntry) {
        self.directory.write().unwrap().add_node_group(table, entry);
    }

    pub(crate) fn cache_pk_index(&self, table: &str, index: Arc<PrimaryKeyIndex>) {
        self.pk_indexes
            .write()
            .unwrap()
            .insert(table.to_string(), index);
    }

    pub(crate) fn take_cached_pk_index(&self, table: &str) -> Option<PrimaryKeyIndex> {
        let mut indexes = self.pk_indexes.write().unwrap();
        let index = indexes.remove(table)?;
        match Arc::try_unwrap(index) {
            Ok(index) => Some(index),
            Err(shared) => {
                indexes.insert(table.to_string(), shared);
                None
            }
        }
    }

    /// Writes the directory back out; the ingestion commit point.
    pub(crate) fn persist(&self) -> Result<()> {
        self.directory
            .read()
            .unwrap()
            .save(&self.dir.join(DIRECTORY_FILE))
    }
}

pub(crate) fn insert_key(
    index: &mut PrimaryKeyIndex,
    table: &str,
    value: Value,
    offset: u64,
) -> Result<()> {
    match value {
        Value::Int64(key) => index.insert_int(key, offset),
        Value::String(key) => index.insert_text(&key, offset),
        Value::Null => Err(Error::Catalog(format!(
            "primary key of table {table} must not be null"
        ))),
        other => Err(Error::MalformedValue {
            value: format!("{other:?}"),
            data_type: LogicalType::Int64.to_string(),
        }),
    }
}
