//! The on-disk directory: per table, per node group, where every column
//! chunk landed in the data file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chunk::ColumnChunkMetadata;
use crate::err::{Error, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeGroupEntry {
    pub num_rows: u64,
    /// One metadata record per column, in schema order.
    pub columns: Vec<ColumnChunkMetadata>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TableEntry {
    pub node_groups: Vec<NodeGroupEntry>,
}

impl TableEntry {
    pub fn num_rows(&self) -> u64 {
        self.node_groups.iter().map(|g| g.num_rows).sum()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TableDirectory {
    tables: HashMap<String, TableEntry>,
}

impl TableDirectory {
    pub fn add_node_group(&mut self, table: &str, entry: NodeGroupEntry) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .node_groups
            .push(entry);
    }

    pub fn table(&self, name: &str) -> Option<&TableEntry> {
        self.tables.get(name)
    }

    pub fn num_rows(&self, table: &str) -> u64 {
        self.tables.get(table).map_or(0, TableEntry::num_rows)
    }

    pub fn load(path: &Path) -> Result<TableDirectory> {
        if !path.exists() {
            return Ok(TableDirectory::default());
        }
        let bytes = fs::read(path).map_err(Error::ReadFile)?;
        serde_json::from_slice(&bytes).map_err(Error::Metadata)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self).map_err(Error::Metadata)?;
        fs::write(path, bytes).map_err(Error::WriteFile)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(num_rows: u64) -> NodeGroupEntry {
        NodeGroupEntry {
            num_rows,
            columns: vec![ColumnChunkMetadata {
                start_page_idx: 0,
                num_pages: 1,
                num_values: num_rows,
                num_value_pages: 1,
                num_null_pages: 0,
                num_overflow_pages: 0,
                children: vec![],
            }],
        }
    }

    #[test]
    fn accumulates_row_counts() {
        let mut directory = TableDirectory::default();
        directory.add_node_group("person", entry(100));
        directory.add_node_group("person", entry(20));
        assert_eq!(directory.num_rows("person"), 120);
        assert_eq!(directory.num_rows("city"), 0);
        assert_eq!(directory.table("person").unwrap().node_groups.len(), 2);
    }

    #[test]
    fn persists_to_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.json");
        let mut directory = TableDirectory::default();
        directory.add_node_group("person", entry(5));
        directory.save(&path).unwrap();
        let reloaded = TableDirectory::load(&path).unwrap();
        assert_eq!(reloaded.num_rows("person"), 5);
    }
}
