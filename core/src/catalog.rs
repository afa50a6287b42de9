//! Minimal table schema model: node tables with a primary key and rel
//! tables connecting two node tables. Binding and planning live elsewhere;
//! the copier only needs names, types, and the per-column null policy.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::err::{Error, Result};
use crate::types::LogicalType;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub data_type: LogicalType,
    /// Whether an empty unquoted CSV field loads as null.
    pub null_on_empty: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: LogicalType) -> ColumnDefinition {
        ColumnDefinition {
            name: name.into(),
            data_type,
            null_on_empty: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeTableSchema {
    pub table_id: u64,
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key_idx: usize,
}

impl NodeTableSchema {
    pub fn primary_key(&self) -> &ColumnDefinition {
        &self.columns[self.primary_key_idx]
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelTableSchema {
    pub table_id: u64,
    pub name: String,
    pub src_table: String,
    pub dst_table: String,
    /// Property columns; the source and destination key columns are implied.
    pub columns: Vec<ColumnDefinition>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TableSchema {
    Node(NodeTableSchema),
    Rel(RelTableSchema),
}

impl TableSchema {
    pub fn name(&self) -> &str {
        match self {
            TableSchema::Node(node) => &node.name,
            TableSchema::Rel(rel) => &rel.name,
        }
    }

    /// Column layout the copier materializes: node tables as declared, rel
    /// tables with the implied endpoint offset columns in front.
    pub fn copy_columns(&self) -> Vec<ColumnDefinition> {
        match self {
            TableSchema::Node(node) => node.columns.clone(),
            TableSchema::Rel(rel) => {
                let mut columns = Vec::with_capacity(rel.columns.len() + 2);
                for endpoint in ["_src", "_dst"] {
                    let mut column =
                        ColumnDefinition::new(endpoint, LogicalType::InternalId);
                    column.null_on_empty = false;
                    columns.push(column);
                }
                columns.extend(rel.columns.iter().cloned());
                columns
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: HashMap<String, TableSchema>,
    next_table_id: u64,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    pub fn add_node_table(
        &mut self,
        name: &str,
        columns: Vec<ColumnDefinition>,
        primary_key: &str,
    ) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }
        let primary_key_idx = columns
            .iter()
            .position(|c| c.name == primary_key)
            .ok_or_else(|| {
                Error::Catalog(format!("primary key column {primary_key} is not defined"))
            })?;
        match columns[primary_key_idx].data_type {
            LogicalType::Int64 | LogicalType::String => {}
            ref other => {
                return Err(Error::Catalog(format!(
                    "primary key must be INT64 or STRING, got {other}"
                )))
            }
        }
        let table_id = self.next_table_id;
        self.next_table_id += 1;
        self.tables.insert(
            name.to_string(),
            TableSchema::Node(NodeTableSchema {
                table_id,
                name: name.to_string(),
                columns,
                primary_key_idx,
            }),
        );
        Ok(())
    }

    pub fn add_rel_table(
        &mut self,
        name: &str,
        src_table: &str,
        dst_table: &str,
        columns: Vec<ColumnDefinition>,
    ) -> Result<()> {
        if self.tables.contains_key(name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }
        for endpoint in [src_table, dst_table] {
            match self.tables.get(endpoint) {
                Some(TableSchema::Node(_)) => {}
                Some(_) => {
                    return Err(Error::Catalog(format!(
                        "{endpoint} is not a node table"
                    )))
                }
                None => return Err(Error::TableNotFound(endpoint.to_string())),
            }
        }
        let table_id = self.next_table_id;
        self.next_table_id += 1;
        self.tables.insert(
            name.to_string(),
            TableSchema::Rel(RelTableSchema {
                table_id,
                name: name.to_string(),
                src_table: src_table.to_string(),
                dst_table: dst_table.to_string(),
                columns,
            }),
        );
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    pub fn node_table(&self, name: &str) -> Result<&NodeTableSchema> {
        match self.table(name)? {
            TableSchema::Node(node) => Ok(node),
            TableSchema::Rel(_) => {
                Err(Error::Catalog(format!("{name} is not a node table")))
            }
        }
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn load(path: &Path) -> Result<Catalog> {
        if !path.exists() {
            return Ok(Catalog::new());
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

    #[test]
    fn node_table_requires_valid_primary_key() {
        let mut catalog = Catalog::new();
        let columns = vec![
            ColumnDefinition::new("id", LogicalType::Int64),
            ColumnDefinition::new("score", LogicalType::Double),
        ];
        assert!(catalog
            .add_node_table("person", columns.clone(), "missing")
            .is_err());
        assert!(catalog
            .add_node_table("person", columns.clone(), "score")
            .is_err());
        catalog.add_node_table("person", columns, "id").unwrap();
        assert!(catalog.node_table("person").is_ok());
    }

    #[test]
    fn rel_table_endpoints_must_exist() {
        let mut catalog = Catalog::new();
        catalog
            .add_node_table(
                "person",
                vec![ColumnDefinition::new("id", LogicalType::Int64)],
                "id",
            )
            .unwrap();
        assert!(catalog
            .add_rel_table("knows", "person", "city", vec![])
            .is_err());
        catalog
            .add_rel_table("knows", "person", "person", vec![])
            .unwrap();
        assert!(matches!(
            catalog.table("knows").unwrap(),
            TableSchema::Rel(_)
        ));
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut catalog = Catalog::new();
        catalog
            .add_node_table(
                "person",
                vec![ColumnDefinition::new("id", LogicalType::Int64)],
                "id",
            )
            .unwrap();
        catalog.save(&path).unwrap();
        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded.table_names(), vec!["person"]);
    }
}
