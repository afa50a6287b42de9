//! In-memory primary-key index built while nodes are copied, consulted when
//! rel tables resolve their endpoint keys to node offsets.

use std::collections::HashMap;

use crate::err::{Error, Result};
use crate::types::LogicalType;

#[derive(Debug)]
enum Keys {
    Int(HashMap<i64, u64>),
    Text(HashMap<String, u64>),
}

#[derive(Debug)]
pub struct PrimaryKeyIndex {
    table: String,
    keys: Keys,
}

impl PrimaryKeyIndex {
    pub fn new(table: &str, key_type: &LogicalType) -> PrimaryKeyIndex {
        let keys = match key_type {
            LogicalType::Int64 => Keys::Int(HashMap::new()),
            _ => Keys::Text(HashMap::new()),
        };
        PrimaryKeyIndex {
            table: table.to_string(),
            keys,
        }
    }

    pub fn len(&self) -> usize {
        match &self.keys {
            Keys::Int(map) => map.len(),
            Keys::Text(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert_int(&mut self, key: i64, offset: u64) -> Result<()> {
        match &mut self.keys {
            Keys::Int(map) => {
                if map.insert(key, offset).is_some() {
                    return Err(Error::DuplicatePrimaryKey {
                        table: self.table.clone(),
                        key: key.to_string(),
                    });
                }
                Ok(())
            }
            Keys::Text(_) => unreachable!("integer key in a text index"),
        }
    }

    pub fn insert_text(&mut self, key: &str, offset: u64) -> Result<()> {
        match &mut self.keys {
            Keys::Text(map) => {
                if map.insert(key.to_string(), offset).is_some() {
                    return Err(Error::DuplicatePrimaryKey {
                        table: self.table.clone(),
                        key: key.to_string(),
                    });
                }
                Ok(())
            }
            Keys::Int(_) => unreachable!("text key in an integer index"),
        }
    }

    /// Resolves a key as it appears in a CSV cell.
    pub fn lookup_bytes(&self, key: &[u8]) -> Option<u64> {
        let text = std::str::from_utf8(key).ok()?;
        match &self.keys {
            Keys::Int(map) => map.get(&text.trim().parse::<i64>().ok()?).copied(),
            Keys::Text(map) => map.get(text).copied(),
        }
    }
}
