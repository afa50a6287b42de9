//! Embedded columnar property-graph database.
//!
//! A [`Database`] lives in one local directory. Clients open it, declare
//! node and rel tables, and bulk-load tabular files through a [`Session`]:
//!
//! ```no_run
//! use quiver::{ColumnDefinition, CsvOption, Database, LogicalType};
//!
//! fn main() -> quiver::Result<()> {
//!     let db = Database::open(std::path::Path::new("./people-db"))?;
//!     db.create_node_table(
//!         "person",
//!         vec![
//!             ColumnDefinition::new("id", LogicalType::Int64),
//!             ColumnDefinition::new("name", LogicalType::String),
//!         ],
//!         "id",
//!     )?;
//!     let session = db.session();
//!     let mut option = CsvOption::default();
//!     option.has_header = true;
//!     let result = db.copy(&session, "person", std::path::Path::new("people.csv"), option)?;
//!     println!("loaded {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```
//!
//! The ingestion pipeline streams the file through a character-level CSV
//! state machine into typed column chunks, one node group at a time, and
//! flushes each sealed group to 4 KiB pages in the data file. Malformed
//! lines either fail the load or, with `IGNORE_ERRORS`, are recorded and
//! skipped; the recorded errors come back on [`CopyResult`].

pub use quiver_core::{
    sniff_csv, Catalog, ColumnDefinition, CopyProgress, CopyResult, CsvError, CsvOption,
    Database, Error, FileType, Interval, InternalId, LogicalType, NodeTableSchema,
    RelTableSchema, Result, Session, StructField, TableSchema, Value,
};

/// Rows per node group, the database's flush granularity.
pub const NODE_GROUP_SIZE: u64 = constants::storage::NODE_GROUP_SIZE;
