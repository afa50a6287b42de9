//! Core engine of quiver, an embedded columnar property-graph database:
//! the bulk-ingestion pipeline (CSV reader state machine, parse drivers,
//! error policy) and the column-chunk storage layer (typed chunks, null
//! masks, overflow buffers, page-aligned flushing).

pub mod buffer_manager;
pub mod catalog;
pub mod chunk;
pub mod copier;
pub mod csv;
pub mod datetime;
pub mod db;
pub mod directory;
pub mod err;
pub mod node_group;
pub mod null_mask;
pub mod options;
pub mod page_store;
pub mod pk_index;
pub mod session;
pub mod types;

pub use catalog::{Catalog, ColumnDefinition, NodeTableSchema, RelTableSchema, TableSchema};
pub use copier::{sniff_csv, CopyProgress, CopyResult};
pub use csv::{CsvError, CsvErrorHandler, CsvReader};
pub use db::Database;
pub use err::{Error, Result};
pub use options::{CsvOption, FileType};
pub use session::Session;
pub use types::{Interval, InternalId, LogicalType, StructField, Value};
