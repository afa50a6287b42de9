//! The bulk-load pipeline: stream a source file through the CSV reader into
//! node groups and flush each sealed group to the data file.
//!
//! Small files run one serial reader. Large files are split into fixed-size
//! byte blocks parsed in parallel; each block reader owns its chunk sets,
//! and the coordinator recombines them in block order so row order within
//! the table matches file order.

use std::cmp::min;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use constants::copy::{NUM_SNIFF_ROWS, PARALLEL_BLOCK_SIZE};
use constants::storage::NODE_GROUP_SIZE;
use log::{debug, info};
use rayon::prelude::*;

use crate::catalog::{ColumnDefinition, TableSchema};
use crate::chunk::ListFormat;
use crate::csv::reader::ReadProgress;
use crate::csv::sniff::name_columns;
use crate::csv::{
    CsvColumnInfo, CsvError, CsvErrorHandler, CsvReader, ParallelDriver, SerialDriver,
    SniffDriver,
};
use crate::db::{insert_key, Database};
use crate::directory::NodeGroupEntry;
use crate::err::{Error, Result};
use crate::node_group::NodeGroup;
use crate::options::{CsvOption, FileType};
use crate::pk_index::PrimaryKeyIndex;
use crate::session::Session;
use crate::types::LogicalType;

/// Outcome of one bulk load: accepted rows plus, in lenient mode, the
/// ordered stream of skipped lines.
#[derive(Debug)]
pub struct CopyResult {
    pub rows_inserted: u64,
    pub errors: Vec<CsvError>,
}

/// Live progress of a running copy, readable from another thread. Every
/// reader the copy starts registers its byte range and shared offset
/// tracker here; [`CopyProgress::bytes_read`] sums the per-reader
/// `file_offset` values clamped to their ranges.
pub struct CopyProgress {
    total_bytes: AtomicU64,
    readers: Mutex<Vec<TrackedReader>>,
}

struct TrackedReader {
    start: u64,
    end: u64,
    progress: Arc<ReadProgress>,
}

impl CopyProgress {
    pub fn new() -> Arc<CopyProgress> {
        Arc::new(CopyProgress {
            total_bytes: AtomicU64::new(0),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Size of the source file, zero until the copy has opened it.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Bytes the copy's readers have consumed so far.
    pub fn bytes_read(&self) -> u64 {
        let readers = self.readers.lock().unwrap();
        readers
            .iter()
            .map(|r| min(r.progress.file_offset(), r.end).saturating_sub(r.start))
            .sum()
    }

    /// Fraction of the file consumed, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        self.bytes_read() as f64 / total as f64
    }

    fn set_total(&self, total_bytes: u64) {
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
    }

    fn track(&self, start: u64, end: u64, progress: Arc<ReadProgress>) {
        self.readers.lock().unwrap().push(TrackedReader {
            start,
            end,
            progress,
        });
    }
}

/// Infers column names and types from the head of a CSV file. Names come
/// from the header row when present, `column{i}` otherwise.
pub fn sniff_csv(path: &Path, option: CsvOption) -> Result<Vec<(String, LogicalType)>> {
    expect_csv(path)?;
    let handler = Arc::new(CsvErrorHandler::lenient());
    let mut reader = CsvReader::new(path, option, CsvColumnInfo::default(), handler, None)?;
    reader.handle_first_block()?;
    let mut driver = SniffDriver::new(NUM_SNIFF_ROWS);
    reader.parse_csv(&mut driver)?;
    debug!("sniffed {} rows of {}", driver.num_sampled_rows(), path.display());
    Ok(name_columns(
        reader.header_names(),
        driver.infer_column_types(),
    ))
}

fn expect_csv(path: &Path) -> Result<()> {
    match FileType::from_path(path)? {
        FileType::Csv => Ok(()),
        other => Err(Error::UnsupportedFileType(format!(
            "{other} (copy not implemented)"
        ))),
    }
}

pub(crate) fn copy_into_table(
    db: &Database,
    session: &Session,
    table: &str,
    path: &Path,
    option: CsvOption,
    progress: Option<Arc<CopyProgress>>,
) -> Result<CopyResult> {
    expect_csv(path)?;
    let schema = db.table_schema(table)?;
    let columns = schema.copy_columns();
    let resolvers = build_resolvers(db, &schema)?;
    let handler = Arc::new(if option.ignore_errors {
        CsvErrorHandler::lenient()
    } else {
        CsvErrorHandler::strict()
    });
    let list_format = ListFormat {
        begin: option.list_begin_char,
        end: option.list_end_char,
    };
    let mut pk_builder = primary_key_builder(db, &schema)?;
    let base_offset = db.num_rows(table);

    let file_size = fs::metadata(path).map_err(Error::ReadFile)?.len();
    let parallel = session.num_threads() > 1 && file_size >= 2 * PARALLEL_BLOCK_SIZE;
    info!(
        "copying {} into {table} ({file_size} bytes, {})",
        path.display(),
        if parallel { "parallel" } else { "serial" }
    );
    if let Some(progress) = &progress {
        progress.set_total(file_size);
    }

    let context = CopyContext {
        db,
        schema: &schema,
        columns: &columns,
        resolvers,
        handler: handler.clone(),
        list_format,
        base_offset,
        progress,
    };
    let rows_inserted = if parallel {
        copy_parallel(&context, session, path, option, file_size, &mut pk_builder)?
    } else {
        copy_serial(&context, session, path, option, &mut pk_builder)?
    };

    if let (TableSchema::Node(node), Some(index)) = (&schema, pk_builder) {
        db.cache_pk_index(&node.name, Arc::new(index));
    }
    db.persist()?;
    info!("copied {rows_inserted} rows into {table}");
    Ok(CopyResult {
        rows_inserted,
        errors: handler.take_errors(),
    })
}

struct CopyContext<'a> {
    db: &'a Database,
    schema: &'a TableSchema,
    columns: &'a [ColumnDefinition],
    resolvers: Vec<Option<Arc<PrimaryKeyIndex>>>,
    handler: Arc<CsvErrorHandler>,
    list_format: ListFormat,
    base_offset: u64,
    progress: Option<Arc<CopyProgress>>,
}

impl CopyContext<'_> {
    fn new_group(&self) -> NodeGroup {
        NodeGroup::new(
            self.columns,
            NODE_GROUP_SIZE,
            self.db.buffer_manager(),
            self.list_format,
        )
    }

    fn column_info(&self) -> CsvColumnInfo {
        CsvColumnInfo {
            num_columns: self.columns.len(),
        }
    }

    fn track_reader(&self, start: u64, end: u64, reader: &CsvReader) {
        if let Some(progress) = &self.progress {
            progress.track(start, end, reader.progress());
        }
    }

    /// Flushes one sealed group: updates the primary-key index, writes every
    /// chunk as a page run, and records the placements in the directory.
    fn seal_group(
        &self,
        group: &NodeGroup,
        pk_builder: &mut Option<PrimaryKeyIndex>,
        rows_before: u64,
    ) -> Result<()> {
        if let (TableSchema::Node(node), Some(index)) = (self.schema, pk_builder.as_mut()) {
            let chunk = group.chunk(node.primary_key_idx);
            for i in 0..group.num_rows() {
                let offset = self.base_offset + rows_before + i;
                insert_key(index, &node.name, chunk.value_at(i), offset)?;
            }
        }
        let store = self.db.page_store();
        let mut columns = Vec::with_capacity(group.chunks().len());
        for chunk in group.chunks() {
            let start_page_idx = store.allocate_pages(chunk.num_pages());
            columns.push(chunk.flush(store, start_page_idx)?);
        }
        debug!(
            "sealed node group of {} rows for {}",
            group.num_rows(),
            self.schema.name()
        );
        self.db.add_node_group(
            self.schema.name(),
            NodeGroupEntry {
                num_rows: group.num_rows(),
                columns,
            },
        );
        Ok(())
    }
}

/// Rel endpoint columns resolve node keys through the endpoint tables'
/// primary-key indexes; other columns parse cell text directly.
fn build_resolvers(
    db: &Database,
    schema: &TableSchema,
) -> Result<Vec<Option<Arc<PrimaryKeyIndex>>>> {
    let TableSchema::Rel(rel) = schema else {
        return Ok(Vec::new());
    };
    let mut resolvers = Vec::with_capacity(rel.columns.len() + 2);
    for endpoint in [&rel.src_table, &rel.dst_table] {
        let index = db.pk_index(endpoint)?;
        if index.is_empty() {
            return Err(Error::EmptyNodeTable(endpoint.clone()));
        }
        resolvers.push(Some(index));
    }
    resolvers.resize(rel.columns.len() + 2, None);
    Ok(resolvers)
}

/// An owned builder for the node table's primary-key index, extending any
/// keys already loaded.
fn primary_key_builder(
    db: &Database,
    schema: &TableSchema,
) -> Result<Option<PrimaryKeyIndex>> {
    let TableSchema::Node(node) = schema else {
        return Ok(None);
    };
    if let Some(index) = db.take_cached_pk_index(&node.name) {
        return Ok(Some(index));
    }
    if db.num_rows(&node.name) == 0 {
        return Ok(Some(PrimaryKeyIndex::new(
            &node.name,
            &node.primary_key().data_type,
        )));
    }
    // Rebuild from flushed chunks, then take the freshly cached copy.
    db.pk_index(&node.name)?;
    db.take_cached_pk_index(&node.name)
        .map(Some)
        .ok_or_else(|| Error::Catalog(format!("primary key index of {} is busy", node.name)))
}

fn copy_serial(
    context: &CopyContext<'_>,
    session: &Session,
    path: &Path,
    option: CsvOption,
    pk_builder: &mut Option<PrimaryKeyIndex>,
) -> Result<u64> {
    let mut reader = CsvReader::new(
        path,
        option,
        context.column_info(),
        context.handler.clone(),
        Some(session.interrupt_flag()),
    )?;
    context.track_reader(0, reader.file_size(), &reader);
    reader.handle_first_block()?;
    let mut total = 0u64;
    loop {
        let mut group = context.new_group();
        let rows = {
            let mut driver =
                SerialDriver::with_resolvers(&mut group, context.resolvers.clone());
            reader.parse_csv(&mut driver)?
        };
        reader.increase_num_rows_in_current_block(rows);
        if group.is_empty() {
            break;
        }
        context.seal_group(&group, pk_builder, total)?;
        total += group.num_rows();
    }
    Ok(total)
}

fn copy_parallel(
    context: &CopyContext<'_>,
    session: &Session,
    path: &Path,
    option: CsvOption,
    file_size: u64,
    pk_builder: &mut Option<PrimaryKeyIndex>,
) -> Result<u64> {
    let num_blocks = (file_size + PARALLEL_BLOCK_SIZE - 1) / PARALLEL_BLOCK_SIZE;
    // A block boundary cannot be located inside an open quote, so block
    // readers run with quoted newlines rejected.
    let block_option = CsvOption {
        allow_quoted_newlines: false,
        ..option
    };
    let num_threads = min(session.num_threads() as u64, num_blocks) as usize;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;
    debug!("scheduling {num_blocks} blocks on {num_threads} threads");

    let block_groups: Vec<Vec<NodeGroup>> = pool.install(|| {
        (0..num_blocks as usize)
            .into_par_iter()
            .map(|block_idx| {
                parse_block(context, session, path, block_option, block_idx as u64)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    combine_and_flush(context, block_groups, pk_builder)
}

/// Parses the byte range of one block into its own chunk sets. The reader
/// aligns on the first row boundary after the block start (block 0 instead
/// consumes the BOM, skipped rows, and header) and keeps going until it has
/// finished the row it was in when it crossed the block end.
fn parse_block(
    context: &CopyContext<'_>,
    session: &Session,
    path: &Path,
    option: CsvOption,
    block_idx: u64,
) -> Result<Vec<NodeGroup>> {
    let mut reader = CsvReader::new(
        path,
        option,
        context.column_info(),
        context.handler.clone(),
        Some(session.interrupt_flag()),
    )?;
    reader.set_block_idx(block_idx);
    let block_end = (block_idx + 1) * PARALLEL_BLOCK_SIZE;
    context.track_reader(
        block_idx * PARALLEL_BLOCK_SIZE,
        min(block_end, reader.file_size()),
        &reader,
    );
    if block_idx == 0 {
        reader.handle_first_block()?;
    } else {
        reader.seek(block_idx * PARALLEL_BLOCK_SIZE)?;
        reader.skip_partial_line()?;
        if reader.file_offset() > block_end {
            // The line spanning this whole block belongs to its predecessor.
            return Ok(Vec::new());
        }
    }

    let progress = reader.progress();
    let mut groups = Vec::new();
    loop {
        let mut group = context.new_group();
        let rows = {
            let serial = SerialDriver::with_resolvers(&mut group, context.resolvers.clone());
            let mut driver = ParallelDriver::new(serial, progress.clone(), block_end);
            reader.parse_csv(&mut driver)?
        };
        reader.increase_num_rows_in_current_block(rows);
        if group.is_empty() {
            break;
        }
        groups.push(group);
        if reader.is_eof() || reader.file_offset() > block_end {
            break;
        }
    }
    debug!(
        "block {block_idx}: {} rows in {} chunk sets",
        reader.num_rows_in_current_block(),
        groups.len()
    );
    Ok(groups)
}

/// Repacks per-block chunk sets into full node groups, preserving block
/// order, and flushes each sealed group.
fn combine_and_flush(
    context: &CopyContext<'_>,
    block_groups: Vec<Vec<NodeGroup>>,
    pk_builder: &mut Option<PrimaryKeyIndex>,
) -> Result<u64> {
    let mut total = 0u64;
    let mut current: Option<NodeGroup> = None;
    for group in block_groups.into_iter().flatten() {
        if current.is_none() && group.is_full() {
            // Already a whole node group; flush it without recopying.
            context.seal_group(&group, pk_builder, total)?;
            total += group.num_rows();
            continue;
        }
        let mut copied = 0u64;
        while copied < group.num_rows() {
            let target = current.get_or_insert_with(|| context.new_group());
            let take = min(target.remaining_capacity(), group.num_rows() - copied);
            target.append_rows(&group, copied, take)?;
            copied += take;
            if target.is_full() {
                if let Some(sealed) = current.take() {
                    context.seal_group(&sealed, pk_builder, total)?;
                    total += sealed.num_rows();
                }
            }
        }
    }
    if let Some(last) = current {
        if !last.is_empty() {
            context.seal_group(&last, pk_builder, total)?;
            total += last.num_rows();
        }
    }
    Ok(total)
}
