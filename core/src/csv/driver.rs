//! Drivers plugged into the CSV state machine. The reader hands every cell
//! and row boundary to the driver; the driver decides whether to keep it.

use std::sync::Arc;

use crate::csv::reader::ReadProgress;
use crate::node_group::NodeGroup;
use crate::pk_index::PrimaryKeyIndex;

/// What to do with each parsed cell and row.
///
/// Returning false from [`ParseDriver::add_value`] makes the reader skip the
/// rest of the line. [`ParseDriver::add_row`] returns whether the row was
/// accepted; a rejection with a pending error message goes through the error
/// handler, one without is a silent skip (e.g. an empty line).
pub trait ParseDriver {
    fn done(&self, row_num: u64) -> bool {
        let _ = row_num;
        false
    }

    fn add_value(&mut self, row_num: u64, column_idx: usize, value: &[u8]) -> bool;

    fn add_row(&mut self, row_num: u64, num_columns: usize) -> bool;

    /// Why the last `add_value`/`add_row` returned false, if it was an error.
    fn take_error(&mut self) -> Option<String> {
        None
    }
}

/// Discards the first `skip_num` rows.
pub struct SkipRowDriver {
    skip_num: u64,
}

impl SkipRowDriver {
    pub fn new(skip_num: u64) -> SkipRowDriver {
        SkipRowDriver { skip_num }
    }
}

impl ParseDriver for SkipRowDriver {
    fn done(&self, row_num: u64) -> bool {
        row_num >= self.skip_num
    }

    fn add_value(&mut self, _row_num: u64, _column_idx: usize, _value: &[u8]) -> bool {
        true
    }

    fn add_row(&mut self, _row_num: u64, _num_columns: usize) -> bool {
        true
    }
}

/// Consumes one row, keeping the cell texts as column names.
#[derive(Default)]
pub struct HeaderDriver {
    pub names: Vec<String>,
}

impl ParseDriver for HeaderDriver {
    fn done(&self, row_num: u64) -> bool {
        row_num >= 1
    }

    fn add_value(&mut self, _row_num: u64, _column_idx: usize, value: &[u8]) -> bool {
        self.names.push(String::from_utf8_lossy(value).into_owned());
        true
    }

    fn add_row(&mut self, _row_num: u64, _num_columns: usize) -> bool {
        true
    }
}

/// Writes parsed cells straight into one shared node group; done when the
/// group reaches capacity.
pub struct SerialDriver<'a> {
    group: &'a mut NodeGroup,
    /// Per-column key resolvers; a resolving column holds node keys in the
    /// file but stores node offsets in its chunk (rel endpoint columns).
    resolvers: Vec<Option<Arc<PrimaryKeyIndex>>>,
    pending_error: Option<String>,
    row_empty: bool,
}

impl<'a> SerialDriver<'a> {
    pub fn new(group: &'a mut NodeGroup) -> SerialDriver<'a> {
        SerialDriver {
            group,
            resolvers: Vec::new(),
            pending_error: None,
            row_empty: false,
        }
    }

    pub fn with_resolvers(
        group: &'a mut NodeGroup,
        resolvers: Vec<Option<Arc<PrimaryKeyIndex>>>,
    ) -> SerialDriver<'a> {
        SerialDriver {
            group,
            resolvers,
            pending_error: None,
            row_empty: false,
        }
    }
}

impl ParseDriver for SerialDriver<'_> {
    fn done(&self, _row_num: u64) -> bool {
        self.group.is_full()
    }

    fn add_value(&mut self, _row_num: u64, column_idx: usize, value: &[u8]) -> bool {
        if column_idx == 0 {
            self.row_empty = value.is_empty();
        } else {
            self.row_empty = false;
        }
        if column_idx >= self.group.num_columns() {
            self.pending_error = Some(format!(
                "expected {} values per row, found more",
                self.group.num_columns()
            ));
            return false;
        }
        let pos = self.group.num_rows();
        if let Some(Some(index)) = self.resolvers.get(column_idx) {
            return match index.lookup_bytes(value) {
                Some(offset) => {
                    let chunk = self.group.chunk_mut(column_idx);
                    chunk.set_value(offset, pos);
                    chunk.set_null(pos, false);
                    true
                }
                None => {
                    self.pending_error = Some(format!(
                        "cannot resolve key `{}` to a node",
                        String::from_utf8_lossy(value)
                    ));
                    false
                }
            };
        }
        let null_on_empty = self.group.columns()[column_idx].null_on_empty;
        let chunk = self.group.chunk_mut(column_idx);
        if value.is_empty() && null_on_empty {
            chunk.write_null(pos);
            return true;
        }
        match chunk.set_value_from_string(value, pos) {
            Ok(()) => {
                chunk.set_null(pos, false);
                true
            }
            Err(error) => {
                self.pending_error = Some(error.to_string());
                false
            }
        }
    }

    fn add_row(&mut self, _row_num: u64, num_columns: usize) -> bool {
        if num_columns == 1 && self.row_empty {
            // Blank line; skip without recording an error.
            return false;
        }
        if num_columns != self.group.num_columns() {
            self.pending_error = Some(format!(
                "expected {} values per row, found {}",
                self.group.num_columns(),
                num_columns
            ));
            return false;
        }
        self.group.advance_row();
        true
    }

    fn take_error(&mut self) -> Option<String> {
        self.pending_error.take()
    }
}

/// Block-scoped variant of [`SerialDriver`]: same write path, but done once
/// the reader has moved past the end of its assigned byte range. The row
/// that straddles the boundary belongs to the block it started in.
pub struct ParallelDriver<'a> {
    inner: SerialDriver<'a>,
    progress: Arc<ReadProgress>,
    block_end: u64,
}

impl<'a> ParallelDriver<'a> {
    pub fn new(
        inner: SerialDriver<'a>,
        progress: Arc<ReadProgress>,
        block_end: u64,
    ) -> ParallelDriver<'a> {
        ParallelDriver {
            inner,
            progress,
            block_end,
        }
    }
}

impl ParseDriver for ParallelDriver<'_> {
    fn done(&self, row_num: u64) -> bool {
        self.inner.done(row_num) || self.progress.file_offset() > self.block_end
    }

    fn add_value(&mut self, row_num: u64, column_idx: usize, value: &[u8]) -> bool {
        self.inner.add_value(row_num, column_idx, value)
    }

    fn add_row(&mut self, row_num: u64, num_columns: usize) -> bool {
        self.inner.add_row(row_num, num_columns)
    }

    fn take_error(&mut self) -> Option<String> {
        self.inner.take_error()
    }
}
