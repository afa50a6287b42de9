//! A node group: one fixed-size batch of rows held as a set of column
//! chunks, the unit of flushing to the data file.

use std::sync::Arc;

use crate::buffer_manager::BufferManager;
use crate::catalog::ColumnDefinition;
use crate::chunk::{create_column_chunk, ColumnChunk, ListFormat};
use crate::err::Result;

pub struct NodeGroup {
    columns: Vec<ColumnDefinition>,
    chunks: Vec<ColumnChunk>,
    num_rows: u64,
    capacity: u64,
}

impl NodeGroup {
    pub fn new(
        columns: &[ColumnDefinition],
        capacity: u64,
        buffer_manager: &Arc<BufferManager>,
        list_format: ListFormat,
    ) -> NodeGroup {
        let chunks = columns
            .iter()
            .map(|column| {
                create_column_chunk(
                    column.data_type.clone(),
                    capacity,
                    buffer_manager,
                    list_format,
                )
            })
            .collect();
        NodeGroup {
            columns: columns.to_vec(),
            chunks,
            num_rows: 0,
            capacity,
        }
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> u64 {
        self.num_rows
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.num_rows >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn chunk(&self, column_idx: usize) -> &ColumnChunk {
        &self.chunks[column_idx]
    }

    pub fn chunk_mut(&mut self, column_idx: usize) -> &mut ColumnChunk {
        &mut self.chunks[column_idx]
    }

    pub fn chunks(&self) -> &[ColumnChunk] {
        &self.chunks
    }

    /// Commits the row currently staged at `num_rows`.
    pub fn advance_row(&mut self) {
        debug_assert!(self.num_rows < self.capacity);
        self.num_rows += 1;
    }

    /// Appends `num_rows` rows from `other` starting at `src_start`.
    pub fn append_rows(&mut self, other: &NodeGroup, src_start: u64, num_rows: u64) -> Result<()> {
        debug_assert!(self.num_rows + num_rows <= self.capacity);
        for (chunk, other_chunk) in self.chunks.iter_mut().zip(other.chunks.iter()) {
            chunk.append_chunk(other_chunk, src_start, self.num_rows, num_rows)?;
        }
        self.num_rows += num_rows;
        Ok(())
    }

    /// Rows still available before the group seals.
    pub fn remaining_capacity(&self) -> u64 {
        self.capacity - self.num_rows
    }
}
