//! Typed in-memory column buffers. One [`ColumnChunk`] holds the values of
//! one column for one node group, tracks nulls in a companion bitmap, and is
//! flushed to the data file as a run of whole pages: value pages first, then
//! null pages, then overflow and child chunks in preorder.

mod array;
mod list_chunk;
mod null_chunk;
mod string_chunk;
mod struct_chunk;

pub use array::ColumnArray;
pub use null_chunk::NullColumnChunk;

use std::mem::size_of;
use std::ptr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::buffer_manager::{BufferManager, OverflowBuffer};
use crate::datetime;
use crate::err::{Error, Result};
use crate::page_store::{num_pages_for_bytes, PageStore};
use crate::types::{LogicalType, PhysicalType, Value};

/// Characters delimiting embedded list literals in cell text.
#[derive(Clone, Copy, Debug)]
pub struct ListFormat {
    pub begin: u8,
    pub end: u8,
}

impl Default for ListFormat {
    fn default() -> ListFormat {
        ListFormat {
            begin: constants::copy::DEFAULT_CSV_LIST_BEGIN,
            end: constants::copy::DEFAULT_CSV_LIST_END,
        }
    }
}

pub struct ColumnChunk {
    data_type: LogicalType,
    num_bytes_per_value: usize,
    buffer: Vec<u8>,
    capacity: u64,
    null: Option<NullColumnChunk>,
    list_format: ListFormat,
    variant: ChunkVariant,
}

enum ChunkVariant {
    Plain,
    FixedList,
    String {
        overflow: OverflowBuffer,
    },
    VarList {
        child: Box<ColumnChunk>,
        num_elements: u64,
    },
    Struct {
        children: Vec<ColumnChunk>,
    },
}

/// Placement of one flushed chunk inside the data file, recorded in the
/// per-table directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnChunkMetadata {
    pub start_page_idx: u64,
    pub num_pages: u64,
    /// Capacity in values of the flushed primary buffer.
    pub num_values: u64,
    pub num_value_pages: u64,
    pub num_null_pages: u64,
    pub num_overflow_pages: u64,
    pub children: Vec<ColumnChunkMetadata>,
}

/// Builds the chunk variant matching a logical type and sizes it for
/// `capacity` values, nulls cleared.
pub fn create_column_chunk(
    data_type: LogicalType,
    capacity: u64,
    buffer_manager: &Arc<BufferManager>,
    list_format: ListFormat,
) -> ColumnChunk {
    let variant = match data_type.physical_type() {
        PhysicalType::String => ChunkVariant::String {
            overflow: OverflowBuffer::new(buffer_manager.clone()),
        },
        PhysicalType::VarList => {
            let child_type = match &data_type {
                LogicalType::VarList { child } => (**child).clone(),
                _ => unreachable!(),
            };
            ChunkVariant::VarList {
                child: Box::new(create_column_chunk(
                    child_type,
                    capacity,
                    buffer_manager,
                    list_format,
                )),
                num_elements: 0,
            }
        }
        PhysicalType::Struct => {
            let fields = match &data_type {
                LogicalType::Struct { fields } => fields.clone(),
                _ => unreachable!(),
            };
            ChunkVariant::Struct {
                children: fields
                    .into_iter()
                    .map(|field| {
                        create_column_chunk(field.data_type, capacity, buffer_manager, list_format)
                    })
                    .collect(),
            }
        }
        PhysicalType::FixedList => ChunkVariant::FixedList,
        _ => ChunkVariant::Plain,
    };
    let num_bytes_per_value = data_type.size_in_chunk();
    ColumnChunk {
        num_bytes_per_value,
        buffer: vec![0u8; num_bytes_per_value * capacity as usize],
        capacity,
        null: Some(NullColumnChunk::new(capacity)),
        list_format,
        data_type,
        variant,
    }
}

impl ColumnChunk {
    pub fn data_type(&self) -> &LogicalType {
        &self.data_type
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn num_bytes_per_value(&self) -> usize {
        self.num_bytes_per_value
    }

    pub fn children(&self) -> Vec<&ColumnChunk> {
        match &self.variant {
            ChunkVariant::VarList { child, .. } => vec![child.as_ref()],
            ChunkVariant::Struct { children } => children.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Clears null state and variable-width bookkeeping so the chunk can be
    /// refilled. The primary buffer is not shrunk.
    pub fn reset_to_empty(&mut self) {
        if let Some(null) = &mut self.null {
            null.reset();
        }
        match &mut self.variant {
            ChunkVariant::String { overflow } => overflow.reset(),
            ChunkVariant::VarList {
                child,
                num_elements,
            } => {
                *num_elements = 0;
                child.reset_to_empty();
            }
            ChunkVariant::Struct { children } => {
                for child in children {
                    child.reset_to_empty();
                }
            }
            _ => {}
        }
    }

    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        if let Some(null) = &mut self.null {
            null.set_null(pos, is_null);
        }
        // A null struct nulls every field; a non-null struct says nothing
        // about its fields.
        if is_null {
            if let ChunkVariant::Struct { children } = &mut self.variant {
                for child in children {
                    child.set_null(pos, true);
                }
            }
        }
    }

    pub fn is_null(&self, pos: u64) -> bool {
        self.null.as_ref().map_or(false, |null| null.is_null(pos))
    }

    /// Records a null at `pos`, maintaining per-variant bookkeeping: a null
    /// var-list value still needs its end offset so later values keep valid
    /// bounds.
    pub fn write_null(&mut self, pos: u64) {
        self.set_null(pos, true);
        if matches!(self.variant, ChunkVariant::VarList { .. }) {
            let previous_end = if pos > 0 { self.get_value::<u64>(pos - 1) } else { 0 };
            self.set_value(previous_end, pos);
        }
    }

    pub(crate) fn set_value<T: Copy>(&mut self, value: T, pos: u64) {
        debug_assert_eq!(size_of::<T>(), self.num_bytes_per_value);
        debug_assert!(pos < self.capacity);
        let offset = pos as usize * self.num_bytes_per_value;
        unsafe {
            ptr::copy_nonoverlapping(
                &value as *const T as *const u8,
                self.buffer.as_mut_ptr().add(offset),
                size_of::<T>(),
            );
        }
    }

    pub(crate) fn get_value<T: Copy>(&self, pos: u64) -> T {
        debug_assert_eq!(size_of::<T>(), self.num_bytes_per_value);
        debug_assert!(pos < self.capacity);
        let offset = pos as usize * self.num_bytes_per_value;
        unsafe { ptr::read_unaligned(self.buffer.as_ptr().add(offset) as *const T) }
    }

    /// Grows the chunk to hold `new_capacity` values, preserving contents.
    /// Struct children grow with their parent; a var-list child instead grows
    /// on demand as elements arrive.
    pub fn resize(&mut self, new_capacity: u64) {
        debug_assert!(new_capacity >= self.capacity);
        self.buffer
            .resize(self.num_bytes_per_value * new_capacity as usize, 0);
        self.capacity = new_capacity;
        if let Some(null) = &mut self.null {
            null.resize(new_capacity);
        }
        if let ChunkVariant::Struct { children } = &mut self.variant {
            for child in children {
                child.resize(new_capacity);
            }
        }
    }

    /// Parses cell text into a value of this chunk's type at `pos`. The null
    /// bit is not touched; callers decide null-on-empty policy first.
    pub fn set_value_from_string(&mut self, value: &[u8], pos: u64) -> Result<()> {
        match self.data_type.physical_type() {
            PhysicalType::Bool => {
                let parsed = if value.eq_ignore_ascii_case(b"true") {
                    1u8
                } else if value.eq_ignore_ascii_case(b"false") {
                    0u8
                } else {
                    return Err(malformed(value, &self.data_type));
                };
                self.set_value(parsed, pos);
            }
            PhysicalType::Int16 => {
                let parsed: i16 = parse_utf8(value, &self.data_type)?;
                self.set_value(parsed, pos);
            }
            PhysicalType::Int32 => {
                if self.data_type == LogicalType::Date {
                    self.set_value(datetime::parse_date(value)?, pos);
                } else {
                    let parsed: i32 = parse_utf8(value, &self.data_type)?;
                    self.set_value(parsed, pos);
                }
            }
            PhysicalType::Int64 => {
                if self.data_type == LogicalType::Timestamp {
                    self.set_value(datetime::parse_timestamp(value)?, pos);
                } else {
                    let parsed: i64 = parse_utf8(value, &self.data_type)?;
                    self.set_value(parsed, pos);
                }
            }
            PhysicalType::Float => {
                let parsed: f32 = parse_utf8(value, &self.data_type)?;
                self.set_value(parsed, pos);
            }
            PhysicalType::Double => {
                let parsed: f64 = parse_utf8(value, &self.data_type)?;
                self.set_value(parsed, pos);
            }
            PhysicalType::Interval => {
                self.set_value(datetime::parse_interval(value)?, pos);
            }
            PhysicalType::InternalId => {
                let parsed: u64 = parse_utf8(value, &self.data_type)?;
                self.set_value(parsed, pos);
            }
            PhysicalType::String => self.write_string(value, pos)?,
            PhysicalType::FixedList => self.set_fixed_list_from_string(value, pos)?,
            PhysicalType::VarList => self.set_var_list_from_string(value, pos)?,
            PhysicalType::Struct => self.set_struct_from_string(value, pos)?,
        }
        Ok(())
    }

    /// Writes one [`Value`] at `pos`, setting the null bit from the value.
    pub fn write_value(&mut self, value: &Value, pos: u64) -> Result<()> {
        self.set_null(pos, value.is_null());
        match (value, self.data_type.physical_type()) {
            (Value::Null, _) => {}
            (Value::Bool(v), PhysicalType::Bool) => self.set_value(*v as u8, pos),
            (Value::Int16(v), PhysicalType::Int16) => self.set_value(*v, pos),
            (Value::Int32(v), PhysicalType::Int32) => self.set_value(*v, pos),
            (Value::Date(v), PhysicalType::Int32) => self.set_value(*v, pos),
            (Value::Int64(v), PhysicalType::Int64) => self.set_value(*v, pos),
            (Value::Timestamp(v), PhysicalType::Int64) => self.set_value(*v, pos),
            (Value::Float(v), PhysicalType::Float) => self.set_value(*v, pos),
            (Value::Double(v), PhysicalType::Double) => self.set_value(*v, pos),
            (Value::Interval(v), PhysicalType::Interval) => self.set_value(*v, pos),
            (Value::InternalId(v), PhysicalType::InternalId) => self.set_value(v.offset, pos),
            (Value::String(v), PhysicalType::String) => self.write_string(v.as_bytes(), pos)?,
            (Value::List(elements), PhysicalType::FixedList) => {
                self.write_fixed_list_value(elements, pos)?
            }
            (Value::List(elements), PhysicalType::VarList) => {
                self.write_var_list_value(elements, pos)?
            }
            (Value::Struct(fields), PhysicalType::Struct) => {
                self.write_struct_value(fields, pos)?
            }
            (value, _) => {
                return Err(Error::MalformedValue {
                    value: format!("{value:?}"),
                    data_type: self.data_type.to_string(),
                })
            }
        }
        Ok(())
    }

    /// Copies `num_values` entries from a source array starting at chunk
    /// position `start_pos`. Dispatches once on the array's type; a string
    /// array feeding a typed chunk runs the per-type value parser.
    pub fn append_array(
        &mut self,
        array: &ColumnArray,
        start_pos: u64,
        num_values: u64,
    ) -> Result<()> {
        debug_assert!(start_pos + num_values <= self.capacity);
        match array {
            ColumnArray::Bool { values, validity } => {
                for i in 0..num_values as usize {
                    let pos = start_pos + i as u64;
                    if array::entry_is_null(validity, i) {
                        self.write_null(pos);
                        continue;
                    }
                    self.set_value(values[i] as u8, pos);
                }
            }
            ColumnArray::Int16 { values, validity } => {
                self.copy_typed_values(values, validity, start_pos, num_values)
            }
            ColumnArray::Int32 { values, validity }
            | ColumnArray::Date { values, validity } => {
                self.copy_typed_values(values, validity, start_pos, num_values)
            }
            ColumnArray::Int64 { values, validity }
            | ColumnArray::Timestamp { values, validity } => {
                self.copy_typed_values(values, validity, start_pos, num_values)
            }
            ColumnArray::Float { values, validity } => {
                self.copy_typed_values(values, validity, start_pos, num_values)
            }
            ColumnArray::Double { values, validity } => {
                self.copy_typed_values(values, validity, start_pos, num_values)
            }
            ColumnArray::FixedList {
                values,
                element_size,
                validity,
            } => {
                let width = self.num_bytes_per_value;
                debug_assert_eq!(*element_size, width);
                for i in 0..num_values as usize {
                    let pos = start_pos + i as u64;
                    if array::entry_is_null(validity, i) {
                        self.write_null(pos);
                        continue;
                    }
                    let src = &values[i * width..(i + 1) * width];
                    let dst = pos as usize * width;
                    self.buffer[dst..dst + width].copy_from_slice(src);
                }
            }
            ColumnArray::String { values, validity } => {
                for i in 0..num_values as usize {
                    let pos = start_pos + i as u64;
                    if array::entry_is_null(validity, i) {
                        self.write_null(pos);
                        continue;
                    }
                    self.set_value_from_string(values[i].as_bytes(), pos)?;
                }
            }
        }
        Ok(())
    }

    fn copy_typed_values<T: Copy>(
        &mut self,
        values: &[T],
        validity: &Option<crate::null_mask::NullMask>,
        start_pos: u64,
        num_values: u64,
    ) {
        debug_assert_eq!(size_of::<T>(), self.num_bytes_per_value);
        match validity {
            Some(validity) => {
                for i in 0..num_values as usize {
                    let pos = start_pos + i as u64;
                    if validity.is_set(i as u64) {
                        self.write_null(pos);
                        continue;
                    }
                    self.set_value(values[i], pos);
                }
            }
            None => {
                for i in 0..num_values as usize {
                    self.set_value(values[i], start_pos + i as u64);
                }
            }
        }
    }

    /// Copies `num_values` entries from another chunk of the same type.
    pub fn append_chunk(
        &mut self,
        other: &ColumnChunk,
        src_start: u64,
        dst_start: u64,
        num_values: u64,
    ) -> Result<()> {
        debug_assert_eq!(self.data_type, other.data_type);
        debug_assert!(dst_start + num_values <= self.capacity);
        if let (Some(dst_null), Some(src_null)) = (&mut self.null, &other.null) {
            dst_null.append(src_null, src_start, dst_start, num_values);
        }
        match self.data_type.physical_type() {
            PhysicalType::String => {
                self.append_string_chunk(other, src_start, dst_start, num_values)?
            }
            PhysicalType::VarList => {
                self.append_var_list_chunk(other, src_start, dst_start, num_values)?
            }
            PhysicalType::Struct => {
                self.append_struct_chunk(other, src_start, dst_start, num_values)?
            }
            _ => {
                let width = self.num_bytes_per_value;
                let src = src_start as usize * width;
                let dst = dst_start as usize * width;
                let len = num_values as usize * width;
                self.buffer[dst..dst + len].copy_from_slice(&other.buffer[src..src + len]);
            }
        }
        Ok(())
    }

    /// Reads the value at `pos` back out, reconstructing variable-width and
    /// nested payloads.
    pub fn value_at(&self, pos: u64) -> Value {
        if self.is_null(pos) {
            return Value::Null;
        }
        match self.data_type.physical_type() {
            PhysicalType::Bool => Value::Bool(self.get_value::<u8>(pos) != 0),
            PhysicalType::Int16 => Value::Int16(self.get_value(pos)),
            PhysicalType::Int32 => {
                if self.data_type == LogicalType::Date {
                    Value::Date(self.get_value(pos))
                } else {
                    Value::Int32(self.get_value(pos))
                }
            }
            PhysicalType::Int64 => {
                if self.data_type == LogicalType::Timestamp {
                    Value::Timestamp(self.get_value(pos))
                } else {
                    Value::Int64(self.get_value(pos))
                }
            }
            PhysicalType::Float => Value::Float(self.get_value(pos)),
            PhysicalType::Double => Value::Double(self.get_value(pos)),
            PhysicalType::Interval => Value::Interval(self.get_value(pos)),
            PhysicalType::InternalId => Value::InternalId(crate::types::InternalId {
                table_id: 0,
                offset: self.get_value(pos),
            }),
            PhysicalType::String => Value::String(self.string_at(pos)),
            PhysicalType::FixedList => Value::List(self.fixed_list_at(pos)),
            PhysicalType::VarList => Value::List(self.var_list_at(pos)),
            PhysicalType::Struct => Value::Struct(self.struct_at(pos)),
        }
    }

    fn num_value_pages(&self) -> u64 {
        num_pages_for_bytes(self.buffer.len() as u64)
    }

    fn num_overflow_pages(&self) -> u64 {
        match &self.variant {
            ChunkVariant::String { overflow } => num_pages_for_bytes(overflow.flushed_size()),
            _ => 0,
        }
    }

    /// Total pages a flush will write: own value pages, then null pages, then
    /// overflow pages, then children depth-first in declaration order.
    pub fn num_pages(&self) -> u64 {
        let mut pages = self.num_value_pages();
        if let Some(null) = &self.null {
            pages += null.num_pages();
        }
        pages += self.num_overflow_pages();
        for child in self.children() {
            pages += child.num_pages();
        }
        pages
    }

    /// Writes the chunk at `start_page_idx` and returns where everything
    /// landed. The caller allocates the page run via
    /// [`PageStore::allocate_pages`] sized by [`ColumnChunk::num_pages`].
    pub fn flush(&self, store: &PageStore, start_page_idx: u64) -> Result<ColumnChunkMetadata> {
        let page_size = store.page_size();
        let num_value_pages = self.num_value_pages();
        store.write(&self.buffer, start_page_idx * page_size)?;
        let mut cursor = start_page_idx + num_value_pages;

        let mut num_null_pages = 0;
        if let Some(null) = &self.null {
            num_null_pages = null.flush(store, cursor)?;
            cursor += num_null_pages;
        }

        let mut num_overflow_pages = 0;
        if let ChunkVariant::String { overflow } = &self.variant {
            for ordinal in 0..overflow.num_blocks() {
                store.write(overflow.block_bytes(ordinal), cursor * page_size)?;
                cursor += num_pages_for_bytes(overflow.block_bytes(ordinal).len() as u64);
            }
            num_overflow_pages = self.num_overflow_pages();
        }

        let mut children = Vec::new();
        for child in self.children() {
            let child_metadata = child.flush(store, cursor)?;
            cursor += child_metadata.num_pages;
            children.push(child_metadata);
        }

        Ok(ColumnChunkMetadata {
            start_page_idx,
            num_pages: cursor - start_page_idx,
            num_values: self.capacity,
            num_value_pages,
            num_null_pages,
            num_overflow_pages,
            children,
        })
    }

    /// Rebuilds a chunk from a flushed page run.
    pub fn read(
        store: &PageStore,
        metadata: &ColumnChunkMetadata,
        data_type: LogicalType,
        buffer_manager: &Arc<BufferManager>,
    ) -> Result<ColumnChunk> {
        let capacity = metadata.num_values;
        let num_bytes_per_value = data_type.size_in_chunk();

        let mut buffer = store.read_pages(metadata.start_page_idx, metadata.num_value_pages)?;
        buffer.truncate(num_bytes_per_value * capacity as usize);
        let after_values = metadata.start_page_idx + metadata.num_value_pages;
        let after_nulls = after_values + metadata.num_null_pages;

        let null = if metadata.num_null_pages > 0 {
            Some(NullColumnChunk::read(store, after_values, capacity)?)
        } else {
            None
        };

        let variant = match data_type.physical_type() {
            PhysicalType::String => {
                // Overflow blocks are written whole, so the page run is an
                // exact sequence of block images.
                let images = store.read_pages(after_nulls, metadata.num_overflow_pages)?;
                ChunkVariant::String {
                    overflow: OverflowBuffer::from_block_images(buffer_manager.clone(), &images),
                }
            }
            PhysicalType::VarList => {
                let child_type = match &data_type {
                    LogicalType::VarList { child } => (**child).clone(),
                    _ => unreachable!(),
                };
                let child_metadata = &metadata.children[0];
                let child =
                    ColumnChunk::read(store, child_metadata, child_type, buffer_manager)?;
                // The primary buffer holds end offsets; the last one in use is
                // recovered lazily by readers, so track the child's capacity.
                ChunkVariant::VarList {
                    num_elements: child.capacity,
                    child: Box::new(child),
                }
            }
            PhysicalType::Struct => {
                let fields = match &data_type {
                    LogicalType::Struct { fields } => fields.clone(),
                    _ => unreachable!(),
                };
                let children = fields
                    .into_iter()
                    .zip(metadata.children.iter())
                    .map(|(field, child_metadata)| {
                        ColumnChunk::read(store, child_metadata, field.data_type, buffer_manager)
                    })
                    .collect::<Result<Vec<_>>>()?;
                ChunkVariant::Struct { children }
            }
            PhysicalType::FixedList => ChunkVariant::FixedList,
            _ => ChunkVariant::Plain,
        };

        Ok(ColumnChunk {
            num_bytes_per_value,
            buffer,
            capacity,
            null,
            list_format: ListFormat::default(),
            data_type,
            variant,
        })
    }
}

pub(crate) fn malformed(value: &[u8], data_type: &LogicalType) -> Error {
    Error::MalformedValue {
        value: String::from_utf8_lossy(value).into_owned(),
        data_type: data_type.to_string(),
    }
}

fn parse_utf8<T: std::str::FromStr>(value: &[u8], data_type: &LogicalType) -> Result<T> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| malformed(value, data_type))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::StructField;
    use constants::storage::PAGE_SIZE;

    fn plain_chunk(data_type: LogicalType, capacity: u64) -> ColumnChunk {
        create_column_chunk(
            data_type,
            capacity,
            &BufferManager::new(),
            ListFormat::default(),
        )
    }

    #[test]
    fn int64_write_and_read_back() {
        let mut chunk = plain_chunk(LogicalType::Int64, 16);
        chunk.set_value_from_string(b"42", 0).unwrap();
        chunk.set_value_from_string(b"-7", 1).unwrap();
        assert_eq!(chunk.value_at(0), Value::Int64(42));
        assert_eq!(chunk.value_at(1), Value::Int64(-7));
        assert!(chunk.set_value_from_string(b"4.5", 2).is_err());
    }

    #[test]
    fn bool_parse_is_case_insensitive() {
        let mut chunk = plain_chunk(LogicalType::Bool, 4);
        chunk.set_value_from_string(b"TRUE", 0).unwrap();
        chunk.set_value_from_string(b"false", 1).unwrap();
        assert_eq!(chunk.value_at(0), Value::Bool(true));
        assert_eq!(chunk.value_at(1), Value::Bool(false));
        assert!(chunk.set_value_from_string(b"yes", 2).is_err());
    }

    #[test]
    fn nulls_survive_append_chunk() {
        let mut src = plain_chunk(LogicalType::Int32, 8);
        for i in 0..8 {
            src.write_value(&Value::Int32(i as i32), i).unwrap();
        }
        src.set_null(3, true);
        let mut dst = plain_chunk(LogicalType::Int32, 8);
        dst.append_chunk(&src, 2, 0, 4).unwrap();
        assert_eq!(dst.value_at(0), Value::Int32(2));
        assert_eq!(dst.value_at(1), Value::Null);
        assert_eq!(dst.value_at(2), Value::Int32(4));
    }

    #[test]
    fn resize_preserves_values() {
        let mut chunk = plain_chunk(LogicalType::Int16, 4);
        chunk.write_value(&Value::Int16(123), 3).unwrap();
        chunk.set_null(1, true);
        chunk.resize(64);
        assert_eq!(chunk.capacity(), 64);
        assert_eq!(chunk.value_at(3), Value::Int16(123));
        assert_eq!(chunk.value_at(1), Value::Null);
    }

    #[test]
    fn append_array_from_strings_parses_dates() {
        let array = ColumnArray::String {
            values: vec!["2000-01-01".into(), "2000-01-02".into()],
            validity: None,
        };
        let mut chunk = plain_chunk(LogicalType::Date, 4);
        chunk.append_array(&array, 0, 2).unwrap();
        assert_eq!(chunk.value_at(0), Value::Date(10957));
        assert_eq!(chunk.value_at(1), Value::Date(10958));
    }

    #[test]
    fn flush_layout_is_page_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::open(&dir.path().join("data.qv")).unwrap();
        let mut chunk = plain_chunk(LogicalType::Int64, 1000);
        for i in 0..1000u64 {
            chunk.write_value(&Value::Int64(i as i64), i).unwrap();
        }
        let start = store.allocate_pages(chunk.num_pages());
        let metadata = chunk.flush(&store, start).unwrap();
        // 8000 value bytes and 125 null bytes each round up to whole pages.
        assert_eq!(metadata.num_value_pages, 2);
        assert_eq!(metadata.num_null_pages, 1);
        assert_eq!(metadata.num_pages, 3);
        assert_eq!(metadata.num_values, 1000);

        let reloaded =
            ColumnChunk::read(&store, &metadata, LogicalType::Int64, &BufferManager::new())
                .unwrap();
        assert_eq!(reloaded.value_at(999), Value::Int64(999));
    }

    #[test]
    fn flush_reload_flush_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::open(&dir.path().join("data.qv")).unwrap();
        let manager = BufferManager::new();
        let mut chunk = create_column_chunk(
            LogicalType::String,
            64,
            &manager,
            ListFormat::default(),
        );
        for (i, word) in ["page", "aligned", "flush"].iter().enumerate() {
            chunk
                .set_value_from_string(word.as_bytes(), i as u64)
                .unwrap();
        }
        chunk.set_null(3, true);

        let start = store.allocate_pages(chunk.num_pages());
        let first = chunk.flush(&store, start).unwrap();
        let first_bytes = store.read_pages(first.start_page_idx, first.num_pages).unwrap();

        let reloaded =
            ColumnChunk::read(&store, &first, LogicalType::String, &manager).unwrap();
        let again = store.allocate_pages(reloaded.num_pages());
        let second = reloaded.flush(&store, again).unwrap();
        let second_bytes = store.read_pages(second.start_page_idx, second.num_pages).unwrap();

        assert_eq!(second.num_pages, first.num_pages);
        assert_eq!(first_bytes, second_bytes);
    }

    #[test]
    fn sparse_nulls_survive_flush_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = PageStore::open(&dir.path().join("data.qv")).unwrap();
        let num_rows = 100_000u64;
        let null_positions = [37u64, 500, 99_999];
        let mut chunk = plain_chunk(LogicalType::Int64, num_rows);
        for i in 0..num_rows {
            chunk.write_value(&Value::Int64(i as i64), i).unwrap();
        }
        for &pos in &null_positions {
            chunk.set_null(pos, true);
        }
        let start = store.allocate_pages(chunk.num_pages());
        let metadata = chunk.flush(&store, start).unwrap();
        let reloaded =
            ColumnChunk::read(&store, &metadata, LogicalType::Int64, &BufferManager::new())
                .unwrap();
        for i in 0..num_rows {
            assert_eq!(reloaded.is_null(i), null_positions.contains(&i), "row {i}");
        }
        assert_eq!(reloaded.value_at(99_998), Value::Int64(99_998));
    }

    #[test]
    fn struct_routes_to_children() {
        let data_type = LogicalType::Struct {
            fields: vec![
                StructField {
                    name: "x".into(),
                    data_type: LogicalType::Int64,
                },
                StructField {
                    name: "label".into(),
                    data_type: LogicalType::String,
                },
            ],
        };
        let mut chunk = create_column_chunk(
            data_type,
            8,
            &BufferManager::new(),
            ListFormat::default(),
        );
        assert_eq!(chunk.num_bytes_per_value(), 0);
        chunk
            .set_value_from_string(b"{x: 7, label: seven}", 0)
            .unwrap();
        assert_eq!(
            chunk.value_at(0),
            Value::Struct(vec![
                ("x".into(), Value::Int64(7)),
                ("label".into(), Value::String("seven".into())),
            ])
        );
    }

    #[test]
    fn page_size_is_4096() {
        assert_eq!(PAGE_SIZE, 4096);
    }
}
