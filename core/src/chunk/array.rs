//! Column-shaped source data handed to [`super::ColumnChunk::append_array`].
//! This is the in-memory form non-CSV readers and re-chunking produce: one
//! typed value vector plus an optional validity mask (bit set = null).

use crate::null_mask::NullMask;

pub enum ColumnArray {
    Bool {
        values: Vec<bool>,
        validity: Option<NullMask>,
    },
    Int16 {
        values: Vec<i16>,
        validity: Option<NullMask>,
    },
    Int32 {
        values: Vec<i32>,
        validity: Option<NullMask>,
    },
    Int64 {
        values: Vec<i64>,
        validity: Option<NullMask>,
    },
    Float {
        values: Vec<f32>,
        validity: Option<NullMask>,
    },
    Double {
        values: Vec<f64>,
        validity: Option<NullMask>,
    },
    /// Days since the epoch.
    Date {
        values: Vec<i32>,
        validity: Option<NullMask>,
    },
    /// Microseconds since the epoch.
    Timestamp {
        values: Vec<i64>,
        validity: Option<NullMask>,
    },
    /// Cell text that still needs the per-type value parser.
    String {
        values: Vec<String>,
        validity: Option<NullMask>,
    },
    /// Fixed-width blobs, `element_size` bytes per entry.
    FixedList {
        values: Vec<u8>,
        element_size: usize,
        validity: Option<NullMask>,
    },
}

impl ColumnArray {
    pub fn len(&self) -> usize {
        match self {
            ColumnArray::Bool { values, .. } => values.len(),
            ColumnArray::Int16 { values, .. } => values.len(),
            ColumnArray::Int32 { values, .. } => values.len(),
            ColumnArray::Int64 { values, .. } => values.len(),
            ColumnArray::Float { values, .. } => values.len(),
            ColumnArray::Double { values, .. } => values.len(),
            ColumnArray::Date { values, .. } => values.len(),
            ColumnArray::Timestamp { values, .. } => values.len(),
            ColumnArray::String { values, .. } => values.len(),
            ColumnArray::FixedList {
                values,
                element_size,
                ..
            } => values.len() / element_size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether entry `i` of an array with this validity mask is null.
pub(crate) fn entry_is_null(validity: &Option<NullMask>, i: usize) -> bool {
    validity.as_ref().map_or(false, |mask| mask.is_set(i as u64))
}
