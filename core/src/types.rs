//! Logical and physical types of column values, and the fixed per-value byte
//! widths they occupy inside a column chunk.

use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::err::{Error, Result};

/// A logical column type as declared in a table schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Date,
    Timestamp,
    Interval,
    InternalId,
    String,
    FixedList {
        child: Box<LogicalType>,
        num_elements: u32,
    },
    VarList {
        child: Box<LogicalType>,
    },
    Struct {
        fields: Vec<StructField>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructField {
    pub name: String,
    pub data_type: LogicalType,
}

/// The storage representation backing a logical type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalType {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Interval,
    InternalId,
    String,
    FixedList,
    VarList,
    Struct,
}

impl LogicalType {
    pub fn physical_type(&self) -> PhysicalType {
        match self {
            LogicalType::Bool => PhysicalType::Bool,
            LogicalType::Int16 => PhysicalType::Int16,
            LogicalType::Int32 | LogicalType::Date => PhysicalType::Int32,
            LogicalType::Int64 | LogicalType::Timestamp => PhysicalType::Int64,
            LogicalType::Float => PhysicalType::Float,
            LogicalType::Double => PhysicalType::Double,
            LogicalType::Interval => PhysicalType::Interval,
            LogicalType::InternalId => PhysicalType::InternalId,
            LogicalType::String => PhysicalType::String,
            LogicalType::FixedList { .. } => PhysicalType::FixedList,
            LogicalType::VarList { .. } => PhysicalType::VarList,
            LogicalType::Struct { .. } => PhysicalType::Struct,
        }
    }

    /// Bytes one value of this type occupies in the primary chunk buffer.
    ///
    /// STRUCT values live entirely in child chunks, STRING values are a
    /// fixed-width descriptor pointing into the overflow area, and VAR_LIST
    /// values are a single end offset into the child chunk.
    pub fn size_in_chunk(&self) -> usize {
        match self {
            LogicalType::Struct { .. } => 0,
            LogicalType::String => size_of::<StringDescriptor>(),
            LogicalType::VarList { .. } => size_of::<u64>(),
            LogicalType::InternalId => size_of::<u64>(),
            LogicalType::FixedList {
                child,
                num_elements,
            } => child.size_in_chunk() * *num_elements as usize,
            LogicalType::Bool => 1,
            LogicalType::Int16 => 2,
            LogicalType::Int32 | LogicalType::Date | LogicalType::Float => 4,
            LogicalType::Int64 | LogicalType::Timestamp | LogicalType::Double => 8,
            LogicalType::Interval => size_of::<Interval>(),
        }
    }

    /// Parses a type name as written in DDL, e.g. `INT64` or `STRING`.
    pub fn parse(name: &str) -> Result<LogicalType> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(LogicalType::Bool),
            "INT16" => Ok(LogicalType::Int16),
            "INT32" => Ok(LogicalType::Int32),
            "INT64" => Ok(LogicalType::Int64),
            "FLOAT" => Ok(LogicalType::Float),
            "DOUBLE" => Ok(LogicalType::Double),
            "DATE" => Ok(LogicalType::Date),
            "TIMESTAMP" => Ok(LogicalType::Timestamp),
            "INTERVAL" => Ok(LogicalType::Interval),
            "STRING" => Ok(LogicalType::String),
            other => Err(Error::Catalog(format!("cannot parse data type {other}"))),
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Bool => write!(f, "BOOL"),
            LogicalType::Int16 => write!(f, "INT16"),
            LogicalType::Int32 => write!(f, "INT32"),
            LogicalType::Int64 => write!(f, "INT64"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::Interval => write!(f, "INTERVAL"),
            LogicalType::InternalId => write!(f, "INTERNAL_ID"),
            LogicalType::String => write!(f, "STRING"),
            LogicalType::FixedList {
                child,
                num_elements,
            } => write!(f, "{child}[{num_elements}]"),
            LogicalType::VarList { child } => write!(f, "{child}[]"),
            LogicalType::Struct { fields } => {
                write!(f, "STRUCT(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", field.name, field.data_type)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Fixed-width descriptor stored in a string chunk's primary buffer. The
/// payload bytes live in the chunk's overflow area at `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(C)]
pub struct StringDescriptor {
    pub len: u32,
    pub prefix: [u8; 4],
    pub offset: u64,
}

impl StringDescriptor {
    pub fn new(payload: &[u8], offset: u64) -> StringDescriptor {
        let mut prefix = [0u8; 4];
        let n = payload.len().min(4);
        prefix[..n].copy_from_slice(&payload[..n]);
        StringDescriptor {
            len: payload.len() as u32,
            prefix,
            offset,
        }
    }
}

/// A SQL interval, kept as separate month/day/microsecond components so that
/// calendar-dependent parts never collapse into a fixed number of seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} months {} days {} us",
            self.months, self.days, self.micros
        )
    }
}

/// Identity of a node: the owning table plus the node's offset within it.
/// Only the offset is materialized in a column chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InternalId {
    pub table_id: u64,
    pub offset: u64,
}

/// A single column value, used for point writes into a chunk.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    /// Days since 1970-01-01.
    Date(i32),
    /// Microseconds since 1970-01-01 00:00:00.
    Timestamp(i64),
    Interval(Interval),
    InternalId(InternalId),
    String(String),
    List(Vec<Value>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_descriptor_is_sixteen_bytes() {
        assert_eq!(size_of::<StringDescriptor>(), 16);
    }

    #[test]
    fn chunk_widths() {
        assert_eq!(LogicalType::Bool.size_in_chunk(), 1);
        assert_eq!(LogicalType::Int64.size_in_chunk(), 8);
        assert_eq!(LogicalType::Date.size_in_chunk(), 4);
        assert_eq!(LogicalType::String.size_in_chunk(), 16);
        assert_eq!(LogicalType::InternalId.size_in_chunk(), 8);
        assert_eq!(LogicalType::Interval.size_in_chunk(), 16);
        assert_eq!(
            LogicalType::Struct { fields: vec![] }.size_in_chunk(),
            0
        );
        assert_eq!(
            LogicalType::FixedList {
                child: Box::new(LogicalType::Int32),
                num_elements: 3
            }
            .size_in_chunk(),
            12
        );
        assert_eq!(
            LogicalType::VarList {
                child: Box::new(LogicalType::Int64)
            }
            .size_in_chunk(),
            8
        );
    }

    #[test]
    fn parse_type_names() {
        assert_eq!(LogicalType::parse("int64").unwrap(), LogicalType::Int64);
        assert_eq!(LogicalType::parse(" BOOLEAN ").unwrap(), LogicalType::Bool);
        assert!(LogicalType::parse("BLOB").is_err());
    }
}
