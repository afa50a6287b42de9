//! Fixed-list and var-list chunk storage. A fixed list is an inline blob of
//! `element width * element count` bytes. A var list keeps one end offset per
//! value in the primary buffer; the flattened elements live in a child chunk.

use super::{malformed, ChunkVariant, ColumnChunk, ListFormat};
use crate::datetime;
use crate::err::Result;
use crate::types::{Interval, LogicalType, PhysicalType, Value};

/// Splits a list literal like `{1,2,3}` into element slices. Nested list
/// literals stay intact; element whitespace is trimmed.
pub(crate) fn split_list_text<'a>(
    value: &'a [u8],
    format: ListFormat,
    data_type: &LogicalType,
) -> Result<Vec<&'a [u8]>> {
    let trimmed = trim_ascii(value);
    if trimmed.len() < 2 || trimmed[0] != format.begin || trimmed[trimmed.len() - 1] != format.end
    {
        return Err(malformed(value, data_type));
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if trim_ascii(inner).is_empty() {
        return Ok(Vec::new());
    }
    let mut elements = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (i, &b) in inner.iter().enumerate() {
        if b == format.begin {
            depth += 1;
        } else if b == format.end {
            depth = depth.checked_sub(1).ok_or_else(|| malformed(value, data_type))?;
        } else if b == b',' && depth == 0 {
            elements.push(trim_ascii(&inner[start..i]));
            start = i + 1;
        }
    }
    if depth != 0 {
        return Err(malformed(value, data_type));
    }
    elements.push(trim_ascii(&inner[start..]));
    Ok(elements)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

/// Parses a scalar element into its chunk byte representation.
fn parse_scalar_bytes(data_type: &LogicalType, text: &[u8], out: &mut [u8]) -> Result<()> {
    match data_type.physical_type() {
        PhysicalType::Bool => {
            out[0] = if text.eq_ignore_ascii_case(b"true") {
                1
            } else if text.eq_ignore_ascii_case(b"false") {
                0
            } else {
                return Err(malformed(text, data_type));
            };
        }
        PhysicalType::Int16 => {
            let v: i16 = parse_element(text, data_type)?;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        PhysicalType::Int32 => {
            let v: i32 = if *data_type == LogicalType::Date {
                datetime::parse_date(text)?
            } else {
                parse_element(text, data_type)?
            };
            out.copy_from_slice(&v.to_ne_bytes());
        }
        PhysicalType::Int64 => {
            let v: i64 = if *data_type == LogicalType::Timestamp {
                datetime::parse_timestamp(text)?
            } else {
                parse_element(text, data_type)?
            };
            out.copy_from_slice(&v.to_ne_bytes());
        }
        PhysicalType::Float => {
            let v: f32 = parse_element(text, data_type)?;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        PhysicalType::Double => {
            let v: f64 = parse_element(text, data_type)?;
            out.copy_from_slice(&v.to_ne_bytes());
        }
        PhysicalType::Interval => {
            let v = datetime::parse_interval(text)?;
            out[0..4].copy_from_slice(&v.months.to_ne_bytes());
            out[4..8].copy_from_slice(&v.days.to_ne_bytes());
            out[8..16].copy_from_slice(&v.micros.to_ne_bytes());
        }
        _ => return Err(malformed(text, data_type)),
    }
    Ok(())
}

fn parse_element<T: std::str::FromStr>(text: &[u8], data_type: &LogicalType) -> Result<T> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| malformed(text, data_type))
}

fn scalar_value_from_bytes(data_type: &LogicalType, bytes: &[u8]) -> Value {
    match data_type.physical_type() {
        PhysicalType::Bool => Value::Bool(bytes[0] != 0),
        PhysicalType::Int16 => Value::Int16(i16::from_ne_bytes(bytes.try_into().unwrap())),
        PhysicalType::Int32 => {
            let v = i32::from_ne_bytes(bytes.try_into().unwrap());
            if *data_type == LogicalType::Date {
                Value::Date(v)
            } else {
                Value::Int32(v)
            }
        }
        PhysicalType::Int64 => {
            let v = i64::from_ne_bytes(bytes.try_into().unwrap());
            if *data_type == LogicalType::Timestamp {
                Value::Timestamp(v)
            } else {
                Value::Int64(v)
            }
        }
        PhysicalType::Float => Value::Float(f32::from_ne_bytes(bytes.try_into().unwrap())),
        PhysicalType::Double => Value::Double(f64::from_ne_bytes(bytes.try_into().unwrap())),
        PhysicalType::Interval => Value::Interval(Interval {
            months: i32::from_ne_bytes(bytes[0..4].try_into().unwrap()),
            days: i32::from_ne_bytes(bytes[4..8].try_into().unwrap()),
            micros: i64::from_ne_bytes(bytes[8..16].try_into().unwrap()),
        }),
        _ => Value::Null,
    }
}

fn scalar_bytes_from_value(
    data_type: &LogicalType,
    value: &Value,
    out: &mut [u8],
) -> Result<()> {
    match (value, data_type.physical_type()) {
        (Value::Bool(v), PhysicalType::Bool) => out[0] = *v as u8,
        (Value::Int16(v), PhysicalType::Int16) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Int32(v), PhysicalType::Int32) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Date(v), PhysicalType::Int32) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Int64(v), PhysicalType::Int64) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Timestamp(v), PhysicalType::Int64) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Float(v), PhysicalType::Float) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Double(v), PhysicalType::Double) => out.copy_from_slice(&v.to_ne_bytes()),
        (Value::Interval(v), PhysicalType::Interval) => {
            out[0..4].copy_from_slice(&v.months.to_ne_bytes());
            out[4..8].copy_from_slice(&v.days.to_ne_bytes());
            out[8..16].copy_from_slice(&v.micros.to_ne_bytes());
        }
        (value, _) => {
            return Err(crate::err::Error::MalformedValue {
                value: format!("{value:?}"),
                data_type: data_type.to_string(),
            })
        }
    }
    Ok(())
}

impl ColumnChunk {
    fn fixed_list_parts(&self) -> (LogicalType, usize) {
        match self.data_type() {
            LogicalType::FixedList {
                child,
                num_elements,
            } => ((**child).clone(), *num_elements as usize),
            _ => unreachable!("fixed_list_parts on non-fixed-list chunk"),
        }
    }

    pub(crate) fn set_fixed_list_from_string(&mut self, value: &[u8], pos: u64) -> Result<()> {
        let (child_type, num_elements) = self.fixed_list_parts();
        let elements = split_list_text(value, self.list_format, &self.data_type)?;
        if elements.len() != num_elements {
            return Err(malformed(value, &self.data_type));
        }
        let element_width = child_type.size_in_chunk();
        let base = pos as usize * self.num_bytes_per_value;
        for (i, element) in elements.iter().enumerate() {
            let start = base + i * element_width;
            parse_scalar_bytes(
                &child_type,
                element,
                &mut self.buffer[start..start + element_width],
            )?;
        }
        Ok(())
    }

    pub(crate) fn write_fixed_list_value(&mut self, elements: &[Value], pos: u64) -> Result<()> {
        let (child_type, num_elements) = self.fixed_list_parts();
        if elements.len() != num_elements {
            return Err(crate::err::Error::MalformedValue {
                value: format!("list of {} values", elements.len()),
                data_type: self.data_type.to_string(),
            });
        }
        let element_width = child_type.size_in_chunk();
        let base = pos as usize * self.num_bytes_per_value;
        for (i, element) in elements.iter().enumerate() {
            let start = base + i * element_width;
            scalar_bytes_from_value(
                &child_type,
                element,
                &mut self.buffer[start..start + element_width],
            )?;
        }
        Ok(())
    }

    pub(crate) fn fixed_list_at(&self, pos: u64) -> Vec<Value> {
        let (child_type, num_elements) = self.fixed_list_parts();
        let element_width = child_type.size_in_chunk();
        let base = pos as usize * self.num_bytes_per_value;
        (0..num_elements)
            .map(|i| {
                let start = base + i * element_width;
                scalar_value_from_bytes(&child_type, &self.buffer[start..start + element_width])
            })
            .collect()
    }

    /// Element range `[start, end)` in the child chunk for value `pos`.
    pub(crate) fn var_list_bounds(&self, pos: u64) -> (u64, u64) {
        let end: u64 = self.get_value(pos);
        let start = if pos > 0 { self.get_value(pos - 1) } else { 0 };
        (start, end)
    }

    pub(crate) fn set_var_list_from_string(&mut self, value: &[u8], pos: u64) -> Result<()> {
        let elements: Vec<Vec<u8>> =
            split_list_text(value, self.list_format, &self.data_type)?
                .into_iter()
                .map(|e| e.to_vec())
                .collect();
        // Rewriting a position rewinds the element cursor to the end of the
        // previous value, so a rejected row leaves no gap behind.
        let start = if pos > 0 { self.get_value::<u64>(pos - 1) } else { 0 };
        {
            let ChunkVariant::VarList {
                child,
                num_elements,
            } = &mut self.variant
            else {
                unreachable!("set_var_list_from_string on non-var-list chunk");
            };
            *num_elements = start;
            let needed = start + elements.len() as u64;
            if needed > child.capacity() {
                child.resize(needed.next_power_of_two());
            }
            for (i, element) in elements.iter().enumerate() {
                let element_pos = start + i as u64;
                if element.is_empty() {
                    child.set_null(element_pos, true);
                    continue;
                }
                child.set_value_from_string(element, element_pos)?;
                child.set_null(element_pos, false);
            }
            *num_elements = needed;
        }
        self.set_value(start + elements.len() as u64, pos);
        Ok(())
    }

    pub(crate) fn write_var_list_value(&mut self, elements: &[Value], pos: u64) -> Result<()> {
        let start = if pos > 0 { self.get_value::<u64>(pos - 1) } else { 0 };
        {
            let ChunkVariant::VarList {
                child,
                num_elements,
            } = &mut self.variant
            else {
                unreachable!("write_var_list_value on non-var-list chunk");
            };
            *num_elements = start;
            let needed = start + elements.len() as u64;
            if needed > child.capacity() {
                child.resize(needed.next_power_of_two());
            }
            for (i, element) in elements.iter().enumerate() {
                child.write_value(element, start + i as u64)?;
            }
            *num_elements = needed;
        }
        self.set_value(start + elements.len() as u64, pos);
        Ok(())
    }

    pub(crate) fn var_list_at(&self, pos: u64) -> Vec<Value> {
        let (start, end) = self.var_list_bounds(pos);
        let child = match &self.variant {
            ChunkVariant::VarList { child, .. } => child,
            _ => unreachable!("var_list_at on non-var-list chunk"),
        };
        (start..end).map(|i| child.value_at(i)).collect()
    }

    pub(crate) fn append_var_list_chunk(
        &mut self,
        other: &ColumnChunk,
        src_start: u64,
        dst_start: u64,
        num_values: u64,
    ) -> Result<()> {
        let other_child = match &other.variant {
            ChunkVariant::VarList { child, .. } => child.as_ref(),
            _ => unreachable!("append_var_list_chunk source is not a var list"),
        };
        let start = if dst_start > 0 {
            self.get_value::<u64>(dst_start - 1)
        } else {
            0
        };
        let mut ends = Vec::with_capacity(num_values as usize);
        {
            let ChunkVariant::VarList {
                child,
                num_elements,
            } = &mut self.variant
            else {
                unreachable!("append_var_list_chunk on non-var-list chunk");
            };
            *num_elements = start;
            for i in 0..num_values {
                let src_pos = src_start + i;
                if other.is_null(src_pos) {
                    ends.push(*num_elements);
                    continue;
                }
                let (element_start, element_end) = other.var_list_bounds(src_pos);
                let len = element_end - element_start;
                let needed = *num_elements + len;
                if needed > child.capacity() {
                    child.resize(needed.next_power_of_two());
                }
                child.append_chunk(other_child, element_start, *num_elements, len)?;
                *num_elements = needed;
                ends.push(*num_elements);
            }
        }
        for (i, end) in ends.into_iter().enumerate() {
            self.set_value(end, dst_start + i as u64);
        }
        Ok(())
    }
}
