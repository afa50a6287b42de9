//! Struct chunk storage. A struct chunk has no primary bytes of its own;
//! every field lives in a child chunk and the parent only fans writes out.

use super::{malformed, ChunkVariant, ColumnChunk};
use crate::err::Result;
use crate::types::{LogicalType, StructField, Value};

/// Splits `{name: value, ...}` into (name, value text) pairs. Nested braces
/// stay inside their value.
fn split_struct_text<'a>(
    value: &'a [u8],
    begin: u8,
    end: u8,
    data_type: &LogicalType,
) -> Result<Vec<(&'a [u8], &'a [u8])>> {
    let trimmed = trim(value);
    if trimmed.len() < 2 || trimmed[0] != begin || trimmed[trimmed.len() - 1] != end {
        return Err(malformed(value, data_type));
    }
    let inner = &trimmed[1..trimmed.len() - 1];
    if trim(inner).is_empty() {
        return Ok(Vec::new());
    }
    let mut pairs = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    let mut cuts = Vec::new();
    for (i, &b) in inner.iter().enumerate() {
        if b == begin {
            depth += 1;
        } else if b == end {
            depth = depth
                .checked_sub(1)
                .ok_or_else(|| malformed(value, data_type))?;
        } else if b == b',' && depth == 0 {
            cuts.push(&inner[start..i]);
            start = i + 1;
        }
    }
    if depth != 0 {
        return Err(malformed(value, data_type));
    }
    cuts.push(&inner[start..]);
    for cut in cuts {
        let colon = cut
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| malformed(value, data_type))?;
        pairs.push((trim(&cut[..colon]), trim(&cut[colon + 1..])));
    }
    Ok(pairs)
}

fn trim(bytes: &[u8]) -> &[u8] {
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

impl ColumnChunk {
    fn struct_fields(&self) -> Vec<StructField> {
        match self.data_type() {
            LogicalType::Struct { fields } => fields.clone(),
            _ => unreachable!("struct_fields on non-struct chunk"),
        }
    }

    pub(crate) fn set_struct_from_string(&mut self, value: &[u8], pos: u64) -> Result<()> {
        let fields = self.struct_fields();
        let pairs = split_struct_text(
            value,
            self.list_format.begin,
            self.list_format.end,
            &self.data_type,
        )?;
        let owned: Vec<(Vec<u8>, Vec<u8>)> = pairs
            .into_iter()
            .map(|(name, text)| (name.to_vec(), text.to_vec()))
            .collect();
        let ChunkVariant::Struct { children } = &mut self.variant else {
            unreachable!("set_struct_from_string on non-struct chunk");
        };
        for (i, field) in fields.iter().enumerate() {
            let matched = owned
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(field.name.as_bytes()));
            match matched {
                Some((_, text)) => {
                    children[i].set_value_from_string(text, pos)?;
                    children[i].set_null(pos, false);
                }
                None => children[i].write_null(pos),
            }
        }
        Ok(())
    }

    pub(crate) fn write_struct_value(
        &mut self,
        values: &[(String, Value)],
        pos: u64,
    ) -> Result<()> {
        let fields = self.struct_fields();
        let ChunkVariant::Struct { children } = &mut self.variant else {
            unreachable!("write_struct_value on non-struct chunk");
        };
        for (i, field) in fields.iter().enumerate() {
            let matched = values
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&field.name));
            match matched {
                Some((_, value)) => children[i].write_value(value, pos)?,
                None => children[i].write_null(pos),
            }
        }
        Ok(())
    }

    pub(crate) fn struct_at(&self, pos: u64) -> Vec<(String, Value)> {
        let fields = self.struct_fields();
        let ChunkVariant::Struct { children } = &self.variant else {
            unreachable!("struct_at on non-struct chunk");
        };
        fields
            .iter()
            .zip(children.iter())
            .map(|(field, child)| (field.name.clone(), child.value_at(pos)))
            .collect()
    }

    pub(crate) fn append_struct_chunk(
        &mut self,
        other: &ColumnChunk,
        src_start: u64,
        dst_start: u64,
        num_values: u64,
    ) -> Result<()> {
        let (ChunkVariant::Struct { children }, ChunkVariant::Struct { children: other_children }) =
            (&mut self.variant, &other.variant)
        else {
            unreachable!("append_struct_chunk variant mismatch");
        };
        for (child, other_child) in children.iter_mut().zip(other_children.iter()) {
            child.append_chunk(other_child, src_start, dst_start, num_values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::buffer_manager::BufferManager;
    use crate::chunk::{create_column_chunk, ListFormat};
    use crate::types::{LogicalType, StructField, Value};

    fn person_type() -> LogicalType {
        LogicalType::Struct {
            fields: vec![
                StructField {
                    name: "name".into(),
                    data_type: LogicalType::String,
                },
                StructField {
                    name: "age".into(),
                    data_type: LogicalType::Int64,
                },
            ],
        }
    }

    #[test]
    fn missing_fields_become_null() {
        let mut chunk = create_column_chunk(
            person_type(),
            4,
            &BufferManager::new(),
            ListFormat::default(),
        );
        chunk.set_value_from_string(b"{name: ada}", 0).unwrap();
        assert_eq!(
            chunk.value_at(0),
            Value::Struct(vec![
                ("name".into(), Value::String("ada".into())),
                ("age".into(), Value::Null),
            ])
        );
    }

    #[test]
    fn malformed_struct_is_rejected() {
        let mut chunk = create_column_chunk(
            person_type(),
            4,
            &BufferManager::new(),
            ListFormat::default(),
        );
        assert!(chunk.set_value_from_string(b"name: ada", 0).is_err());
        assert!(chunk.set_value_from_string(b"{name ada}", 0).is_err());
    }
}
