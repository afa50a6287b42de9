//! String chunk storage: a fixed-width descriptor per value in the primary
//! buffer, payload bytes in the overflow area.

use super::{ChunkVariant, ColumnChunk};
use crate::err::Result;
use crate::types::StringDescriptor;

impl ColumnChunk {
    pub(crate) fn write_string(&mut self, payload: &[u8], pos: u64) -> Result<()> {
        let offset = match &mut self.variant {
            ChunkVariant::String { overflow } => overflow.append(payload)?,
            _ => unreachable!("write_string on non-string chunk"),
        };
        self.set_value(StringDescriptor::new(payload, offset), pos);
        Ok(())
    }

    pub(crate) fn string_bytes_at(&self, pos: u64) -> &[u8] {
        let descriptor: StringDescriptor = self.get_value(pos);
        match &self.variant {
            ChunkVariant::String { overflow } => {
                overflow.read(descriptor.offset, descriptor.len as u64)
            }
            _ => unreachable!("string_bytes_at on non-string chunk"),
        }
    }

    pub(crate) fn string_at(&self, pos: u64) -> String {
        String::from_utf8_lossy(self.string_bytes_at(pos)).into_owned()
    }

    /// Values are re-added one by one so the payload lands in this chunk's
    /// own overflow area and descriptors stay self-contained.
    pub(crate) fn append_string_chunk(
        &mut self,
        other: &ColumnChunk,
        src_start: u64,
        dst_start: u64,
        num_values: u64,
    ) -> Result<()> {
        for i in 0..num_values {
            let src_pos = src_start + i;
            if other.is_null(src_pos) {
                continue;
            }
            self.write_string(other.string_bytes_at(src_pos), dst_start + i)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use crate::buffer_manager::BufferManager;
    use crate::chunk::{create_column_chunk, ListFormat};
    use crate::types::{LogicalType, Value};

    #[test]
    fn descriptors_point_into_overflow() {
        let mut chunk = create_column_chunk(
            LogicalType::String,
            8,
            &BufferManager::new(),
            ListFormat::default(),
        );
        chunk.set_value_from_string(b"alice", 0).unwrap();
        chunk.set_value_from_string(b"", 1).unwrap();
        chunk
            .set_value_from_string("privet, mir".as_bytes(), 2)
            .unwrap();
        assert_eq!(chunk.value_at(0), Value::String("alice".into()));
        assert_eq!(chunk.value_at(1), Value::String(String::new()));
        assert_eq!(chunk.value_at(2), Value::String("privet, mir".into()));
    }

    #[test]
    fn append_rewrites_descriptors_into_own_overflow() {
        let manager = BufferManager::new();
        let mut src =
            create_column_chunk(LogicalType::String, 8, &manager, ListFormat::default());
        src.set_value_from_string(b"carried", 0).unwrap();
        src.set_null(1, true);
        src.set_value_from_string(b"over", 2).unwrap();

        let mut dst =
            create_column_chunk(LogicalType::String, 8, &manager, ListFormat::default());
        dst.append_chunk(&src, 0, 0, 3).unwrap();
        drop(src);
        assert_eq!(dst.value_at(0), Value::String("carried".into()));
        assert_eq!(dst.value_at(1), Value::Null);
        assert_eq!(dst.value_at(2), Value::String("over".into()));
    }
}
