//! The companion chunk tracking nulls: a packed bitmap where
//! `num_bytes_for_values(n) = ceil(n / 8)`.

use crate::err::Result;
use crate::null_mask::{num_bytes_for_bits, NullMask};
use crate::page_store::{num_pages_for_bytes, PageStore};

pub struct NullColumnChunk {
    mask: NullMask,
}

impl NullColumnChunk {
    pub fn new(capacity: u64) -> NullColumnChunk {
        NullColumnChunk {
            mask: NullMask::new(capacity),
        }
    }

    pub fn set_null(&mut self, pos: u64, is_null: bool) {
        self.mask.set(pos, is_null);
    }

    pub fn is_null(&self, pos: u64) -> bool {
        self.mask.is_set(pos)
    }

    pub fn set_range_non_null(&mut self, start: u64, num_values: u64) {
        self.mask.set_range(start, num_values, false);
    }

    pub fn append(&mut self, other: &NullColumnChunk, src_start: u64, dst_start: u64, n: u64) {
        self.mask.copy_from(&other.mask, src_start, dst_start, n);
    }

    pub fn resize(&mut self, capacity: u64) {
        self.mask.resize(capacity);
    }

    pub fn reset(&mut self) {
        self.mask.reset();
    }

    pub fn num_pages(&self) -> u64 {
        num_pages_for_bytes(self.mask.as_bytes().len() as u64)
    }

    /// Writes the bitmap at `start_page_idx`, returning pages written.
    pub fn flush(&self, store: &PageStore, start_page_idx: u64) -> Result<u64> {
        store.write(self.mask.as_bytes(), start_page_idx * store.page_size())?;
        Ok(self.num_pages())
    }

    pub fn read(store: &PageStore, start_page_idx: u64, capacity: u64) -> Result<NullColumnChunk> {
        let num_bytes = num_bytes_for_bits(capacity);
        let mut bytes = store.read_pages(start_page_idx, num_pages_for_bytes(num_bytes as u64))?;
        bytes.truncate(num_bytes);
        Ok(NullColumnChunk {
            mask: NullMask::from_bytes(bytes, capacity),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn page_count_matches_bitmap_bytes() {
        // 100k rows need 12.5 KiB of bits, which is four pages.
        let chunk = NullColumnChunk::new(100_000);
        assert_eq!(chunk.num_pages(), 4);
    }

    #[test]
    fn append_copies_a_bit_range() {
        let mut src = NullColumnChunk::new(32);
        src.set_null(5, true);
        src.set_null(6, true);
        let mut dst = NullColumnChunk::new(32);
        dst.append(&src, 4, 0, 8);
        assert!(!dst.is_null(0));
        assert!(dst.is_null(1));
        assert!(dst.is_null(2));
        assert!(!dst.is_null(3));
    }
}
