//! Page-granular access to the data file. Column chunks are flushed as runs
//! of consecutive pages allocated from here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use constants::storage::PAGE_SIZE;
use log::debug;

use crate::err::{Error, Result};

pub struct PageStore {
    file: Mutex<File>,
    num_pages: AtomicU64,
}

impl PageStore {
    /// Opens (or creates) the data file at `path`. Existing pages are
    /// preserved; new allocations start after them.
    pub fn open(path: &Path) -> Result<PageStore> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| Error::OpenFile {
                path: path.display().to_string(),
                source,
            })?;
        let len = file.metadata().map_err(Error::ReadFile)?.len();
        Ok(PageStore {
            file: Mutex::new(file),
            num_pages: AtomicU64::new((len + PAGE_SIZE - 1) / PAGE_SIZE),
        })
    }

    pub fn page_size(&self) -> u64 {
        PAGE_SIZE
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages.load(Ordering::Relaxed)
    }

    /// Reserves `num_pages` consecutive pages and returns the index of the
    /// first one.
    pub fn allocate_pages(&self, num_pages: u64) -> u64 {
        let start = self.num_pages.fetch_add(num_pages, Ordering::Relaxed);
        debug!("allocated pages {start}..{}", start + num_pages);
        start
    }

    /// Writes `buffer` at an absolute byte offset. Callers pass offsets
    /// derived from allocated page indices.
    pub fn write(&self, buffer: &[u8], byte_offset: u64) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(byte_offset))
            .map_err(Error::SeekFile)?;
        file.write_all(buffer).map_err(Error::WriteFile)
    }

    /// Reads `buffer.len()` bytes from an absolute byte offset. Bytes past
    /// the end of the file read back as zero, matching the page images that
    /// a partial final write implies.
    pub fn read(&self, buffer: &mut [u8], byte_offset: u64) -> Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(byte_offset))
            .map_err(Error::SeekFile)?;
        let mut filled = 0;
        while filled < buffer.len() {
            let n = file.read(&mut buffer[filled..]).map_err(Error::ReadFile)?;
            if n == 0 {
                buffer[filled..].fill(0);
                break;
            }
            filled += n;
        }
        Ok(())
    }

    /// Bytes of the page run `[start_page_idx, start_page_idx + num_pages)`.
    pub fn read_pages(&self, start_page_idx: u64, num_pages: u64) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; (num_pages * PAGE_SIZE) as usize];
        self.read(&mut buffer, start_page_idx * PAGE_SIZE)?;
        Ok(buffer)
    }
}

/// Pages needed to hold `num_bytes`.
pub fn num_pages_for_bytes(num_bytes: u64) -> u64 {
    (num_bytes + PAGE_SIZE - 1) / PAGE_SIZE
}
