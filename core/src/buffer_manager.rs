//! Buffer-manager backed blocks and the overflow buffer that string and list
//! chunks use for variable-width payloads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use constants::storage::OVERFLOW_BLOCK_SIZE;
use log::debug;

use crate::err::{Error, Result};

/// Hands out fixed-size memory blocks with stable ids. Blocks must be
/// returned through [`BufferManager::free_block`]; [`OverflowBuffer`] does so
/// on drop.
#[derive(Debug)]
pub struct BufferManager {
    block_size: u64,
    next_block_id: AtomicU64,
    num_live_blocks: AtomicU64,
}

#[derive(Debug)]
pub struct BackedBlock {
    pub block_id: u64,
    pub data: Box<[u8]>,
}

impl BufferManager {
    pub fn new() -> Arc<BufferManager> {
        Arc::new(BufferManager {
            block_size: OVERFLOW_BLOCK_SIZE,
            next_block_id: AtomicU64::new(0),
            num_live_blocks: AtomicU64::new(0),
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn allocate_block(&self) -> BackedBlock {
        let block_id = self.next_block_id.fetch_add(1, Ordering::Relaxed);
        self.num_live_blocks.fetch_add(1, Ordering::Relaxed);
        BackedBlock {
            block_id,
            data: vec![0u8; self.block_size as usize].into_boxed_slice(),
        }
    }

    pub fn free_block(&self, block: BackedBlock) {
        debug!("releasing overflow block {}", block.block_id);
        self.num_live_blocks.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn num_live_blocks(&self) -> u64 {
        self.num_live_blocks.load(Ordering::Relaxed)
    }
}

struct OverflowBlock {
    used: u64,
    block: BackedBlock,
}

/// Append-only arena for variable-width payloads. Allocations get a logical
/// offset of `block ordinal * block size + offset in block`, which stays
/// valid for the lifetime of the buffer and across [`OverflowBuffer::merge`]
/// via the returned rebase amount.
pub struct OverflowBuffer {
    manager: Arc<BufferManager>,
    blocks: Vec<OverflowBlock>,
}

impl OverflowBuffer {
    pub fn new(manager: Arc<BufferManager>) -> OverflowBuffer {
        OverflowBuffer {
            manager,
            blocks: Vec::new(),
        }
    }

    fn block_size(&self) -> u64 {
        self.manager.block_size()
    }

    fn require_new_block(&self, len: u64) -> Result<bool> {
        if len > self.block_size() {
            return Err(Error::OverflowAllocationTooLarge {
                requested: len,
                block_size: self.block_size(),
            });
        }
        Ok(match self.blocks.last() {
            None => true,
            Some(last) => last.used + len > self.block_size(),
        })
    }

    /// Copies `payload` into the buffer and returns its logical offset.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64> {
        let len = payload.len() as u64;
        if self.require_new_block(len)? {
            self.blocks.push(OverflowBlock {
                used: 0,
                block: self.manager.allocate_block(),
            });
        }
        let block_ordinal = self.blocks.len() as u64 - 1;
        let current = self.blocks.last_mut().unwrap();
        let offset_in_block = current.used;
        current.block.data[offset_in_block as usize..(offset_in_block + len) as usize]
            .copy_from_slice(payload);
        current.used += len;
        Ok(block_ordinal * self.block_size() + offset_in_block)
    }

    /// Reads `len` bytes back from a logical offset.
    pub fn read(&self, offset: u64, len: u64) -> &[u8] {
        let block = (offset / self.block_size()) as usize;
        let start = (offset % self.block_size()) as usize;
        &self.blocks[block].block.data[start..start + len as usize]
    }

    /// Adopts all of `other`'s blocks. Returns the amount to add to each of
    /// `other`'s logical offsets so they address the same payload here.
    pub fn merge(&mut self, mut other: OverflowBuffer) -> u64 {
        let rebase = self.blocks.len() as u64 * self.block_size();
        self.blocks.append(&mut other.blocks);
        rebase
    }

    /// Releases all blocks except the first and rewinds it, so the buffer can
    /// be refilled without going back to the manager for the common case.
    pub fn reset(&mut self) {
        for extra in self.blocks.drain(1..) {
            self.manager.free_block(extra.block);
        }
        if let Some(first) = self.blocks.first_mut() {
            first.used = 0;
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Total bytes the buffer occupies when flushed: each block is written
    /// whole so logical offsets stay valid on reload.
    pub fn flushed_size(&self) -> u64 {
        self.blocks.len() as u64 * self.block_size()
    }

    /// Full backing bytes of block `ordinal`, used by the flush path.
    pub fn block_bytes(&self, ordinal: usize) -> &[u8] {
        &self.blocks[ordinal].block.data
    }

    /// Rebuilds an overflow buffer from flushed block images.
    pub fn from_block_images(manager: Arc<BufferManager>, images: &[u8]) -> OverflowBuffer {
        let block_size = manager.block_size() as usize;
        debug_assert_eq!(images.len() % block_size, 0);
        let mut buffer = OverflowBuffer::new(manager);
        for image in images.chunks(block_size) {
            let mut block = buffer.manager.allocate_block();
            block.data.copy_from_slice(image);
            buffer.blocks.push(OverflowBlock {
                // Reloaded blocks are read-only in practice; treat them as
                // full so fresh appends open a new block.
                used: block_size as u64,
                block,
            });
        }
        buffer
    }
}

impl Drop for OverflowBuffer {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            self.manager.free_block(block.block);
        }
    }
}
