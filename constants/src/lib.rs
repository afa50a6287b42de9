//! Numeric constants shared across the quiver crates.

/// Storage-layer constants.
pub mod storage {
    /// Size in bytes of one page in the data file. Every column chunk flush
    /// writes a whole number of pages.
    pub const PAGE_SIZE: u64 = 4096;

    /// Number of rows in one node group, the unit of columnar flushing.
    pub const NODE_GROUP_SIZE: u64 = 1 << 17;

    /// Size in bytes of one buffer-manager backed block used for string and
    /// list overflow payloads.
    pub const OVERFLOW_BLOCK_SIZE: u64 = 256 * 1024;
}

/// Bulk-copy constants.
pub mod copy {
    /// Initial size of the CSV read buffer. The buffer doubles until it can
    /// hold the unconsumed tail of the previous buffer.
    pub const INITIAL_BUFFER_SIZE: usize = 16 * 1024;

    /// Size in bytes of the byte range assigned to one parallel CSV reader.
    pub const PARALLEL_BLOCK_SIZE: u64 = 1 << 20;

    /// Number of rows sampled when sniffing column types from a headerless
    /// value section.
    pub const NUM_SNIFF_ROWS: u64 = 100;

    pub const DEFAULT_CSV_DELIMITER: u8 = b',';
    pub const DEFAULT_CSV_QUOTE: u8 = b'"';
    pub const DEFAULT_CSV_ESCAPE: u8 = b'"';
    pub const DEFAULT_CSV_LIST_BEGIN: u8 = b'{';
    pub const DEFAULT_CSV_LIST_END: u8 = b'}';
}
