use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open {path}: {source}")]
    OpenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read from file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("could not seek in file: {0}")]
    SeekFile(#[source] std::io::Error),

    #[error("could not write to data file: {0}")]
    WriteFile(#[source] std::io::Error),

    #[error(
        "copy failed on line `{line_text}` (block {block_idx}, bytes {start_byte_offset}..{end_byte_offset}): {message}"
    )]
    CopyLine {
        message: String,
        line_text: String,
        block_idx: u64,
        start_byte_offset: u64,
        end_byte_offset: u64,
    },

    #[error("cannot parse `{value}` as {data_type}")]
    MalformedValue { value: String, data_type: String },

    #[error("unsupported file type {0}")]
    UnsupportedFileType(String),

    #[error("`{0}` is not a recognized copy option")]
    UnrecognizedOption(String),

    #[error("invalid value `{value}` for copy option {option}")]
    InvalidOptionValue { option: String, value: String },

    #[error("table {0} does not exist")]
    TableNotFound(String),

    #[error("duplicate primary key {key} in table {table}")]
    DuplicatePrimaryKey { table: String, key: String },

    #[error("no nodes loaded for table {0}; copy the node table before its rel tables")]
    EmptyNodeTable(String),

    #[error("could not start worker threads: {0}")]
    ThreadPool(String),

    #[error("table {0} already exists")]
    TableAlreadyExists(String),

    #[error("{0}")]
    Catalog(String),

    #[error("overflow allocation of {requested} bytes exceeds block size {block_size}")]
    OverflowAllocationTooLarge { requested: u64, block_size: u64 },

    #[error("interrupted")]
    Interrupted,

    #[error("could not persist database metadata: {0}")]
    Metadata(#[source] serde_json::Error),
}
