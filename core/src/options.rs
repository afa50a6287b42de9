//! Copy configuration: the recognized CSV options and source file types.

use std::path::Path;

use constants::copy::{
    DEFAULT_CSV_DELIMITER, DEFAULT_CSV_ESCAPE, DEFAULT_CSV_LIST_BEGIN, DEFAULT_CSV_LIST_END,
    DEFAULT_CSV_QUOTE,
};

use crate::err::{Error, Result};

/// Source file formats the copier recognizes, keyed by extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Parquet,
    Npy,
    Turtle,
}

impl FileType {
    /// The extension set is closed and small, so this is a plain function
    /// rather than a registry.
    pub fn from_extension(extension: &str) -> Option<FileType> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Some(FileType::Csv),
            "parquet" => Some(FileType::Parquet),
            "npy" => Some(FileType::Npy),
            "ttl" => Some(FileType::Turtle),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<FileType> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(FileType::from_extension)
            .ok_or_else(|| Error::UnsupportedFileType(path.display().to_string()))
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileType::Csv => write!(f, "CSV"),
            FileType::Parquet => write!(f, "PARQUET"),
            FileType::Npy => write!(f, "NPY"),
            FileType::Turtle => write!(f, "TURTLE"),
        }
    }
}

/// CSV parsing configuration. `escape_char == quote_char` (the default)
/// selects doubled-quote escaping; an `escape_char` of zero means unset,
/// which behaves the same.
#[derive(Clone, Copy, Debug)]
pub struct CsvOption {
    pub delimiter: u8,
    pub quote_char: u8,
    pub escape_char: u8,
    pub has_header: bool,
    /// Leading rows discarded before the header.
    pub skip_num: u64,
    pub list_begin_char: u8,
    pub list_end_char: u8,
    /// Policy for a newline inside a quoted value. The serial reader accepts
    /// them by default; parallel block readers always reject them because a
    /// block boundary cannot be found inside an open quote.
    pub allow_quoted_newlines: bool,
    /// Record and skip malformed lines instead of failing the copy.
    pub ignore_errors: bool,
}

impl Default for CsvOption {
    fn default() -> CsvOption {
        CsvOption {
            delimiter: DEFAULT_CSV_DELIMITER,
            quote_char: DEFAULT_CSV_QUOTE,
            escape_char: DEFAULT_CSV_ESCAPE,
            has_header: false,
            skip_num: 0,
            list_begin_char: DEFAULT_CSV_LIST_BEGIN,
            list_end_char: DEFAULT_CSV_LIST_END,
            allow_quoted_newlines: true,
            ignore_errors: false,
        }
    }
}

impl CsvOption {
    /// Builds an option block from `(name, value)` pairs the way a COPY
    /// statement supplies them. Unknown names are an error.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<CsvOption> {
        let mut option = CsvOption::default();
        for (name, value) in pairs {
            match name.to_ascii_uppercase().as_str() {
                "DELIM" | "DELIMITER" => option.delimiter = single_char(name, value)?,
                "QUOTE" => option.quote_char = single_char(name, value)?,
                "ESCAPE" => option.escape_char = single_char(name, value)?,
                "HEADER" => option.has_header = boolean(name, value)?,
                "SKIP" => {
                    option.skip_num = value.parse().map_err(|_| Error::InvalidOptionValue {
                        option: name.to_string(),
                        value: value.to_string(),
                    })?
                }
                "LIST_BEGIN" => option.list_begin_char = single_char(name, value)?,
                "LIST_END" => option.list_end_char = single_char(name, value)?,
                "QUOTED_NEWLINES" => option.allow_quoted_newlines = boolean(name, value)?,
                "IGNORE_ERRORS" => option.ignore_errors = boolean(name, value)?,
                _ => return Err(Error::UnrecognizedOption(name.to_string())),
            }
        }
        Ok(option)
    }

    /// Whether `""` inside a quoted value stands for one quote character.
    pub fn doubled_quote_escape(&self) -> bool {
        self.escape_char == 0 || self.escape_char == self.quote_char
    }
}

fn single_char(name: &str, value: &str) -> Result<u8> {
    let bytes = value.as_bytes();
    if bytes.len() == 1 {
        Ok(bytes[0])
    } else {
        Err(Error::InvalidOptionValue {
            option: name.to_string(),
            value: value.to_string(),
        })
    }
}

fn boolean(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::InvalidOptionValue {
            option: name.to_string(),
            value: value.to_string(),
        }),
    }
}
