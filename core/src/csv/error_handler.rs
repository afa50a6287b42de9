//! Error policy for the CSV reader: either fail the copy on the first bad
//! line, or record the line and let the parser skip it.

use std::collections::HashMap;
use std::sync::Mutex;

use log::warn;

use crate::err::{Error, Result};

/// Byte extent of the logical line currently being parsed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineContext {
    pub start_byte_offset: u64,
    pub end_byte_offset: u64,
    /// True once the terminating newline (or end of file) has been seen.
    pub is_complete_line: bool,
}

impl LineContext {
    pub fn set_new_line(&mut self, offset: u64) {
        self.start_byte_offset = offset;
        self.is_complete_line = false;
    }

    pub fn set_end_of_line(&mut self, offset: u64) {
        self.end_byte_offset = offset;
        self.is_complete_line = true;
    }
}

/// One recorded parse failure, with enough context to quote the offending
/// input back to the user.
#[derive(Clone, Debug)]
pub struct CsvError {
    pub message: String,
    pub line: LineContext,
    /// Raw text of the offending line, reconstructed from the file.
    pub line_text: String,
    pub block_idx: u64,
    /// Rows of this block consumed before the failure: accepted rows plus
    /// previously skipped lines.
    pub num_rows_read_in_block: u64,
    /// Forces propagation regardless of handler policy (raw I/O failures).
    pub must_throw: bool,
}

impl CsvError {
    fn into_error(self) -> Error {
        Error::CopyLine {
            message: self.message,
            line_text: self.line_text,
            block_idx: self.block_idx,
            start_byte_offset: self.line.start_byte_offset,
            end_byte_offset: self.line.end_byte_offset,
        }
    }
}

/// Shared across all readers of one copy. Lenient mode serializes recording
/// internally, so parallel block readers can share one handler.
pub struct CsvErrorHandler {
    strict: bool,
    recorded: Mutex<RecordedErrors>,
}

#[derive(Default)]
struct RecordedErrors {
    errors: Vec<CsvError>,
    per_block: HashMap<u64, u64>,
}

impl CsvErrorHandler {
    pub fn strict() -> CsvErrorHandler {
        CsvErrorHandler {
            strict: true,
            recorded: Mutex::new(RecordedErrors::default()),
        }
    }

    pub fn lenient() -> CsvErrorHandler {
        CsvErrorHandler {
            strict: false,
            recorded: Mutex::new(RecordedErrors::default()),
        }
    }

    /// Applies the policy to one error. `Ok(())` means the caller should
    /// skip the offending line and keep parsing.
    pub fn handle(&self, error: CsvError) -> Result<()> {
        if error.must_throw || self.strict {
            return Err(error.into_error());
        }
        warn!(
            "skipping malformed line in block {}: {} ({})",
            error.block_idx, error.line_text, error.message
        );
        let mut recorded = self.recorded.lock().unwrap();
        *recorded.per_block.entry(error.block_idx).or_insert(0) += 1;
        recorded.errors.push(error);
        Ok(())
    }

    pub fn num_errors(&self) -> u64 {
        self.recorded.lock().unwrap().errors.len() as u64
    }

    pub fn num_errors_in_block(&self, block_idx: u64) -> u64 {
        self.recorded
            .lock()
            .unwrap()
            .per_block
            .get(&block_idx)
            .copied()
            .unwrap_or(0)
    }

    /// Drains the recorded errors ordered by block, then by position within
    /// the block.
    pub fn take_errors(&self) -> Vec<CsvError> {
        let mut errors = std::mem::take(&mut self.recorded.lock().unwrap().errors);
        errors.sort_by_key(|e| (e.block_idx, e.line.start_byte_offset));
        errors
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_error(must_throw: bool) -> CsvError {
        CsvError {
            message: "unterminated quotes".into(),
            line: LineContext {
                start_byte_offset: 10,
                end_byte_offset: 25,
                is_complete_line: true,
            },
            line_text: "1,\"oops".into(),
            block_idx: 0,
            num_rows_read_in_block: 3,
            must_throw,
        }
    }

    #[test]
    fn strict_throws_and_lenient_records() {
        let strict = CsvErrorHandler::strict();
        assert!(strict.handle(sample_error(false)).is_err());

        let lenient = CsvErrorHandler::lenient();
        lenient.handle(sample_error(false)).unwrap();
        lenient.handle(sample_error(false)).unwrap();
        assert_eq!(lenient.num_errors(), 2);
        assert_eq!(lenient.num_errors_in_block(0), 2);
        assert_eq!(lenient.num_errors_in_block(7), 0);
    }

    #[test]
    fn must_throw_escalates_past_lenient_policy() {
        let lenient = CsvErrorHandler::lenient();
        assert!(lenient.handle(sample_error(true)).is_err());
    }

    #[test]
    fn taken_errors_are_ordered_by_block() {
        let lenient = CsvErrorHandler::lenient();
        let mut late = sample_error(false);
        late.block_idx = 3;
        lenient.handle(late).unwrap();
        lenient.handle(sample_error(false)).unwrap();
        let drained = lenient.take_errors();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].block_idx, 0);
        assert_eq!(drained[1].block_idx, 3);
    }
}
