//! Streaming CSV reader. A character-level state machine walks a growing
//! read buffer and hands each cell slice to a [`ParseDriver`]; the driver
//! decides what a cell and a row mean for the current pass (skipping,
//! header capture, sniffing, or chunk loading).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use constants::copy::INITIAL_BUFFER_SIZE;
use log::debug;
use memchr::memchr2;

use crate::csv::driver::{HeaderDriver, ParseDriver, SkipRowDriver};
use crate::csv::error_handler::{CsvError, CsvErrorHandler, LineContext};
use crate::err::{Error, Result};
use crate::options::CsvOption;

/// Expected shape of the file's columns, used for header validation.
#[derive(Clone, Debug, Default)]
pub struct CsvColumnInfo {
    pub num_columns: usize,
}

/// Offsets a progress thread may read while the parse loop runs. The updates
/// in [`CsvReader::read_buffer`] keep `os_file_offset >= buffer_size` at
/// every observable point, so the subtraction never underflows.
#[derive(Debug, Default)]
pub struct ReadProgress {
    os_file_offset: AtomicU64,
    buffer_size: AtomicU64,
    position: AtomicU64,
}

impl ReadProgress {
    /// Current position within the file. Monotone non-decreasing across
    /// successful parse steps; safe to call from any thread.
    pub fn file_offset(&self) -> u64 {
        self.os_file_offset.load(Ordering::Relaxed) - self.buffer_size.load(Ordering::Relaxed)
            + self.position.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ParseState {
    ValueStart,
    Normal,
    InQuotes,
    Unquote,
    HandleEscape,
    AddValue,
    AddRow,
    CarriageReturn,
    Final,
    IgnoreError,
}

fn is_new_line(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

pub struct CsvReader {
    file: File,
    file_size: u64,
    option: CsvOption,
    column_info: CsvColumnInfo,
    error_handler: Arc<CsvErrorHandler>,
    interrupt: Option<Arc<AtomicBool>>,

    buffer: Box<[u8]>,
    buffer_size: usize,
    position: usize,
    os_file_offset: u64,
    buffer_idx: u64,
    progress: Arc<ReadProgress>,

    current_block_idx: u64,
    num_rows_in_current_block: u64,
    cur_row_idx: u64,
    num_errors: u64,
    line_context: LineContext,
    header: Vec<String>,
}

impl CsvReader {
    pub fn new(
        path: &Path,
        option: CsvOption,
        column_info: CsvColumnInfo,
        error_handler: Arc<CsvErrorHandler>,
        interrupt: Option<Arc<AtomicBool>>,
    ) -> Result<CsvReader> {
        let file = File::open(path).map_err(|source| Error::OpenFile {
            path: path.display().to_string(),
            source,
        })?;
        let file_size = file.metadata().map_err(Error::ReadFile)?.len();
        Ok(CsvReader {
            file,
            file_size,
            option,
            column_info,
            error_handler,
            interrupt,
            buffer: Vec::new().into_boxed_slice(),
            buffer_size: 0,
            position: 0,
            os_file_offset: 0,
            buffer_idx: 0,
            progress: Arc::new(ReadProgress::default()),
            current_block_idx: 0,
            num_rows_in_current_block: 0,
            cur_row_idx: 0,
            num_errors: 0,
            line_context: LineContext::default(),
            header: Vec::new(),
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn is_eof(&self) -> bool {
        self.file_offset() >= self.file_size
    }

    /// `os_file_offset - buffer_size + position`, the exact in-parse offset.
    pub fn file_offset(&self) -> u64 {
        debug_assert!(self.os_file_offset >= self.buffer_size as u64);
        self.os_file_offset - self.buffer_size as u64 + self.position as u64
    }

    /// Shared handle for concurrent progress reads.
    pub fn progress(&self) -> Arc<ReadProgress> {
        self.progress.clone()
    }

    pub fn header_names(&self) -> &[String] {
        &self.header
    }

    pub fn set_block_idx(&mut self, block_idx: u64) {
        self.current_block_idx = block_idx;
    }

    pub fn reset_num_rows_in_current_block(&mut self) {
        self.num_rows_in_current_block = 0;
    }

    pub fn increase_num_rows_in_current_block(&mut self, num_rows: u64) {
        self.num_rows_in_current_block += num_rows;
    }

    pub fn num_rows_in_current_block(&self) -> u64 {
        self.num_rows_in_current_block
    }

    /// Repositions the reader at an absolute byte offset, dropping buffered
    /// bytes. Used by parallel block readers before their first parse.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::SeekFile)?;
        self.buffer = Vec::new().into_boxed_slice();
        self.buffer_size = 0;
        self.position = 0;
        self.os_file_offset = offset;
        self.progress.buffer_size.store(0, Ordering::Relaxed);
        self.progress.position.store(0, Ordering::Relaxed);
        self.progress
            .os_file_offset
            .store(offset, Ordering::Relaxed);
        Ok(())
    }

    /// Advances past an optional UTF-8 byte-order mark, then past `skip_num`
    /// rows, then past the header row. Returns rows consumed.
    pub fn handle_first_block(&mut self) -> Result<u64> {
        let mut num_rows_read = 0;
        self.read_bom()?;
        if self.option.skip_num > 0 {
            let mut driver = SkipRowDriver::new(self.option.skip_num);
            num_rows_read += self.parse_csv(&mut driver)?;
        }
        if self.option.has_header {
            num_rows_read += self.read_header()?;
        }
        Ok(num_rows_read)
    }

    fn read_bom(&mut self) -> Result<()> {
        if !self.maybe_read_buffer(None)? {
            return Ok(());
        }
        if self.buffer_size >= 3 && self.buffer[..3] == [0xEF, 0xBB, 0xBF] {
            self.position = 3;
        }
        Ok(())
    }

    /// Consumes the header row, capturing the column names.
    pub fn read_header(&mut self) -> Result<u64> {
        let mut driver = HeaderDriver::default();
        let num_rows = self.parse_csv(&mut driver)?;
        if self.column_info.num_columns > 0 && driver.names.len() != self.column_info.num_columns
        {
            debug!(
                "header names {} columns, table has {}",
                driver.names.len(),
                self.column_info.num_columns
            );
        }
        self.header = driver.names;
        Ok(num_rows)
    }

    /// Skips to the first position after the next newline run. Parallel
    /// readers use this to align on a row boundary after seeking into the
    /// middle of the file.
    pub fn skip_partial_line(&mut self) -> Result<()> {
        self.skip_current_line()
    }

    fn check_interrupt(&self) -> Result<()> {
        match &self.interrupt {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Interrupted),
            _ => Ok(()),
        }
    }

    fn maybe_read_buffer(&mut self, start: Option<&mut usize>) -> Result<bool> {
        if self.position >= self.buffer_size {
            return self.read_buffer(start);
        }
        Ok(true)
    }

    /// Replaces the buffer with a fresh one holding the unconsumed tail of
    /// the old buffer plus newly read bytes. Returns true iff at least one
    /// new byte arrived.
    fn read_buffer(&mut self, start: Option<&mut usize>) -> Result<bool> {
        self.check_interrupt()?;
        let old_buffer = std::mem::take(&mut self.buffer);

        let remaining = match start.as_deref() {
            Some(&start) => {
                debug_assert!(start <= self.buffer_size);
                self.buffer_size - start
            }
            None => 0,
        };

        let mut buffer_read_size = INITIAL_BUFFER_SIZE;
        while remaining > buffer_read_size {
            buffer_read_size *= 2;
        }

        let mut new_buffer = vec![0u8; buffer_read_size + remaining].into_boxed_slice();
        if remaining > 0 {
            let from = *start.as_deref().unwrap();
            new_buffer[..remaining].copy_from_slice(&old_buffer[from..from + remaining]);
        }

        let mut read_count = 0;
        loop {
            match self.file.read(&mut new_buffer[remaining + read_count..]) {
                Ok(0) => break,
                Ok(n) => {
                    read_count += n;
                    if remaining + read_count == new_buffer.len() {
                        break;
                    }
                }
                Err(source) => {
                    self.buffer = new_buffer;
                    self.line_context.set_end_of_line(self.file_offset());
                    self.handle_copy_exception(
                        &format!("could not read from file: {source}"),
                        true,
                    )?;
                    unreachable!("read failures always escalate");
                }
            }
        }
        self.buffer = new_buffer;

        // The update order is load-bearing: a progress thread derives the
        // file offset from these counters, and `os_file_offset >=
        // buffer_size` must hold at every intermediate point.
        self.buffer_size = remaining;
        self.progress
            .buffer_size
            .store(remaining as u64, Ordering::Relaxed);
        self.os_file_offset += read_count as u64;
        self.progress
            .os_file_offset
            .store(self.os_file_offset, Ordering::Relaxed);
        self.buffer_size += read_count;
        self.progress
            .buffer_size
            .store(self.buffer_size as u64, Ordering::Relaxed);

        self.position = remaining;
        self.progress
            .position
            .store(remaining as u64, Ordering::Relaxed);
        if let Some(start) = start {
            *start = 0;
        }
        self.buffer_idx += 1;
        Ok(read_count > 0)
    }

    fn publish_position(&self) {
        self.progress
            .position
            .store(self.position as u64, Ordering::Relaxed);
    }

    /// Re-reads the raw bytes of `[start, end)` for error reporting, then
    /// restores the read position. Leading and trailing newlines are
    /// trimmed.
    pub fn reconstruct_line(&mut self, start: u64, end: u64) -> String {
        debug_assert!(end >= start);
        if self.file.seek(SeekFrom::Start(start)).is_err() {
            return "unable to reconstruct line".to_string();
        }
        let mut bytes = vec![0u8; (end - start) as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            match self.file.read(&mut bytes[filled..]) {
                Ok(0) | Err(_) => break,
                Ok(n) => filled += n,
            }
        }
        let reseek = self.file.seek(SeekFrom::Start(self.os_file_offset));
        debug_assert!(reseek.is_ok());
        bytes.truncate(filled);
        let first = bytes
            .iter()
            .position(|&b| !is_new_line(b))
            .unwrap_or(bytes.len());
        let last = bytes
            .iter()
            .rposition(|&b| !is_new_line(b))
            .map_or(first, |p| p + 1);
        String::from_utf8_lossy(&bytes[first..last]).into_owned()
    }

    /// Consumes input through the next newline run so the machine can
    /// restart cleanly at the following line.
    fn skip_current_line(&mut self) -> Result<()> {
        loop {
            if let Some(found) =
                memchr2(b'\n', b'\r', &self.buffer[self.position..self.buffer_size])
            {
                self.position += found;
                while self.position < self.buffer_size && is_new_line(self.buffer[self.position])
                {
                    self.position += 1;
                }
                self.publish_position();
                return Ok(());
            }
            self.position = self.buffer_size;
            if !self.maybe_read_buffer(None)? {
                self.publish_position();
                return Ok(());
            }
        }
    }

    /// Builds an error record for the current line and applies the handler
    /// policy. Returning `Ok` means the caller skips the line and continues.
    fn handle_copy_exception(&mut self, message: &str, must_throw: bool) -> Result<()> {
        let mut line = self.line_context;
        if !line.is_complete_line {
            line.end_byte_offset = self.file_offset();
        }
        let line_text = self.reconstruct_line(line.start_byte_offset, line.end_byte_offset);
        let error = CsvError {
            message: message.to_string(),
            line,
            line_text,
            block_idx: self.current_block_idx,
            num_rows_read_in_block: self.num_rows_in_current_block
                + self.cur_row_idx
                + self.num_errors,
            must_throw,
        };
        self.error_handler.handle(error)?;
        self.num_errors += 1;
        Ok(())
    }

    /// Strips recorded escape characters out of the cell slice and hands it
    /// to the driver. Returns the driver's verdict; a rejection has already
    /// been routed through the error handler.
    fn emit_value<D: ParseDriver>(
        &mut self,
        driver: &mut D,
        column: usize,
        start: usize,
        end: usize,
        escape_positions: &mut Vec<usize>,
    ) -> Result<bool> {
        let accepted = if escape_positions.is_empty() {
            driver.add_value(self.cur_row_idx, column, &self.buffer[start..end])
        } else {
            let raw = &self.buffer[start..end];
            let mut cleaned = Vec::with_capacity(raw.len());
            let mut previous = 0;
            for &escape_position in escape_positions.iter() {
                cleaned.extend_from_slice(&raw[previous..escape_position]);
                previous = escape_position + 1;
            }
            cleaned.extend_from_slice(&raw[previous..]);
            escape_positions.clear();
            driver.add_value(self.cur_row_idx, column, &cleaned)
        };
        if !accepted {
            let message = driver
                .take_error()
                .unwrap_or_else(|| "value rejected".to_string());
            self.handle_copy_exception(&message, false)?;
        }
        Ok(accepted)
    }

    fn handle_quoted_newline(&mut self) -> Result<bool> {
        if self.option.allow_quoted_newlines {
            return Ok(true);
        }
        self.line_context.set_end_of_line(self.file_offset());
        self.handle_copy_exception("newline inside a quoted value is not allowed here.", false)?;
        Ok(false)
    }

    /// Runs the state machine until the driver reports done or input ends.
    /// Returns the number of rows the driver accepted.
    pub fn parse_csv<D: ParseDriver>(&mut self, driver: &mut D) -> Result<u64> {
        self.cur_row_idx = 0;
        self.num_errors = 0;
        let mut escape_positions: Vec<usize> = Vec::new();

        'row: loop {
            let mut column: usize = 0;
            let mut start = self.position;
            let mut has_quotes = false;
            escape_positions.clear();
            self.line_context.set_new_line(self.file_offset());

            if !self.maybe_read_buffer(Some(&mut start))? {
                return Ok(self.cur_row_idx);
            }

            let mut state = ParseState::ValueStart;
            loop {
                match state {
                    ParseState::ValueStart => {
                        if self.buffer[self.position] == self.option.quote_char {
                            // Actual value starts after the quote.
                            start = self.position + 1;
                            has_quotes = true;
                            state = ParseState::InQuotes;
                        } else {
                            start = self.position;
                            has_quotes = false;
                            state = ParseState::Normal;
                        }
                    }
                    ParseState::Normal => {
                        // Remainder of an unquoted value, up to a delimiter
                        // or newline.
                        'scan: loop {
                            while self.position < self.buffer_size {
                                let b = self.buffer[self.position];
                                if b == self.option.delimiter {
                                    state = ParseState::AddValue;
                                    break 'scan;
                                }
                                if is_new_line(b) {
                                    state = ParseState::AddRow;
                                    break 'scan;
                                }
                                self.position += 1;
                            }
                            if !self.read_buffer(Some(&mut start))? {
                                state = ParseState::Final;
                                break 'scan;
                            }
                        }
                    }
                    ParseState::InQuotes => {
                        self.position += 1;
                        'scan: loop {
                            while self.position < self.buffer_size {
                                let b = self.buffer[self.position];
                                if b == self.option.quote_char {
                                    state = ParseState::Unquote;
                                    break 'scan;
                                }
                                if b == self.option.escape_char {
                                    escape_positions.push(self.position - start);
                                    state = ParseState::HandleEscape;
                                    break 'scan;
                                }
                                if is_new_line(b) && !self.handle_quoted_newline()? {
                                    state = ParseState::IgnoreError;
                                    break 'scan;
                                }
                                self.position += 1;
                            }
                            if !self.read_buffer(Some(&mut start))? {
                                self.line_context.set_end_of_line(self.file_offset());
                                self.handle_copy_exception("unterminated quotes.", false)?;
                                state = ParseState::IgnoreError;
                                break 'scan;
                            }
                        }
                    }
                    ParseState::Unquote => {
                        debug_assert!(
                            has_quotes && self.buffer[self.position] == self.option.quote_char
                        );
                        // Right after a closing quote only another quote, a
                        // delimiter, or a row end is legal.
                        self.position += 1;
                        if !self.maybe_read_buffer(Some(&mut start))? {
                            state = ParseState::Final;
                            continue;
                        }
                        let b = self.buffer[self.position];
                        if b == self.option.quote_char && self.option.doubled_quote_escape() {
                            escape_positions.push(self.position - start);
                            state = ParseState::InQuotes;
                        } else if b == self.option.delimiter || b == self.option.list_end_char {
                            state = ParseState::AddValue;
                        } else if is_new_line(b) {
                            state = ParseState::AddRow;
                        } else {
                            self.handle_copy_exception(
                                "quote should be followed by end of file, end of value, end of row or another quote.",
                                false,
                            )?;
                            state = ParseState::IgnoreError;
                        }
                    }
                    ParseState::HandleEscape => {
                        self.position += 1;
                        if !self.maybe_read_buffer(Some(&mut start))? {
                            self.line_context.set_end_of_line(self.file_offset());
                            self.handle_copy_exception("escape at end of file.", false)?;
                            state = ParseState::IgnoreError;
                            continue;
                        }
                        let b = self.buffer[self.position];
                        if b != self.option.quote_char && b != self.option.escape_char {
                            // Consume the invalid character before skipping.
                            self.position += 1;
                            self.handle_copy_exception(
                                "escape must be followed by the quote or escape character.",
                                false,
                            )?;
                            state = ParseState::IgnoreError;
                        } else {
                            state = ParseState::InQuotes;
                        }
                    }
                    ParseState::AddValue => {
                        debug_assert!(
                            self.buffer[self.position] == self.option.delimiter
                                || self.buffer[self.position] == self.option.list_end_char
                        );
                        // Trim the closing quote if the value was quoted.
                        let end = self.position - has_quotes as usize;
                        if !self.emit_value(driver, column, start, end, &mut escape_positions)? {
                            state = ParseState::IgnoreError;
                            continue;
                        }
                        column += 1;
                        self.position += 1;
                        start = self.position;
                        if !self.maybe_read_buffer(Some(&mut start))? {
                            state = ParseState::Final;
                            continue;
                        }
                        state = ParseState::ValueStart;
                    }
                    ParseState::AddRow => {
                        debug_assert!(is_new_line(self.buffer[self.position]));
                        self.line_context.set_end_of_line(self.file_offset());
                        let is_carriage_return = self.buffer[self.position] == b'\r';
                        let end = self.position - has_quotes as usize;
                        if !self.emit_value(driver, column, start, end, &mut escape_positions)? {
                            state = ParseState::IgnoreError;
                            continue;
                        }
                        column += 1;

                        if driver.add_row(self.cur_row_idx, column) {
                            self.cur_row_idx += 1;
                        } else if let Some(message) = driver.take_error() {
                            self.handle_copy_exception(&message, false)?;
                        }

                        column = 0;
                        self.position += 1;
                        start = self.position;
                        self.line_context.set_new_line(self.file_offset());
                        if !self.maybe_read_buffer(Some(&mut start))? {
                            state = ParseState::Final;
                            continue;
                        }
                        self.check_interrupt()?;
                        self.publish_position();
                        if is_carriage_return {
                            state = ParseState::CarriageReturn;
                        } else {
                            if driver.done(self.cur_row_idx) {
                                return Ok(self.cur_row_idx);
                            }
                            state = ParseState::ValueStart;
                        }
                    }
                    ParseState::CarriageReturn => {
                        // Fold an optional `\n` after `\r` into one row end.
                        if self.buffer[self.position] == b'\n' {
                            self.position += 1;
                            start = self.position;
                            if !self.maybe_read_buffer(Some(&mut start))? {
                                state = ParseState::Final;
                                continue;
                            }
                        }
                        if driver.done(self.cur_row_idx) {
                            return Ok(self.cur_row_idx);
                        }
                        state = ParseState::ValueStart;
                    }
                    ParseState::Final => {
                        self.line_context.set_end_of_line(self.file_offset());
                        if self.position > start {
                            let end = self.position - has_quotes as usize;
                            if !self.emit_value(
                                driver,
                                column,
                                start,
                                end,
                                &mut escape_positions,
                            )? {
                                return Ok(self.cur_row_idx);
                            }
                            column += 1;
                        }
                        if column > 0 {
                            if driver.add_row(self.cur_row_idx, column) {
                                self.cur_row_idx += 1;
                            } else if let Some(message) = driver.take_error() {
                                self.handle_copy_exception(&message, false)?;
                            }
                        }
                        self.publish_position();
                        return Ok(self.cur_row_idx);
                    }
                    ParseState::IgnoreError => {
                        self.skip_current_line()?;
                        continue 'row;
                    }
                }
            }
        }
    }
}
