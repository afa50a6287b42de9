//! Column-type sniffing: sample the leading rows and infer a type per
//! column by trying each parser in a fixed precedence.

use itertools::{EitherOrBoth, Itertools};

use crate::csv::driver::ParseDriver;
use crate::datetime;
use crate::types::LogicalType;

/// Records the first `sample_rows` rows as text for inference.
pub struct SniffDriver {
    sample_rows: u64,
    rows: Vec<Vec<Option<String>>>,
    current: Vec<Option<String>>,
}

impl SniffDriver {
    pub fn new(sample_rows: u64) -> SniffDriver {
        SniffDriver {
            sample_rows,
            rows: Vec::new(),
            current: Vec::new(),
        }
    }

    /// One inferred type per column over the sampled rows. Columns that only
    /// ever held empty cells fall back to STRING.
    pub fn infer_column_types(&self) -> Vec<LogicalType> {
        let num_columns = self.rows.iter().map(|row| row.len()).max().unwrap_or(0);
        (0..num_columns)
            .map(|column_idx| {
                let mut merged: Option<LogicalType> = None;
                for row in &self.rows {
                    let Some(Some(cell)) = row.get(column_idx) else {
                        continue;
                    };
                    let cell_type = infer_cell_type(cell);
                    merged = Some(match merged {
                        None => cell_type,
                        Some(current) => merge_types(current, cell_type),
                    });
                }
                merged.unwrap_or(LogicalType::String)
            })
            .collect()
    }

    pub fn num_sampled_rows(&self) -> usize {
        self.rows.len()
    }
}

impl ParseDriver for SniffDriver {
    fn done(&self, row_num: u64) -> bool {
        row_num >= self.sample_rows
    }

    fn add_value(&mut self, _row_num: u64, _column_idx: usize, value: &[u8]) -> bool {
        self.current.push(if value.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(value).into_owned())
        });
        true
    }

    fn add_row(&mut self, _row_num: u64, _num_columns: usize) -> bool {
        self.rows.push(std::mem::take(&mut self.current));
        true
    }
}

/// The narrowest type whose parser accepts the cell. The precedence is
/// fixed: BOOL, INT64, DOUBLE, DATE, TIMESTAMP, INTERVAL, then STRING.
pub fn infer_cell_type(cell: &str) -> LogicalType {
    let trimmed = cell.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return LogicalType::Bool;
    }
    if trimmed.parse::<i64>().is_ok() {
        return LogicalType::Int64;
    }
    if trimmed.parse::<f64>().is_ok() {
        return LogicalType::Double;
    }
    if datetime::parse_date(trimmed.as_bytes()).is_ok() {
        return LogicalType::Date;
    }
    if datetime::parse_timestamp(trimmed.as_bytes()).is_ok() {
        return LogicalType::Timestamp;
    }
    if datetime::parse_interval(trimmed.as_bytes()).is_ok() {
        return LogicalType::Interval;
    }
    LogicalType::String
}

/// Widens two per-cell types to one that holds both: an integer column with
/// a float in it widens to DOUBLE, a date column with times to TIMESTAMP,
/// anything else conflicting falls back to STRING.
pub fn merge_types(a: LogicalType, b: LogicalType) -> LogicalType {
    use LogicalType::{Date, Double, Int64, String as Str, Timestamp};
    if a == b {
        return a;
    }
    match (a, b) {
        (Int64, Double) | (Double, Int64) => Double,
        (Date, Timestamp) | (Timestamp, Date) => Timestamp,
        _ => Str,
    }
}

/// Pairs header names with inferred types; synthesizes `column{i}` names
/// when the header is shorter than the widest row, and STRING types when it
/// is longer.
pub fn name_columns(
    header: &[String],
    types: Vec<LogicalType>,
) -> Vec<(String, LogicalType)> {
    header
        .iter()
        .zip_longest(types)
        .enumerate()
        .map(|(i, pair)| match pair {
            EitherOrBoth::Both(name, data_type) => (name.clone(), data_type),
            EitherOrBoth::Left(name) => (name.clone(), LogicalType::String),
            EitherOrBoth::Right(data_type) => (format!("column{i}"), data_type),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("true", LogicalType::Bool)]
    #[test_case("FALSE", LogicalType::Bool)]
    #[test_case("42", LogicalType::Int64)]
    #[test_case("-1", LogicalType::Int64)]
    #[test_case("4.5", LogicalType::Double)]
    #[test_case("1e10", LogicalType::Double)]
    #[test_case("2024-06-01", LogicalType::Date)]
    #[test_case("2024-06-01 12:00:00", LogicalType::Timestamp)]
    #[test_case("3 days", LogicalType::Interval)]
    #[test_case("alice", LogicalType::String)]
    fn precedence(cell: &str, expected: LogicalType) {
        assert_eq!(infer_cell_type(cell), expected);
    }

    #[test]
    fn merging_widens() {
        assert_eq!(
            merge_types(LogicalType::Int64, LogicalType::Double),
            LogicalType::Double
        );
        assert_eq!(
            merge_types(LogicalType::Date, LogicalType::Timestamp),
            LogicalType::Timestamp
        );
        assert_eq!(
            merge_types(LogicalType::Bool, LogicalType::Int64),
            LogicalType::String
        );
    }

    #[test]
    fn sniffs_over_rows_with_empties() {
        let mut driver = SniffDriver::new(10);
        for row in [["1", "x"], ["2", ""], ["3.5", "y"]] {
            for (i, cell) in row.iter().enumerate() {
                driver.add_value(0, i, cell.as_bytes());
            }
            driver.add_row(0, row.len());
        }
        assert_eq!(
            driver.infer_column_types(),
            vec![LogicalType::Double, LogicalType::String]
        );
    }

    #[test]
    fn header_pairing_fills_gaps() {
        let named = name_columns(
            &["id".to_string(), "when".to_string()],
            vec![LogicalType::Int64, LogicalType::Date, LogicalType::Bool],
        );
        assert_eq!(named.len(), 3);
        assert_eq!(named[0], ("id".to_string(), LogicalType::Int64));
        assert_eq!(named[2], ("column2".to_string(), LogicalType::Bool));
    }
}
