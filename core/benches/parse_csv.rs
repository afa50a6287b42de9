//! Throughput of the CSV state machine over a synthetic file.

use std::io::Write;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use quiver_core::csv::{CsvColumnInfo, CsvErrorHandler, CsvReader, ParseDriver};
use quiver_core::options::CsvOption;

struct CountingDriver {
    rows: u64,
}

impl ParseDriver for CountingDriver {
    fn add_value(&mut self, _row_num: u64, _column_idx: usize, _value: &[u8]) -> bool {
        true
    }

    fn add_row(&mut self, _row_num: u64, _num_columns: usize) -> bool {
        self.rows += 1;
        true
    }
}

fn synthetic_csv(num_rows: usize, quoted: bool) -> Vec<u8> {
    let mut contents = Vec::with_capacity(num_rows * 32);
    for i in 0..num_rows {
        if quoted {
            contents
                .extend_from_slice(format!("{i},\"name {i}\",\"note, with comma\"\n").as_bytes());
        } else {
            contents.extend_from_slice(format!("{i},name{i},plain note\n").as_bytes());
        }
    }
    contents
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_csv");
    for (label, quoted) in [("unquoted", false), ("quoted", true)] {
        let contents = synthetic_csv(100_000, quoted);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&contents).unwrap();
        file.flush().unwrap();

        group.throughput(Throughput::Bytes(contents.len() as u64));
        group.bench_function(label, |b| {
            b.iter(|| {
                let handler = Arc::new(CsvErrorHandler::strict());
                let mut reader = CsvReader::new(
                    file.path(),
                    CsvOption::default(),
                    CsvColumnInfo::default(),
                    handler,
                    None,
                )
                .unwrap();
                let mut driver = CountingDriver { rows: 0 };
                reader.parse_csv(&mut driver).unwrap();
                assert_eq!(driver.rows, 100_000);
                driver.rows
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
