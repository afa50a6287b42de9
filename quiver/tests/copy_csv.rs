//! End-to-end bulk-load tests: CSV files through the full pipeline into the
//! data file, verified by scanning columns back out.

use std::fs;
use std::path::{Path, PathBuf};

use quiver::{
    ColumnDefinition, CopyProgress, CsvOption, Database, Error, LogicalType, Value,
};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    db: Database,
}

impl Fixture {
    fn new() -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(&dir.path().join("db")).unwrap();
        Fixture { dir, db }
    }

    fn csv(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn person_table(&self) {
        self.db
            .create_node_table(
                "person",
                vec![
                    ColumnDefinition::new("id", LogicalType::Int64),
                    ColumnDefinition::new("name", LogicalType::String),
                ],
                "id",
            )
            .unwrap();
    }
}

fn header_option() -> CsvOption {
    let mut option = CsvOption::default();
    option.has_header = true;
    option
}

fn ints(values: &[Value]) -> Vec<i64> {
    values
        .iter()
        .map(|v| match v {
            Value::Int64(i) => *i,
            other => panic!("expected INT64, got {other:?}"),
        })
        .collect()
}

fn strings(values: &[Value]) -> Vec<String> {
    values
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => panic!("expected STRING, got {other:?}"),
        })
        .collect()
}

#[test]
fn copy_nodes_and_scan() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("people.csv", b"id,name\n1,alice\n2,bob\n");
    let session = fixture.db.session();
    let result = fixture
        .db
        .copy(&session, "person", &file, header_option())
        .unwrap();
    assert_eq!(result.rows_inserted, 2);
    assert!(result.errors.is_empty());
    assert_eq!(fixture.db.num_rows("person"), 2);
    assert_eq!(
        ints(&fixture.db.scan_column("person", "id").unwrap()),
        vec![1, 2]
    );
    assert_eq!(
        strings(&fixture.db.scan_column("person", "name").unwrap()),
        vec!["alice", "bob"]
    );
}

#[test]
fn doubled_quotes_reach_storage_unescaped() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("quotes.csv", b"1,\"he said \"\"hi\"\"\"\n");
    let session = fixture.db.session();
    fixture
        .db
        .copy(&session, "person", &file, CsvOption::default())
        .unwrap();
    assert_eq!(
        fixture.db.scan_column("person", "name").unwrap(),
        vec![Value::String("he said \"hi\"".into())]
    );
}

#[test]
fn empty_field_loads_as_null_under_policy() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("gaps.csv", b"1,\n2,bob\n");
    let session = fixture.db.session();
    let result = fixture
        .db
        .copy(&session, "person", &file, CsvOption::default())
        .unwrap();
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(
        fixture.db.scan_column("person", "name").unwrap(),
        vec![Value::Null, Value::String("bob".into())]
    );
}

#[test]
fn bom_is_skipped_before_the_header() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("bom.csv", b"\xEF\xBB\xBFid,name\n1,alice\n");
    let session = fixture.db.session();
    let result = fixture
        .db
        .copy(&session, "person", &file, header_option())
        .unwrap();
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(
        ints(&fixture.db.scan_column("person", "id").unwrap()),
        vec![1]
    );
}

#[test]
fn skip_rows_with_crlf_line_endings() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("skip.csv", b"1,a\r\n2,b\r\n3,c\r\n");
    let mut option = CsvOption::default();
    option.skip_num = 1;
    let session = fixture.db.session();
    let result = fixture.db.copy(&session, "person", &file, option).unwrap();
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(
        ints(&fixture.db.scan_column("person", "id").unwrap()),
        vec![2, 3]
    );
    assert_eq!(
        strings(&fixture.db.scan_column("person", "name").unwrap()),
        vec!["b", "c"]
    );
}

#[test]
fn lenient_copy_records_and_skips_bad_lines() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("bad.csv", b"1,alice\neleven,bob\n2,carol\n3\n");
    let mut option = CsvOption::default();
    option.ignore_errors = true;
    let session = fixture.db.session();
    let result = fixture.db.copy(&session, "person", &file, option).unwrap();
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(result.errors.len(), 2);
    // A mid-line failure reconstructs the line up to the failure point.
    assert!(result.errors[0].line_text.contains("eleven"));
    assert!(result.errors[1].line_text.contains('3'));
    assert_eq!(
        ints(&fixture.db.scan_column("person", "id").unwrap()),
        vec![1, 2]
    );
}

#[test]
fn strict_copy_fails_and_commits_nothing() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("bad.csv", b"1,alice\neleven,bob\n");
    let session = fixture.db.session();
    let error = fixture
        .db
        .copy(&session, "person", &file, CsvOption::default())
        .unwrap_err();
    assert!(error.to_string().contains("eleven"), "{error}");
    assert_eq!(fixture.db.num_rows("person"), 0);
}

#[test]
fn copy_reports_progress_through_the_tracker() {
    let fixture = Fixture::new();
    fixture.person_table();
    let contents = b"1,alice\n2,bob\n3,carol\n";
    let file = fixture.csv("people.csv", contents);
    let session = fixture.db.session();
    let progress = CopyProgress::new();
    assert_eq!(progress.total_bytes(), 0);
    assert_eq!(progress.fraction(), 0.0);
    let result = fixture
        .db
        .copy_with_progress(&session, "person", &file, CsvOption::default(), &progress)
        .unwrap();
    assert_eq!(result.rows_inserted, 3);
    assert_eq!(progress.total_bytes(), contents.len() as u64);
    assert_eq!(progress.bytes_read(), progress.total_bytes());
    assert!((progress.fraction() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn interrupted_session_aborts_the_copy() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("people.csv", b"1,alice\n2,bob\n");
    let session = fixture.db.session();
    session.interrupt();
    let error = fixture
        .db
        .copy(&session, "person", &file, CsvOption::default())
        .unwrap_err();
    assert!(matches!(error, Error::Interrupted));
}

#[test]
fn non_csv_extensions_are_recognized_but_unimplemented() {
    let fixture = Fixture::new();
    fixture.person_table();
    let file = fixture.csv("people.parquet", b"not really parquet");
    let session = fixture.db.session();
    let error = fixture
        .db
        .copy(&session, "person", &file, CsvOption::default())
        .unwrap_err();
    assert!(matches!(error, Error::UnsupportedFileType(_)));
    assert!(error.to_string().contains("PARQUET"), "{error}");
}

#[test]
fn list_columns_round_trip() {
    let fixture = Fixture::new();
    fixture
        .db
        .create_node_table(
            "sample",
            vec![
                ColumnDefinition::new("id", LogicalType::Int64),
                ColumnDefinition::new(
                    "scores",
                    LogicalType::VarList {
                        child: Box::new(LogicalType::Int64),
                    },
                ),
                ColumnDefinition::new(
                    "pair",
                    LogicalType::FixedList {
                        child: Box::new(LogicalType::Int32),
                        num_elements: 2,
                    },
                ),
            ],
            "id",
        )
        .unwrap();
    let file = fixture.csv(
        "lists.csv",
        b"1,\"{10,20,30}\",\"{1,2}\"\n2,{},\"{3,4}\"\n",
    );
    let session = fixture.db.session();
    let result = fixture
        .db
        .copy(&session, "sample", &file, CsvOption::default())
        .unwrap();
    assert_eq!(result.rows_inserted, 2);
    assert_eq!(
        fixture.db.scan_column("sample", "scores").unwrap(),
        vec![
            Value::List(vec![
                Value::Int64(10),
                Value::Int64(20),
                Value::Int64(30)
            ]),
            Value::List(vec![]),
        ]
    );
    assert_eq!(
        fixture.db.scan_column("sample", "pair").unwrap(),
        vec![
            Value::List(vec![Value::Int32(1), Value::Int32(2)]),
            Value::List(vec![Value::Int32(3), Value::Int32(4)]),
        ]
    );
}

#[test]
fn date_and_timestamp_columns() {
    let fixture = Fixture::new();
    fixture
        .db
        .create_node_table(
            "event",
            vec![
                ColumnDefinition::new("id", LogicalType::Int64),
                ColumnDefinition::new("day", LogicalType::Date),
                ColumnDefinition::new("at", LogicalType::Timestamp),
            ],
            "id",
        )
        .unwrap();
    let file = fixture.csv(
        "events.csv",
        b"1,1970-01-02,1970-01-01 00:00:01\n2,2000-03-01,2000-03-01T12:00:00\n",
    );
    let session = fixture.db.session();
    fixture
        .db
        .copy(&session, "event", &file, CsvOption::default())
        .unwrap();
    assert_eq!(
        fixture.db.scan_column("event", "day").unwrap(),
        vec![Value::Date(1), Value::Date(11017)]
    );
    assert_eq!(
        fixture.db.scan_column("event", "at").unwrap()[0],
        Value::Timestamp(1_000_000)
    );
}

#[test]
fn rel_copy_resolves_endpoint_keys_to_offsets() {
    let fixture = Fixture::new();
    fixture.person_table();
    fixture
        .db
        .create_rel_table(
            "knows",
            "person",
            "person",
            vec![ColumnDefinition::new("since", LogicalType::Int64)],
        )
        .unwrap();
    let session = fixture.db.session();
    let people = fixture.csv("people.csv", b"1,alice\n2,bob\n3,carol\n");
    fixture
        .db
        .copy(&session, "person", &people, CsvOption::default())
        .unwrap();

    let knows = fixture.csv("knows.csv", b"1,2,2020\n2,3,2021\n3,1,2022\n");
    let result = fixture
        .db
        .copy(&session, "knows", &knows, CsvOption::default())
        .unwrap();
    assert_eq!(result.rows_inserted, 3);

    let src: Vec<u64> = fixture
        .db
        .scan_column("knows", "_src")
        .unwrap()
        .iter()
        .map(|v| match v {
            Value::InternalId(id) => id.offset,
            other => panic!("expected internal id, got {other:?}"),
        })
        .collect();
    assert_eq!(src, vec![0, 1, 2]);
    let dst: Vec<u64> = fixture
        .db
        .scan_column("knows", "_dst")
        .unwrap()
        .iter()
        .map(|v| match v {
            Value::InternalId(id) => id.offset,
            other => panic!("expected internal id, got {other:?}"),
        })
        .collect();
    assert_eq!(dst, vec![1, 2, 0]);
    assert_eq!(
        ints(&fixture.db.scan_column("knows", "since").unwrap()),
        vec![2020, 2021, 2022]
    );
}

#[test]
fn rel_copy_requires_loaded_nodes() {
    let fixture = Fixture::new();
    fixture.person_table();
    fixture
        .db
        .create_rel_table("knows", "person", "person", vec![])
        .unwrap();
    let session = fixture.db.session();
    let knows = fixture.csv("knows.csv", b"1,2\n");
    let error = fixture
        .db
        .copy(&session, "knows", &knows, CsvOption::default())
        .unwrap_err();
    assert!(matches!(error, Error::EmptyNodeTable(_)));
}

#[test]
fn unresolvable_key_is_subject_to_error_policy() {
    let fixture = Fixture::new();
    fixture.person_table();
    fixture
        .db
        .create_rel_table("knows", "person", "person", vec![])
        .unwrap();
    let session = fixture.db.session();
    let people = fixture.csv("people.csv", b"1,alice\n");
    fixture
        .db
        .copy(&session, "person", &people, CsvOption::default())
        .unwrap();
    let knows = fixture.csv("knows.csv", b"1,1\n1,99\n");
    let mut option = CsvOption::default();
    option.ignore_errors = true;
    let result = fixture.db.copy(&session, "knows", &knows, option).unwrap();
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("99"));
}

#[test]
fn duplicate_primary_key_fails_the_copy() {
    let fixture = Fixture::new();
    fixture.person_table();
    let session = fixture.db.session();
    let first = fixture.csv("a.csv", b"1,alice\n2,bob\n");
    fixture
        .db
        .copy(&session, "person", &first, CsvOption::default())
        .unwrap();
    let second = fixture.csv("b.csv", b"2,again\n");
    let error = fixture
        .db
        .copy(&session, "person", &second, CsvOption::default())
        .unwrap_err();
    assert!(matches!(error, Error::DuplicatePrimaryKey { .. }));
}

#[test]
fn appending_copies_accumulate_rows() {
    let fixture = Fixture::new();
    fixture.person_table();
    let session = fixture.db.session();
    let first = fixture.csv("a.csv", b"1,alice\n2,bob\n");
    let second = fixture.csv("b.csv", b"3,carol\n");
    fixture
        .db
        .copy(&session, "person", &first, CsvOption::default())
        .unwrap();
    fixture
        .db
        .copy(&session, "person", &second, CsvOption::default())
        .unwrap();
    assert_eq!(fixture.db.num_rows("person"), 3);
    assert_eq!(
        ints(&fixture.db.scan_column("person", "id").unwrap()),
        vec![1, 2, 3]
    );
}

#[test]
fn data_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let db_path: &Path = &dir.path().join("db");
    let csv_path = dir.path().join("people.csv");
    fs::write(&csv_path, b"1,alice\n2,bob\n").unwrap();
    {
        let db = Database::open(db_path).unwrap();
        db.create_node_table(
            "person",
            vec![
                ColumnDefinition::new("id", LogicalType::Int64),
                ColumnDefinition::new("name", LogicalType::String),
            ],
            "id",
        )
        .unwrap();
        let session = db.session();
        db.copy(&session, "person", &csv_path, CsvOption::default())
            .unwrap();
    }

    let db = Database::open(db_path).unwrap();
    assert_eq!(db.num_rows("person"), 2);
    assert_eq!(
        strings(&db.scan_column("person", "name").unwrap()),
        vec!["alice", "bob"]
    );

    // The primary-key index is rebuilt from flushed chunks, so rel copies
    // still resolve after a reopen.
    db.create_rel_table("knows", "person", "person", vec![])
        .unwrap();
    let rel_path = dir.path().join("knows.csv");
    fs::write(&rel_path, b"2,1\n").unwrap();
    let session = db.session();
    let result = db
        .copy(&session, "knows", &rel_path, CsvOption::default())
        .unwrap();
    assert_eq!(result.rows_inserted, 1);
    assert_eq!(
        db.scan_column("knows", "_src").unwrap(),
        vec![Value::InternalId(quiver::InternalId {
            table_id: 0,
            offset: 1
        })]
    );
}

#[test]
fn large_copy_splits_into_blocks_and_preserves_order() {
    let fixture = Fixture::new();
    fixture.person_table();

    // Past the parallel threshold and past one node group of rows.
    let num_rows: i64 = 200_000;
    let mut contents = Vec::with_capacity(num_rows as usize * 16);
    for i in 0..num_rows {
        contents.extend_from_slice(format!("{i},name{i}\n").as_bytes());
    }
    assert!(contents.len() > 2 * 1024 * 1024);
    let file = fixture.csv("big.csv", &contents);

    let session = fixture.db.session();
    let progress = CopyProgress::new();
    let result = fixture
        .db
        .copy_with_progress(&session, "person", &file, CsvOption::default(), &progress)
        .unwrap();
    assert_eq!(result.rows_inserted, num_rows as u64);
    assert!(result.errors.is_empty());
    // Every block reader registered its range; the clamped sum covers the
    // whole file once the copy is done.
    assert_eq!(progress.total_bytes(), contents.len() as u64);
    assert_eq!(progress.bytes_read(), progress.total_bytes());

    let ids = ints(&fixture.db.scan_column("person", "id").unwrap());
    assert_eq!(ids.len(), num_rows as usize);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(*id, i as i64, "row {i} out of order");
    }
    let names = strings(&fixture.db.scan_column("person", "name").unwrap());
    assert_eq!(names[123_456], "name123456");
}
