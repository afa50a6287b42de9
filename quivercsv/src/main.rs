//! Command-line bulk importer: create tables from CSV headers and copy CSV
//! files into a quiver database.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;
use quiver::{sniff_csv, ColumnDefinition, CopyProgress, CsvOption, Database};

#[derive(Parser)]
#[clap(version, about)]
struct Cli {
    /// Verbosity (-v sets info, -vv debug).
    #[clap(short = 'v', long, parse(from_occurrences), global = true)]
    verbose: usize,
    /// Database directory; created on first use.
    #[clap(long, env = "QUIVER_DB", global = true, default_value = "./quiver-db")]
    db: PathBuf,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Infer a schema from a CSV file and create a node table for it.
    CreateTable {
        /// Table to create.
        #[clap(long)]
        table: String,
        /// CSV file whose header and leading rows define the columns.
        file: PathBuf,
        /// Primary key column; defaults to the first column.
        #[clap(long)]
        primary_key: Option<String>,
        #[clap(flatten)]
        csv: CsvArgs,
    },
    /// Copy a CSV file into an existing table.
    Copy {
        /// Target table.
        #[clap(long)]
        table: String,
        /// Source CSV file.
        file: PathBuf,
        #[clap(flatten)]
        csv: CsvArgs,
        /// Record and skip malformed lines instead of failing.
        #[clap(long)]
        ignore_errors: bool,
    },
    /// List tables and their row counts.
    Tables,
}

#[derive(Args)]
struct CsvArgs {
    /// Field delimiter.
    #[clap(long, default_value = ",")]
    delimiter: char,
    /// Treat the first row as data instead of a header.
    #[clap(long)]
    no_header: bool,
    /// Leading rows to discard.
    #[clap(long, default_value = "0")]
    skip: u64,
}

impl CsvArgs {
    fn to_option(&self) -> anyhow::Result<CsvOption> {
        if !self.delimiter.is_ascii() {
            bail!("delimiter must be a single ASCII character");
        }
        let mut option = CsvOption::default();
        option.delimiter = self.delimiter as u8;
        option.has_header = !self.no_header;
        option.skip_num = self.skip;
        Ok(option)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    stderrlog::new()
        .module(module_path!())
        .module("quiver_core")
        .verbosity(cli.verbose + 1)
        .init()?;

    let db = Database::open(&cli.db)
        .with_context(|| format!("opening database at {}", cli.db.display()))?;

    match cli.command {
        Command::CreateTable {
            table,
            file,
            primary_key,
            csv,
        } => {
            let option = csv.to_option()?;
            let sniffed = sniff_csv(&file, option)
                .with_context(|| format!("sniffing {}", file.display()))?;
            if sniffed.is_empty() {
                bail!("{} has no columns to infer", file.display());
            }
            let columns: Vec<ColumnDefinition> = sniffed
                .into_iter()
                .map(|(name, data_type)| ColumnDefinition::new(name, data_type))
                .collect();
            let primary_key =
                primary_key.unwrap_or_else(|| columns[0].name.clone());
            for column in &columns {
                info!("inferred {}: {}", column.name, column.data_type);
            }
            db.create_node_table(&table, columns, &primary_key)?;
            println!("created table {table}");
        }
        Command::Copy {
            table,
            file,
            csv,
            ignore_errors,
        } => {
            let mut option = csv.to_option()?;
            option.ignore_errors = ignore_errors;
            let session = db.session();
            // A watcher thread reads the copy's shared offset trackers and
            // reports progress while the load runs.
            let progress = CopyProgress::new();
            let finished = AtomicBool::new(false);
            let result = std::thread::scope(|scope| {
                scope.spawn(|| {
                    while !finished.load(Ordering::Relaxed) {
                        std::thread::sleep(Duration::from_millis(250));
                        let total = progress.total_bytes();
                        if total > 0 && !finished.load(Ordering::Relaxed) {
                            info!(
                                "copy progress: {}/{} bytes ({:.0}%)",
                                progress.bytes_read(),
                                total,
                                100.0 * progress.fraction()
                            );
                        }
                    }
                });
                let result =
                    db.copy_with_progress(&session, &table, &file, option, &progress);
                finished.store(true, Ordering::Relaxed);
                result
            });
            let result =
                result.with_context(|| format!("copying {}", file.display()))?;
            println!("inserted {} rows into {table}", result.rows_inserted);
            if !result.errors.is_empty() {
                println!("skipped {} malformed lines:", result.errors.len());
                for error in &result.errors {
                    println!(
                        "  block {} bytes {}..{}: {} ({})",
                        error.block_idx,
                        error.line.start_byte_offset,
                        error.line.end_byte_offset,
                        error.line_text,
                        error.message
                    );
                }
            }
        }
        Command::Tables => {
            for name in db.table_names() {
                println!("{name}\t{} rows", db.num_rows(&name));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use assert_cmd::Command;

    #[test]
    fn help_prints_usage() {
        Command::cargo_bin("quivercsv")
            .unwrap()
            .arg("--help")
            .assert()
            .success();
    }
}
