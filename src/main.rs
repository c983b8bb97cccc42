use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stratum::sstable::serialize_with;
use stratum::{Cell, NewestFirst, Result, SsTable, StorageError, Value, WriteOptions};

mod cli;

use cli::{Cli, Commands, OutputFormat};

/// One line of `load` input.
#[derive(Deserialize)]
struct InputRow {
    key: String,
    timestamp: u64,
    value: Option<String>,
}

/// One line of `dump --format json` output.
#[derive(Serialize)]
struct DumpRow {
    key: String,
    key_hex: String,
    timestamp: u64,
    tombstone: bool,
    value: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    match cli.command {
        Commands::Stats { path } => {
            let table = SsTable::open(&path)?;
            println!("rows:  {}", table.size());
            println!("bytes: {}", table.size_in_bytes());
            table.close()?;
        }
        Commands::Dump {
            path,
            from,
            limit,
            format,
        } => {
            let table = SsTable::open(&path)?;
            let mut out = BufWriter::new(io::stdout().lock());
            for cell in table.iter(from.as_bytes())?.take(limit.unwrap_or(usize::MAX)) {
                write_cell(&mut out, &cell?, format)?;
            }
            out.flush()?;
            table.close()?;
        }
        Commands::Get { path, key } => {
            let table = SsTable::open(&path)?;
            match table.get(key.as_bytes())? {
                Some(value) => match value.data() {
                    Some(data) => println!(
                        "Found key: \"{}\" @ {}, value: \"{}\"",
                        key,
                        value.timestamp(),
                        String::from_utf8_lossy(data)
                    ),
                    None => println!("Key \"{}\" deleted @ {}.", key, value.timestamp()),
                },
                None => println!("Key \"{}\" not found.", key),
            }
            table.close()?;
        }
        Commands::Load {
            path,
            input,
            no_sync,
        } => {
            let cells = read_input(&input)?;
            let options = WriteOptions { sync: !no_sync };
            let info = serialize_with(&path, cells.into_iter().map(Ok::<_, StorageError>), options)?;
            println!("Wrote {} rows ({} bytes) to {:?}", info.rows, info.file_size, info.path);
        }
    }

    Ok(())
}

/// Reads JSON lines, keeping the newest version of each key.
fn read_input(input: &Path) -> Result<Vec<Cell>> {
    let reader = BufReader::new(File::open(input)?);
    let mut cells = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: InputRow = serde_json::from_str(&line).map_err(io::Error::from)?;
        let value = match row.value {
            Some(v) => Value::new_live(row.timestamp, v.into_bytes()),
            None => Value::new_tombstone(row.timestamp),
        };
        cells.push(Cell::new(row.key.into_bytes(), value));
    }

    cells.sort_by(|a, b| a.cmp_by(b, &NewestFirst));
    cells.dedup_by(|later, kept| later.key() == kept.key());
    Ok(cells)
}

fn write_cell(out: &mut impl Write, cell: &Cell, format: OutputFormat) -> Result<()> {
    let value = cell.value();
    match format {
        OutputFormat::Text => {
            let shown = match value.data() {
                Some(data) => format!("\"{}\"", String::from_utf8_lossy(data)),
                None => "<tombstone>".to_string(),
            };
            writeln!(
                out,
                "{}\t@{}\t{}",
                String::from_utf8_lossy(cell.key()),
                value.timestamp(),
                shown
            )?;
        }
        OutputFormat::Json => {
            let row = DumpRow {
                key: String::from_utf8_lossy(cell.key()).into_owned(),
                key_hex: hex::encode(cell.key()),
                timestamp: value.timestamp(),
                tombstone: value.is_tombstone(),
                value: value.data().map(|d| String::from_utf8_lossy(d).into_owned()),
            };
            let json = serde_json::to_string(&row).map_err(io::Error::from)?;
            writeln!(out, "{}", json)?;
        }
        OutputFormat::Compact => {
            let shown = value.data().map(hex::encode).unwrap_or_default();
            writeln!(out, "{}={}", hex::encode(cell.key()), shown)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_input_keeps_newest_version() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("rows.jsonl");
        std::fs::write(
            &input,
            [
                r#"{"key": "b", "timestamp": 1, "value": "b-old"}"#,
                r#"{"key": "a", "timestamp": 4, "value": "a-only"}"#,
                "",
                r#"{"key": "b", "timestamp": 9, "value": "b-new"}"#,
                r#"{"key": "c", "timestamp": 7, "value": null}"#,
                r#"{"key": "c", "timestamp": 2, "value": "c-old"}"#,
                r#"{"key": "b", "timestamp": 5, "value": "b-mid"}"#,
            ]
            .join("\n"),
        )?;

        let cells = read_input(&input)?;
        assert_eq!(
            cells,
            vec![
                Cell::live(b"a".to_vec(), 4, "a-only"),
                Cell::live(b"b".to_vec(), 9, "b-new"),
                Cell::tombstone(b"c".to_vec(), 7),
            ]
        );

        // The result is ready for the writer as is.
        let info = serialize_with(
            dir.path().join("out.sst"),
            cells.into_iter().map(Ok::<_, StorageError>),
            WriteOptions { sync: false },
        )?;
        assert_eq!(info.rows, 3);
        Ok(())
    }

    #[test]
    fn test_read_input_rejects_bad_json() -> Result<()> {
        let dir = tempdir()?;
        let input = dir.path().join("bad.jsonl");
        std::fs::write(&input, r#"{"key": "a"}"#)?;

        assert!(matches!(read_input(&input), Err(StorageError::Io(_))));
        Ok(())
    }

    #[test]
    fn test_write_cell_formats() -> Result<()> {
        let live = Cell::live(b"k1".to_vec(), 3, "v");
        let dead = Cell::tombstone(b"k2".to_vec(), 8);

        let mut out = Vec::new();
        for format in [OutputFormat::Text, OutputFormat::Json, OutputFormat::Compact] {
            write_cell(&mut out, &live, format)?;
            write_cell(&mut out, &dead, format)?;
        }

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "k1\t@3\t\"v\"");
        assert_eq!(lines[1], "k2\t@8\t<tombstone>");
        assert_eq!(
            lines[2],
            r#"{"key":"k1","key_hex":"6b31","timestamp":3,"tombstone":false,"value":"v"}"#
        );
        assert_eq!(
            lines[3],
            r#"{"key":"k2","key_hex":"6b32","timestamp":8,"tombstone":true,"value":null}"#
        );
        assert_eq!(lines[4], "6b31=76");
        assert_eq!(lines[5], "6b32=");
        Ok(())
    }
}
