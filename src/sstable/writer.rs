use crate::sstable::format::{encode_footer, encode_row};
use crate::sstable::SsTableInfo;
use crate::{Cell, Key, Result, StorageError};
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Knobs for [`SsTableWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// `fsync` the file before `finish` returns.
    pub sync: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self { sync: true }
    }
}

/// Streams sorted cells into a new table file.
///
/// Rows are appended as they arrive; their offsets are kept in memory and
/// written out with the row count by [`finish`](SsTableWriter::finish).
/// Dropping the writer without calling `finish` leaves a file with no valid
/// footer, which [`SsTable::open`](crate::SsTable::open) rejects.
pub struct SsTableWriter {
    path: PathBuf,
    out: BufWriter<File>,
    options: WriteOptions,
    offsets: Vec<u64>,
    position: u64,
    last_key: Option<Key>,
    row_buf: BytesMut,
}

impl SsTableWriter {
    /// Creates `path`, which must not exist yet.
    pub fn create(path: impl AsRef<Path>, options: WriteOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.clone()),
                _ => StorageError::Io(e),
            })?;

        debug!(path = ?path, "creating sstable");

        Ok(Self {
            path,
            out: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
            options,
            offsets: Vec::new(),
            position: 0,
            last_key: None,
            row_buf: BytesMut::new(),
        })
    }

    /// Appends one row. Keys must be strictly ascending.
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        if let Some(last) = &self.last_key {
            if cell.key() <= last.as_slice() {
                return Err(StorageError::Encode(format!(
                    "key {} is not greater than previous key {}",
                    hex::encode(cell.key()),
                    hex::encode(last)
                )));
            }
        }

        self.row_buf.clear();
        encode_row(&mut self.row_buf, cell)?;

        self.offsets.push(self.position);
        self.out.write_all(&self.row_buf)?;
        self.position += self.row_buf.len() as u64;

        match &mut self.last_key {
            Some(last) => {
                last.clear();
                last.extend_from_slice(cell.key());
            }
            None => self.last_key = Some(cell.key().to_vec()),
        }

        Ok(())
    }

    /// Number of rows added so far.
    pub fn rows(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Writes the offset array and the row count, then flushes.
    pub fn finish(mut self) -> Result<SsTableInfo> {
        let mut footer = BytesMut::new();
        encode_footer(&mut footer, &self.offsets)?;
        self.out.write_all(&footer)?;
        self.out.flush()?;

        if self.options.sync {
            self.out.get_ref().sync_all()?;
        }

        let info = SsTableInfo {
            path: self.path,
            rows: self.offsets.len() as u64,
            file_size: self.position + footer.len() as u64,
        };

        info!(
            path = ?info.path,
            rows = info.rows,
            bytes = info.file_size,
            "sstable written"
        );

        Ok(info)
    }

    // Removes the half-written file. Only called for files this writer created.
    fn abandon(self) {
        let path = self.path.clone();
        drop(self.out);
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = ?path, error = %e, "failed to remove partial sstable");
        }
    }
}

/// Writes `cells` to a new table at `path`.
///
/// `cells` must be in strictly ascending key order with duplicates already
/// resolved. Fails with [`StorageError::AlreadyExists`] if `path` exists.
/// On failure the partially written file is removed.
pub fn serialize<I>(path: impl AsRef<Path>, cells: I) -> Result<SsTableInfo>
where
    I: IntoIterator<Item = Cell>,
{
    try_serialize(path, cells.into_iter().map(Ok::<_, StorageError>))
}

/// Like [`serialize`], for sources that can fail mid-stream, such as another
/// table's iterator. The first error aborts the write.
pub fn try_serialize<I>(path: impl AsRef<Path>, cells: I) -> Result<SsTableInfo>
where
    I: IntoIterator<Item = Result<Cell>>,
{
    serialize_with(path, cells, WriteOptions::default())
}

pub fn serialize_with<I>(
    path: impl AsRef<Path>,
    cells: I,
    options: WriteOptions,
) -> Result<SsTableInfo>
where
    I: IntoIterator<Item = Result<Cell>>,
{
    let mut writer = SsTableWriter::create(path, options)?;

    for cell in cells {
        let added = cell.and_then(|cell| writer.add(&cell));
        if let Err(e) = added {
            writer.abandon();
            return Err(e);
        }
    }

    // finish consumes the writer, so clean up by path if it fails.
    let path = writer.path.clone();
    writer.finish().inspect_err(|_| {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = ?path, error = %e, "failed to remove partial sstable");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::format::FOOTER_BYTES;
    use tempfile::tempdir;

    #[test]
    fn test_empty_table_is_footer_only() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.sst");

        let info = serialize(&path, Vec::new())?;
        assert_eq!(info.rows, 0);
        assert_eq!(info.file_size, FOOTER_BYTES);
        assert_eq!(std::fs::read(&path)?, vec![0u8; 8]);
        Ok(())
    }

    #[test]
    fn test_exact_bytes() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("two.sst");

        serialize(
            &path,
            vec![Cell::live(b"a".to_vec(), 5, "x"), Cell::tombstone(b"b".to_vec(), 7)],
        )?;

        let mut expected = Vec::new();
        // row 0 at offset 0
        expected.extend_from_slice(&1i32.to_be_bytes());
        expected.extend_from_slice(b"a");
        expected.extend_from_slice(&5i64.to_be_bytes());
        expected.extend_from_slice(&1i32.to_be_bytes());
        expected.extend_from_slice(b"x");
        // row 1 at offset 18
        expected.extend_from_slice(&1i32.to_be_bytes());
        expected.extend_from_slice(b"b");
        expected.extend_from_slice(&(-7i64).to_be_bytes());
        // offsets, row count
        expected.extend_from_slice(&0i64.to_be_bytes());
        expected.extend_from_slice(&18i64.to_be_bytes());
        expected.extend_from_slice(&2i64.to_be_bytes());

        assert_eq!(std::fs::read(&path)?, expected);
        Ok(())
    }

    #[test]
    fn test_existing_path_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("taken.sst");
        std::fs::write(&path, b"keep me")?;

        let result = serialize(&path, vec![Cell::live(b"a".to_vec(), 1, "v")]);
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
        // The existing file is untouched.
        assert_eq!(std::fs::read(&path)?, b"keep me");
        Ok(())
    }

    #[test]
    fn test_unsorted_input_rejected_and_cleaned_up() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("unsorted.sst");

        let result = serialize(
            &path,
            vec![Cell::live(b"b".to_vec(), 1, "v"), Cell::live(b"a".to_vec(), 1, "v")],
        );
        assert!(matches!(result, Err(StorageError::Encode(_))));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_duplicate_keys_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("dup.sst");

        let result = serialize(
            &path,
            vec![Cell::live(b"a".to_vec(), 2, "new"), Cell::live(b"a".to_vec(), 1, "old")],
        );
        assert!(matches!(result, Err(StorageError::Encode(_))));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_source_error_aborts_write() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("failing.sst");

        let source = vec![
            Ok(Cell::live(b"a".to_vec(), 1, "v")),
            Err(StorageError::decode(1, "boom")),
        ];
        let result = try_serialize(&path, source);
        assert!(matches!(result, Err(StorageError::Decode { row: 1, .. })));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_writer_without_sync() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nosync.sst");

        let mut writer = SsTableWriter::create(&path, WriteOptions { sync: false })?;
        writer.add(&Cell::live(b"k".to_vec(), 3, "v"))?;
        assert_eq!(writer.rows(), 1);
        let info = writer.finish()?;

        assert_eq!(info.file_size, std::fs::metadata(&path)?.len());
        Ok(())
    }

    #[test]
    fn test_write_options_from_json() {
        let opts: WriteOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, WriteOptions::default());
        let opts: WriteOptions = serde_json::from_str(r#"{"sync": false}"#).unwrap();
        assert!(!opts.sync);
    }
}
