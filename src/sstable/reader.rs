use crate::sstable::file::PositionedFile;
use crate::sstable::format::{
    decode_timestamp, FOOTER_BYTES, KEY_LEN_BYTES, MIN_ROW_BYTES, OFFSET_BYTES, TIMESTAMP_BYTES,
    VALUE_LEN_BYTES,
};
use crate::sstable::{SsTableInfo, SsTableIter};
use crate::table::{CellIter, Table};
use crate::{Key, Result, StorageError, Value};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An open, immutable table file.
///
/// Only the footer is read on [`open`](SsTable::open); every other access is
/// a positioned read, so one `SsTable` can serve many threads at once.
#[derive(Debug)]
pub struct SsTable {
    path: PathBuf,
    file: PositionedFile,
    rows: u64,
    /// Start of the offset array, which is also the end of the row data.
    index_start: u64,
}

impl SsTable {
    /// Opens `path` and validates its footer.
    ///
    /// Besides the row count, the first and last offset entries are checked,
    /// so a truncated or foreign file fails here instead of on a later read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = PositionedFile::new(File::open(&path)?)?;
        let file_size = file.len();

        if file_size < FOOTER_BYTES {
            return Err(StorageError::malformed(
                &path,
                format!("{} bytes is smaller than the {} byte footer", file_size, FOOTER_BYTES),
            ));
        }

        let stored_rows = file.read_i64_at(file_size - FOOTER_BYTES)?;
        let rows = u64::try_from(stored_rows).map_err(|_| {
            StorageError::malformed(&path, format!("negative row count {}", stored_rows))
        })?;

        let index_start = rows
            .checked_mul(OFFSET_BYTES)
            .and_then(|index_len| (file_size - FOOTER_BYTES).checked_sub(index_len))
            .ok_or_else(|| {
                StorageError::malformed(
                    &path,
                    format!("row count {} does not fit in {} bytes", rows, file_size),
                )
            })?;

        if rows > 0 {
            if index_start < rows * MIN_ROW_BYTES {
                return Err(StorageError::malformed(
                    &path,
                    format!("{} bytes of row data cannot hold {} rows", index_start, rows),
                ));
            }

            let first = file.read_i64_at(index_start)?;
            if first != 0 {
                return Err(StorageError::malformed(
                    &path,
                    format!("first row offset is {}, expected 0", first),
                ));
            }

            let last = file.read_i64_at(file_size - FOOTER_BYTES - OFFSET_BYTES)?;
            let last_fits = u64::try_from(last)
                .ok()
                .is_some_and(|last| last + MIN_ROW_BYTES <= index_start);
            if !last_fits {
                return Err(StorageError::malformed(
                    &path,
                    format!("last row offset {} overlaps the offset array", last),
                ));
            }
        } else if index_start != 0 {
            return Err(StorageError::malformed(
                &path,
                format!("empty table has {} stray bytes", index_start),
            ));
        }

        debug!(path = ?path, rows, bytes = file_size, "opened sstable");

        Ok(Self {
            path,
            file,
            rows,
            index_start,
        })
    }

    pub fn size(&self) -> u64 {
        self.rows
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.file.len()
    }

    pub fn info(&self) -> SsTableInfo {
        SsTableInfo {
            path: self.path.clone(),
            rows: self.rows,
            file_size: self.file.len(),
        }
    }

    /// Byte offset where `row` starts.
    pub fn offset_of(&self, row: u64) -> Result<u64> {
        if row >= self.rows {
            return Err(StorageError::decode(
                row,
                format!("row out of range, table has {} rows", self.rows),
            ));
        }

        let slot = self.file.len() - FOOTER_BYTES - OFFSET_BYTES * (self.rows - row);
        let offset = self.file.read_i64_at(slot)?;

        u64::try_from(offset)
            .ok()
            .filter(|&offset| offset + MIN_ROW_BYTES <= self.index_start)
            .ok_or_else(|| StorageError::decode(row, format!("invalid row offset {}", offset)))
    }

    /// Key of `row`, without touching its value.
    pub fn key_at(&self, row: u64) -> Result<Key> {
        let offset = self.offset_of(row)?;
        let key_len = self.read_len(row, offset, "key")?;
        let key_start = offset + KEY_LEN_BYTES;
        self.check_in_rows(row, key_start, key_len + TIMESTAMP_BYTES)?;

        Ok(self.file.read_vec_at(key_len as usize, key_start)?)
    }

    /// Value of `row`. A tombstone costs no read beyond its timestamp.
    pub fn value_at(&self, row: u64) -> Result<Value> {
        let offset = self.offset_of(row)?;
        let key_len = self.read_len(row, offset, "key")?;
        let ts_pos = offset + KEY_LEN_BYTES + key_len;
        self.check_in_rows(row, offset + KEY_LEN_BYTES, key_len + TIMESTAMP_BYTES)?;

        let stored = self.file.read_i64_at(ts_pos)?;
        let (timestamp, tombstone) = decode_timestamp(stored)
            .ok_or_else(|| StorageError::decode(row, format!("invalid timestamp {}", stored)))?;
        if tombstone {
            return Ok(Value::new_tombstone(timestamp));
        }

        let len_pos = ts_pos + TIMESTAMP_BYTES;
        self.check_in_rows(row, len_pos, VALUE_LEN_BYTES)?;
        let value_len = self.read_len(row, len_pos, "value")?;
        let data_pos = len_pos + VALUE_LEN_BYTES;
        self.check_in_rows(row, data_pos, value_len)?;

        let data = self.file.read_vec_at(value_len as usize, data_pos)?;
        Ok(Value::new_live(timestamp, data))
    }

    /// Smallest row whose key is `>= target`, or `size()` if there is none.
    pub fn binary_search(&self, target: &[u8]) -> Result<u64> {
        // Every key is >= the empty key.
        if target.is_empty() {
            return Ok(0);
        }

        let mut lo = 0u64;
        let mut hi = self.rows;

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)?.as_slice() < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        Ok(lo)
    }

    /// Exact-match lookup. Tombstones come back as `Some` so callers can let
    /// them shadow older tables.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let row = self.binary_search(key)?;
        if row == self.rows || self.key_at(row)? != key {
            return Ok(None);
        }
        self.value_at(row).map(Some)
    }

    /// Cells with key `>= from`, ascending.
    pub fn iter(&self, from: &[u8]) -> Result<SsTableIter<'_>> {
        let start = self.binary_search(from)?;
        Ok(SsTableIter::new(self, start))
    }

    /// Releases the file handle.
    pub fn close(self) -> Result<()> {
        debug!(path = ?self.path, "closing sstable");
        drop(self.file.into_inner());
        Ok(())
    }

    fn read_len(&self, row: u64, pos: u64, what: &str) -> Result<u64> {
        let len = self.file.read_i32_at(pos)?;
        u64::try_from(len)
            .map_err(|_| StorageError::decode(row, format!("negative {} length {}", what, len)))
    }

    // Row bytes must stay inside the data region, before the offset array.
    fn check_in_rows(&self, row: u64, start: u64, len: u64) -> Result<()> {
        match start.checked_add(len) {
            Some(end) if end <= self.index_start => Ok(()),
            _ => Err(StorageError::decode(
                row,
                format!(
                    "{} bytes at {} run past row data ending at {}",
                    len, start, self.index_start
                ),
            )),
        }
    }
}

impl Table for SsTable {
    fn iter(&self, from: &[u8]) -> Result<CellIter<'_>> {
        Ok(Box::new(SsTable::iter(self, from)?))
    }

    fn upsert(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Err(StorageError::Unsupported("table is immutable"))
    }

    fn remove(&mut self, _key: &[u8]) -> Result<()> {
        Err(StorageError::Unsupported("table is immutable"))
    }

    fn size(&self) -> u64 {
        self.rows
    }

    fn size_in_bytes(&self) -> u64 {
        self.file.len()
    }

    fn close(self) -> Result<()> {
        SsTable::close(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::serialize;
    use crate::Cell;
    use tempfile::tempdir;

    fn sample(dir: &Path) -> Result<SsTable> {
        let path = dir.join("sample.sst");
        serialize(
            &path,
            vec![
                Cell::live(b"a".to_vec(), 5, "x"),
                Cell::tombstone(b"b".to_vec(), 7),
                Cell::live(b"c".to_vec(), 3, "y"),
                Cell::live(b"e".to_vec(), 0, ""),
            ],
        )?;
        SsTable::open(&path)
    }

    #[test]
    fn test_indexed_access() -> Result<()> {
        let dir = tempdir()?;
        let table = sample(dir.path())?;

        assert_eq!(table.size(), 4);
        assert_eq!(table.offset_of(0)?, 0);
        assert_eq!(table.offset_of(1)?, 4 + 1 + 8 + 4 + 1);
        assert_eq!(table.key_at(2)?, b"c");
        assert_eq!(table.value_at(0)?, Value::new_live(5, b"x".to_vec()));
        assert_eq!(table.value_at(1)?, Value::new_tombstone(7));
        assert_eq!(table.value_at(3)?, Value::new_live(0, Vec::new()));
        Ok(())
    }

    #[test]
    fn test_row_out_of_range() -> Result<()> {
        let dir = tempdir()?;
        let table = sample(dir.path())?;

        assert!(matches!(table.key_at(4), Err(StorageError::Decode { row: 4, .. })));
        assert!(matches!(table.value_at(u64::MAX), Err(StorageError::Decode { .. })));
        Ok(())
    }

    #[test]
    fn test_binary_search_insertion_point() -> Result<()> {
        let dir = tempdir()?;
        let table = sample(dir.path())?;

        assert_eq!(table.binary_search(b"")?, 0);
        assert_eq!(table.binary_search(b"a")?, 0);
        assert_eq!(table.binary_search(b"aa")?, 1);
        assert_eq!(table.binary_search(b"b")?, 1);
        assert_eq!(table.binary_search(b"d")?, 3);
        assert_eq!(table.binary_search(b"e")?, 3);
        assert_eq!(table.binary_search(b"f")?, 4);
        assert_eq!(table.binary_search(&[0xFF])?, 4);
        Ok(())
    }

    #[test]
    fn test_get() -> Result<()> {
        let dir = tempdir()?;
        let table = sample(dir.path())?;

        assert_eq!(table.get(b"a")?, Some(Value::new_live(5, b"x".to_vec())));
        assert_eq!(table.get(b"b")?, Some(Value::new_tombstone(7)));
        assert_eq!(table.get(b"d")?, None);
        assert_eq!(table.get(b"z")?, None);
        Ok(())
    }

    #[test]
    fn test_mutation_unsupported() -> Result<()> {
        let dir = tempdir()?;
        let mut table = sample(dir.path())?;

        assert!(matches!(
            Table::upsert(&mut table, b"a", b"v"),
            Err(StorageError::Unsupported(_))
        ));
        assert!(matches!(
            Table::remove(&mut table, b"zzz"),
            Err(StorageError::Unsupported(_))
        ));
        // Still readable afterwards.
        assert_eq!(table.size(), 4);
        table.close()
    }

    #[test]
    fn test_info() -> Result<()> {
        let dir = tempdir()?;
        let table = sample(dir.path())?;
        let info = table.info();

        assert_eq!(info.path, dir.path().join("sample.sst"));
        assert_eq!(info.rows, 4);
        assert_eq!(info.file_size, std::fs::metadata(&info.path)?.len());
        assert_eq!(table.size_in_bytes(), info.file_size);
        Ok(())
    }
}
