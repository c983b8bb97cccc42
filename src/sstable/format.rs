//! Table file layout and row codec.
//!
//! ```text
//! File        := Row* OffsetArray RowCount
//! Row         := key_len (i32) | key | timestamp (i64) | [val_len (i32) | val]
//! OffsetArray := row offset (i64), one per row, ascending
//! RowCount    := i64, always the last 8 bytes
//! ```
//!
//! All integers are big-endian. A tombstone stores its timestamp negated and
//! has no value part, so a tombstone at timestamp 0 is not representable.
//!
//! There is no version field. A future format must grow the footer so that
//! this reader sees an inconsistent row count and refuses the file.

use crate::{Cell, Result, StorageError};
use bytes::{BufMut, BytesMut};

/// Size of the trailing row count.
pub const FOOTER_BYTES: u64 = 8;

/// Size of one offset array entry.
pub const OFFSET_BYTES: u64 = 8;

pub const KEY_LEN_BYTES: u64 = 4;
pub const TIMESTAMP_BYTES: u64 = 8;
pub const VALUE_LEN_BYTES: u64 = 4;

/// Smallest possible row: empty key, tombstone.
pub const MIN_ROW_BYTES: u64 = KEY_LEN_BYTES + TIMESTAMP_BYTES;

/// Appends the encoding of `cell` to `buf`.
pub fn encode_row(buf: &mut BytesMut, cell: &Cell) -> Result<()> {
    let key = cell.key();
    let value = cell.value();

    let key_len = checked_len(key.len(), "key")?;
    let timestamp = i64::try_from(value.timestamp()).map_err(|_| {
        StorageError::Encode(format!("timestamp {} exceeds i64::MAX", value.timestamp()))
    })?;

    buf.reserve(encoded_len(cell));
    buf.put_i32(key_len);
    buf.put_slice(key);

    match value.data() {
        None => {
            if timestamp == 0 {
                return Err(StorageError::Encode(
                    "tombstone at timestamp 0 cannot be stored".into(),
                ));
            }
            buf.put_i64(-timestamp);
        }
        Some(data) => {
            buf.put_i64(timestamp);
            buf.put_i32(checked_len(data.len(), "value")?);
            buf.put_slice(data);
        }
    }

    Ok(())
}

/// Appends the offset array and row count for rows starting at `offsets`.
pub fn encode_footer(buf: &mut BytesMut, offsets: &[u64]) -> Result<()> {
    buf.reserve(offsets.len() * OFFSET_BYTES as usize + FOOTER_BYTES as usize);
    for &offset in offsets {
        buf.put_i64(checked_i64(offset, "row offset")?);
    }
    buf.put_i64(checked_i64(offsets.len() as u64, "row count")?);
    Ok(())
}

/// Number of bytes `encode_row` produces for `cell`.
pub fn encoded_len(cell: &Cell) -> usize {
    let mut len = (KEY_LEN_BYTES + TIMESTAMP_BYTES) as usize + cell.key().len();
    if let Some(data) = cell.value().data() {
        len += VALUE_LEN_BYTES as usize + data.len();
    }
    len
}

/// Splits a stored timestamp into `(magnitude, is_tombstone)`.
pub fn decode_timestamp(stored: i64) -> Option<(u64, bool)> {
    match stored {
        i64::MIN => None,
        ts if ts < 0 => Some((ts.unsigned_abs(), true)),
        ts => Some((ts as u64, false)),
    }
}

fn checked_i64(n: u64, what: &str) -> Result<i64> {
    i64::try_from(n).map_err(|_| StorageError::Encode(format!("{} {} exceeds i64::MAX", what, n)))
}

fn checked_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| StorageError::Encode(format!("{} of {} bytes exceeds i32::MAX", what, len)))
}
