//! Mutable in-memory table.
//!
//! Buffers writes in a `BTreeMap` so they are already sorted and deduplicated
//! when flushed to an [`SsTable`](crate::SsTable). Each mutation is stamped
//! with the next tick of a logical clock.

use crate::sstable::{serialize, SsTableInfo};
use crate::table::{CellIter, Table};
use crate::{Cell, Key, Result, StorageError, Timestamp, Value};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;

/// Per-entry overhead counted by `size_in_bytes` (the timestamp).
const ENTRY_OVERHEAD: u64 = 8;

/// Largest timestamp a table file can store.
const MAX_TIMESTAMP: Timestamp = i64::MAX as Timestamp;

#[derive(Debug)]
pub struct MemTable {
    map: BTreeMap<Key, Value>,
    clock: Timestamp,
    approx_size: u64,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    pub fn new() -> Self {
        Self::with_clock(1)
    }

    /// Starts the logical clock at `first_tick`. Use the largest timestamp
    /// already on disk plus one so new writes shadow flushed ones.
    pub fn with_clock(first_tick: Timestamp) -> Self {
        Self {
            map: BTreeMap::new(),
            clock: first_tick.max(1),
            approx_size: 0,
        }
    }

    /// Timestamp the next mutation will get.
    pub fn next_timestamp(&self) -> Timestamp {
        self.clock
    }

    /// Inserts a cell with its own timestamp, e.g. during replay.
    ///
    /// A cell older than the entry already held for its key is ignored;
    /// returns whether it was applied. The clock moves past the cell's
    /// timestamp either way.
    pub fn insert(&mut self, cell: Cell) -> bool {
        let (key, value) = cell.into_parts();
        self.clock = self.clock.max(value.timestamp().saturating_add(1));

        if let Some(old) = self.map.get(&key) {
            if old.timestamp() > value.timestamp() {
                return false;
            }
        }
        self.put(key, value);
        true
    }

    /// Latest version held for `key`, tombstones included.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of every cell in key order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        self.range_from(&[])
    }

    /// Writes the current contents to a new table at `path`.
    pub fn flush(&self, path: impl AsRef<Path>) -> Result<SsTableInfo> {
        serialize(path, self.cells())
    }

    fn range_from<'a>(&'a self, from: &[u8]) -> impl Iterator<Item = Cell> + 'a {
        self.map
            .range::<[u8], _>((Bound::Included(from), Bound::Unbounded))
            .map(|(k, v)| Cell::new(k.clone(), v.clone()))
    }

    fn tick(&mut self) -> Result<Timestamp> {
        let now = self.clock;
        if now > MAX_TIMESTAMP {
            return Err(StorageError::Encode(format!(
                "logical clock exhausted at {}",
                now
            )));
        }
        self.clock = now + 1;
        Ok(now)
    }

    fn put(&mut self, key: Key, value: Value) {
        let added = entry_size(&key, &value);
        if let Some(old) = self.map.insert(key.clone(), value) {
            self.approx_size -= entry_size(&key, &old);
        }
        self.approx_size += added;
    }
}

fn entry_size(key: &[u8], value: &Value) -> u64 {
    let data = value.data().map_or(0, <[u8]>::len);
    (key.len() + data) as u64 + ENTRY_OVERHEAD
}

impl Table for MemTable {
    fn iter(&self, from: &[u8]) -> Result<CellIter<'_>> {
        Ok(Box::new(self.range_from(from).map(Ok::<_, StorageError>)))
    }

    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let ts = self.tick()?;
        self.put(key.to_vec(), Value::new_live(ts, value.to_vec()));
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<()> {
        let ts = self.tick()?;
        self.put(key.to_vec(), Value::new_tombstone(ts));
        Ok(())
    }

    fn size(&self) -> u64 {
        self.map.len() as u64
    }

    fn size_in_bytes(&self) -> u64 {
        self.approx_size
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}
