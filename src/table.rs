//! Capability shared by the mutable and immutable table variants.

use crate::{Cell, Result};

/// Iterator over the cells of a table, in ascending key order.
pub type CellIter<'a> = Box<dyn Iterator<Item = Result<Cell>> + 'a>;

/// What the read path and the flush/merge layers may do with a table.
///
/// Callers depend on this trait only; they never need to know whether they
/// hold a [`MemTable`](crate::MemTable) or an [`SsTable`](crate::SsTable).
pub trait Table {
    /// Cells with key `>= from`, ascending.
    fn iter(&self, from: &[u8]) -> Result<CellIter<'_>>;

    fn upsert(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn remove(&mut self, key: &[u8]) -> Result<()>;

    /// Number of cells, tombstones included.
    fn size(&self) -> u64;

    fn size_in_bytes(&self) -> u64;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}
