use crate::sstable::SsTable;
use crate::{Cell, Result};

/// Forward cursor over the rows of an [`SsTable`].
///
/// Each step costs one key read and one value read at the current row. A
/// decode or I/O failure is yielded as `Err`, after which the iterator is
/// exhausted.
pub struct SsTableIter<'a> {
    table: &'a SsTable,
    next: u64,
    end: u64,
}

impl<'a> SsTableIter<'a> {
    pub(crate) fn new(table: &'a SsTable, start: u64) -> Self {
        Self {
            table,
            next: start,
            end: table.size(),
        }
    }

    /// Row the next call to `next` will read.
    pub fn position(&self) -> u64 {
        self.next
    }

    fn read_row(&self, row: u64) -> Result<Cell> {
        let key = self.table.key_at(row)?;
        let value = self.table.value_at(row)?;
        Ok(Cell::new(key, value))
    }
}

impl Iterator for SsTableIter<'_> {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }

        let row = self.next;
        let cell = self.read_row(row);
        self.next = if cell.is_ok() { row + 1 } else { self.end };
        Some(cell)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.end.saturating_sub(self.next);
        match usize::try_from(remaining) {
            Ok(n) => (0, Some(n)),
            Err(_) => (0, None),
        }
    }
}

impl std::iter::FusedIterator for SsTableIter<'_> {}
