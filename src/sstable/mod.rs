//! SSTable (Sorted String Table) implementation
//!
//! Persistent, immutable, sorted storage for versioned cells. A table is
//! written once by [`serialize`] and then opened read-only as an [`SsTable`].
//! See [`format`] for the byte layout.

mod file;
pub mod format;
mod iter;
mod reader;
mod writer;

pub use iter::SsTableIter;
pub use reader::SsTable;
pub use writer::{serialize, serialize_with, try_serialize, SsTableWriter, WriteOptions};

use std::path::PathBuf;

/// Where a table lives and how big it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsTableInfo {
    pub path: PathBuf,
    pub rows: u64,
    pub file_size: u64,
}
