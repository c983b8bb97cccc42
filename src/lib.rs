pub mod cell;
pub mod error;
pub mod memtable;
pub mod sstable;
pub mod table;
pub mod value;

pub use cell::{Cell, NewestFirst, OldestFirst, VersionOrder};
pub use error::{Result, StorageError};
pub use memtable::MemTable;
pub use sstable::{serialize, try_serialize, SsTable, SsTableInfo, SsTableWriter, WriteOptions};
pub use table::{CellIter, Table};
pub use value::Value;

// Core types that everything uses
pub type Key = Vec<u8>;
pub type Timestamp = u64; // Logical write time
