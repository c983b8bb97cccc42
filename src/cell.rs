//! Cells and their ordering.
//!
//! Cells sort by key first (unsigned byte-wise). When two sources hold the
//! same key, the order between their versions decides merge precedence. That
//! choice belongs to the merge layer, so it is passed in as a [`VersionOrder`]
//! instead of being baked into `Ord`.

use crate::{Key, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A key together with one version of its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    key: Key,
    value: Value,
}

impl Cell {
    pub fn new(key: Key, value: Value) -> Self {
        Cell { key, value }
    }

    pub fn live(key: impl Into<Key>, timestamp: u64, data: impl Into<Vec<u8>>) -> Self {
        Cell::new(key.into(), Value::new_live(timestamp, data.into()))
    }

    pub fn tombstone(key: impl Into<Key>, timestamp: u64) -> Self {
        Cell::new(key.into(), Value::new_tombstone(timestamp))
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Key, Value) {
        (self.key, self.value)
    }

    /// Key ascending, then `order` between the two versions.
    pub fn cmp_by<O: VersionOrder + ?Sized>(&self, other: &Cell, order: &O) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| order.compare(&self.value, &other.value))
    }
}

/// Total order between two versions of the same key.
///
/// `Less` means `a` takes precedence over `b` when merging.
pub trait VersionOrder {
    fn compare(&self, a: &Value, b: &Value) -> Ordering;
}

impl<F> VersionOrder for F
where
    F: Fn(&Value, &Value) -> Ordering,
{
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        self(a, b)
    }
}

/// Higher timestamp first.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestFirst;

/// Lower timestamp first.
#[derive(Debug, Clone, Copy, Default)]
pub struct OldestFirst;

impl VersionOrder for NewestFirst {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| same_time_tie_break(a, b))
    }
}

impl VersionOrder for OldestFirst {
    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| same_time_tie_break(a, b))
    }
}

// Equal timestamps: a tombstone wins over a live value, live values compare
// their bytes. Keeps both orders total.
fn same_time_tie_break(a: &Value, b: &Value) -> Ordering {
    match (a.data(), b.data()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}
