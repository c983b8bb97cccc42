//! Versioned payload stored against a key.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// A logical write time plus either data bytes or a deletion marker.
///
/// `data == None` is a tombstone: the key was removed at `timestamp`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    timestamp: Timestamp,
    data: Option<Vec<u8>>,
}

impl Value {
    pub fn new_live(timestamp: Timestamp, data: Vec<u8>) -> Self {
        Value {
            timestamp,
            data: Some(data),
        }
    }

    pub fn new_tombstone(timestamp: Timestamp) -> Self {
        Value {
            timestamp,
            data: None,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Payload bytes, `None` for a tombstone.
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn into_data(self) -> Option<Vec<u8>> {
        self.data
    }

    pub fn is_tombstone(&self) -> bool {
        self.data.is_none()
    }
}
