//! Key-value storage contract
//!
//! Engines expose logical columns over plain byte keys. Multi-key updates go
//! through a `WriteBatch`, which an engine must apply atomically.

use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] sled::Error),
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Logical columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Column {
    /// Block hash -> BlockState
    Block = 0,
    /// (kind, tx hash) -> transaction body
    Tx = 1,
    /// Tx hash -> containing block hash
    TxIndex = 2,
    /// Canonical height -> block hash
    Height = 3,
    /// Spent legacy outpoint -> spending tx hash
    Spent = 4,
    /// Sigchain id -> last transaction hash
    LastTx = 5,
    /// Sigchain id -> last coinstake hash
    LastStake = 6,
    Meta = 7,
}

impl Column {
    pub fn prefix(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { column: Column, key: Vec<u8>, value: Vec<u8> },
    Delete { column: Column, key: Vec<u8> },
}

/// An ordered set of writes applied as one unit
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: &[u8], value: Vec<u8>) {
        self.ops.push(WriteOp::Put { column, key: key.to_vec(), value });
    }

    pub fn delete(&mut self, column: Column, key: &[u8]) {
        self.ops.push(WriteOp::Delete { column, key: key.to_vec() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }
}

impl IntoIterator for WriteBatch {
    type Item = WriteOp;
    type IntoIter = std::vec::IntoIter<WriteOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply every write of `batch`, or none of them
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError>;

    fn put(&self, column: Column, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.put(column, key, value);
        self.write_batch(batch)
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(column, key);
        self.write_batch(batch)
    }

    fn contains(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// In-memory engine
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<(Column, Vec<u8>), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries in `column`
    pub fn count(&self, column: Column) -> Result<usize, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.keys().filter(|(col, _)| *col == column).count())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(&(column, key.to_vec())).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::Poisoned)?;
        for op in batch {
            match op {
                WriteOp::Put { column, key, value } => {
                    entries.insert((column, key), value);
                }
                WriteOp::Delete { column, key } => {
                    entries.remove(&(column, key));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_separate() {
        let store = MemoryStore::new();
        store.put(Column::Block, b"k", vec![1]).unwrap();
        store.put(Column::Tx, b"k", vec![2]).unwrap();

        assert_eq!(store.get(Column::Block, b"k").unwrap(), Some(vec![1]));
        assert_eq!(store.get(Column::Tx, b"k").unwrap(), Some(vec![2]));
        assert_eq!(store.get(Column::Meta, b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_applies_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(Column::Meta, b"a", vec![1]);
        batch.delete(Column::Meta, b"a");
        batch.put(Column::Meta, b"b", vec![2]);
        assert_eq!(batch.len(), 3);

        store.write_batch(batch).unwrap();
        assert!(!store.contains(Column::Meta, b"a").unwrap());
        assert!(store.contains(Column::Meta, b"b").unwrap());
        assert_eq!(store.count(Column::Meta).unwrap(), 1);
    }
}
