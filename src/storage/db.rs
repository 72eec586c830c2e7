//! Database persistence layer using Sled
//!
//! One tree holds every column; keys are prefixed with the column byte so a
//! `sled::Batch` can cover writes to several columns at once.

use std::path::Path;

use sled::Db;

use super::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

/// Sled-backed engine
#[derive(Debug, Clone)]
pub struct SledStore {
    db: Db,
}

fn column_key(column: Column, key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(key.len() + 1);
    full.push(column.prefix());
    full.extend_from_slice(key);
    full
}

impl SledStore {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Throwaway database for tests
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }
}

impl KeyValueStore for SledStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.db.get(column_key(column, key))?.map(|value| value.to_vec()))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut sled_batch = sled::Batch::default();
        for op in batch {
            match op {
                WriteOp::Put { column, key, value } => sled_batch.insert(column_key(column, &key), value),
                WriteOp::Delete { column, key } => sled_batch.remove(column_key(column, &key)),
            }
        }
        self.db.apply_batch(sled_batch)?;
        self.db.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_roundtrip() {
        let store = SledStore::temporary().unwrap();
        let mut batch = WriteBatch::new();
        batch.put(Column::Block, b"block", vec![1, 2, 3]);
        batch.put(Column::Meta, b"block", vec![4]);
        store.write_batch(batch).unwrap();

        assert_eq!(store.get(Column::Block, b"block").unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(store.get(Column::Meta, b"block").unwrap(), Some(vec![4]));

        store.delete(Column::Block, b"block").unwrap();
        assert_eq!(store.get(Column::Block, b"block").unwrap(), None);
    }
}
