//! Staged writes over another store
//!
//! Reads fall through to the base store unless the overlay has an entry.
//! Nothing reaches the base store until `commit`, which hands the whole
//! overlay over as a single batch.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

type Overlay = BTreeMap<(Column, Vec<u8>), Option<Vec<u8>>>;

pub struct StagedStore<'a> {
    base: &'a dyn KeyValueStore,
    overlay: RwLock<Overlay>,
}

impl<'a> StagedStore<'a> {
    pub fn new(base: &'a dyn KeyValueStore) -> Self {
        Self {
            base,
            overlay: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of staged writes
    pub fn pending(&self) -> Result<usize, StoreError> {
        Ok(self.overlay.read().map_err(|_| StoreError::Poisoned)?.len())
    }

    pub fn into_batch(self) -> Result<WriteBatch, StoreError> {
        let overlay = self.overlay.into_inner().map_err(|_| StoreError::Poisoned)?;
        let mut batch = WriteBatch::new();
        for ((column, key), value) in overlay {
            match value {
                Some(value) => batch.put(column, &key, value),
                None => batch.delete(column, &key),
            }
        }
        Ok(batch)
    }

    /// Write every staged change to the base store atomically
    pub fn commit(self) -> Result<(), StoreError> {
        let base = self.base;
        let batch = self.into_batch()?;
        if batch.is_empty() {
            return Ok(());
        }
        base.write_batch(batch)
    }
}

impl KeyValueStore for StagedStore<'_> {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        {
            let overlay = self.overlay.read().map_err(|_| StoreError::Poisoned)?;
            if let Some(staged) = overlay.get(&(column, key.to_vec())) {
                return Ok(staged.clone());
            }
        }
        self.base.get(column, key)
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut overlay = self.overlay.write().map_err(|_| StoreError::Poisoned)?;
        for op in batch {
            match op {
                WriteOp::Put { column, key, value } => {
                    overlay.insert((column, key), Some(value));
                }
                WriteOp::Delete { column, key } => {
                    overlay.insert((column, key), None);
                }
            }
        }
        Ok(())
    }
}
