//! Typed access to chain data
//!
//! Values are bincode encoded. Every accessor goes through the wrapped store,
//! so the same ledger code runs against a staged overlay or a database.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::consensus::BlockState;
use crate::crypto::Hash;
use crate::validation::{Transaction, TxKind, TxOutput, TxRef};

use super::{Column, KeyValueStore, StoreError};

const BEST_KEY: &[u8] = b"best";

#[derive(Clone, Copy)]
pub struct Ledger<'a> {
    kv: &'a dyn KeyValueStore,
}

fn tx_key(tx: &TxRef) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(match tx.kind {
        TxKind::Legacy => 0,
        TxKind::Tritium => 1,
    });
    key.extend_from_slice(&tx.hash.0);
    key
}

fn outpoint_key(tx_hash: &Hash, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(36);
    key.extend_from_slice(&tx_hash.0);
    key.extend_from_slice(&index.to_le_bytes());
    key
}

impl<'a> Ledger<'a> {
    pub fn new(kv: &'a dyn KeyValueStore) -> Self {
        Self { kv }
    }

    pub fn store(&self) -> &'a dyn KeyValueStore {
        self.kv
    }

    fn read<T: DeserializeOwned>(&self, column: Column, key: &[u8]) -> Result<Option<T>, StoreError> {
        match self.kv.get(column, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, column: Column, key: &[u8], value: &T) -> Result<(), StoreError> {
        self.kv.put(column, key, bincode::serialize(value)?)
    }

    // Blocks

    pub fn read_block(&self, hash: &Hash) -> Result<Option<BlockState>, StoreError> {
        self.read(Column::Block, &hash.0)
    }

    pub fn write_block(&self, state: &BlockState) -> Result<(), StoreError> {
        self.write(Column::Block, &state.hash().0, state)
    }

    pub fn erase_block(&self, hash: &Hash) -> Result<(), StoreError> {
        self.kv.delete(Column::Block, &hash.0)
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool, StoreError> {
        self.kv.contains(Column::Block, &hash.0)
    }

    /// Predecessor of `state`, `None` for genesis
    pub fn prev(&self, state: &BlockState) -> Result<Option<BlockState>, StoreError> {
        if state.is_genesis() {
            return Ok(None);
        }
        self.read_block(&state.prev_hash())
    }

    /// Canonical successor of `state`
    pub fn next(&self, state: &BlockState) -> Result<Option<BlockState>, StoreError> {
        if state.hash_next.is_zero() {
            return Ok(None);
        }
        self.read_block(&state.hash_next)
    }

    pub fn read_best(&self) -> Result<Option<Hash>, StoreError> {
        self.read(Column::Meta, BEST_KEY)
    }

    pub fn write_best(&self, hash: &Hash) -> Result<(), StoreError> {
        self.write(Column::Meta, BEST_KEY, hash)
    }

    // Transactions

    pub fn read_tx(&self, tx: &TxRef) -> Result<Option<Transaction>, StoreError> {
        self.read(Column::Tx, &tx_key(tx))
    }

    pub fn write_tx(&self, tx: &Transaction) -> Result<(), StoreError> {
        self.write(Column::Tx, &tx_key(&tx.to_ref()), tx)
    }

    pub fn has_tx(&self, tx: &TxRef) -> Result<bool, StoreError> {
        self.kv.contains(Column::Tx, &tx_key(tx))
    }

    /// Output `index` of a stored legacy transaction
    pub fn read_output(&self, tx_hash: &Hash, index: u32) -> Result<Option<TxOutput>, StoreError> {
        match self.read_tx(&TxRef::new(TxKind::Legacy, *tx_hash))? {
            Some(Transaction::Legacy(tx)) => Ok(tx.outputs.get(index as usize).cloned()),
            _ => Ok(None),
        }
    }

    // Transaction -> block index

    pub fn has_index(&self, tx_hash: &Hash) -> Result<bool, StoreError> {
        self.kv.contains(Column::TxIndex, &tx_hash.0)
    }

    pub fn read_index(&self, tx_hash: &Hash) -> Result<Option<Hash>, StoreError> {
        self.read(Column::TxIndex, &tx_hash.0)
    }

    pub fn index_tx(&self, tx_hash: &Hash, block: &Hash) -> Result<(), StoreError> {
        self.write(Column::TxIndex, &tx_hash.0, block)
    }

    pub fn erase_index(&self, tx_hash: &Hash) -> Result<(), StoreError> {
        self.kv.delete(Column::TxIndex, &tx_hash.0)
    }

    // Canonical height index

    pub fn read_height(&self, height: u32) -> Result<Option<Hash>, StoreError> {
        self.read(Column::Height, &height.to_be_bytes())
    }

    pub fn index_height(&self, height: u32, block: &Hash) -> Result<(), StoreError> {
        self.write(Column::Height, &height.to_be_bytes(), block)
    }

    pub fn erase_height(&self, height: u32) -> Result<(), StoreError> {
        self.kv.delete(Column::Height, &height.to_be_bytes())
    }

    // Legacy spends

    pub fn read_spent(&self, tx_hash: &Hash, index: u32) -> Result<Option<Hash>, StoreError> {
        self.read(Column::Spent, &outpoint_key(tx_hash, index))
    }

    pub fn write_spent(&self, tx_hash: &Hash, index: u32, spender: &Hash) -> Result<(), StoreError> {
        self.write(Column::Spent, &outpoint_key(tx_hash, index), spender)
    }

    pub fn erase_spent(&self, tx_hash: &Hash, index: u32) -> Result<(), StoreError> {
        self.kv.delete(Column::Spent, &outpoint_key(tx_hash, index))
    }

    // Sigchain pointers

    pub fn read_last_tx(&self, genesis: &Hash) -> Result<Option<Hash>, StoreError> {
        self.read(Column::LastTx, &genesis.0)
    }

    pub fn write_last_tx(&self, genesis: &Hash, tx: &Hash) -> Result<(), StoreError> {
        self.write(Column::LastTx, &genesis.0, tx)
    }

    pub fn erase_last_tx(&self, genesis: &Hash) -> Result<(), StoreError> {
        self.kv.delete(Column::LastTx, &genesis.0)
    }

    pub fn read_last_stake(&self, genesis: &Hash) -> Result<Option<Hash>, StoreError> {
        self.read(Column::LastStake, &genesis.0)
    }

    pub fn write_last_stake(&self, genesis: &Hash, tx: &Hash) -> Result<(), StoreError> {
        self.write(Column::LastStake, &genesis.0, tx)
    }

    pub fn erase_last_stake(&self, genesis: &Hash) -> Result<(), StoreError> {
        self.kv.delete(Column::LastStake, &genesis.0)
    }
}
