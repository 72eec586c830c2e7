//! Wallet implementation
//!
//! Tracks coins paying to local keys as the chain connects transactions, and
//! refunds staked inputs when a local coinstake is disconnected.
//! The wallet does NOT affect consensus - failures here are only logged.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::crypto::{Hash, PrivateKey, PublicKey};
use crate::validation::{signature_script, LegacyTransaction, Transaction};

use super::WalletNotifier;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key")]
    InvalidKey,
    #[error("Coin {tx}:{index} is not tracked by this wallet")]
    UnknownCoin { tx: Hash, index: u32 },
    #[error("Wallet lock poisoned")]
    Poisoned,
}

/// A wallet key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let private_key = PrivateKey::generate();
        let public_key = private_key.public_key();
        Self { private_key, public_key }
    }

    /// Import from private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidKey)?;
        let public_key = private_key.public_key();
        Ok(Self { private_key, public_key })
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Key hash used in outputs
    pub fn pubkey_hash(&self) -> Hash {
        self.public_key.key_hash()
    }
}

/// An output owned by a wallet key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coin {
    pub amount: u64,
    pub owner: Hash,
}

type Outpoint = (Hash, u32);

#[derive(Debug, Default)]
struct Records {
    /// Relevant transaction -> block that connected it
    transactions: HashMap<Hash, Hash>,
    unspent: HashMap<Outpoint, Coin>,
    /// Coins consumed by connected transactions, kept for refunds
    spent: HashMap<Outpoint, Coin>,
}

#[derive(Debug, Default)]
pub struct Wallet {
    /// Wallet keys (pubkey_hash -> keypair)
    keys: RwLock<HashMap<Hash, KeyPair>>,
    records: Mutex<Records>,
}

impl Wallet {
    /// Create a new empty wallet
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn owns(&self, key_hash: &Hash) -> bool {
        self.keys
            .read()
            .map(|keys| keys.contains_key(key_hash))
            .unwrap_or(false)
    }

    /// Generate a new key and add to wallet
    pub fn generate_key(&self) -> Result<KeyPair, WalletError> {
        self.add_key(KeyPair::generate())
    }

    /// Import a key
    pub fn import_key(&self, bytes: &[u8; 32]) -> Result<KeyPair, WalletError> {
        self.add_key(KeyPair::from_private_key_bytes(bytes)?)
    }

    fn add_key(&self, keypair: KeyPair) -> Result<KeyPair, WalletError> {
        let mut keys = self.keys.write().map_err(|_| WalletError::Poisoned)?;
        keys.insert(keypair.pubkey_hash(), keypair.clone());
        Ok(keypair)
    }

    /// Get all pubkey hashes
    pub fn get_pubkey_hashes(&self) -> Vec<Hash> {
        self.keys
            .read()
            .map(|keys| keys.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Get total balance across all keys
    pub fn get_balance(&self) -> u64 {
        self.records()
            .unspent
            .values()
            .fold(0u64, |acc, coin| acc.saturating_add(coin.amount))
    }

    pub fn unspent(&self, tx: &Hash, index: u32) -> Option<Coin> {
        self.records().unspent.get(&(*tx, index)).copied()
    }

    /// Block that connected a relevant transaction
    pub fn containing_block(&self, tx: &Hash) -> Option<Hash> {
        self.records().transactions.get(tx).copied()
    }

    /// Sign every input of `tx` that spends a coin of this wallet
    pub fn sign_inputs(&self, tx: &mut LegacyTransaction) -> Result<(), WalletError> {
        let records = self.records();
        let keys = self.keys.read().map_err(|_| WalletError::Poisoned)?;

        let mut scripts = Vec::new();
        for (index, input) in tx.inputs.iter().enumerate() {
            if input.prev_tx_hash.is_zero() {
                continue;
            }
            let coin = records
                .unspent
                .get(&(input.prev_tx_hash, input.output_index))
                .ok_or(WalletError::UnknownCoin { tx: input.prev_tx_hash, index: input.output_index })?;
            let keypair = keys.get(&coin.owner).ok_or(WalletError::InvalidKey)?;
            scripts.push((index, signature_script(keypair.private_key(), tx)));
        }

        for (index, script) in scripts {
            tx.inputs[index].script = script;
        }
        Ok(())
    }

    fn script_owner(script: &[u8]) -> Option<Hash> {
        let key: [u8; 32] = script.get(..32)?.try_into().ok()?;
        Some(PublicKey(key).key_hash())
    }
}

impl WalletNotifier for Wallet {
    fn notify_if_involving(&self, tx: &Transaction, block: &Hash) {
        let hash = tx.hash();
        match tx {
            Transaction::Legacy(legacy) => {
                let mut records = self.records();
                let mut involved = false;

                for input in legacy.spent_inputs() {
                    let outpoint = (input.prev_tx_hash, input.output_index);
                    if let Some(coin) = records.unspent.remove(&outpoint) {
                        records.spent.insert(outpoint, coin);
                        involved = true;
                    }
                }
                for (index, output) in legacy.outputs.iter().enumerate() {
                    if self.owns(&output.pubkey_hash) {
                        records
                            .unspent
                            .insert((hash, index as u32), Coin { amount: output.amount, owner: output.pubkey_hash });
                        involved = true;
                    }
                }
                if involved {
                    debug!(tx = %hash.short(), block = %block.short(), "wallet transaction connected");
                    records.transactions.insert(hash, *block);
                }
            }
            Transaction::Tritium(contract) => {
                if self.owns(&contract.public_key.key_hash()) {
                    self.records().transactions.insert(hash, *block);
                }
            }
        }
    }

    fn is_mine(&self, tx: &LegacyTransaction) -> bool {
        tx.spent_inputs()
            .filter_map(|input| Self::script_owner(&input.script))
            .any(|owner| self.owns(&owner))
    }

    fn refund_stake(&self, tx: &LegacyTransaction) -> Result<(), WalletError> {
        let hash = tx.hash();
        let mut records = self.records();

        for input in tx.spent_inputs() {
            let outpoint = (input.prev_tx_hash, input.output_index);
            let coin = records
                .spent
                .remove(&outpoint)
                .ok_or(WalletError::UnknownCoin { tx: input.prev_tx_hash, index: input.output_index })?;
            records.unspent.insert(outpoint, coin);
        }
        for index in 0..tx.outputs.len() {
            records.unspent.remove(&(hash, index as u32));
        }
        records.transactions.remove(&hash);
        debug!(tx = %hash.short(), "refunded disconnected stake");
        Ok(())
    }
}
