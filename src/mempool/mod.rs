//! Pending transaction pool
//!
//! Transactions claim either legacy outpoints or sigchain sequence slots. A
//! transaction whose claim is already held stays in the pool but is marked
//! conflicted; blocks that carry a conflicted transaction are kept off the
//! best chain.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::crypto::Hash;
use crate::validation::Transaction;

/// Pool contract consumed by the chain
pub trait Mempool: Send + Sync {
    /// Add a transaction; false if it is already pooled or may not be pooled
    fn accept(&self, tx: Transaction) -> bool;

    fn remove(&self, hash: &Hash);

    fn get(&self, hash: &Hash) -> Option<Transaction>;

    fn contains(&self, hash: &Hash) -> bool;

    fn is_conflicted(&self, hash: &Hash) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Claim {
    Outpoint(Hash, u32),
    Sequence(Hash, u32),
}

fn claims(tx: &Transaction) -> Vec<Claim> {
    match tx {
        Transaction::Legacy(tx) => tx
            .spent_inputs()
            .map(|input| Claim::Outpoint(input.prev_tx_hash, input.output_index))
            .collect(),
        Transaction::Tritium(contract) => vec![Claim::Sequence(contract.genesis, contract.sequence)],
    }
}

#[derive(Debug, Default)]
struct PoolState {
    entries: HashMap<Hash, Transaction>,
    claims: HashMap<Claim, Hash>,
    conflicted: HashSet<Hash>,
    revision: u64,
}

/// In-memory pool
#[derive(Debug, Default)]
pub struct MemoryPool {
    state: Mutex<PoolState>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn size(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Bumped on every insert or removal
    pub fn revision(&self) -> u64 {
        self.state().revision
    }

    pub fn hashes(&self) -> Vec<Hash> {
        let mut out: Vec<_> = self.state().entries.keys().copied().collect();
        out.sort();
        out
    }
}

impl Mempool for MemoryPool {
    fn accept(&self, tx: Transaction) -> bool {
        if tx.is_producer() {
            return false;
        }
        let hash = tx.hash();
        let mut state = self.state();
        if state.entries.contains_key(&hash) {
            return false;
        }

        let wanted = claims(&tx);
        let held = wanted
            .iter()
            .find_map(|claim| state.claims.get(claim).copied());
        match held {
            Some(holder) => {
                debug!(tx = %hash.short(), holder = %holder.short(), "mempool conflict");
                state.conflicted.insert(hash);
            }
            None => {
                for claim in wanted {
                    state.claims.insert(claim, hash);
                }
            }
        }

        state.entries.insert(hash, tx);
        state.revision = state.revision.saturating_add(1);
        true
    }

    fn remove(&self, hash: &Hash) {
        let mut state = self.state();
        let Some(tx) = state.entries.remove(hash) else {
            return;
        };
        for claim in claims(&tx) {
            if state.claims.get(&claim) == Some(hash) {
                state.claims.remove(&claim);
            }
        }
        state.conflicted.remove(hash);
        state.revision = state.revision.saturating_add(1);
    }

    fn get(&self, hash: &Hash) -> Option<Transaction> {
        self.state().entries.get(hash).cloned()
    }

    fn contains(&self, hash: &Hash) -> bool {
        self.state().entries.contains_key(hash)
    }

    fn is_conflicted(&self, hash: &Hash) -> bool {
        self.state().conflicted.contains(hash)
    }
}
