//! Transaction shapes for both ledger models, and the collaborator contracts
//! that verify and apply them.

mod contract;
mod operations;
mod script;
mod transaction;

pub use contract::*;
pub use operations::*;
pub use script::*;
pub use transaction::*;

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

/// Which ledger model a transaction belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Legacy,
    Tritium,
}

/// A (kind, hash) entry of a block's transaction list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef {
    pub kind: TxKind,
    pub hash: Hash,
}

impl TxRef {
    pub fn new(kind: TxKind, hash: Hash) -> Self {
        Self { kind, hash }
    }
}

/// Stake data read from a coinstake producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustInfo {
    pub balance: u64,
    pub trust: u64,
    pub stake: u64,
}

/// A transaction body of either model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    Tritium(Contract),
}

impl Transaction {
    pub fn hash(&self) -> Hash {
        match self {
            Transaction::Legacy(tx) => tx.hash(),
            Transaction::Tritium(tx) => tx.hash(),
        }
    }

    pub fn kind(&self) -> TxKind {
        match self {
            Transaction::Legacy(_) => TxKind::Legacy,
            Transaction::Tritium(_) => TxKind::Tritium,
        }
    }

    pub fn to_ref(&self) -> TxRef {
        TxRef::new(self.kind(), self.hash())
    }

    pub fn is_coinbase(&self) -> bool {
        match self {
            Transaction::Legacy(tx) => tx.is_coinbase(),
            Transaction::Tritium(tx) => tx.is_coinbase(),
        }
    }

    pub fn is_coinstake(&self) -> bool {
        match self {
            Transaction::Legacy(tx) => tx.is_coinstake(),
            Transaction::Tritium(tx) => tx.is_coinstake(),
        }
    }

    pub fn is_producer(&self) -> bool {
        self.is_coinbase() || self.is_coinstake()
    }
}

impl From<LegacyTransaction> for Transaction {
    fn from(tx: LegacyTransaction) -> Self {
        Transaction::Legacy(tx)
    }
}

impl From<Contract> for Transaction {
    fn from(tx: Contract) -> Self {
        Transaction::Tritium(tx)
    }
}
