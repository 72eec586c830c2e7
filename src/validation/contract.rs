//! Register-model (sigchain) transactions
//!
//! Every account is a signature chain identified by its genesis id. Each
//! contract links to the previous transaction of the same chain, and stake
//! producers additionally link to the chain's previous coinstake.

use serde::{Deserialize, Serialize};

use crate::consensus::RewardClass;
use crate::crypto::{hash_bytes, Hash, PublicKey};

use super::TrustInfo;

/// A reward paid by a coinbase producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub class: RewardClass,
    pub recipient: Hash,
    pub amount: u64,
}

/// Block-producing role of a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Producer {
    /// Proof-of-work reward split across reward classes
    Coinbase { payouts: Vec<Payout> },
    /// Proof-of-stake reward
    Coinstake {
        /// Previous coinstake of this sigchain, zero for a genesis stake
        last_stake: Hash,
        trust: u64,
        /// Amount moved into stake by this transaction
        stake: u64,
        /// Account balance, used as the stake amount at genesis
        balance: u64,
        reward: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub version: u32,
    /// Sigchain id
    pub genesis: Hash,
    pub sequence: u32,
    /// Previous transaction of this sigchain, zero for the first
    pub prev_tx: Hash,
    pub time: u64,
    pub public_key: PublicKey,
    pub fee: u64,
    /// Opaque operation stream interpreted by the operation layer
    pub operations: Vec<u8>,
    pub producer: Option<Producer>,
}

impl Contract {
    /// Plain (non-producer) contract
    pub fn new(genesis: Hash, sequence: u32, prev_tx: Hash, public_key: PublicKey, time: u64) -> Self {
        Self {
            version: 1,
            genesis,
            sequence,
            prev_tx,
            time,
            public_key,
            fee: 0,
            operations: Vec::new(),
            producer: None,
        }
    }

    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_operations(mut self, operations: Vec<u8>) -> Self {
        self.operations = operations;
        self
    }

    /// First transaction of its sigchain
    pub fn is_first(&self) -> bool {
        self.sequence == 0 && self.prev_tx.is_zero()
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.producer, Some(Producer::Coinbase { .. }))
    }

    pub fn is_coinstake(&self) -> bool {
        matches!(self.producer, Some(Producer::Coinstake { .. }))
    }

    pub fn is_producer(&self) -> bool {
        self.producer.is_some()
    }

    /// Coinstake with no previous stake
    pub fn is_genesis_stake(&self) -> bool {
        matches!(self.producer, Some(Producer::Coinstake { last_stake, .. }) if last_stake.is_zero())
    }

    /// Coinbase payouts, empty for anything else
    pub fn payouts(&self) -> &[Payout] {
        match &self.producer {
            Some(Producer::Coinbase { payouts }) => payouts,
            _ => &[],
        }
    }

    pub fn trust_info(&self) -> Option<TrustInfo> {
        match self.producer {
            Some(Producer::Coinstake { trust, stake, balance, .. }) => {
                Some(TrustInfo { balance, trust, stake })
            }
            _ => None,
        }
    }

    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(160 + self.operations.len());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.genesis.0);
        bytes.extend_from_slice(&self.sequence.to_le_bytes());
        bytes.extend_from_slice(&self.prev_tx.0);
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.public_key.0);
        bytes.extend_from_slice(&self.fee.to_le_bytes());
        bytes.extend_from_slice(&(self.operations.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.operations);

        match &self.producer {
            None => bytes.push(0),
            Some(Producer::Coinbase { payouts }) => {
                bytes.push(1);
                bytes.extend_from_slice(&(payouts.len() as u32).to_le_bytes());
                for payout in payouts {
                    bytes.push(payout.class as u8);
                    bytes.extend_from_slice(&payout.recipient.0);
                    bytes.extend_from_slice(&payout.amount.to_le_bytes());
                }
            }
            Some(Producer::Coinstake { last_stake, trust, stake, balance, reward }) => {
                bytes.push(2);
                bytes.extend_from_slice(&last_stake.0);
                bytes.extend_from_slice(&trust.to_le_bytes());
                bytes.extend_from_slice(&stake.to_le_bytes());
                bytes.extend_from_slice(&balance.to_le_bytes());
                bytes.extend_from_slice(&reward.to_le_bytes());
            }
        }
        bytes
    }
}
