//! Legacy (UTXO-model) transactions
//!
//! Inputs carry an unlocking script instead of a fixed key/signature pair so
//! that the script engine stays a pluggable collaborator. Coinbase and
//! coinstake producers are recognised by marker inputs.

use serde::{Deserialize, Serialize};

use crate::constants::{COINBASE_MARKER, COINSTAKE_MARKER};
use crate::crypto::{hash_bytes, Hash};

/// A transaction input referencing a previous output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Hash of the transaction containing the output
    pub prev_tx_hash: Hash,
    /// Index of the output in that transaction
    pub output_index: u32,
    /// Unlocking script
    pub script: Vec<u8>,
}

impl TxInput {
    pub fn new(prev_tx_hash: Hash, output_index: u32) -> Self {
        Self {
            prev_tx_hash,
            output_index,
            script: Vec::new(),
        }
    }

    fn is_marker(&self) -> bool {
        self.prev_tx_hash.is_zero()
            && (self.output_index == COINBASE_MARKER || self.output_index == COINSTAKE_MARKER)
    }
}

/// A transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub amount: u64,
    /// Key hash of the recipient
    pub pubkey_hash: Hash,
}

/// A complete legacy transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyTransaction {
    pub version: u32,
    pub time: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Lock time (block height or timestamp)
    pub lock_time: u32,
}

impl LegacyTransaction {
    /// Create a new transaction
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, time: u64) -> Self {
        Self {
            version: 1,
            time,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    /// Create a coinbase transaction paying the given outputs
    pub fn coinbase(outputs: Vec<TxOutput>, time: u64) -> Self {
        Self::new(vec![TxInput::new(Hash::zero(), COINBASE_MARKER)], outputs, time)
    }

    /// Create a coinstake: the marker input carries the trust score, the
    /// remaining inputs are the staked outputs.
    pub fn coinstake(trust: u64, stake_inputs: Vec<TxInput>, outputs: Vec<TxOutput>, time: u64) -> Self {
        let mut marker = TxInput::new(Hash::zero(), COINSTAKE_MARKER);
        marker.script = trust.to_le_bytes().to_vec();

        let mut inputs = Vec::with_capacity(stake_inputs.len() + 1);
        inputs.push(marker);
        inputs.extend(stake_inputs);
        Self::new(inputs, outputs, time)
    }

    /// Check if this is a coinbase transaction
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1
            && self.inputs[0].prev_tx_hash.is_zero()
            && self.inputs[0].output_index == COINBASE_MARKER
    }

    pub fn is_coinstake(&self) -> bool {
        self.inputs.len() > 1
            && self.inputs[0].prev_tx_hash.is_zero()
            && self.inputs[0].output_index == COINSTAKE_MARKER
    }

    /// Trust score carried by a coinstake marker script.
    ///
    /// `None` when this is not a coinstake or the script is not exactly
    /// eight little-endian bytes.
    pub fn trust_score(&self) -> Option<u64> {
        if !self.is_coinstake() {
            return None;
        }
        let script: [u8; 8] = self.inputs[0].script.as_slice().try_into().ok()?;
        Some(u64::from_le_bytes(script))
    }

    /// Inputs that reference real previous outputs
    pub fn spent_inputs(&self) -> impl Iterator<Item = &TxInput> {
        self.inputs.iter().filter(|input| !input.is_marker())
    }

    /// Transaction hash (covers unlocking scripts)
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes(true))
    }

    /// Get the signing hash (excludes unlocking scripts)
    pub fn signing_hash(&self) -> Hash {
        hash_bytes(&self.to_bytes(false))
    }

    fn to_bytes(&self, with_scripts: bool) -> Vec<u8> {
        let mut bytes = Vec::new();

        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.time.to_le_bytes());

        bytes.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.prev_tx_hash.0);
            bytes.extend_from_slice(&input.output_index.to_le_bytes());
            if with_scripts {
                bytes.extend_from_slice(&(input.script.len() as u32).to_le_bytes());
                bytes.extend_from_slice(&input.script);
            }
        }

        bytes.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            bytes.extend_from_slice(&output.amount.to_le_bytes());
            bytes.extend_from_slice(&output.pubkey_hash.0);
        }

        bytes.extend_from_slice(&self.lock_time.to_le_bytes());
        bytes
    }

    /// Total output value, `None` on overflow
    pub fn total_output_value(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, output| acc.checked_add(output.amount))
    }
}
