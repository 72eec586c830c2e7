//! Block weight and trust
//!
//! Weight measures how much proof a block carries on its own channel. Trust
//! is a small per-block increment that favours switching channels.

use primitive_types::U256;
use thiserror::Error;

use crate::constants::{CHANNEL_SWITCH_TRUST, COIN, WEIGHT_DIVISOR};
use crate::crypto::Hash;
use crate::storage::{Ledger, StoreError};
use crate::validation::{OperationLayer, Transaction};

use super::{BlockState, Channel, PrimeDifficulty};

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Weight arithmetic overflow")]
    Overflow,
    #[error("Block {0} has no producer transaction")]
    MissingProducer(Hash),
    #[error("Producer transaction {0} unreadable")]
    ProducerUnreadable(Hash),
    #[error("Stake input {0} unreadable")]
    InputUnreadable(Hash),
    #[error("Malformed trust data in {0}")]
    MalformedTrust(Hash),
    #[error("Predecessor {0} not found")]
    MissingPredecessor(Hash),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// `(~H / (H + 1)) + 1`: expected attempts to find a hash at or below `H`
fn proof_ratio(proof: &Hash) -> Result<U256, ScoreError> {
    let value = proof.to_u256();
    let denominator = value.checked_add(U256::one()).ok_or(ScoreError::Overflow)?;
    (!value / denominator)
        .checked_add(U256::one())
        .ok_or(ScoreError::Overflow)
}

fn to_weight(value: U256) -> Result<u128, ScoreError> {
    if value > U256::from(u128::MAX) {
        return Err(ScoreError::Overflow);
    }
    Ok(value.as_u128())
}

pub fn hash_weight(proof: &Hash) -> Result<u128, ScoreError> {
    let ratio = proof_ratio(proof)?.low_u64();
    Ok((ratio / WEIGHT_DIVISOR) as u128 + 1)
}

pub fn stake_weight(stake_hash: &Hash, stake_amount: u64, trust: u64) -> Result<u128, ScoreError> {
    let ratio = U256::from(proof_ratio(stake_hash)?.low_u64() / WEIGHT_DIVISOR);
    let weight = ratio
        .checked_mul(U256::from(stake_amount / COIN))
        .and_then(|w| w.checked_add(U256::from(trust)))
        .and_then(|w| w.checked_add(U256::one()))
        .ok_or(ScoreError::Overflow)?;
    to_weight(weight)
}

/// Weight of a prime block proving `prime_bits` of cluster difficulty.
/// Headers without offsets fall back to their declared `bits`.
pub fn prime_weight(offsets: &[u8], prime_bits: u64, bits: u32) -> Result<u128, ScoreError> {
    if offsets.is_empty() {
        return Ok(bits as u128 * 25);
    }
    (prime_bits as u128)
        .checked_mul(25)
        .and_then(|w| w.checked_add(1))
        .ok_or(ScoreError::Overflow)
}

/// Trust earned by `block` on top of `prev`
pub fn trust(block: &BlockState, prev: &BlockState) -> u64 {
    if block.channel() != prev.channel() {
        CHANNEL_SWITCH_TRUST
    } else {
        1
    }
}

/// (trust score, stake amount) of a stake block's producer
pub fn stake_data(
    block: &BlockState,
    ledger: &Ledger<'_>,
    operations: &dyn OperationLayer,
) -> Result<(u64, u64), ScoreError> {
    let producer = block.producer().ok_or_else(|| ScoreError::MissingProducer(block.hash()))?;
    let tx = ledger
        .read_tx(producer)?
        .ok_or(ScoreError::ProducerUnreadable(producer.hash))?;

    match tx {
        Transaction::Tritium(contract) => {
            let info = operations
                .trust_info(&contract)
                .ok_or(ScoreError::MalformedTrust(producer.hash))?;
            let amount = if contract.is_genesis_stake() { info.balance } else { info.stake };
            Ok((info.trust, amount))
        }
        Transaction::Legacy(tx) => {
            let trust = tx.trust_score().ok_or(ScoreError::MalformedTrust(producer.hash))?;
            let mut amount = 0u64;
            for input in tx.spent_inputs() {
                let output = ledger
                    .read_output(&input.prev_tx_hash, input.output_index)?
                    .ok_or(ScoreError::InputUnreadable(input.prev_tx_hash))?;
                amount = amount.checked_add(output.amount).ok_or(ScoreError::Overflow)?;
            }
            Ok((trust, amount))
        }
    }
}

impl BlockState {
    /// Trust increment of this block; zero for genesis
    pub fn trust(&self, ledger: &Ledger<'_>) -> Result<u64, ScoreError> {
        if self.is_genesis() {
            return Ok(0);
        }
        let prev = ledger
            .read_block(&self.prev_hash())?
            .ok_or(ScoreError::MissingPredecessor(self.prev_hash()))?;
        Ok(trust(self, &prev))
    }

    /// Weight this block adds to its own channel
    pub fn weight(
        &self,
        ledger: &Ledger<'_>,
        operations: &dyn OperationLayer,
        primes: &dyn PrimeDifficulty,
    ) -> Result<u128, ScoreError> {
        match self.channel() {
            Channel::Hash => hash_weight(&self.header.proof_hash()),
            Channel::Prime => {
                prime_weight(&self.header.offsets, primes.prime_bits(&self.header), self.header.bits)
            }
            Channel::Stake => {
                let (trust, amount) = stake_data(self, ledger, operations)?;
                stake_weight(&self.header.stake_hash(), amount, trust)
            }
            Channel::Hybrid => Ok(0),
        }
    }
}
