//! Transaction applier
//!
//! `connect_block` applies every transaction of an indexed block in order and
//! links the block into the canonical chain. `disconnect_block` reverts the
//! transactions in reverse order and unlinks it again. Both read the block
//! fresh from the ledger and write it back when done.

use tracing::{debug, warn};

use crate::consensus::{BlockState, ScoreError};
use crate::crypto::Hash;
use crate::storage::Ledger;
use crate::validation::{Contract, LegacyTransaction, Producer, Transaction};

use super::{ChainError, Context, Hooks};

/// Wallet work queued while a pipeline runs.
///
/// Effects are only fired once the pipeline's writes are committed, so the
/// wallet never sees a block that was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Notify { tx: Transaction, block: Hash },
    Refund(LegacyTransaction),
}

#[derive(Debug, Default)]
pub struct Effects(Vec<Effect>);

impl Effects {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, effect: Effect) {
        self.0.push(effect);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Effect> {
        self.0.iter()
    }

    /// Hand every queued effect to the wallet, in order
    pub fn fire(self, hooks: &Hooks) {
        for effect in self.0 {
            match effect {
                Effect::Notify { tx, block } => hooks.wallet.notify_if_involving(&tx, &block),
                Effect::Refund(tx) => {
                    if let Err(e) = hooks.wallet.refund_stake(&tx) {
                        warn!(tx = %tx.hash(), error = %e, "stake refund failed");
                    }
                }
            }
        }
    }
}

/// Apply the transactions of block `hash` and make it the successor of its
/// predecessor
pub fn connect_block(
    hash: &Hash,
    ledger: &Ledger<'_>,
    context: &Context,
    effects: &mut Effects,
) -> Result<(), ChainError> {
    let mut state = ledger.read_block(hash)?.ok_or(ChainError::MissingBlock(*hash))?;
    let prev = ledger.prev(&state)?;
    if prev.is_none() && !state.is_genesis() {
        return Err(ChainError::MissingPredecessor(state.prev_hash()));
    }

    let mut fees = 0u64;
    for tx_ref in &state.vtx {
        if ledger.has_index(&tx_ref.hash)? {
            return Err(ChainError::AlreadyIndexed(tx_ref.hash));
        }
        let tx = ledger
            .read_tx(tx_ref)?
            .ok_or(ChainError::MissingTransaction(tx_ref.hash))?;

        let fee = match &tx {
            Transaction::Tritium(contract) => connect_contract(contract, &state, ledger, context)?,
            Transaction::Legacy(tx) => connect_legacy(tx, ledger, context)?,
        };
        fees = fees.checked_add(fee).ok_or(ChainError::Overflow)?;

        ledger.index_tx(&tx_ref.hash, hash)?;
        effects.push(Effect::Notify { tx, block: *hash });
    }

    let prev_supply = prev.as_ref().map_or(0, |prev| prev.money_supply);
    state.fees = fees;
    state.fee_reserve = state.fee_reserve.checked_add(fees).ok_or(ChainError::Overflow)?;
    state.money_supply = prev_supply.checked_add(state.mint).ok_or(ChainError::Overflow)?;

    ledger.index_height(state.height(), hash)?;
    if let Some(mut prev) = prev {
        prev.hash_next = *hash;
        ledger.write_block(&prev)?;
    }
    ledger.write_block(&state)?;

    debug!(%hash, height = state.height(), fees, supply = state.money_supply, "connected block");
    Ok(())
}

/// Revert the transactions of block `hash` and unlink it from its
/// predecessor
pub fn disconnect_block(
    hash: &Hash,
    ledger: &Ledger<'_>,
    context: &Context,
    effects: &mut Effects,
) -> Result<(), ChainError> {
    let mut state = ledger.read_block(hash)?.ok_or(ChainError::MissingBlock(*hash))?;

    // Later transactions of a sigchain depend on earlier ones
    for tx_ref in state.vtx.iter().rev() {
        let tx = ledger
            .read_tx(tx_ref)?
            .ok_or(ChainError::MissingTransaction(tx_ref.hash))?;

        match tx {
            Transaction::Tritium(contract) => disconnect_contract(&contract, ledger, context)?,
            Transaction::Legacy(tx) => {
                for input in tx.spent_inputs() {
                    ledger.erase_spent(&input.prev_tx_hash, input.output_index)?;
                }
                if tx.is_coinstake() && context.hooks.wallet.is_mine(&tx) {
                    effects.push(Effect::Refund(tx));
                }
            }
        }
        ledger.erase_index(&tx_ref.hash)?;
    }

    state.fee_reserve = state.fee_reserve.checked_sub(state.fees).ok_or(ChainError::Overflow)?;
    state.hash_next = Hash::zero();

    if ledger.read_height(state.height())? == Some(*hash) {
        ledger.erase_height(state.height())?;
    }
    if let Some(mut prev) = ledger.prev(&state)? {
        prev.hash_next = Hash::zero();
        ledger.write_block(&prev)?;
    }
    ledger.write_block(&state)?;

    debug!(%hash, height = state.height(), "disconnected block");
    Ok(())
}

/// Apply a register-model transaction, returning its fee
fn connect_contract(
    contract: &Contract,
    block: &BlockState,
    ledger: &Ledger<'_>,
    context: &Context,
) -> Result<u64, ChainError> {
    let operations = &context.hooks.operations;
    let hash = contract.hash();

    if !contract.is_first() && ledger.read_last_tx(&contract.genesis)? != Some(contract.prev_tx) {
        return Err(ChainError::OutOfSequence(hash));
    }
    if !operations.verify(contract) {
        return Err(ChainError::Rejected(hash));
    }

    if let Some(Producer::Coinstake { last_stake, reward, .. }) = &contract.producer {
        let current = ledger.read_last_stake(&contract.genesis)?.unwrap_or_default();
        if current != *last_stake {
            return Err(ChainError::StakeOutOfSequence(hash));
        }

        let info = operations
            .trust_info(contract)
            .ok_or(ScoreError::MalformedTrust(hash))?;
        let amount = if contract.is_genesis_stake() { info.balance } else { info.stake };
        let limit = stake_reward_limit(amount, context.config.max_stake_reward_ppm);
        if *reward > limit {
            return Err(ChainError::StakeRewardTooHigh { reward: *reward, limit });
        }

        ledger.write_last_stake(&contract.genesis, &hash)?;
    }

    operations.connect(contract, block, ledger)?;
    ledger.write_last_tx(&contract.genesis, &hash)?;
    Ok(operations.fees(contract))
}

fn disconnect_contract(contract: &Contract, ledger: &Ledger<'_>, context: &Context) -> Result<(), ChainError> {
    context.hooks.operations.disconnect(contract, ledger)?;

    if let Some(Producer::Coinstake { last_stake, .. }) = &contract.producer {
        if last_stake.is_zero() {
            ledger.erase_last_stake(&contract.genesis)?;
        } else {
            ledger.write_last_stake(&contract.genesis, last_stake)?;
        }
    }

    if contract.is_first() {
        ledger.erase_last_tx(&contract.genesis)?;
    } else {
        ledger.write_last_tx(&contract.genesis, &contract.prev_tx)?;
    }
    Ok(())
}

/// Apply a legacy transaction, returning its fee
fn connect_legacy(tx: &LegacyTransaction, ledger: &Ledger<'_>, context: &Context) -> Result<u64, ChainError> {
    if tx.is_coinbase() {
        return Ok(0);
    }

    let hash = tx.hash();
    // The coinstake marker input carries trust, not a spend
    let first_spend = usize::from(tx.is_coinstake());
    let mut value_in = 0u64;

    for (index, input) in tx.inputs.iter().enumerate().skip(first_spend) {
        let missing = ChainError::MissingInput { tx: input.prev_tx_hash, index: input.output_index };
        if !ledger.has_index(&input.prev_tx_hash)? {
            return Err(missing);
        }
        let spent = ledger
            .read_output(&input.prev_tx_hash, input.output_index)?
            .ok_or(missing)?;

        if ledger.read_spent(&input.prev_tx_hash, input.output_index)?.is_some() {
            return Err(ChainError::DoubleSpend { tx: input.prev_tx_hash, index: input.output_index });
        }
        if !context.hooks.scripts.verify_input(tx, index, &spent) {
            return Err(ChainError::InvalidScript { tx: hash, index });
        }

        ledger.write_spent(&input.prev_tx_hash, input.output_index, &hash)?;
        value_in = value_in.checked_add(spent.amount).ok_or(ChainError::Overflow)?;
    }

    if tx.is_coinstake() {
        return Ok(0);
    }

    let value_out = tx.total_output_value().ok_or(ChainError::Overflow)?;
    value_in.checked_sub(value_out).ok_or(ChainError::NegativeFee(hash))
}

/// Largest coinstake reward allowed for `amount` staked
pub fn stake_reward_limit(amount: u64, ppm: u64) -> u64 {
    let limit = amount as u128 * ppm as u128 / 1_000_000;
    u64::try_from(limit).unwrap_or(u64::MAX)
}
