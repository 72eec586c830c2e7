//! Chain indexer
//!
//! Derives a validated block's position from its predecessor: channel
//! height, reward reserves, mint, checkpoint, accumulated channel weights
//! and chain trust. The result is persisted and handed to the fork choice.

use tracing::debug;

use crate::consensus::{
    check_scheduled_payouts, is_new_timespan, rewards_by_class, trust, BlockState, Channel, RewardClass,
    RewardError, ScoreError,
};
use crate::constants::RESERVE_EXEMPT_VERSION;
use crate::storage::Ledger;
use crate::validation::{Producer, Transaction};

use super::{set_best, BestChain, ChainError, Context, Effects, Selection};

/// Index `state` on top of its stored predecessor, persist it, and run the
/// fork choice
pub fn index_block(
    mut state: BlockState,
    ledger: &Ledger<'_>,
    context: &Context,
    best: Option<&BestChain>,
    effects: &mut Effects,
) -> Result<Selection, ChainError> {
    if state.is_genesis() {
        index_genesis(&mut state, ledger)?;
    } else {
        index_successor(&mut state, ledger, context)?;
    }

    ledger.write_block(&state)?;
    debug!(
        hash = %state.hash(),
        height = state.height(),
        channel = %state.channel(),
        channel_height = state.channel_height,
        trust = state.chain_trust,
        mint = state.mint,
        "indexed block"
    );

    set_best(&state, ledger, context, best, effects)
}

fn index_genesis(state: &mut BlockState, ledger: &Ledger<'_>) -> Result<(), ChainError> {
    let producer = producer_tx(state, ledger)?;
    let rewards = work_rewards(&producer)?;

    state.mint = total(&rewards)?;
    state.channel_height = 1;
    state.chain_trust = 0;
    state.hash_checkpoint = state.hash();
    Ok(())
}

fn index_successor(state: &mut BlockState, ledger: &Ledger<'_>, context: &Context) -> Result<(), ChainError> {
    let config = &context.config;
    let prev = ledger
        .read_block(&state.prev_hash())?
        .ok_or(ChainError::MissingPredecessor(state.prev_hash()))?;

    state.channel_weight = prev.channel_weight;

    let last = last_of_channel(&prev, state.channel(), ledger, config.channel_lookback)?;
    let carried = match &last {
        Some(last) => {
            state.channel_height = last.channel_height.saturating_add(1);
            state.fee_reserve = last.fee_reserve;
            last.released_reserve
        }
        None => {
            state.channel_height = 1;
            state.fee_reserve = 0;
            [0; 3]
        }
    };

    let producer = producer_tx(state, ledger)?;
    match state.channel() {
        Channel::Stake => {
            state.released_reserve = carried;
            state.mint = stake_reward(&producer, ledger)?;
        }
        Channel::Hybrid => {
            // Hybrid blocks draw on no reserve
            let rewards = work_rewards(&producer)?;
            for class in RewardClass::ALL {
                let reward = rewards[class.index()];
                if reward > 0 {
                    return Err(RewardError::ReserveExceeded { class, reward, reserve: 0 }.into());
                }
            }
            state.released_reserve = carried;
            state.mint = 0;
        }
        Channel::Prime | Channel::Hash => {
            let rewards = work_rewards(&producer)?;
            let mut mint = 0u64;
            for class in RewardClass::ALL {
                let slot = class.index();
                let released = context.hooks.reserves.released(state, last.as_ref(), class);
                let reserve = carried[slot].saturating_add(released);

                if class != RewardClass::Miner {
                    if let Transaction::Tritium(contract) = &producer {
                        check_scheduled_payouts(
                            contract.payouts(),
                            class,
                            reserve,
                            state.channel_height,
                            &config.payouts,
                        )?;
                    }
                }

                let reward = rewards[slot];
                if reward > reserve && state.header.version != RESERVE_EXEMPT_VERSION {
                    return Err(RewardError::ReserveExceeded { class, reward, reserve }.into());
                }
                state.released_reserve[slot] = reserve.saturating_sub(reward);
                mint = mint.checked_add(reward).ok_or(RewardError::Overflow)?;
            }
            state.mint = mint;
        }
    }

    let checkpoint = ledger
        .read_block(&prev.hash_checkpoint)?
        .ok_or(ChainError::MissingBlock(prev.hash_checkpoint))?;
    state.hash_checkpoint = if is_new_timespan(state, &checkpoint, config.checkpoint_timespan) {
        state.hash()
    } else {
        prev.hash_checkpoint
    };

    if let Some(slot) = state.channel().weight_index() {
        let weight = state.weight(
            ledger,
            context.hooks.operations.as_ref(),
            context.hooks.primes.as_ref(),
        )?;
        state.channel_weight[slot] = state.channel_weight[slot]
            .checked_add(weight)
            .ok_or(ScoreError::Overflow)?;
    }

    state.chain_trust = prev
        .chain_trust
        .checked_add(trust(state, &prev))
        .ok_or(ScoreError::Overflow)?;
    Ok(())
}

/// Most recent block of `channel` at or before `from`, searching at most
/// `lookback` blocks
pub fn last_of_channel(
    from: &BlockState,
    channel: Channel,
    ledger: &Ledger<'_>,
    lookback: u32,
) -> Result<Option<BlockState>, ChainError> {
    let mut cursor = from.clone();
    for _ in 0..lookback.max(1) {
        if cursor.channel() == channel {
            return Ok(Some(cursor));
        }
        match ledger.prev(&cursor)? {
            Some(prev) => cursor = prev,
            None => return Ok(None),
        }
    }
    Ok(None)
}

fn producer_tx(state: &BlockState, ledger: &Ledger<'_>) -> Result<Transaction, ChainError> {
    let producer = state
        .producer()
        .ok_or_else(|| ScoreError::MissingProducer(state.hash()))?;
    Ok(ledger
        .read_tx(producer)?
        .ok_or(ScoreError::ProducerUnreadable(producer.hash))?)
}

/// Coinbase rewards per class. Legacy coinbases only pay miners.
fn work_rewards(producer: &Transaction) -> Result<[u64; 3], ChainError> {
    match producer {
        Transaction::Tritium(contract) => Ok(rewards_by_class(contract.payouts())?),
        Transaction::Legacy(tx) => {
            let paid = tx.total_output_value().ok_or(RewardError::Overflow)?;
            Ok([paid, 0, 0])
        }
    }
}

/// New coins created by a coinstake
fn stake_reward(producer: &Transaction, ledger: &Ledger<'_>) -> Result<u64, ChainError> {
    match producer {
        Transaction::Tritium(contract) => match &contract.producer {
            Some(Producer::Coinstake { reward, .. }) => Ok(*reward),
            _ => Err(ScoreError::MalformedTrust(contract.hash()).into()),
        },
        Transaction::Legacy(tx) => {
            let mut staked = 0u64;
            for input in tx.spent_inputs() {
                let output = ledger
                    .read_output(&input.prev_tx_hash, input.output_index)?
                    .ok_or(ScoreError::InputUnreadable(input.prev_tx_hash))?;
                staked = staked.checked_add(output.amount).ok_or(ChainError::Overflow)?;
            }
            let paid = tx.total_output_value().ok_or(ChainError::Overflow)?;
            Ok(paid.saturating_sub(staked))
        }
    }
}

fn total(rewards: &[u64; 3]) -> Result<u64, ChainError> {
    rewards
        .iter()
        .try_fold(0u64, |acc, reward| acc.checked_add(*reward))
        .ok_or_else(|| RewardError::Overflow.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::BlockHeader;
    use crate::crypto::hash_bytes;
    use crate::storage::MemoryStore;

    fn chain_of(channels: &[Channel], ledger: &Ledger<'_>) -> Vec<BlockState> {
        let mut blocks: Vec<BlockState> = Vec::new();
        for (height, channel) in channels.iter().enumerate() {
            let prev_hash = blocks.last().map(|b| b.hash()).unwrap_or_default();
            let header = BlockHeader {
                version: 7,
                prev_hash,
                merkle_root: hash_bytes(&[height as u8]),
                channel: *channel,
                height: height as u32,
                bits: 0,
                nonce: 0,
                time: height as u64,
                offsets: vec![],
            };
            let state = BlockState::new(header, vec![], vec![]);
            ledger.write_block(&state).unwrap();
            blocks.push(state);
        }
        blocks
    }

    #[test]
    fn test_last_of_channel_walks_back() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store);
        let blocks = chain_of(
            &[Channel::Hash, Channel::Prime, Channel::Stake, Channel::Stake, Channel::Hash],
            &ledger,
        );
        let tip = &blocks[4];

        let prime = last_of_channel(tip, Channel::Prime, &ledger, 10).unwrap();
        assert_eq!(prime.map(|b| b.hash()), Some(blocks[1].hash()));

        let hash = last_of_channel(tip, Channel::Hash, &ledger, 10).unwrap();
        assert_eq!(hash.map(|b| b.hash()), Some(tip.hash()));

        assert_eq!(last_of_channel(tip, Channel::Hybrid, &ledger, 10).unwrap(), None);
    }

    #[test]
    fn test_last_of_channel_is_bounded() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store);
        let blocks = chain_of(&[Channel::Prime, Channel::Stake, Channel::Stake, Channel::Stake], &ledger);

        assert_eq!(last_of_channel(&blocks[3], Channel::Prime, &ledger, 2).unwrap(), None);
        assert!(last_of_channel(&blocks[3], Channel::Prime, &ledger, 4).unwrap().is_some());
    }

    #[test]
    fn test_missing_producer_is_an_error() {
        let store = MemoryStore::new();
        let ledger = Ledger::new(&store);
        let blocks = chain_of(&[Channel::Hash], &ledger);
        let mut genesis = blocks[0].clone();
        genesis.vtx = vec![];
        assert!(matches!(
            index_genesis(&mut genesis, &ledger),
            Err(ChainError::Score(ScoreError::MissingProducer(_)))
        ));
    }
}
