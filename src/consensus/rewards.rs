//! Reward reserves
//!
//! Each work channel accumulates a reserve per reward class as chain time
//! passes. Producers may only pay out what the reserve holds. Ambassador and
//! developer reserves are paid on a fixed channel-height interval, split by
//! a configured share table.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ChainConfig, PayoutConfig};
use crate::crypto::Hash;
use crate::validation::Payout;

use super::BlockState;

/// Reward class of a payout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RewardClass {
    Miner = 0,
    Ambassador = 1,
    Developer = 2,
}

impl RewardClass {
    pub const ALL: [RewardClass; 3] = [RewardClass::Miner, RewardClass::Ambassador, RewardClass::Developer];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RewardError {
    #[error("Reward arithmetic overflow")]
    Overflow,
    #[error("{class:?} reward {reward} exceeds reserve {reserve}")]
    ReserveExceeded { class: RewardClass, reward: u64, reserve: u64 },
    #[error("{class:?} payouts do not match the payout table")]
    PayoutMismatch { class: RewardClass },
    #[error("{class:?} payouts outside a payout interval")]
    UnscheduledPayout { class: RewardClass },
}

/// Source of newly released reserve
pub trait ReserveSchedule: Send + Sync {
    /// Reserve of `class` released between `last` (the previous block of the
    /// same channel, if any) and `block`
    fn released(&self, block: &BlockState, last: Option<&BlockState>, class: RewardClass) -> u64;
}

/// Linear release per minute of chain age
#[derive(Debug, Clone)]
pub struct MinuteRelease {
    network_timelock: u64,
    rates: [u64; 3],
}

/// Minutes credited to the first block of a channel
const FIRST_BLOCK_MINUTES: u64 = 5;

impl MinuteRelease {
    pub fn new(network_timelock: u64, rates: [u64; 3]) -> Self {
        Self { network_timelock, rates }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(config.network_timelock, config.release_per_minute)
    }

    /// Whole minutes since the network timelock
    pub fn chain_age(&self, time: u64) -> u64 {
        time.saturating_sub(self.network_timelock) / 60
    }
}

impl ReserveSchedule for MinuteRelease {
    fn released(&self, block: &BlockState, last: Option<&BlockState>, class: RewardClass) -> u64 {
        let minutes = match last {
            Some(last) => self.chain_age(block.time()).saturating_sub(self.chain_age(last.time())),
            None => self.chain_age(block.time()).saturating_add(FIRST_BLOCK_MINUTES),
        };
        minutes.saturating_mul(self.rates[class.index()])
    }
}

/// Sum payouts per reward class
pub fn rewards_by_class(payouts: &[Payout]) -> Result<[u64; 3], RewardError> {
    let mut totals = [0u64; 3];
    for payout in payouts {
        let slot = &mut totals[payout.class.index()];
        *slot = slot.checked_add(payout.amount).ok_or(RewardError::Overflow)?;
    }
    Ok(totals)
}

/// Check the ambassador or developer payouts of a producer.
///
/// Off-interval blocks must not pay the class at all. On an interval the
/// payouts must be exactly the share table applied to `reserve`, in table
/// order.
pub fn check_scheduled_payouts(
    payouts: &[Payout],
    class: RewardClass,
    reserve: u64,
    channel_height: u32,
    config: &PayoutConfig,
) -> Result<(), RewardError> {
    let paid: Vec<(Hash, u64)> = payouts
        .iter()
        .filter(|payout| payout.class == class)
        .map(|payout| (payout.recipient, payout.amount))
        .collect();

    if channel_height % config.interval != 0 {
        if paid.is_empty() {
            return Ok(());
        }
        return Err(RewardError::UnscheduledPayout { class });
    }

    let expected: Vec<(Hash, u64)> = config
        .shares(class)
        .iter()
        .map(|share| (share.recipient, share_of(reserve, share.percent)))
        .collect();

    if paid != expected {
        return Err(RewardError::PayoutMismatch { class });
    }
    Ok(())
}

fn share_of(reserve: u64, percent: u64) -> u64 {
    (reserve as u128 * percent as u128 / 100) as u64
}
