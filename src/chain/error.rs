use thiserror::Error;

use crate::consensus::{RewardError, ScoreError, ValidationError};
use crate::crypto::Hash;
use crate::storage::StoreError;
use crate::validation::OperationError;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Score(#[from] ScoreError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Reward(#[from] RewardError),
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error("Chain has no genesis block")]
    NoGenesis,
    #[error("Block {0} not found")]
    MissingBlock(Hash),
    #[error("Predecessor {0} not found")]
    MissingPredecessor(Hash),
    #[error("Block {0} is not on the best chain")]
    NotInMainChain(Hash),

    #[error("Transaction {0} not found")]
    MissingTransaction(Hash),
    #[error("Transaction {0} already indexed")]
    AlreadyIndexed(Hash),
    #[error("Transaction {0} does not follow its sigchain")]
    OutOfSequence(Hash),
    #[error("Coinstake {0} does not follow the previous stake")]
    StakeOutOfSequence(Hash),
    #[error("Stake reward {reward} above limit {limit}")]
    StakeRewardTooHigh { reward: u64, limit: u64 },
    #[error("Transaction {0} rejected by the operation layer")]
    Rejected(Hash),
    #[error("Input {tx}:{index} not found")]
    MissingInput { tx: Hash, index: u32 },
    #[error("Input {tx}:{index} already spent")]
    DoubleSpend { tx: Hash, index: u32 },
    #[error("Invalid script on input {index} of {tx}")]
    InvalidScript { tx: Hash, index: usize },
    #[error("Outputs exceed inputs in {0}")]
    NegativeFee(Hash),
    #[error("Value overflow")]
    Overflow,

    #[error("Reorganize failed at block {hash}: {source}")]
    Reorg {
        hash: Hash,
        #[source]
        source: Box<ChainError>,
    },
    #[error("Chain lock poisoned")]
    Poisoned,
}

impl ChainError {
    /// Errors that reject one block without saying anything about the node
    pub fn is_block_fault(&self) -> bool {
        !matches!(
            self,
            ChainError::Store(_) | ChainError::Reorg { .. } | ChainError::Poisoned | ChainError::NoGenesis
        )
    }
}
