//! Block state: a block plus its derived chain position

use serde::{Deserialize, Serialize};

use crate::constants::TRITIUM_VERSION;
use crate::crypto::Hash;
use crate::validation::TxRef;

use super::{BlockHeader, Channel, SourceBlock};

/// A block and everything the chain derives about it.
///
/// Header fields come from the wire. Every other field is filled in by
/// indexing and updated by connect/disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockState {
    pub header: BlockHeader,
    /// Producer signature over the header hash (stake blocks)
    pub signature: Vec<u8>,
    /// Set while transactions of the block are still being fetched
    pub hash_missing: Hash,
    /// Accepted but barred from the best chain
    pub conflicted: bool,
    /// Opaque system context
    pub system: Vec<u8>,
    pub vtx: Vec<TxRef>,

    pub chain_trust: u64,
    pub money_supply: u64,
    pub mint: u64,
    pub fees: u64,
    pub channel_height: u32,
    /// Cumulative weight per channel: [stake, prime, hash]
    pub channel_weight: [u128; 3],
    /// Reserve per reward class: [miner, ambassador, developer]
    pub released_reserve: [u64; 3],
    pub fee_reserve: u64,
    /// Next block on the best chain, zero when not canonical
    pub hash_next: Hash,
    pub hash_checkpoint: Hash,
}

impl BlockState {
    pub fn new(header: BlockHeader, signature: Vec<u8>, vtx: Vec<TxRef>) -> Self {
        Self {
            header,
            signature,
            hash_missing: Hash::zero(),
            conflicted: false,
            system: Vec::new(),
            vtx,
            chain_trust: 0,
            money_supply: 0,
            mint: 0,
            fees: 0,
            channel_height: 0,
            channel_weight: [0; 3],
            released_reserve: [0; 3],
            fee_reserve: 0,
            hash_next: Hash::zero(),
            hash_checkpoint: Hash::zero(),
        }
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn prev_hash(&self) -> Hash {
        self.header.prev_hash
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn channel(&self) -> Channel {
        self.header.channel
    }

    pub fn time(&self) -> u64 {
        self.header.time
    }

    pub fn is_genesis(&self) -> bool {
        self.header.is_genesis()
    }

    pub fn is_stake(&self) -> bool {
        self.header.channel == Channel::Stake
    }

    pub fn is_hybrid(&self) -> bool {
        self.header.channel == Channel::Hybrid
    }

    /// Pre-tritium blocks and hybrid blocks are compared by raw trust
    pub fn uses_trust_scoring(&self) -> bool {
        self.header.version < TRITIUM_VERSION || self.is_hybrid()
    }

    /// Index of the producer transaction in `vtx`
    pub fn producer_index(&self) -> Option<usize> {
        if self.vtx.is_empty() {
            None
        } else if self.header.version >= TRITIUM_VERSION {
            Some(self.vtx.len() - 1)
        } else {
            Some(0)
        }
    }

    pub fn producer(&self) -> Option<&TxRef> {
        self.producer_index().map(|index| &self.vtx[index])
    }

    /// Whether this block sits on the best chain whose tip is `best`
    pub fn is_in_main_chain(&self, best: &Hash) -> bool {
        !self.hash_next.is_zero() || self.hash() == *best
    }
}

impl From<SourceBlock> for BlockState {
    fn from(block: SourceBlock) -> Self {
        let vtx = block.vtx();
        match block {
            SourceBlock::Legacy(block) => BlockState::new(block.header, block.signature, vtx),
            SourceBlock::Tritium(block) => BlockState::new(block.header, block.signature, vtx),
            SourceBlock::Client(block) => BlockState::new(block.header, block.signature, vtx),
        }
    }
}
