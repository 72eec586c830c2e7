//! Genesis block generation
//!
//! The genesis block is a hash-channel tritium block whose only transaction
//! is the network's coinbase.

use crate::consensus::{vtx_merkle_root, BlockHeader, Channel, SourceBlock, TritiumBlock};
use crate::constants::{CHAIN_NAME, GENESIS_TIMESTAMP, TRITIUM_VERSION};
use crate::crypto::{hash_bytes, Hash, PublicKey};
use crate::validation::{Contract, Payout, Producer, Transaction};

/// Initial difficulty target (easy for genesis)
const GENESIS_DIFFICULTY: u32 = 0x1e00ffff;

/// Sigchain id of the genesis coinbase
pub fn genesis_sigchain() -> Hash {
    hash_bytes(format!("{CHAIN_NAME}/genesis").as_bytes())
}

/// Build a genesis block at `time` paying `payouts`
pub fn genesis_block(time: u64, payouts: Vec<Payout>) -> SourceBlock {
    let coinbase = Contract::new(genesis_sigchain(), 0, Hash::zero(), PublicKey([0u8; 32]), time)
        .with_producer(Producer::Coinbase { payouts });
    let transactions = vec![Transaction::Tritium(coinbase)];
    let vtx: Vec<_> = transactions.iter().map(Transaction::to_ref).collect();

    let header = BlockHeader {
        version: TRITIUM_VERSION,
        prev_hash: Hash::zero(),
        merkle_root: vtx_merkle_root(&vtx),
        channel: Channel::Hash,
        height: 0,
        bits: GENESIS_DIFFICULTY,
        nonce: 0,
        time,
        offsets: Vec::new(),
    };

    SourceBlock::Tritium(TritiumBlock {
        header,
        signature: Vec::new(),
        transactions,
    })
}

/// Create the genesis block
///
/// This function produces a reproducible, byte-for-byte identical genesis block.
pub fn create_genesis_block() -> SourceBlock {
    genesis_block(GENESIS_TIMESTAMP, Vec::new())
}

/// Get genesis block hash (computed once)
pub fn genesis_hash() -> Hash {
    create_genesis_block().hash()
}

/// Genesis block statistics
#[derive(Debug)]
pub struct GenesisInfo {
    pub hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u64,
    pub channel: Channel,
}

impl GenesisInfo {
    pub fn new() -> Self {
        let genesis = create_genesis_block();
        let header = genesis.header();
        Self {
            hash: genesis.hash(),
            merkle_root: header.merkle_root,
            timestamp: header.time,
            channel: header.channel,
        }
    }
}

impl Default for GenesisInfo {
    fn default() -> Self {
        Self::new()
    }
}
