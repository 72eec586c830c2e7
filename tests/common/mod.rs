//! Chain builders shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::broadcast;

use trichain_core::chain::{ChainStore, Context, Hooks, ProcessStatus};
use trichain_core::config::ChainConfig;
use trichain_core::consensus::{
    vtx_merkle_root, BlockHeader, BlockState, Channel, ClientBlock, LegacyBlock, RewardClass, SourceBlock,
    TritiumBlock,
};
use trichain_core::constants::{COIN, GENESIS_TIMESTAMP, TRITIUM_VERSION};
use trichain_core::crypto::{hash_bytes, Hash, PrivateKey, PublicKey};
use trichain_core::mempool::MemoryPool;
use trichain_core::node::{genesis_block, Announcement, BroadcastRelay};
use trichain_core::storage::MemoryStore;
use trichain_core::validation::{Contract, LegacyTransaction, Payout, Producer, Transaction, TxRef};
use trichain_core::wallet::Wallet;

/// Seconds between test blocks
pub const SPACING: u64 = 60;
/// Local time far beyond every test block
pub const NOW: u64 = u64::MAX / 2;
pub const MINER_REWARD: u64 = 10;
pub const STAKE_AMOUNT: u64 = 1_000 * COIN;
pub const STAKE_REWARD: u64 = COIN;
pub const LEGACY_VERSION: u32 = TRITIUM_VERSION - 1;

pub fn test_config() -> ChainConfig {
    ChainConfig {
        testnet: true,
        verify_work: false,
        network_timelock: GENESIS_TIMESTAMP,
        release_per_minute: [1_000, 100, 100],
        ..ChainConfig::default()
    }
}

pub struct TestChain {
    pub chain: ChainStore<MemoryStore>,
    pub mempool: Arc<MemoryPool>,
    pub wallet: Arc<Wallet>,
    pub announcements: broadcast::Receiver<Announcement>,
    pub genesis: SourceBlock,
}

impl TestChain {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        let mempool = Arc::new(MemoryPool::new());
        let wallet = Arc::new(Wallet::new());
        let (relay, announcements) = BroadcastRelay::new(64);
        let hooks = Hooks::new(&config)
            .with_mempool(mempool.clone())
            .with_wallet(wallet.clone())
            .with_relay(Arc::new(relay));

        let genesis = genesis_block(GENESIS_TIMESTAMP, vec![]);
        let chain = ChainStore::open_with_genesis(
            MemoryStore::new(),
            Context::with_hooks(config, hooks),
            genesis.clone(),
        )
        .expect("genesis initializes");

        Self { chain, mempool, wallet, announcements, genesis }
    }

    pub fn process(&self, block: &SourceBlock) -> ProcessStatus {
        self.chain.process(block.clone(), NOW).expect("process")
    }

    pub fn state(&self, block: &SourceBlock) -> BlockState {
        self.chain
            .block(&block.hash())
            .expect("read block")
            .expect("block stored")
    }

    pub fn best_hash(&self) -> Hash {
        self.chain.best().expect("best chain").hash
    }

    /// Drain relay announcements received so far
    pub fn relayed(&mut self) -> Vec<Announcement> {
        let mut out = Vec::new();
        while let Ok(announcement) = self.announcements.try_recv() {
            out.push(announcement);
        }
        out
    }
}

/// Position a new block builds on
#[derive(Debug, Clone, Copy)]
pub struct Tip {
    pub hash: Hash,
    pub height: u32,
    pub time: u64,
}

impl Tip {
    pub fn of(block: &SourceBlock) -> Self {
        let header = block.header();
        Self { hash: block.hash(), height: header.height, time: header.time }
    }
}

fn header(tip: Tip, version: u32, channel: Channel, vtx: &[TxRef]) -> BlockHeader {
    BlockHeader {
        version,
        prev_hash: tip.hash,
        merkle_root: vtx_merkle_root(vtx),
        channel,
        height: tip.height + 1,
        bits: 0x1d00_ffff,
        nonce: 1,
        time: tip.time + SPACING,
        offsets: if channel == Channel::Prime { vec![2, 4, 6] } else { Vec::new() },
    }
}

/// Tritium block with `producer` appended after `transactions`
pub fn tritium_block(
    tip: Tip,
    channel: Channel,
    mut transactions: Vec<Transaction>,
    producer: Transaction,
    signer: Option<&PrivateKey>,
) -> SourceBlock {
    transactions.push(producer);
    let vtx: Vec<TxRef> = transactions.iter().map(Transaction::to_ref).collect();
    let header = header(tip, TRITIUM_VERSION, channel, &vtx);
    let signature = signer
        .map(|key| key.sign(&header.hash()).to_bytes().to_vec())
        .unwrap_or_default();
    SourceBlock::Tritium(TritiumBlock { header, signature, transactions })
}

/// Miner coinbase from a fresh sigchain derived from `tag`
pub fn coinbase(tag: &[u8], time: u64, reward: u64) -> Transaction {
    let sigchain = hash_bytes(tag);
    Contract::new(sigchain, 0, Hash::zero(), PublicKey([1; 32]), time)
        .with_producer(Producer::Coinbase {
            payouts: vec![Payout { class: RewardClass::Miner, recipient: sigchain, amount: reward }],
        })
        .into()
}

/// Proof-of-work block on `tip`; `salt` keeps sibling coinbases distinct
pub fn work_block(tip: Tip, channel: Channel, transactions: Vec<Transaction>, salt: &[u8]) -> SourceBlock {
    let mut tag = tip.hash.0.to_vec();
    tag.extend_from_slice(salt);
    let producer = coinbase(&tag, tip.time + SPACING, MINER_REWARD);
    tritium_block(tip, channel, transactions, producer, None)
}

/// Prime block on `tip` carrying `offsets` instead of the default cluster
pub fn prime_block(tip: Tip, offsets: Vec<u8>, salt: &[u8]) -> SourceBlock {
    let mut block = work_block(tip, Channel::Prime, vec![], salt);
    if let SourceBlock::Tritium(inner) = &mut block {
        inner.header.offsets = offsets;
    }
    block
}

/// The same block as a header plus references only
pub fn as_client(block: &SourceBlock) -> SourceBlock {
    let (header, signature) = match block {
        SourceBlock::Legacy(block) => (block.header.clone(), block.signature.clone()),
        SourceBlock::Tritium(block) => (block.header.clone(), block.signature.clone()),
        SourceBlock::Client(block) => (block.header.clone(), block.signature.clone()),
    };
    SourceBlock::Client(ClientBlock { header, signature, vtx: block.vtx() })
}

/// Plain first transaction of the sigchain derived from `tag`
pub fn transfer(tag: &[u8], time: u64) -> Transaction {
    Contract::new(hash_bytes(tag), 0, Hash::zero(), PublicKey([2; 32]), time)
        .with_fee(5)
        .into()
}

/// Legacy hash-channel block; `transactions[0]` must be the coinbase
pub fn legacy_block(tip: Tip, transactions: Vec<LegacyTransaction>) -> SourceBlock {
    legacy_block_at_version(tip, LEGACY_VERSION, transactions)
}

pub fn legacy_block_at_version(tip: Tip, version: u32, transactions: Vec<LegacyTransaction>) -> SourceBlock {
    let vtx: Vec<TxRef> = transactions
        .iter()
        .map(|tx| Transaction::Legacy(tx.clone()).to_ref())
        .collect();
    let header = header(tip, version, Channel::Hash, &vtx);
    SourceBlock::Legacy(LegacyBlock { header, signature: Vec::new(), transactions })
}

/// A sigchain producing a run of coinstakes
#[derive(Clone)]
pub struct Staker {
    pub key: PrivateKey,
    pub sigchain: Hash,
    sequence: u32,
    last_tx: Hash,
    last_stake: Hash,
}

impl Staker {
    pub fn new(tag: &[u8]) -> Self {
        Self {
            key: PrivateKey::generate(),
            sigchain: hash_bytes(tag),
            sequence: 0,
            last_tx: Hash::zero(),
            last_stake: Hash::zero(),
        }
    }

    pub fn coinstake(&self, time: u64) -> Contract {
        Contract::new(self.sigchain, self.sequence, self.last_tx, self.key.public_key(), time).with_producer(
            Producer::Coinstake {
                last_stake: self.last_stake,
                trust: self.sequence as u64 * 10,
                stake: STAKE_AMOUNT,
                balance: STAKE_AMOUNT,
                reward: STAKE_REWARD,
            },
        )
    }

    /// Signed stake block on `tip`; advances the sigchain
    pub fn stake_block(&mut self, tip: Tip, transactions: Vec<Transaction>) -> SourceBlock {
        let contract = self.coinstake(tip.time + SPACING);
        let hash = contract.hash();
        let block = tritium_block(tip, Channel::Stake, transactions, contract.into(), Some(&self.key));

        self.sequence += 1;
        self.last_tx = hash;
        self.last_stake = hash;
        block
    }
}

/// Producer transaction hash of a tritium block
pub fn producer_hash(block: &SourceBlock) -> Hash {
    block.vtx().last().map(|tx| tx.hash).expect("block has a producer")
}
