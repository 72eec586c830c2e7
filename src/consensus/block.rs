//! Block structure for the tri-channel chain
//!
//! Three wire shapes exist: legacy blocks (UTXO transactions, producer first),
//! tritium blocks (register-model contracts plus legacy transactions, producer
//! last) and client blocks (header plus transaction references only). All of
//! them reduce to one `BlockState`.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::crypto::{compute_merkle_root, hash_bytes, sha256d, Hash};
use crate::validation::{LegacyTransaction, Transaction, TxKind, TxRef};

/// Block production channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    Stake = 0,
    Prime = 1,
    Hash = 2,
    /// Private-chain blocks; never contribute weight
    Hybrid = 3,
}

impl Channel {
    /// Slot of this channel in the weight vector
    pub fn weight_index(self) -> Option<usize> {
        match self {
            Channel::Stake => Some(0),
            Channel::Prime => Some(1),
            Channel::Hash => Some(2),
            Channel::Hybrid => None,
        }
    }

    pub fn is_work(self) -> bool {
        matches!(self, Channel::Prime | Channel::Hash)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Channel::Stake => "stake",
            Channel::Prime => "prime",
            Channel::Hash => "hash",
            Channel::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Block header containing all metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockHeader {
    /// Protocol version
    pub version: u32,
    /// Hash of the previous block
    pub prev_hash: Hash,
    /// Merkle root of the transaction references
    pub merkle_root: Hash,
    pub channel: Channel,
    pub height: u32,
    /// Difficulty (compact target for hash, cluster bits for prime)
    pub bits: u32,
    pub nonce: u64,
    /// Block timestamp (seconds since Unix epoch)
    pub time: u64,
    /// Prime cluster offsets, empty outside the prime channel
    pub offsets: Vec<u8>,
}

impl BlockHeader {
    /// Serialize the header for hashing
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(101 + self.offsets.len());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        bytes.push(self.channel as u8);
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.extend_from_slice(&self.bits.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.offsets);
        bytes
    }

    /// Block identity hash
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes())
    }

    /// Proof-of-work hash
    pub fn proof_hash(&self) -> Hash {
        sha256d(&self.to_bytes())
    }

    /// First member of the prime cluster: the header hash without nonce or
    /// offsets, plus the nonce
    pub fn prime_origin(&self) -> U256 {
        let base = BlockHeader {
            nonce: 0,
            offsets: Vec::new(),
            ..self.clone()
        };
        let (origin, _) = sha256d(&base.to_bytes()).to_u256().overflowing_add(U256::from(self.nonce));
        origin
    }

    /// Stake eligibility hash.
    ///
    /// # Panics
    /// If the header is not on the stake channel.
    pub fn stake_hash(&self) -> Hash {
        assert_eq!(self.channel, Channel::Stake, "stake hash requested for a {} block", self.channel);

        let mut bytes = Vec::with_capacity(84);
        bytes.extend_from_slice(b"stake");
        bytes.extend_from_slice(&self.prev_hash.0);
        bytes.extend_from_slice(&self.merkle_root.0);
        bytes.extend_from_slice(&self.time.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        sha256d(&bytes)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

/// UTXO-model block; the producer is the first transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyBlock {
    pub header: BlockHeader,
    pub signature: Vec<u8>,
    pub transactions: Vec<LegacyTransaction>,
}

/// Register-model block; the producer is the last transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TritiumBlock {
    pub header: BlockHeader,
    pub signature: Vec<u8>,
    pub transactions: Vec<Transaction>,
}

/// Header plus references, with bodies resolved locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientBlock {
    pub header: BlockHeader,
    pub signature: Vec<u8>,
    pub vtx: Vec<TxRef>,
}

/// Any block shape accepted by the chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceBlock {
    Legacy(LegacyBlock),
    Tritium(TritiumBlock),
    Client(ClientBlock),
}

impl SourceBlock {
    pub fn header(&self) -> &BlockHeader {
        match self {
            SourceBlock::Legacy(block) => &block.header,
            SourceBlock::Tritium(block) => &block.header,
            SourceBlock::Client(block) => &block.header,
        }
    }

    pub fn hash(&self) -> Hash {
        self.header().hash()
    }

    pub fn prev_hash(&self) -> Hash {
        self.header().prev_hash
    }

    /// Ordered transaction references
    pub fn vtx(&self) -> Vec<TxRef> {
        match self {
            SourceBlock::Legacy(block) => block
                .transactions
                .iter()
                .map(|tx| TxRef::new(TxKind::Legacy, tx.hash()))
                .collect(),
            SourceBlock::Tritium(block) => block.transactions.iter().map(Transaction::to_ref).collect(),
            SourceBlock::Client(block) => block.vtx.clone(),
        }
    }

    /// Transaction bodies carried by the block itself
    pub fn bodies(&self) -> Vec<Transaction> {
        match self {
            SourceBlock::Legacy(block) => block.transactions.iter().cloned().map(Transaction::Legacy).collect(),
            SourceBlock::Tritium(block) => block.transactions.clone(),
            SourceBlock::Client(_) => Vec::new(),
        }
    }
}

/// Merkle root over a reference list
pub fn vtx_merkle_root(vtx: &[TxRef]) -> Hash {
    let hashes: Vec<Hash> = vtx.iter().map(|tx| tx.hash).collect();
    compute_merkle_root(&hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(channel: Channel) -> BlockHeader {
        BlockHeader {
            version: 7,
            prev_hash: Hash::zero(),
            merkle_root: Hash::zero(),
            channel,
            height: 0,
            bits: 0x1d00ffff,
            nonce: 1,
            time: 1234567890,
            offsets: vec![],
        }
    }

    #[test]
    fn test_block_header_serialization() {
        let bytes = header(Channel::Hash).to_bytes();
        assert_eq!(bytes.len(), 4 + 32 + 32 + 1 + 4 + 4 + 8 + 8 + 4);
    }

    #[test]
    fn test_genesis_block_detection() {
        assert!(header(Channel::Hash).is_genesis());
    }

    #[test]
    fn test_proof_hash_differs_from_identity() {
        let header = header(Channel::Hash);
        assert_ne!(header.hash(), header.proof_hash());
    }

    #[test]
    fn test_stake_hash_ignores_height() {
        let mut first = header(Channel::Stake);
        let stake_hash = first.stake_hash();
        first.height = 9;
        assert_eq!(first.stake_hash(), stake_hash);
        first.nonce = 2;
        assert_ne!(first.stake_hash(), stake_hash);
    }

    #[test]
    fn test_prime_origin_ignores_offsets() {
        let mut prime = header(Channel::Prime);
        let origin = prime.prime_origin();
        prime.offsets = vec![2, 4, 6];
        assert_eq!(prime.prime_origin(), origin);

        prime.nonce += 1;
        assert_eq!(prime.prime_origin(), origin + U256::one());
    }

    #[test]
    #[should_panic(expected = "stake hash requested")]
    fn test_stake_hash_on_work_block_panics() {
        header(Channel::Prime).stake_hash();
    }

    #[test]
    fn test_weight_slots() {
        assert_eq!(Channel::Stake.weight_index(), Some(0));
        assert_eq!(Channel::Prime.weight_index(), Some(1));
        assert_eq!(Channel::Hash.weight_index(), Some(2));
        assert_eq!(Channel::Hybrid.weight_index(), None);
    }

    #[test]
    fn test_legacy_vtx_order() {
        let coinbase = LegacyTransaction::coinbase(vec![], 1);
        let block = SourceBlock::Legacy(LegacyBlock {
            header: header(Channel::Hash),
            signature: vec![],
            transactions: vec![coinbase.clone()],
        });
        assert_eq!(block.vtx(), vec![TxRef::new(TxKind::Legacy, coinbase.hash())]);
        assert_eq!(block.bodies().len(), 1);
    }
}
